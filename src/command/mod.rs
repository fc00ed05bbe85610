pub mod batch;
pub mod operate;

pub use batch::{BatchEntry, BatchExecutor, BatchOutcome, BatchResult};
pub use operate::OperateExecutor;
