pub mod executor;
pub mod plan;

pub use executor::{Execution, ResultRow, ResultStream};
pub use plan::{Filter, FilterValue, Order, Query, ReadKind, ReadSpec, Scan, ScanOptions, UdfCall, bin};
