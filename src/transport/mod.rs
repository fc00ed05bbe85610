//! Boundary with the network/serialization layer.
//!
//! The core never talks to nodes directly. Every round trip goes through a
//! [`Transport`], which owns connection pooling, partition routing and wire
//! encoding. Implementations must be safe to share across concurrent callers.

pub mod memory;

use crate::config::Host;
use crate::error::ClientError;
use crate::index::IndexDefinition;
use crate::job::{JobId, JobKind, JobStatus};
use crate::operation::Operation;
use crate::policy::{BatchPolicy, InfoPolicy, QueryPolicy, ReadPolicy, WritePolicy};
use crate::query::plan::ReadSpec;
use crate::record::{BinValue, Bins, Key};
use crate::udf::UdfLanguage;
use async_trait::async_trait;

/// Record payload as produced by the transport, before the executors shape it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub generation: u32,
    pub expiration: u32,
    /// Bin entries in server order. Names may repeat when an operate request
    /// reads the same bin twice; the last entry wins.
    pub bins: Vec<(String, BinValue)>,
}

impl RawRecord {
    pub fn header(generation: u32, expiration: u32) -> Self {
        Self {
            generation,
            expiration,
            bins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperateRequest {
    pub key: Key,
    /// Applied server-side strictly in this order, as one transaction.
    pub operations: Vec<Operation>,
    pub policy: WritePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: Key,
    /// `None` reads every bin.
    pub projection: Option<Vec<String>>,
    pub header_only: bool,
    pub policy: ReadPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub key: Key,
    pub bins: Bins,
    pub policy: WritePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReadMode {
    /// Existence only; found entries carry metadata and no bins.
    Exists,
    AllBins,
    Bins(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub keys: Vec<Key>,
    pub mode: BatchReadMode,
    pub policy: BatchPolicy,
}

/// One per requested key, in request order.
#[derive(Debug)]
pub enum RawBatchEntry {
    Found(RawRecord),
    NotFound,
    Failed(ClientError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawRow {
    Record { key: Key, record: RawRecord },
    /// Output of an aggregation function; no record shape.
    Value(BinValue),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawScanResponse {
    Rows(Vec<RawRow>),
    Job(JobId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawJobInfo {
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub records_scanned: u64,
}

/// A registered module as reported by the cluster, with one activation flag
/// per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleListing {
    pub filename: String,
    pub content_hash: String,
    pub language: UdfLanguage,
    pub node_loaded: Vec<bool>,
}

impl ModuleListing {
    pub fn loaded_on_all_nodes(&self) -> bool {
        !self.node_loaded.is_empty() && self.node_loaded.iter().all(|loaded| *loaded)
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, hosts: &[Host]) -> Result<(), ClientError>;

    async fn close(&self) -> Result<(), ClientError>;

    async fn operate(&self, req: OperateRequest) -> Result<RawRecord, ClientError>;

    /// `Ok(None)` when the record does not exist.
    async fn read(&self, req: ReadRequest) -> Result<Option<RawRecord>, ClientError>;

    async fn write(&self, req: WriteRequest) -> Result<RawRecord, ClientError>;

    /// Returns whether a record was removed.
    async fn remove(&self, key: Key, policy: WritePolicy) -> Result<bool, ClientError>;

    /// Must return exactly one entry per key, in request order.
    async fn batch(&self, req: BatchRequest) -> Result<Vec<RawBatchEntry>, ClientError>;

    async fn scan(
        &self,
        spec: ReadSpec,
        policy: QueryPolicy,
    ) -> Result<RawScanResponse, ClientError>;

    async fn poll_job(&self, job_id: JobId, policy: InfoPolicy)
    -> Result<RawJobInfo, ClientError>;

    async fn put_module(
        &self,
        filename: String,
        content: Vec<u8>,
        language: UdfLanguage,
        policy: InfoPolicy,
    ) -> Result<(), ClientError>;

    async fn remove_module(&self, filename: String, policy: InfoPolicy)
    -> Result<(), ClientError>;

    async fn list_modules(&self, policy: InfoPolicy) -> Result<Vec<ModuleListing>, ClientError>;

    async fn create_index(
        &self,
        definition: IndexDefinition,
        policy: InfoPolicy,
    ) -> Result<(), ClientError>;

    async fn drop_index(
        &self,
        namespace: String,
        index_name: String,
        policy: InfoPolicy,
    ) -> Result<(), ClientError>;
}
