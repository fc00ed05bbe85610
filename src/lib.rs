pub mod command;
pub mod config;
pub mod error;
pub mod index;
pub mod job;
pub mod operation;
pub mod poll;
pub mod policy;
pub mod query;
pub mod record;
pub mod sync_bridge;
pub mod transport;
pub mod udf;

pub use command::{BatchEntry, BatchOutcome, BatchResult};
pub use config::{ClientConfig, Host};
pub use error::{ClientError, ErrorCode, ServerErrorKind};
pub use index::{IndexDefinition, IndexType};
pub use job::{Job, JobId, JobInfo, JobKind, JobStatus};
pub use operation::{Operation, OperationKind};
pub use policy::{Policies, ReadPolicy, WritePolicy};
pub use query::{Execution, Filter, Order, ReadSpec, ResultRow, ResultStream, bin};
pub use record::{BinValue, Bins, Key, Record, UserKey, bins};
pub use sync_bridge::ClusterClientSync;
pub use transport::Transport;
pub use udf::{RegistrationState, UdfModule};

use crate::command::{BatchExecutor, OperateExecutor};
use crate::config::validate_config;
use crate::index::IndexManager;
use crate::job::{JobRegistry, JobTracker};
use crate::operation::validate_bin_name;
use crate::policy::QueryPolicy;
use crate::query::{Query, Scan};
use crate::transport::{ReadRequest, WriteRequest};
use crate::udf::UdfRegistry;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Explicitly constructed client context. Every component borrows it; there
/// is no process-wide client.
pub struct ClusterClient {
    config: ClientConfig,
    policies: Policies,
    transport: Arc<dyn Transport>,
    open: AtomicBool,
    /// Last forward status observed per background job.
    jobs: Mutex<JobTracker>,
}

impl ClusterClient {
    pub async fn connect(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        validate_config(&config)?;
        let hosts: Vec<String> = config.hosts.iter().map(ToString::to_string).collect();
        info!(
            hosts = ?hosts,
            cluster_name = ?config.cluster_name,
            read_timeout_ms = config.read_timeout_ms,
            write_timeout_ms = config.write_timeout_ms,
            batch_timeout_ms = config.batch_timeout_ms,
            query_timeout_ms = config.query_timeout_ms,
            info_timeout_ms = config.info_timeout_ms,
            max_batch_keys = config.max_batch_keys,
            max_udf_module_bytes = config.max_udf_module_bytes,
            udf_wait_poll_interval_ms = config.udf_wait_poll_interval_ms,
            job_poll_interval_ms = config.job_poll_interval_ms,
            job_not_found_grace_ms = config.job_not_found_grace_ms,
            max_finished_jobs = config.max_finished_jobs,
            "cluster client connecting"
        );
        transport.connect(&config.hosts).await?;
        Ok(Self {
            policies: Policies::from_config(&config),
            jobs: Mutex::new(JobTracker::new(config.max_finished_jobs)),
            config,
            transport,
            open: AtomicBool::new(true),
        })
    }

    /// Closes the transport. Further calls fail with `Closed`. Closing twice
    /// is a no-op.
    pub async fn close(&self) -> Result<(), ClientError> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.transport.close().await?;
        info!("cluster client closed");
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Default policies derived from the config.
    pub fn policies(&self) -> &Policies {
        &self.policies
    }

    pub(crate) fn transport(&self) -> Result<&dyn Transport, ClientError> {
        if !self.is_open() {
            return Err(ClientError::Closed);
        }
        Ok(self.transport.as_ref())
    }

    pub(crate) fn job_states(&self) -> MutexGuard<'_, JobTracker> {
        self.jobs.lock()
    }

    pub async fn put(&self, key: &Key, bins: Bins) -> Result<Record, ClientError> {
        self.put_with_policy(key, bins, &self.policies.write).await
    }

    /// Writes `bins`, merging with existing bins unless the policy replaces
    /// them. A `Nil` value deletes its bin. Returns the new record header.
    pub async fn put_with_policy(
        &self,
        key: &Key,
        bins: Bins,
        policy: &WritePolicy,
    ) -> Result<Record, ClientError> {
        key.validate()?;
        if bins.is_empty() {
            return Err(ClientError::InvalidArgument(
                "put requires at least one bin".into(),
            ));
        }
        for name in bins.keys() {
            validate_bin_name(name)?;
        }
        let transport = self.transport()?;
        debug!(key = %key, bins = bins.len(), "put");
        let raw = transport
            .write(WriteRequest {
                key: key.clone(),
                bins,
                policy: policy.clone(),
            })
            .await?;
        Ok(Record::header_only(key.clone(), raw.generation, raw.expiration))
    }

    /// Reads a record. `None` or an empty projection returns every bin.
    pub async fn get(&self, key: &Key, projection: Option<&[&str]>) -> Result<Record, ClientError> {
        self.get_with_policy(key, projection, &self.policies.read)
            .await
    }

    pub async fn get_with_policy(
        &self,
        key: &Key,
        projection: Option<&[&str]>,
        policy: &ReadPolicy,
    ) -> Result<Record, ClientError> {
        key.validate()?;
        let projection = match projection {
            Some(bins) if !bins.is_empty() => {
                for bin in bins {
                    validate_bin_name(bin)?;
                }
                Some(bins.iter().map(|b| b.to_string()).collect())
            }
            _ => None,
        };
        self.read(key, projection, false, policy).await
    }

    /// Metadata only: generation and expiration, no bins.
    pub async fn get_header(&self, key: &Key) -> Result<Record, ClientError> {
        key.validate()?;
        self.read(key, None, true, &self.policies.read).await
    }

    pub async fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        match self.get_header(key).await {
            Ok(_) => Ok(true),
            Err(ClientError::RecordNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn read(
        &self,
        key: &Key,
        projection: Option<Vec<String>>,
        header_only: bool,
        policy: &ReadPolicy,
    ) -> Result<Record, ClientError> {
        let transport = self.transport()?;
        let raw = transport
            .read(ReadRequest {
                key: key.clone(),
                projection,
                header_only,
                policy: policy.clone(),
            })
            .await?
            .ok_or_else(|| ClientError::RecordNotFound {
                key: key.to_string(),
            })?;
        Ok(Record::new(
            key.clone(),
            raw.generation,
            raw.expiration,
            raw.bins.into_iter().collect(),
        ))
    }

    /// Returns whether a record was removed.
    pub async fn remove(&self, key: &Key) -> Result<bool, ClientError> {
        self.remove_with_policy(key, &self.policies.write).await
    }

    pub async fn remove_with_policy(
        &self,
        key: &Key,
        policy: &WritePolicy,
    ) -> Result<bool, ClientError> {
        key.validate()?;
        let transport = self.transport()?;
        debug!(key = %key, "remove");
        transport.remove(key.clone(), policy.clone()).await
    }

    pub async fn operate(
        &self,
        key: &Key,
        operations: Vec<Operation>,
    ) -> Result<Record, ClientError> {
        self.operate_with_policy(key, operations, &self.policies.write)
            .await
    }

    pub async fn operate_with_policy(
        &self,
        key: &Key,
        operations: Vec<Operation>,
        policy: &WritePolicy,
    ) -> Result<Record, ClientError> {
        OperateExecutor::new(self)
            .execute(key, operations, policy)
            .await
    }

    pub fn batch(&self) -> BatchExecutor<'_> {
        BatchExecutor::new(self)
    }

    pub async fn batch_exists(&self, keys: &[Key]) -> Result<BatchResult, ClientError> {
        self.batch().exists(keys).await
    }

    pub async fn batch_get(
        &self,
        keys: &[Key],
        projection: Option<&[&str]>,
    ) -> Result<BatchResult, ClientError> {
        self.batch().get(keys, projection).await
    }

    pub fn query(&self, namespace: &str, set: &str) -> Query<'_> {
        Query::new(self, namespace, set)
    }

    pub fn scan(&self, namespace: &str, set: &str) -> Scan<'_> {
        Scan::new(self, namespace, set)
    }

    /// Runs a prebuilt read spec, foreground or background per its flag.
    pub async fn execute(
        &self,
        spec: ReadSpec,
        policy: &QueryPolicy,
    ) -> Result<Execution, ClientError> {
        query::executor::execute(self, spec, policy.clone()).await
    }

    pub fn jobs(&self) -> JobRegistry<'_> {
        JobRegistry::new(self)
    }

    pub fn udf(&self) -> UdfRegistry<'_> {
        UdfRegistry::new(self)
    }

    pub fn indexes(&self) -> IndexManager<'_> {
        IndexManager::new(self)
    }

    pub async fn create_index(&self, definition: IndexDefinition) -> Result<(), ClientError> {
        self.indexes().create(definition).await
    }

    pub async fn drop_index(&self, namespace: &str, index_name: &str) -> Result<(), ClientError> {
        self.indexes().drop(namespace, index_name).await
    }
}
