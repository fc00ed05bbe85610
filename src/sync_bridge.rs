use crate::ClusterClient;
use crate::command::BatchResult;
use crate::error::ClientError;
use crate::index::IndexDefinition;
use crate::job::{Job, JobId, JobInfo};
use crate::operation::Operation;
use crate::policy::WritePolicy;
use crate::query::{Execution, ReadSpec};
use crate::record::{Bins, Key, Record};
use crate::udf::UdfModule;
use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

/// Drives `f` to completion on `rt`. Inside a multi-threaded runtime the
/// current worker is handed off with `block_in_place` first.
///
/// Called from within a runtime, that runtime must be multi-threaded:
/// `block_in_place` panics on a current-thread runtime, including the default
/// `#[tokio::test]` flavor.
pub fn block_on_client<F, T>(rt: &Handle, f: F) -> T
where
    F: Future<Output = T>,
{
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(|| rt.block_on(f)),
        Err(_) => rt.block_on(f),
    }
}

/// Blocking facade over [`ClusterClient`]. Use it from plain threads or from
/// a multi-threaded runtime; see [`block_on_client`].
pub struct ClusterClientSync {
    inner: Arc<ClusterClient>,
    rt: Handle,
}

impl ClusterClientSync {
    pub fn new(inner: Arc<ClusterClient>, rt: Handle) -> Self {
        Self { inner, rt }
    }

    pub fn inner(&self) -> &Arc<ClusterClient> {
        &self.inner
    }

    pub fn close(&self) -> Result<(), ClientError> {
        block_on_client(&self.rt, self.inner.close())
    }

    pub fn put(&self, key: &Key, bins: Bins) -> Result<Record, ClientError> {
        block_on_client(&self.rt, self.inner.put(key, bins))
    }

    pub fn put_with_policy(
        &self,
        key: &Key,
        bins: Bins,
        policy: &WritePolicy,
    ) -> Result<Record, ClientError> {
        block_on_client(&self.rt, self.inner.put_with_policy(key, bins, policy))
    }

    pub fn get(&self, key: &Key, projection: Option<&[&str]>) -> Result<Record, ClientError> {
        block_on_client(&self.rt, self.inner.get(key, projection))
    }

    pub fn exists(&self, key: &Key) -> Result<bool, ClientError> {
        block_on_client(&self.rt, self.inner.exists(key))
    }

    pub fn remove(&self, key: &Key) -> Result<bool, ClientError> {
        block_on_client(&self.rt, self.inner.remove(key))
    }

    pub fn operate(&self, key: &Key, operations: Vec<Operation>) -> Result<Record, ClientError> {
        block_on_client(&self.rt, self.inner.operate(key, operations))
    }

    pub fn batch_exists(&self, keys: &[Key]) -> Result<BatchResult, ClientError> {
        block_on_client(&self.rt, self.inner.batch_exists(keys))
    }

    pub fn batch_get(
        &self,
        keys: &[Key],
        projection: Option<&[&str]>,
    ) -> Result<BatchResult, ClientError> {
        block_on_client(&self.rt, self.inner.batch_get(keys, projection))
    }

    /// Runs a spec built with `ClusterClient::query`/`scan` (`into_spec`).
    pub fn execute(&self, spec: ReadSpec) -> Result<Execution, ClientError> {
        let policy = self.inner.policies().query.clone();
        block_on_client(&self.rt, self.inner.execute(spec, &policy))
    }

    pub fn submit_job(&self, spec: ReadSpec) -> Result<Job, ClientError> {
        block_on_client(&self.rt, self.inner.jobs().submit(spec))
    }

    pub fn poll_job(&self, job_id: &JobId) -> Result<JobInfo, ClientError> {
        block_on_client(&self.rt, self.inner.jobs().poll(job_id))
    }

    pub fn wait_for_job(&self, job_id: &JobId, timeout: Duration) -> Result<JobInfo, ClientError> {
        block_on_client(&self.rt, self.inner.jobs().wait(job_id, timeout))
    }

    pub fn udf_list(&self) -> Result<BTreeSet<String>, ClientError> {
        block_on_client(&self.rt, self.inner.udf().list())
    }

    pub fn udf_put(&self, path: &Path) -> Result<UdfModule, ClientError> {
        block_on_client(&self.rt, self.inner.udf().put(path))
    }

    pub fn udf_remove(&self, name: &str) -> Result<(), ClientError> {
        block_on_client(&self.rt, self.inner.udf().remove(name))
    }

    pub fn udf_wait(&self, name: &str, timeout: Duration) -> Result<UdfModule, ClientError> {
        block_on_client(&self.rt, self.inner.udf().wait(name, timeout))
    }

    pub fn create_index(&self, definition: IndexDefinition) -> Result<(), ClientError> {
        block_on_client(&self.rt, self.inner.create_index(definition))
    }

    pub fn drop_index(&self, namespace: &str, index_name: &str) -> Result<(), ClientError> {
        block_on_client(&self.rt, self.inner.drop_index(namespace, index_name))
    }
}
