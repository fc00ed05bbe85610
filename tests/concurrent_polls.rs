use aeroclient::ClusterClient;
use aeroclient::config::{ClientConfig, Host};
use aeroclient::error::{ClientError, ErrorCode};
use aeroclient::index::IndexDefinition;
use aeroclient::job::{JobId, JobKind, JobStatus};
use aeroclient::policy::{InfoPolicy, QueryPolicy, WritePolicy};
use aeroclient::query::ReadSpec;
use aeroclient::record::Key;
use aeroclient::transport::memory::MemoryCluster;
use aeroclient::transport::{
    BatchRequest, ModuleListing, OperateRequest, RawBatchEntry, RawJobInfo, RawRecord,
    RawScanResponse, ReadRequest, Transport, WriteRequest,
};
use aeroclient::udf::UdfLanguage;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Answers job polls from a script of `(delay, reply)` pairs, taken in
/// request order. Everything else goes to an in-memory cluster.
struct ScriptedJobs {
    inner: MemoryCluster,
    job_id: JobId,
    replies: Mutex<VecDeque<(Duration, RawJobInfo)>>,
}

impl ScriptedJobs {
    fn new(job_id: &str, replies: Vec<(Duration, JobStatus, u8)>) -> Self {
        Self {
            inner: MemoryCluster::default(),
            job_id: JobId::from(job_id),
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|(delay, status, progress_percent)| {
                        (
                            delay,
                            RawJobInfo {
                                kind: JobKind::Scan,
                                status,
                                progress_percent,
                                records_scanned: u64::from(progress_percent),
                            },
                        )
                    })
                    .collect(),
            ),
        }
    }
}

#[async_trait]
impl Transport for ScriptedJobs {
    async fn connect(&self, hosts: &[Host]) -> Result<(), ClientError> {
        self.inner.connect(hosts).await
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.inner.close().await
    }

    async fn operate(&self, req: OperateRequest) -> Result<RawRecord, ClientError> {
        self.inner.operate(req).await
    }

    async fn read(&self, req: ReadRequest) -> Result<Option<RawRecord>, ClientError> {
        self.inner.read(req).await
    }

    async fn write(&self, req: WriteRequest) -> Result<RawRecord, ClientError> {
        self.inner.write(req).await
    }

    async fn remove(&self, key: Key, policy: WritePolicy) -> Result<bool, ClientError> {
        self.inner.remove(key, policy).await
    }

    async fn batch(&self, req: BatchRequest) -> Result<Vec<RawBatchEntry>, ClientError> {
        self.inner.batch(req).await
    }

    async fn scan(
        &self,
        spec: ReadSpec,
        policy: QueryPolicy,
    ) -> Result<RawScanResponse, ClientError> {
        if spec.background {
            return Ok(RawScanResponse::Job(self.job_id.clone()));
        }
        self.inner.scan(spec, policy).await
    }

    async fn poll_job(
        &self,
        job_id: JobId,
        _policy: InfoPolicy,
    ) -> Result<RawJobInfo, ClientError> {
        let next = self.replies.lock().pop_front();
        let Some((delay, reply)) = next else {
            return Err(ClientError::JobNotFound {
                job_id: job_id.to_string(),
            });
        };
        tokio::time::sleep(delay).await;
        Ok(reply)
    }

    async fn put_module(
        &self,
        filename: String,
        content: Vec<u8>,
        language: UdfLanguage,
        policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        self.inner.put_module(filename, content, language, policy).await
    }

    async fn remove_module(
        &self,
        filename: String,
        policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        self.inner.remove_module(filename, policy).await
    }

    async fn list_modules(&self, policy: InfoPolicy) -> Result<Vec<ModuleListing>, ClientError> {
        self.inner.list_modules(policy).await
    }

    async fn create_index(
        &self,
        definition: IndexDefinition,
        policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        self.inner.create_index(definition, policy).await
    }

    async fn drop_index(
        &self,
        namespace: String,
        index_name: String,
        policy: InfoPolicy,
    ) -> Result<(), ClientError> {
        self.inner.drop_index(namespace, index_name, policy).await
    }
}

async fn submit(transport: ScriptedJobs) -> (ClusterClient, JobId) {
    let client = ClusterClient::connect(ClientConfig::development(), Arc::new(transport))
        .await
        .expect("connect");
    let job = client
        .scan("test", "jobs")
        .apply("scale.lua", "scale", Vec::new())
        .set_background(true)
        .exec()
        .await
        .expect("submit")
        .into_job()
        .expect("job handle");
    (client, job.id)
}

#[tokio::test]
async fn late_reply_to_an_earlier_poll_is_not_a_regression() {
    let (client, job_id) = submit(ScriptedJobs::new(
        "j1",
        vec![
            (Duration::from_millis(50), JobStatus::InProgress, 50),
            (Duration::ZERO, JobStatus::Completed, 100),
        ],
    ))
    .await;
    let jobs = client.jobs();

    let (slow, fast) = tokio::join!(jobs.poll(&job_id), jobs.poll(&job_id));
    let fast = fast.expect("fast poll");
    assert_eq!(fast.status, JobStatus::Completed);
    let slow = slow.expect("late reply is stale, not a regression");
    assert_eq!(slow, fast);

    let last = jobs.last_observed(&job_id).expect("tracked");
    assert_eq!(last.status, JobStatus::Completed);
    assert_eq!(last.progress_percent, 100);
}

#[tokio::test]
async fn late_progress_never_lowers_the_recorded_snapshot() {
    let (client, job_id) = submit(ScriptedJobs::new(
        "j2",
        vec![
            (Duration::from_millis(50), JobStatus::InProgress, 20),
            (Duration::ZERO, JobStatus::InProgress, 60),
        ],
    ))
    .await;
    let jobs = client.jobs();

    let (slow, fast) = tokio::join!(jobs.poll(&job_id), jobs.poll(&job_id));
    assert_eq!(fast.expect("fast poll").progress_percent, 60);
    let slow = slow.expect("slow poll");
    assert_eq!(slow.status, JobStatus::InProgress);
    assert_eq!(slow.progress_percent, 60);
}

#[tokio::test]
async fn reply_behind_the_status_known_at_request_time_is_a_regression() {
    let (client, job_id) = submit(ScriptedJobs::new(
        "j3",
        vec![
            (Duration::ZERO, JobStatus::InProgress, 50),
            (Duration::ZERO, JobStatus::Pending, 0),
        ],
    ))
    .await;
    let jobs = client.jobs();

    jobs.poll(&job_id).await.expect("running");
    let err = jobs.poll(&job_id).await.expect_err("moved backwards");
    assert_eq!(err.code(), ErrorCode::JobStateRegression);
    assert_eq!(
        jobs.last_observed(&job_id).map(|info| info.status),
        Some(JobStatus::InProgress)
    );
}
