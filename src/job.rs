use crate::ClusterClient;
use crate::error::ClientError;
use crate::poll::{BoundedPoll, PollOutcome};
use crate::query::plan::ReadSpec;
use crate::transport::RawScanResponse;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Scan,
    Query,
}

/// Background job lifecycle. Transitions only move forward:
/// `Pending -> InProgress -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::InProgress => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward step (or a
    /// repeat of the same state).
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return self == next;
        }
        next.rank() >= self.rank()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Handle for a submitted background job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
}

/// Snapshot of a job as last observed. A new `poll` is required to see changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub records_scanned: u64,
}

impl JobInfo {
    pub(crate) fn submitted(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Pending,
            progress_percent: 0,
            records_scanned: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Last forward snapshot per job. Running jobs are always kept; terminal
/// snapshots beyond `retain_finished` are evicted oldest first.
#[derive(Debug)]
pub(crate) struct JobTracker {
    states: HashMap<JobId, JobInfo>,
    finished: VecDeque<JobId>,
    retain_finished: usize,
}

impl JobTracker {
    pub(crate) fn new(retain_finished: usize) -> Self {
        Self {
            states: HashMap::new(),
            finished: VecDeque::new(),
            retain_finished: retain_finished.max(1),
        }
    }

    pub(crate) fn get(&self, job_id: &JobId) -> Option<&JobInfo> {
        self.states.get(job_id)
    }

    pub(crate) fn record(&mut self, info: JobInfo) {
        let newly_finished = info.is_terminal()
            && !self
                .states
                .get(&info.id)
                .is_some_and(JobInfo::is_terminal);
        let job_id = info.id.clone();
        self.states.insert(job_id.clone(), info);
        if !newly_finished {
            return;
        }
        self.finished.push_back(job_id);
        while self.finished.len() > self.retain_finished {
            if let Some(evicted) = self.finished.pop_front() {
                self.states.remove(&evicted);
                debug!(job_id = %evicted, "finished job snapshot evicted");
            }
        }
    }

    pub(crate) fn remove(&mut self, job_id: &JobId) -> Option<JobInfo> {
        self.finished.retain(|finished| finished != job_id);
        self.states.remove(job_id)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.states.len()
    }
}

/// Tracks background scans and queries by id.
pub struct JobRegistry<'a> {
    client: &'a ClusterClient,
}

impl<'a> JobRegistry<'a> {
    pub(crate) fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    /// Submits `spec` for background execution. The job is tracked as
    /// `Pending` until the first poll. Never waits for the job itself.
    pub async fn submit(&self, mut spec: ReadSpec) -> Result<Job, ClientError> {
        spec.background = true;
        spec.validate()?;
        let transport = self.client.transport()?;
        let kind = spec.job_kind();
        let policy = self.client.policies().query.clone();
        let job_id = match transport.scan(spec, policy).await? {
            RawScanResponse::Job(job_id) => job_id,
            RawScanResponse::Rows(_) => {
                return Err(ClientError::Transport(
                    "background request answered with result rows".into(),
                ));
            }
        };
        debug!(job_id = %job_id, kind = ?kind, "background job submitted");
        self.client
            .job_states()
            .record(JobInfo::submitted(job_id.clone(), kind));
        Ok(Job { id: job_id, kind })
    }

    /// Observes the current status of `job_id`. Read-only with respect to the
    /// job; the registry only records the last forward status it has seen.
    ///
    /// Right after submission the cluster may not know the job yet, so
    /// `JobNotFound` is expected transiently and the caller decides whether to
    /// retry.
    ///
    /// Concurrent polls may answer out of order. A reply older than a status
    /// another poll has already recorded yields that recorded status;
    /// `JobStateRegression` is reserved for a reply behind the status known
    /// when this request was sent.
    pub async fn poll(&self, job_id: &JobId) -> Result<JobInfo, ClientError> {
        let transport = self.client.transport()?;
        let before = self.last_observed(job_id);
        if let Some(last) = &before
            && last.is_terminal()
        {
            return Ok(last.clone());
        }

        let raw = transport
            .poll_job(job_id.clone(), self.client.policies().info.clone())
            .await?;
        let mut observed = JobInfo {
            id: job_id.clone(),
            kind: raw.kind,
            status: raw.status,
            progress_percent: raw.progress_percent.min(100),
            records_scanned: raw.records_scanned,
        };
        if let Some(before) = &before
            && !before.status.can_advance_to(observed.status)
        {
            return Err(ClientError::JobStateRegression {
                job_id: job_id.to_string(),
                from: before.status,
                to: observed.status,
            });
        }

        let mut states = self.client.job_states();
        if let Some(current) = states.get(job_id) {
            if !current.status.can_advance_to(observed.status) {
                debug!(
                    job_id = %job_id,
                    recorded = %current.status,
                    reply = %observed.status,
                    "stale job status reply"
                );
                return Ok(current.clone());
            }
            if current.status == observed.status {
                observed.progress_percent = observed.progress_percent.max(current.progress_percent);
                observed.records_scanned = observed.records_scanned.max(current.records_scanned);
            }
        }
        if observed.status == JobStatus::Completed {
            observed.progress_percent = 100;
        }
        states.record(observed.clone());
        Ok(observed)
    }

    /// Last status observed by this client, without contacting the cluster.
    pub fn last_observed(&self, job_id: &JobId) -> Option<JobInfo> {
        self.client.job_states().get(job_id).cloned()
    }

    /// Forgets local tracking for `job_id`. The job itself is unaffected.
    pub fn forget(&self, job_id: &JobId) -> Option<JobInfo> {
        self.client.job_states().remove(job_id)
    }

    /// Polls until the job reaches a terminal state. `JobNotFound` is treated
    /// as "not indexed yet" for the configured grace window. A failed job is
    /// returned as a terminal snapshot, not as an error.
    pub async fn wait_for_completion(
        &self,
        job_id: &JobId,
        interval: Duration,
        timeout: Duration,
    ) -> Result<JobInfo, ClientError> {
        let grace = self.client.config().job_not_found_grace();
        BoundedPoll::new("job wait", interval, timeout)
            .run(move |elapsed| async move {
                match self.poll(job_id).await {
                    Ok(info) if info.is_terminal() => Ok(PollOutcome::Ready(info)),
                    Ok(info) => {
                        debug!(
                            job_id = %job_id,
                            status = %info.status,
                            progress = info.progress_percent,
                            "job still running"
                        );
                        Ok(PollOutcome::Pending)
                    }
                    Err(ClientError::JobNotFound { .. }) if elapsed < grace => {
                        warn!(job_id = %job_id, elapsed_ms = elapsed.as_millis() as u64, "job not visible yet");
                        Ok(PollOutcome::Pending)
                    }
                    Err(err) => Err(err),
                }
            })
            .await
    }

    /// `wait_for_completion` with the configured poll interval.
    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> Result<JobInfo, ClientError> {
        self.wait_for_completion(job_id, self.client.config().job_poll_interval(), timeout)
            .await
    }
}
