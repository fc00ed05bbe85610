use crate::error::ClientError;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one check inside a [`BoundedPoll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    Pending,
}

/// Cooperative polling loop: check, sleep `interval`, repeat until the check
/// reports ready or `timeout` elapses. A check error ends the loop at once.
///
/// Shared by the job registry and the UDF registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedPoll {
    operation: &'static str,
    interval: Duration,
    timeout: Duration,
}

impl BoundedPoll {
    pub fn new(operation: &'static str, interval: Duration, timeout: Duration) -> Self {
        Self {
            operation,
            interval: interval.max(Duration::from_millis(1)),
            timeout,
        }
    }

    /// Runs `check` until ready. The check receives the elapsed time since the
    /// loop started. One final check runs at the deadline before giving up.
    pub async fn run<T, F, Fut>(&self, mut check: F) -> Result<T, ClientError>
    where
        F: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<PollOutcome<T>, ClientError>>,
    {
        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            if let PollOutcome::Ready(value) = check(started.elapsed()).await? {
                return Ok(value);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout {
                    operation: self.operation,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::time::sleep(self.interval.min(deadline - now)).await;
        }
    }
}
