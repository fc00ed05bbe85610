use crate::error::ClientError;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub port: u16,
}

impl Host {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// Runtime configuration for a cluster client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub hosts: Vec<Host>,
    pub cluster_name: Option<String>,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub batch_timeout_ms: u64,
    pub query_timeout_ms: u64,
    pub info_timeout_ms: u64,
    pub max_batch_keys: usize,
    pub max_udf_module_bytes: usize,
    pub udf_wait_poll_interval_ms: u64,
    pub default_udf_wait_timeout_ms: u64,
    pub job_poll_interval_ms: u64,
    /// How long `wait_for_completion` tolerates `JobNotFound` after its first
    /// poll before treating it as fatal.
    pub job_not_found_grace_ms: u64,
    /// Terminal job snapshots kept for `last_observed`; the oldest are
    /// dropped first.
    pub max_finished_jobs: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: vec![Host::new("127.0.0.1", DEFAULT_PORT)],
            cluster_name: None,
            read_timeout_ms: 1_000,
            write_timeout_ms: 1_000,
            batch_timeout_ms: 1_000,
            query_timeout_ms: 0,
            info_timeout_ms: 1_000,
            max_batch_keys: 5_000,
            max_udf_module_bytes: 1024 * 1024,
            udf_wait_poll_interval_ms: 100,
            default_udf_wait_timeout_ms: 1_000,
            job_poll_interval_ms: 1_000,
            job_not_found_grace_ms: 2_000,
            max_finished_jobs: 1_024,
        }
    }
}

impl ClientConfig {
    pub fn with_hosts(hosts: Vec<Host>) -> Self {
        Self {
            hosts,
            ..Self::default()
        }
    }

    /// Short polling cadence for local clusters and tests.
    pub fn development() -> Self {
        Self {
            udf_wait_poll_interval_ms: 10,
            job_poll_interval_ms: 10,
            job_not_found_grace_ms: 500,
            ..Self::default()
        }
    }

    pub fn udf_wait_poll_interval(&self) -> Duration {
        Duration::from_millis(self.udf_wait_poll_interval_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn job_not_found_grace(&self) -> Duration {
        Duration::from_millis(self.job_not_found_grace_ms)
    }
}

pub(crate) fn validate_config(config: &ClientConfig) -> Result<(), ClientError> {
    if config.hosts.is_empty() {
        return Err(ClientError::InvalidConfig {
            message: "at least one seed host is required".into(),
        });
    }
    if let Some(host) = config
        .hosts
        .iter()
        .find(|h| h.name.is_empty() || h.port == 0)
    {
        return Err(ClientError::InvalidConfig {
            message: format!("invalid seed host '{host}'"),
        });
    }
    if config.max_batch_keys == 0 {
        return Err(ClientError::InvalidConfig {
            message: "max_batch_keys must be > 0".into(),
        });
    }
    if config.max_udf_module_bytes == 0 {
        return Err(ClientError::InvalidConfig {
            message: "max_udf_module_bytes must be > 0".into(),
        });
    }
    if config.udf_wait_poll_interval_ms == 0 {
        return Err(ClientError::InvalidConfig {
            message: "udf_wait_poll_interval_ms must be > 0".into(),
        });
    }
    if config.default_udf_wait_timeout_ms == 0 {
        return Err(ClientError::InvalidConfig {
            message: "default_udf_wait_timeout_ms must be > 0".into(),
        });
    }
    if config.job_poll_interval_ms == 0 {
        return Err(ClientError::InvalidConfig {
            message: "job_poll_interval_ms must be > 0".into(),
        });
    }
    if config.max_finished_jobs == 0 {
        return Err(ClientError::InvalidConfig {
            message: "max_finished_jobs must be > 0".into(),
        });
    }
    Ok(())
}
