//! Per-call policies. The core validates their shape and hands them to the
//! transport unchanged; enforcement belongs to the cluster.

use crate::config::ClientConfig;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExistsAction {
    /// Create or update.
    #[default]
    Update,
    /// Update only; fail if the record is missing.
    UpdateOnly,
    /// Create only; fail if the record exists.
    Create,
    /// Replace all bins; fail if the record is missing.
    Replace,
    CreateOrReplace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GenerationPolicy {
    #[default]
    Ignore,
    ExpectEq(u32),
    ExpectGt(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommitLevel {
    #[default]
    All,
    Master,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KeyPolicy {
    #[default]
    Digest,
    Send,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanPriority {
    #[default]
    Auto,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadPolicy {
    pub timeout_ms: u64,
    pub key: KeyPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritePolicy {
    pub timeout_ms: u64,
    pub key: KeyPolicy,
    pub exists: ExistsAction,
    pub generation: GenerationPolicy,
    pub commit_level: CommitLevel,
    /// Record time-to-live; `None` keeps the namespace default.
    pub ttl_secs: Option<u32>,
}

impl WritePolicy {
    pub fn with_exists(mut self, exists: ExistsAction) -> Self {
        self.exists = exists;
        self
    }

    pub fn with_generation(mut self, generation: GenerationPolicy) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_ttl_secs(mut self, ttl_secs: u32) -> Self {
        self.ttl_secs = Some(ttl_secs);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    pub timeout_ms: u64,
    /// Let the transport fan out to nodes in parallel.
    pub concurrent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPolicy {
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoPolicy {
    pub timeout_ms: u64,
}

/// Policy bundle derived from the client config; callers clone and adjust.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policies {
    pub read: ReadPolicy,
    pub write: WritePolicy,
    pub batch: BatchPolicy,
    pub query: QueryPolicy,
    pub info: InfoPolicy,
}

impl Policies {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            read: ReadPolicy {
                timeout_ms: config.read_timeout_ms,
                key: KeyPolicy::Digest,
            },
            write: WritePolicy {
                timeout_ms: config.write_timeout_ms,
                key: KeyPolicy::Digest,
                exists: ExistsAction::Update,
                generation: GenerationPolicy::Ignore,
                commit_level: CommitLevel::All,
                ttl_secs: None,
            },
            batch: BatchPolicy {
                timeout_ms: config.batch_timeout_ms,
                concurrent: false,
            },
            query: QueryPolicy {
                timeout_ms: config.query_timeout_ms,
            },
            info: InfoPolicy {
                timeout_ms: config.info_timeout_ms,
            },
        }
    }
}

pub(crate) fn validate_scan_percent(percent: u8) -> Result<(), ClientError> {
    if !(1..=100).contains(&percent) {
        return Err(ClientError::InvalidArgument(format!(
            "scan percent must be within 1..=100, got {percent}"
        )));
    }
    Ok(())
}
