use crate::ClusterClient;
use crate::error::ClientError;
use crate::operation::validate_bin_name;
use crate::policy::BatchPolicy;
use crate::record::{Bins, Key, Record};
use crate::transport::{BatchReadMode, BatchRequest, RawBatchEntry};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Outcome for a single key. Errors stay local to their entry.
#[derive(Debug)]
pub enum BatchOutcome {
    Found(Record),
    NotFound,
    Error(ClientError),
}

#[derive(Debug)]
pub struct BatchEntry {
    pub key: Key,
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    pub fn record(&self) -> Option<&Record> {
        match &self.outcome {
            BatchOutcome::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Found(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.outcome, BatchOutcome::NotFound)
    }

    pub fn error(&self) -> Option<&ClientError> {
        match &self.outcome {
            BatchOutcome::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// One entry per requested key, in request order.
#[derive(Debug, Default)]
pub struct BatchResult {
    entries: Vec<BatchEntry>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchEntry> {
        self.entries.iter()
    }

    pub fn found_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_found()).count()
    }

    pub fn not_found_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_not_found()).count()
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.error().is_some()).count()
    }
}

impl IntoIterator for BatchResult {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'r> IntoIterator for &'r BatchResult {
    type Item = &'r BatchEntry;
    type IntoIter = std::slice::Iter<'r, BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Runs one read kind across many keys with per-key outcomes.
pub struct BatchExecutor<'a> {
    client: &'a ClusterClient,
}

impl<'a> BatchExecutor<'a> {
    pub(crate) fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    /// Existence check. Found entries are header-only records.
    pub async fn exists(&self, keys: &[Key]) -> Result<BatchResult, ClientError> {
        let policy = self.client.policies().batch.clone();
        self.run(keys, BatchReadMode::Exists, policy).await
    }

    /// Fetches records. `None` or an empty projection returns every bin.
    pub async fn get(
        &self,
        keys: &[Key],
        projection: Option<&[&str]>,
    ) -> Result<BatchResult, ClientError> {
        let policy = self.client.policies().batch.clone();
        self.get_with_policy(keys, projection, &policy).await
    }

    pub async fn get_with_policy(
        &self,
        keys: &[Key],
        projection: Option<&[&str]>,
        policy: &BatchPolicy,
    ) -> Result<BatchResult, ClientError> {
        let mode = match projection {
            Some(bins) if !bins.is_empty() => {
                for bin in bins {
                    validate_bin_name(bin)?;
                }
                let unique: BTreeSet<String> = bins.iter().map(|b| b.to_string()).collect();
                BatchReadMode::Bins(unique.into_iter().collect())
            }
            _ => BatchReadMode::AllBins,
        };
        self.run(keys, mode, policy.clone()).await
    }

    async fn run(
        &self,
        keys: &[Key],
        mode: BatchReadMode,
        policy: BatchPolicy,
    ) -> Result<BatchResult, ClientError> {
        let transport = self.client.transport()?;
        let max = self.client.config().max_batch_keys;
        if keys.len() > max {
            return Err(ClientError::InvalidArgument(format!(
                "batch of {} keys exceeds limit {max}",
                keys.len()
            )));
        }
        for key in keys {
            key.validate()?;
        }
        if keys.is_empty() {
            return Ok(BatchResult::default());
        }

        debug!(keys = keys.len(), mode = ?mode, "batch read");
        let raw = transport
            .batch(BatchRequest {
                keys: keys.to_vec(),
                mode: mode.clone(),
                policy,
            })
            .await?;
        if raw.len() != keys.len() {
            return Err(ClientError::Transport(format!(
                "batch returned {} entries for {} keys",
                raw.len(),
                keys.len()
            )));
        }

        let entries = keys
            .iter()
            .zip(raw)
            .map(|(key, entry)| BatchEntry {
                key: key.clone(),
                outcome: shape_outcome(key, entry, &mode),
            })
            .collect();
        Ok(BatchResult { entries })
    }
}

fn shape_outcome(key: &Key, entry: RawBatchEntry, mode: &BatchReadMode) -> BatchOutcome {
    match entry {
        RawBatchEntry::Found(raw) => {
            let bins: Bins = match mode {
                BatchReadMode::Exists => Bins::new(),
                BatchReadMode::AllBins => raw.bins.into_iter().collect(),
                BatchReadMode::Bins(wanted) => raw
                    .bins
                    .into_iter()
                    .filter(|(name, _)| wanted.contains(name))
                    .collect(),
            };
            BatchOutcome::Found(Record::new(
                key.clone(),
                raw.generation,
                raw.expiration,
                bins,
            ))
        }
        RawBatchEntry::NotFound => BatchOutcome::NotFound,
        RawBatchEntry::Failed(err) => {
            warn!(key = %key, error = %err, "batch key failed");
            BatchOutcome::Error(err)
        }
    }
}
