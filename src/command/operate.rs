use crate::ClusterClient;
use crate::error::ClientError;
use crate::operation::{Operation, validate_operations};
use crate::policy::WritePolicy;
use crate::record::{Bins, Key, Record};
use crate::transport::{OperateRequest, RawRecord};
use std::collections::BTreeSet;
use tracing::debug;

/// Applies an ordered operation list to one record in a single round trip.
pub struct OperateExecutor<'a> {
    client: &'a ClusterClient,
}

impl<'a> OperateExecutor<'a> {
    pub(crate) fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    pub async fn execute(
        &self,
        key: &Key,
        operations: Vec<Operation>,
        policy: &WritePolicy,
    ) -> Result<Record, ClientError> {
        key.validate()?;
        validate_operations(&operations)?;
        let transport = self.client.transport()?;
        let read_bins = read_targets(&operations);
        debug!(key = %key, ops = operations.len(), reads = read_bins.len(), "operate");
        let raw = transport
            .operate(OperateRequest {
                key: key.clone(),
                operations,
                policy: policy.clone(),
            })
            .await?;
        Ok(shape_result(key, raw, &read_bins))
    }
}

/// Bins named by read operations; only these appear in the result.
fn read_targets(operations: &[Operation]) -> BTreeSet<String> {
    operations
        .iter()
        .filter(|op| op.kind.is_read())
        .filter_map(|op| op.bin_name.clone())
        .collect()
}

fn shape_result(key: &Key, raw: RawRecord, read_bins: &BTreeSet<String>) -> Record {
    // Later entries overwrite earlier ones, so a bin read twice reports the
    // value of its last read.
    let bins: Bins = raw
        .bins
        .into_iter()
        .filter(|(name, _)| read_bins.contains(name))
        .collect();
    Record::new(key.clone(), raw.generation, raw.expiration, bins)
}
