use crate::ClusterClient;
use crate::error::ClientError;
use crate::operation::validate_bin_name;
use crate::record::key::validate_namespace_and_set;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Numeric,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub namespace: String,
    pub set: String,
    pub bin: String,
    pub name: String,
    pub index_type: IndexType,
}

/// Secondary index definitions. Pass-through to the transport.
pub struct IndexManager<'a> {
    client: &'a ClusterClient,
}

impl<'a> IndexManager<'a> {
    pub(crate) fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    pub async fn create(&self, definition: IndexDefinition) -> Result<(), ClientError> {
        validate_namespace_and_set(&definition.namespace, &definition.set)?;
        validate_bin_name(&definition.bin)?;
        if definition.name.is_empty() {
            return Err(ClientError::InvalidArgument(
                "index name must not be empty".into(),
            ));
        }
        let transport = self.client.transport()?;
        info!(
            namespace = %definition.namespace,
            set = %definition.set,
            bin = %definition.bin,
            index = %definition.name,
            index_type = ?definition.index_type,
            "create index"
        );
        transport
            .create_index(definition, self.client.policies().info.clone())
            .await
    }

    pub async fn drop(&self, namespace: &str, index_name: &str) -> Result<(), ClientError> {
        validate_namespace_and_set(namespace, "")?;
        let transport = self.client.transport()?;
        info!(namespace, index = index_name, "drop index");
        transport
            .drop_index(
                namespace.to_string(),
                index_name.to_string(),
                self.client.policies().info.clone(),
            )
            .await
    }
}
