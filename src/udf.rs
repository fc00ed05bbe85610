use crate::ClusterClient;
use crate::error::{ClientError, ServerErrorKind};
use crate::poll::{BoundedPoll, PollOutcome};
use crate::transport::ModuleListing;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum UdfLanguage {
    #[default]
    Lua,
}

impl UdfLanguage {
    pub fn extension(self) -> &'static str {
        match self {
            UdfLanguage::Lua => "lua",
        }
    }

    /// Module name as used by `apply`: the filename without this language's
    /// extension. `sum.lua` and `sum` name the same module.
    pub fn module_stem(self, filename: &str) -> &str {
        filename
            .strip_suffix(self.extension())
            .and_then(|rest| rest.strip_suffix('.'))
            .filter(|stem| !stem.is_empty())
            .unwrap_or(filename)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationState {
    /// Registered, but at least one node has not loaded it yet.
    Uploading,
    /// Loaded on every node; safe to `apply`.
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdfModule {
    pub filename: String,
    pub content_hash: String,
    pub language: UdfLanguage,
    pub state: RegistrationState,
}

impl From<ModuleListing> for UdfModule {
    fn from(listing: ModuleListing) -> Self {
        let state = if listing.loaded_on_all_nodes() {
            RegistrationState::Active
        } else {
            RegistrationState::Uploading
        };
        Self {
            filename: listing.filename,
            content_hash: listing.content_hash,
            language: listing.language,
            state,
        }
    }
}

/// Hex SHA-256 of module content, as reported in listings.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Server-side module management. Module identity is the filename.
pub struct UdfRegistry<'a> {
    client: &'a ClusterClient,
}

impl<'a> UdfRegistry<'a> {
    pub(crate) fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    /// Names of every registered module, whether active or not.
    pub async fn list(&self) -> Result<BTreeSet<String>, ClientError> {
        Ok(self
            .modules()
            .await?
            .into_iter()
            .map(|module| module.filename)
            .collect())
    }

    pub async fn modules(&self) -> Result<Vec<UdfModule>, ClientError> {
        let transport = self.client.transport()?;
        let listings = transport
            .list_modules(self.client.policies().info.clone())
            .await?;
        Ok(listings.into_iter().map(UdfModule::from).collect())
    }

    pub async fn get(&self, name: &str) -> Result<UdfModule, ClientError> {
        self.modules()
            .await?
            .into_iter()
            .find(|module| module.filename == name)
            .ok_or_else(|| ClientError::server(ServerErrorKind::ModuleNotFound, name))
    }

    /// Uploads the file at `path` under its base name. The module is
    /// `Uploading` until every node loads it; call [`UdfRegistry::wait`]
    /// before applying it.
    pub async fn put(&self, path: impl AsRef<Path>) -> Result<UdfModule, ClientError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::InvalidArgument(format!(
                    "module path '{}' has no file name",
                    path.display()
                ))
            })?
            .to_string();
        let metadata = tokio::fs::metadata(path).await?;
        if metadata.len() > self.client.config().max_udf_module_bytes as u64 {
            return Err(self.too_large(&filename, metadata.len()));
        }
        let content = tokio::fs::read(path).await?;
        self.put_bytes(filename, content).await
    }

    pub async fn put_bytes(
        &self,
        filename: impl Into<String>,
        content: Vec<u8>,
    ) -> Result<UdfModule, ClientError> {
        let filename = filename.into();
        validate_module_name(&filename)?;
        if content.is_empty() {
            return Err(ClientError::InvalidArgument(format!(
                "module '{filename}' is empty"
            )));
        }
        if content.len() > self.client.config().max_udf_module_bytes {
            return Err(self.too_large(&filename, content.len() as u64));
        }
        let transport = self.client.transport()?;
        let hash = content_hash(&content);
        let language = UdfLanguage::Lua;
        info!(module = %filename, bytes = content.len(), hash = %hash, "upload udf module");
        transport
            .put_module(
                filename.clone(),
                content,
                language,
                self.client.policies().info.clone(),
            )
            .await?;
        Ok(UdfModule {
            filename,
            content_hash: hash,
            language,
            state: RegistrationState::Uploading,
        })
    }

    pub async fn remove(&self, name: &str) -> Result<(), ClientError> {
        validate_module_name(name)?;
        let transport = self.client.transport()?;
        info!(module = name, "remove udf module");
        transport
            .remove_module(name.to_string(), self.client.policies().info.clone())
            .await
    }

    /// Polls the cluster until `name` is loaded on every node. A module that
    /// is not listed yet counts as still propagating.
    pub async fn wait(&self, name: &str, timeout: Duration) -> Result<UdfModule, ClientError> {
        validate_module_name(name)?;
        let poll = BoundedPoll::new(
            "udf wait",
            self.client.config().udf_wait_poll_interval(),
            timeout,
        );
        let result = poll
            .run(move |_| async move {
                let module = self
                    .modules()
                    .await?
                    .into_iter()
                    .find(|module| module.filename == name);
                Ok(match module {
                    Some(module) if module.state == RegistrationState::Active => {
                        PollOutcome::Ready(module)
                    }
                    other => {
                        debug!(module = name, listed = other.is_some(), "udf module not active yet");
                        PollOutcome::Pending
                    }
                })
            })
            .await;
        if let Err(ClientError::Timeout { elapsed_ms, .. }) = &result {
            warn!(module = name, elapsed_ms = *elapsed_ms, "udf module did not activate in time");
        }
        result
    }

    /// `wait` with the configured default timeout.
    pub async fn wait_default(&self, name: &str) -> Result<UdfModule, ClientError> {
        let timeout = Duration::from_millis(self.client.config().default_udf_wait_timeout_ms);
        self.wait(name, timeout).await
    }

    fn too_large(&self, filename: &str, len: u64) -> ClientError {
        ClientError::InvalidArgument(format!(
            "module '{filename}' is {len} bytes, limit is {}",
            self.client.config().max_udf_module_bytes
        ))
    }
}

pub(crate) fn validate_module_name(name: &str) -> Result<(), ClientError> {
    if name.is_empty() || name.contains(['/', '\\']) {
        return Err(ClientError::InvalidArgument(format!(
            "invalid module name '{name}'"
        )));
    }
    Ok(())
}
