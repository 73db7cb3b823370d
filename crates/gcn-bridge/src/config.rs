//! Bridge configuration, loadable from TOML.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use gcn_iot_command::IotConfig;
use gcn_nodes::{CommandNodeConfig, MemoryCredentials, PublishNodeConfig, SubscribeNodeConfig};
use gcn_pubsub_channel::PubSubConfig;

/// Top-level configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub iot: IotConfig,
    /// Environment variable holding a pre-minted access token. When unset,
    /// each node mints tokens from its service-account key.
    #[serde(default)]
    pub token_env: Option<String>,
    /// Credential references mapped to service-account key files.
    #[serde(default)]
    pub credentials: HashMap<String, PathBuf>,
    /// Nodes to run. Each is optional.
    #[serde(default)]
    pub publish: Option<PublishNodeConfig>,
    #[serde(default)]
    pub subscribe: Option<SubscribeNodeConfig>,
    #[serde(default)]
    pub command: Option<CommandNodeConfig>,
}

impl BridgeConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Read every configured credential file into a credential store.
    pub fn credential_store(&self) -> anyhow::Result<MemoryCredentials> {
        let mut accounts = HashMap::with_capacity(self.credentials.len());
        for (reference, path) in &self.credentials {
            let json = std::fs::read_to_string(path).map_err(|e| {
                anyhow::anyhow!("credential '{reference}' ({}): {e}", path.display())
            })?;
            accounts.insert(reference.clone(), json);
        }
        Ok(MemoryCredentials::from(accounts))
    }

    pub fn has_nodes(&self) -> bool {
        self.publish.is_some() || self.subscribe.is_some() || self.command.is_some()
    }
}
