use serde::Deserialize;

use crate::discovery::{API_VERSION, DISCOVERY_API};

/// Command API client configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct IotConfig {
    /// Discovery endpoint (without the `version` query).
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
    /// API version to discover.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_discovery_url() -> String {
    DISCOVERY_API.to_string()
}

fn default_api_version() -> String {
    API_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for IotConfig {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            api_version: default_api_version(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
