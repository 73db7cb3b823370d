use serde::Deserialize;

/// Pub/Sub client configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    /// API endpoint (override for emulators or tests).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Project owning topics and subscriptions. Defaults to the identity's project.
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_endpoint() -> String {
    "https://pubsub.googleapis.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            project_id: None,
        }
    }
}
