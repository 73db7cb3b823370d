//! Node configuration, fixed for the lifetime of a node.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use gcn_protocol::PayloadEncoding;
use gcn_pubsub_channel::{PullSettings, SubscriptionOptions};

/// Where a node's service-account identity comes from.
///
/// The credential reference is tried first, the key file second.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    /// Name of an entry in the host's credential store.
    #[serde(default)]
    pub account: Option<String>,

    /// Path to a service-account JSON key file.
    #[serde(default)]
    pub key_filename: Option<PathBuf>,
}

impl IdentityConfig {
    pub fn account(reference: impl Into<String>) -> Self {
        Self {
            account: Some(reference.into()),
            key_filename: None,
        }
    }

    pub fn key_file(path: impl Into<PathBuf>) -> Self {
        Self {
            account: None,
            key_filename: Some(path.into()),
        }
    }
}

/// Publish node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PublishNodeConfig {
    /// Topic short name or full `projects/…/topics/…` resource name.
    #[serde(default)]
    pub topic: String,

    #[serde(flatten)]
    pub identity: IdentityConfig,
}

impl PublishNodeConfig {
    pub fn new(topic: impl Into<String>, identity: IdentityConfig) -> Self {
        Self {
            topic: topic.into(),
            identity,
        }
    }
}

/// Subscribe node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscribeNodeConfig {
    #[serde(default)]
    pub topic: String,

    /// Subscription short name. Required in practice.
    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(flatten)]
    pub identity: IdentityConfig,

    /// Applied only when this node creates the subscription.
    #[serde(default)]
    pub ack_deadline_seconds: Option<u32>,

    #[serde(default)]
    pub encoding: PayloadEncoding,

    /// Pause between empty pulls, in milliseconds.
    #[serde(default)]
    pub interval_ms: Option<u64>,

    /// Per-pull timeout, in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
}

fn default_max_messages() -> u32 {
    PullSettings::default().max_messages
}

impl SubscribeNodeConfig {
    pub fn new(
        topic: impl Into<String>,
        subscription: impl Into<String>,
        identity: IdentityConfig,
    ) -> Self {
        Self {
            topic: topic.into(),
            subscription: Some(subscription.into()),
            identity,
            ack_deadline_seconds: None,
            encoding: PayloadEncoding::default(),
            interval_ms: None,
            timeout_secs: None,
            max_messages: default_max_messages(),
        }
    }

    /// Configured subscription name, treating an empty string as unset.
    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription.as_deref().filter(|s| !s.is_empty())
    }

    pub fn pull_settings(&self) -> PullSettings {
        let defaults = PullSettings::default();
        PullSettings {
            max_messages: self.max_messages,
            interval: self
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.interval),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn subscription_options(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            ack_deadline_seconds: self.ack_deadline_seconds,
        }
    }
}

/// Command node configuration. Every target field is a default that the
/// incoming message may override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommandNodeConfig {
    #[serde(flatten)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub device_id: Option<String>,

    #[serde(default)]
    pub registry_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub cloud_region: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_config_from_toml() {
        let config: PublishNodeConfig = toml::from_str(
            r#"
            topic = "telemetry"
            account = "flows"
            "#,
        )
        .unwrap();
        assert_eq!(config.topic, "telemetry");
        assert_eq!(config.identity, IdentityConfig::account("flows"));
    }

    #[test]
    fn subscribe_config_overrides() {
        let config: SubscribeNodeConfig = toml::from_str(
            r#"
            topic = "telemetry"
            subscription = "telemetry-sub"
            key_filename = "/etc/gcn/key.json"
            ack_deadline_seconds = 30
            encoding = "utf-8"
            interval_ms = 250
            timeout_secs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.subscription_name(), Some("telemetry-sub"));
        assert_eq!(config.encoding, PayloadEncoding::Utf8);
        assert_eq!(config.subscription_options().ack_deadline_seconds, Some(30));

        let settings = config.pull_settings();
        assert_eq!(settings.max_messages, 100);
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn subscribe_config_defaults() {
        let config: SubscribeNodeConfig = toml::from_str(r#"topic = "t""#).unwrap();
        assert_eq!(config.subscription_name(), None);
        assert_eq!(config.encoding, PayloadEncoding::Binary);
        assert_eq!(config.pull_settings(), PullSettings::default());
    }

    #[test]
    fn empty_subscription_name_is_unset() {
        let mut config = SubscribeNodeConfig::new("t", "", IdentityConfig::default());
        assert_eq!(config.subscription_name(), None);
        config.subscription = Some("s".into());
        assert_eq!(config.subscription_name(), Some("s"));
    }

    #[test]
    fn command_config_defaults() {
        let config: CommandNodeConfig = toml::from_str(
            r#"
            account = "flows"
            registry_id = "thermostats"
            cloud_region = "europe-west1"
            "#,
        )
        .unwrap();
        assert_eq!(config.registry_id.as_deref(), Some("thermostats"));
        assert_eq!(config.cloud_region.as_deref(), Some("europe-west1"));
        assert!(config.device_id.is_none());
    }
}
