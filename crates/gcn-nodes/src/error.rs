//! Errors surfaced by connector nodes to their host.

use thiserror::Error;

/// Every failure a node reports. None of them stop the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectorError {
    /// Missing topic, missing or unusable identity. Fatal to activation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Topic, subscription or API discovery failed. Fatal to the activation.
    #[error("resolution failed: {0}")]
    Resolution(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("command failed: {0}")]
    Command(String),

    /// Pull or acknowledge failure on a subscription.
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("subscription delete failed: {0}")]
    CloseDelete(String),

    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

/// Convenience alias for connector results.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
