//! Pub/Sub channel error types.

use gcn_protocol::AuthError;
use thiserror::Error;

/// Errors that can occur during Pub/Sub operations.
#[derive(Debug, Clone, Error)]
pub enum PubSubError {
    /// The resource already exists (HTTP 409), e.g. a create that lost a race.
    #[error("already exists: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl PubSubError {
    /// HTTP-style status code of the failure, when there is one.
    pub fn code(&self) -> Option<u16> {
        match self {
            PubSubError::Conflict(_) => Some(409),
            PubSubError::NotFound(_) => Some(404),
            PubSubError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.code() == Some(409)
    }
}

impl From<AuthError> for PubSubError {
    fn from(e: AuthError) -> Self {
        PubSubError::Auth(e.to_string())
    }
}

/// Convenience alias for Pub/Sub results.
pub type PubSubResult<T> = Result<T, PubSubError>;
