//! Command API error types.

use gcn_protocol::AuthError;
use thiserror::Error;

/// Errors that can occur while discovering the API or sending commands.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("API discovery failed: {0}")]
    Discovery(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("request error: {0}")]
    Request(String),

    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<AuthError> for CommandError {
    fn from(e: AuthError) -> Self {
        CommandError::Auth(e.to_string())
    }
}

/// Convenience alias for command results.
pub type CommandResult<T> = Result<T, CommandError>;
