//! Device-command delivery for flow nodes.
//!
//! - `CommandClient` trait for `sendCommandToDevice` (mockable in tests)
//! - `RestCommandClient` that discovers the API before first use
//! - `MockCommandClient` for testing without the service

pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod mock;
pub mod rest;

// Re-exports for convenience.
pub use client::{CommandClient, DeviceTarget, SendCommandRequest};
pub use config::IotConfig;
pub use discovery::DiscoveryDocument;
pub use error::{CommandError, CommandResult};
pub use mock::MockCommandClient;
pub use rest::RestCommandClient;
