//! Connector nodes bridging a flow runtime to Cloud Pub/Sub and Cloud IoT.
//!
//! Each node runs as a single task that owns all of its state. The host
//! drives it through a handle (`input`, `close`, `state`) and receives
//! status, errors and output messages through [`NodeHost`].

pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod mock;
pub mod publish;
pub mod resolve;
pub mod subscribe;

pub use command::{CommandNode, CommandState};
pub use config::{CommandNodeConfig, IdentityConfig, PublishNodeConfig, SubscribeNodeConfig};
pub use error::{ConnectorError, ConnectorResult};
pub use host::{Closing, CredentialStore, MemoryCredentials, NodeHost};
pub use identity::resolve_identity;
pub use mock::RecordingHost;
pub use publish::{PublishNode, PublishState};
pub use subscribe::{SubscribeNode, SubscribeState};
