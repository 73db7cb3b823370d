//! Command client trait and request shapes.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Serialize;

use gcn_protocol::resources;

use crate::error::CommandResult;

/// Fully resolved address of a registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub project_id: String,
    pub cloud_region: String,
    pub registry_id: String,
    pub device_id: String,
}

impl DeviceTarget {
    pub fn resource_name(&self) -> String {
        resources::device(
            &self.project_id,
            &self.cloud_region,
            &self.registry_id,
            &self.device_id,
        )
    }
}

/// Body of a `sendCommandToDevice` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCommandRequest {
    /// Device resource name.
    pub name: String,
    /// Base64 of the command bytes.
    pub binary_data: String,
    /// Devices must be subscribed to the wildcard subfolder when this is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subfolder: Option<String>,
}

impl SendCommandRequest {
    pub fn new(target: &DeviceTarget, command: &[u8]) -> Self {
        Self {
            name: target.resource_name(),
            binary_data: BASE64_STANDARD.encode(command),
            subfolder: None,
        }
    }
}

/// Abstraction over the device-command API.
#[async_trait]
pub trait CommandClient: Send + Sync {
    async fn send_command_to_device(&self, request: &SendCommandRequest) -> CommandResult<()>;
}
