//! API discovery for the Cloud IoT REST surface.

use serde::Deserialize;

use crate::error::{CommandError, CommandResult};

pub const DISCOVERY_API: &str = "https://cloudiot.googleapis.com/$discovery/rest";
pub const API_VERSION: &str = "v1";

/// The parts of a discovery document needed to address methods.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryDocument {
    #[serde(default)]
    pub name: String,
    pub version: String,
    pub base_url: String,
}

/// Discovery URL for a version, e.g. `…/$discovery/rest?version=v1`.
pub fn discovery_url(endpoint: &str, version: &str) -> String {
    format!("{endpoint}?version={version}")
}

impl DiscoveryDocument {
    pub fn parse(body: &[u8]) -> CommandResult<Self> {
        let document: Self =
            serde_json::from_slice(body).map_err(|e| CommandError::Discovery(e.to_string()))?;
        if document.base_url.is_empty() {
            return Err(CommandError::Discovery("document has no baseUrl".into()));
        }
        Ok(document)
    }

    /// URL of a custom method on a resource, e.g.
    /// `{baseUrl}v1/projects/…/devices/d:sendCommandToDevice`.
    pub fn method_url(&self, resource: &str, method: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/{}/{resource}:{method}", self.version)
    }
}
