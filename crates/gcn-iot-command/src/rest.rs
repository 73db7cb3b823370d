//! Command client over the discovered Cloud IoT REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use gcn_protocol::{CLOUD_PLATFORM_SCOPE, TokenSource};

use crate::client::{CommandClient, SendCommandRequest};
use crate::config::IotConfig;
use crate::discovery::{DiscoveryDocument, discovery_url};
use crate::error::{CommandError, CommandResult};

const SEND_COMMAND_METHOD: &str = "sendCommandToDevice";

/// Authenticated client created by discovering the API.
pub struct RestCommandClient {
    http: reqwest::Client,
    document: DiscoveryDocument,
    tokens: Arc<dyn TokenSource>,
}

impl RestCommandClient {
    /// Fetch the discovery document and build a client from it.
    pub async fn connect(config: &IotConfig, tokens: Arc<dyn TokenSource>) -> CommandResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CommandError::Request(e.to_string()))?;

        // Fail fast on a token that cannot be obtained.
        tokens.access_token(CLOUD_PLATFORM_SCOPE).await?;

        let url = discovery_url(&config.discovery_url, &config.api_version);
        let response = http
            .get(&url)
            .send()
            .await
            .map_err(|e| CommandError::Discovery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CommandError::Discovery(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CommandError::Discovery(e.to_string()))?;
        let document = DiscoveryDocument::parse(&body)?;

        tracing::info!(
            api = %document.name,
            version = %document.version,
            base_url = %document.base_url,
            "command API discovered"
        );

        Ok(Self {
            http,
            document,
            tokens,
        })
    }

    pub fn document(&self) -> &DiscoveryDocument {
        &self.document
    }
}

#[async_trait]
impl CommandClient for RestCommandClient {
    async fn send_command_to_device(&self, request: &SendCommandRequest) -> CommandResult<()> {
        let token = self.tokens.access_token(CLOUD_PLATFORM_SCOPE).await?;
        let url = self.document.method_url(&request.name, SEND_COMMAND_METHOD);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| CommandError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(device = %request.name, "command delivered");
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => CommandError::Auth(message),
            code => CommandError::Status {
                status: code,
                message,
            },
        })
    }
}
