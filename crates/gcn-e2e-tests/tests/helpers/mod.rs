//! Shared harness for the end-to-end tests.
//!
//! Runs real nodes over the REST clients, against a `wiremock` server
//! standing in for both Pub/Sub and the device-command API.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gcn_iot_command::{CommandClient, CommandError, IotConfig, RestCommandClient};
use gcn_nodes::mock::{SAMPLE_ACCOUNT, sample_credentials};
use gcn_nodes::{
    CommandNode, CommandNodeConfig, IdentityConfig, PublishNode, PublishNodeConfig,
    RecordingHost, SubscribeNode, SubscribeNodeConfig,
};
use gcn_protocol::{StaticToken, TokenSource};
use gcn_pubsub_channel::{PubSubClient, PubSubConfig, RestPubSubClient};

/// Project every resource lives in (from the sample service-account key).
pub const PROJECT: &str = "sample-project";

pub const TOKEN: &str = "e2e-token";

/// Mock server plus a recording host for one node under test.
pub struct Harness {
    pub server: MockServer,
    pub host: Arc<RecordingHost>,
    pub tokens: Arc<dyn TokenSource>,
}

impl Harness {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            host: Arc::new(RecordingHost::new()),
            tokens: Arc::new(StaticToken::new(TOKEN)),
        }
    }

    pub fn pubsub_config(&self) -> PubSubConfig {
        PubSubConfig {
            endpoint: self.server.uri(),
            timeout_secs: 5,
            project_id: None,
        }
    }

    pub fn iot_config(&self) -> IotConfig {
        IotConfig {
            discovery_url: format!("{}/$discovery/rest", self.server.uri()),
            api_version: "v1".into(),
            timeout_secs: 5,
        }
    }

    // ── Nodes ─────────────────────────────────────────────────

    pub fn publish_node(&self, topic: &str) -> PublishNode {
        let config = self.pubsub_config();
        let tokens = self.tokens.clone();
        PublishNode::start(
            PublishNodeConfig::new(topic, IdentityConfig::account(SAMPLE_ACCOUNT)),
            self.host.clone(),
            &sample_credentials(),
            move |identity| {
                let client = RestPubSubClient::new(&config, identity, tokens)?;
                Ok(Arc::new(client) as Arc<dyn PubSubClient>)
            },
        )
        .expect("publish node starts")
    }

    pub fn subscribe_node(&self, config: SubscribeNodeConfig) -> SubscribeNode {
        let pubsub = self.pubsub_config();
        let tokens = self.tokens.clone();
        SubscribeNode::start(config, self.host.clone(), &sample_credentials(), move |identity| {
            let client = RestPubSubClient::new(&pubsub, identity, tokens)?;
            Ok(Arc::new(client) as Arc<dyn PubSubClient>)
        })
        .expect("subscribe node starts")
    }

    pub fn command_node(&self, config: CommandNodeConfig) -> CommandNode {
        let iot = self.iot_config();
        let tokens = self.tokens.clone();
        CommandNode::start(
            config,
            self.host.clone(),
            &sample_credentials(),
            move |_identity| async move {
                let client = RestCommandClient::connect(&iot, tokens).await?;
                Ok::<_, CommandError>(Arc::new(client) as Arc<dyn CommandClient>)
            },
        )
        .expect("command node starts")
    }

    // ── Server fixtures ───────────────────────────────────────

    /// Answer lookups of `topic` with an existing topic.
    pub async fn mount_topic(&self, topic: &str) {
        Mock::given(method("GET"))
            .and(path(topic_path(topic)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": format!("projects/{PROJECT}/topics/{topic}")})),
            )
            .mount(&self.server)
            .await;
    }

    /// Accept publishes to `topic`, answering with a fixed message id.
    pub async fn mount_publish(&self, topic: &str, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(format!("{}:publish", topic_path(topic))))
            .respond_with(template)
            .mount(&self.server)
            .await;
    }

    pub async fn mount_discovery(&self) {
        Mock::given(method("GET"))
            .and(path("/$discovery/rest"))
            .and(query_param("version", "v1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "cloudiot",
                "version": "v1",
                "baseUrl": format!("{}/", self.server.uri()),
            })))
            .mount(&self.server)
            .await;
    }

    /// Bodies of every publish request received so far.
    pub async fn published_bodies(&self) -> Vec<serde_json::Value> {
        self.requests_to(":publish")
            .await
            .into_iter()
            .map(|body| body["messages"][0].clone())
            .collect()
    }

    /// JSON bodies of requests whose path ends with `suffix`.
    pub async fn requests_to(&self, suffix: &str) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path().ends_with(suffix))
            .map(|r| serde_json::from_slice(&r.body).unwrap_or(serde_json::Value::Null))
            .collect()
    }

    /// Count requests with the given method and exact path.
    pub async fn count(&self, http_method: &str, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == http_method && r.url.path() == request_path)
            .count()
    }

    /// Wait (up to two seconds) until `n` matching requests have arrived.
    pub async fn wait_for_requests(&self, http_method: &str, request_path: &str, n: usize) {
        for _ in 0..200 {
            if self.count(http_method, request_path).await >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} {http_method} {request_path} request(s)");
    }
}

pub fn topic_path(topic: &str) -> String {
    format!("/v1/projects/{PROJECT}/topics/{topic}")
}

pub fn subscription_path(subscription: &str) -> String {
    format!("/v1/projects/{PROJECT}/subscriptions/{subscription}")
}

pub fn publish_ok() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"messageIds": ["m-1"]}))
}

/// Decode the base64 `data` of a published message body.
pub fn decoded_data(message: &serde_json::Value) -> Vec<u8> {
    BASE64_STANDARD
        .decode(message["data"].as_str().unwrap_or_default())
        .unwrap_or_default()
}
