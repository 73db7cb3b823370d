//! Pub/Sub client over the v1 REST API.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gcn_protocol::{
    CLOUD_PLATFORM_SCOPE, Identity, OutboundMessage, ReceivedMessage, TokenSource, resources,
};

use crate::client::{PubSubClient, SubscriptionHandle, SubscriptionOptions, TopicHandle};
use crate::config::PubSubConfig;
use crate::error::{PubSubError, PubSubResult};

/// Pub/Sub client for `pubsub.googleapis.com` (or an emulator).
pub struct RestPubSubClient {
    http: reqwest::Client,
    endpoint: String,
    project: String,
    tokens: Arc<dyn TokenSource>,
}

// ── Wire shapes ───────────────────────────────────────────────

#[derive(Serialize)]
struct PublishRequest<'a> {
    messages: Vec<WireOutbound<'a>>,
}

#[derive(Serialize)]
struct WireOutbound<'a> {
    data: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    #[serde(default)]
    message_ids: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubscription<'a> {
    topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack_deadline_seconds: Option<u32>,
}

#[derive(Deserialize)]
struct SubscriptionResource {
    #[serde(default)]
    topic: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PullRequest {
    max_messages: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<WireReceived>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceived {
    ack_id: String,
    message: WireMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    publish_time: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeRequest<'a> {
    ack_ids: &'a [String],
}

impl RestPubSubClient {
    /// Build a client for the identity's project (or the configured override).
    pub fn new(
        config: &PubSubConfig,
        identity: &Identity,
        tokens: Arc<dyn TokenSource>,
    ) -> PubSubResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PubSubError::Request(e.to_string()))?;

        let project = config
            .project_id
            .clone()
            .unwrap_or_else(|| identity.project_id().to_string());

        Ok(Self {
            http,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            project,
            tokens,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/v1/{resource}", self.endpoint)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> PubSubResult<reqwest::Response> {
        let token = self.tokens.access_token(CLOUD_PLATFORM_SCOPE).await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PubSubError::Request(e.to_string()))?;
        check_status(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> PubSubResult<T> {
        response
            .json()
            .await
            .map_err(|e| PubSubError::Serialization(e.to_string()))
    }
}

/// Map non-success responses onto the error taxonomy.
async fn check_status(response: reqwest::Response) -> PubSubResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        404 => PubSubError::NotFound(message),
        409 => PubSubError::Conflict(message),
        401 | 403 => PubSubError::Auth(message),
        code => PubSubError::Status {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl PubSubClient for RestPubSubClient {
    async fn get_topic(&self, topic: &str, auto_create: bool) -> PubSubResult<TopicHandle> {
        let name = resources::topic(&self.project, topic);

        match self.send(self.http.get(self.url(&name))).await {
            Ok(_) => Ok(TopicHandle::new(name)),
            Err(PubSubError::NotFound(_)) if auto_create => {
                tracing::info!(topic = %name, "topic not found, creating");
                self.send(self.http.put(self.url(&name)).json(&serde_json::json!({})))
                    .await?;
                Ok(TopicHandle::new(name))
            }
            Err(e) => Err(e),
        }
    }

    async fn get_subscription(
        &self,
        topic: &TopicHandle,
        subscription: &str,
        options: &SubscriptionOptions,
        auto_create: bool,
    ) -> PubSubResult<SubscriptionHandle> {
        let name = resources::subscription(&self.project, subscription);

        match self.send(self.http.get(self.url(&name))).await {
            Ok(response) => {
                let resource: SubscriptionResource = Self::decode(response).await?;
                let topic = if resource.topic.is_empty() {
                    topic.name.clone()
                } else {
                    resource.topic
                };
                Ok(SubscriptionHandle {
                    name,
                    topic,
                    created: false,
                })
            }
            Err(PubSubError::NotFound(_)) if auto_create => {
                tracing::info!(subscription = %name, topic = %topic.name, "subscription not found, creating");
                let body = CreateSubscription {
                    topic: &topic.name,
                    ack_deadline_seconds: options.ack_deadline_seconds,
                };
                self.send(self.http.put(self.url(&name)).json(&body)).await?;
                Ok(SubscriptionHandle {
                    name,
                    topic: topic.name.clone(),
                    created: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn publish(
        &self,
        topic: &TopicHandle,
        message: &OutboundMessage,
    ) -> PubSubResult<String> {
        let body = PublishRequest {
            messages: vec![WireOutbound {
                data: BASE64_STANDARD.encode(&message.data),
                attributes: &message.attributes,
            }],
        };
        let url = format!("{}:publish", self.url(&topic.name));
        let response = self.send(self.http.post(url).json(&body)).await?;
        let published: PublishResponse = Self::decode(response).await?;

        published
            .message_ids
            .into_iter()
            .next()
            .ok_or_else(|| PubSubError::Serialization("publish response has no message id".into()))
    }

    async fn pull(
        &self,
        subscription: &SubscriptionHandle,
        max_messages: u32,
    ) -> PubSubResult<Vec<ReceivedMessage>> {
        let url = format!("{}:pull", self.url(&subscription.name));
        let response = self
            .send(self.http.post(url).json(&PullRequest { max_messages }))
            .await?;
        let pulled: PullResponse = Self::decode(response).await?;

        pulled
            .received_messages
            .into_iter()
            .map(|received| {
                let data = BASE64_STANDARD
                    .decode(received.message.data.as_bytes())
                    .map_err(|e| PubSubError::Serialization(e.to_string()))?;
                Ok(ReceivedMessage {
                    ack_id: received.ack_id,
                    message_id: received.message.message_id,
                    data,
                    attributes: received.message.attributes,
                    publish_time: received.message.publish_time,
                })
            })
            .collect()
    }

    async fn acknowledge(
        &self,
        subscription: &SubscriptionHandle,
        ack_ids: &[String],
    ) -> PubSubResult<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let url = format!("{}:acknowledge", self.url(&subscription.name));
        self.send(self.http.post(url).json(&AcknowledgeRequest { ack_ids }))
            .await?;
        Ok(())
    }

    async fn delete_subscription(&self, subscription: &SubscriptionHandle) -> PubSubResult<()> {
        self.send(self.http.delete(self.url(&subscription.name)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcn_protocol::{IdentitySource, ServiceAccountKey, StaticToken};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn identity() -> Identity {
        Identity {
            source: IdentitySource::Account("flows".into()),
            key: ServiceAccountKey::from_json(
                r#"{"project_id": "my-proj", "client_email": "flows@my-proj.iam.gserviceaccount.com"}"#,
            )
            .unwrap(),
        }
    }

    fn client_for(server: &MockServer) -> RestPubSubClient {
        let config = PubSubConfig {
            endpoint: server.uri(),
            timeout_secs: 2,
            project_id: None,
        };
        RestPubSubClient::new(&config, &identity(), Arc::new(StaticToken::new("tok"))).unwrap()
    }

    #[tokio::test]
    async fn existing_topic_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/my-proj/topics/events"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "projects/my-proj/topics/events"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let topic = client_for(&server).get_topic("events", true).await.unwrap();
        assert_eq!(topic.name, "projects/my-proj/topics/events");
        assert_eq!(topic.short_name(), "events");
    }

    #[tokio::test]
    async fn missing_topic_is_created() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/my-proj/topics/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/projects/my-proj/topics/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let topic = client_for(&server).get_topic("events", true).await.unwrap();
        assert_eq!(topic.name, "projects/my-proj/topics/events");
    }

    #[tokio::test]
    async fn create_race_reports_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/my-proj/topics/events"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/projects/my-proj/topics/events"))
            .respond_with(ResponseTemplate::new(409).set_body_string("ALREADY_EXISTS"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_topic("events", true)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn missing_topic_without_auto_create() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_topic("events", false)
            .await
            .unwrap_err();
        assert!(matches!(err, PubSubError::NotFound(_)));
    }

    #[tokio::test]
    async fn forbidden_maps_to_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .get_topic("events", true)
            .await
            .unwrap_err();
        assert!(matches!(err, PubSubError::Auth(ref m) if m.contains("PERMISSION_DENIED")));
    }

    #[tokio::test]
    async fn publish_encodes_data_and_attributes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/my-proj/topics/events:publish"))
            .and(body_json(json!({
                "messages": [{
                    "data": "aGVsbG8=",
                    "attributes": {"timestamp": "2024-03-01T12:00:00.000Z"}
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"messageIds": ["7"]})))
            .expect(1)
            .mount(&server)
            .await;

        let message = OutboundMessage {
            data: b"hello".to_vec(),
            attributes: BTreeMap::from([(
                "timestamp".to_string(),
                "2024-03-01T12:00:00.000Z".to_string(),
            )]),
        };
        let id = client_for(&server)
            .publish(&TopicHandle::new("projects/my-proj/topics/events"), &message)
            .await
            .unwrap();
        assert_eq!(id, "7");
    }

    #[tokio::test]
    async fn pull_decodes_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/my-proj/subscriptions/lights:pull"))
            .and(body_json(json!({"maxMessages": 10})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "receivedMessages": [{
                    "ackId": "ack-1",
                    "message": {
                        "data": "b24=",
                        "attributes": {"room": "hall"},
                        "messageId": "99",
                        "publishTime": "2024-03-01T12:00:00Z"
                    }
                }]
            })))
            .mount(&server)
            .await;

        let sub = SubscriptionHandle {
            name: "projects/my-proj/subscriptions/lights".into(),
            topic: "projects/my-proj/topics/switches".into(),
            created: false,
        };
        let messages = client_for(&server).pull(&sub, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].ack_id, "ack-1");
        assert_eq!(messages[0].data, b"on");
        assert_eq!(messages[0].attributes["room"], "hall");
        assert!(messages[0].publish_time.is_some());
    }

    #[tokio::test]
    async fn empty_pull_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/my-proj/subscriptions/lights:pull"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let sub = SubscriptionHandle {
            name: "projects/my-proj/subscriptions/lights".into(),
            topic: "projects/my-proj/topics/switches".into(),
            created: false,
        };
        assert!(client_for(&server).pull(&sub, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_subscription_is_created_with_ack_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/projects/my-proj/subscriptions/lights"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/projects/my-proj/subscriptions/lights"))
            .and(body_json(json!({
                "topic": "projects/my-proj/topics/switches",
                "ackDeadlineSeconds": 30
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let topic = TopicHandle::new("projects/my-proj/topics/switches");
        let options = SubscriptionOptions {
            ack_deadline_seconds: Some(30),
        };
        let sub = client_for(&server)
            .get_subscription(&topic, "lights", &options, true)
            .await
            .unwrap();
        assert!(sub.created);
        assert_eq!(sub.name, "projects/my-proj/subscriptions/lights");
    }

    #[tokio::test]
    async fn acknowledge_and_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/projects/my-proj/subscriptions/lights:acknowledge"))
            .and(body_json(json!({"ackIds": ["a", "b"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/projects/my-proj/subscriptions/lights"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let sub = SubscriptionHandle {
            name: "projects/my-proj/subscriptions/lights".into(),
            topic: "projects/my-proj/topics/switches".into(),
            created: true,
        };
        client
            .acknowledge(&sub, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        client.delete_subscription(&sub).await.unwrap();
    }

    #[test]
    fn project_override() {
        let config = PubSubConfig {
            project_id: Some("other-proj".into()),
            ..PubSubConfig::default()
        };
        let client =
            RestPubSubClient::new(&config, &identity(), Arc::new(StaticToken::new("tok"))).unwrap();
        assert_eq!(client.project(), "other-proj");
    }
}
