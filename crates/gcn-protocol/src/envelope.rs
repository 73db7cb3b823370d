//! Translation between flow messages and Pub/Sub message shapes.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::message::FlowMessage;
use crate::resources;

/// Attribute carrying the event time of a published message.
pub const TIMESTAMP_ATTRIBUTE: &str = "timestamp";

/// A message ready to be published to a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl OutboundMessage {
    /// Wrap a flow message for publishing.
    ///
    /// The payload becomes the message data; the message attributes are
    /// kept and a `timestamp` attribute is added in ISO-8601 form, taken
    /// from the message `time` field when present, else `now`. Returns
    /// `None` when the message has no payload.
    pub fn from_flow(message: &FlowMessage, now: DateTime<Utc>) -> Option<Self> {
        let data = message.payload_bytes()?;
        let time = message.timestamp().unwrap_or(now);

        let mut attributes = message.attributes.clone();
        attributes.insert(
            TIMESTAMP_ATTRIBUTE.to_string(),
            time.to_rfc3339_opts(SecondsFormat::Millis, true),
        );

        Some(Self { data, attributes })
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.attributes.get(TIMESTAMP_ATTRIBUTE).map(String::as_str)
    }
}

/// A message delivered from a subscription, awaiting acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message_id: String,
    pub data: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
    pub publish_time: Option<DateTime<Utc>>,
}

/// How delivered message data is decoded into a flow payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// UTF-8 text when valid, otherwise an array of octets.
    #[default]
    Binary,
    /// UTF-8 text, invalid sequences replaced.
    #[serde(alias = "utf-8")]
    Utf8,
    /// Base64 text of the raw data.
    Base64,
}

impl PayloadEncoding {
    pub fn decode(self, data: &[u8]) -> serde_json::Value {
        match self {
            PayloadEncoding::Binary => match std::str::from_utf8(data) {
                Ok(text) => serde_json::Value::String(text.to_string()),
                Err(_) => serde_json::Value::Array(
                    data.iter().map(|b| serde_json::Value::from(*b)).collect(),
                ),
            },
            PayloadEncoding::Utf8 => {
                serde_json::Value::String(String::from_utf8_lossy(data).into_owned())
            }
            PayloadEncoding::Base64 => serde_json::Value::String(BASE64_STANDARD.encode(data)),
        }
    }
}

/// Turn a delivered message into the flow message a subscribe node emits.
///
/// `subscription` is the full subscription resource name; the project and
/// short subscription name are parsed from it.
pub fn to_flow_message(
    received: &ReceivedMessage,
    subscription: &str,
    topic: &str,
    encoding: PayloadEncoding,
) -> FlowMessage {
    let parsed = resources::parse(subscription);

    FlowMessage {
        payload: encoding.decode(&received.data),
        attributes: received.attributes.clone(),
        time: received
            .publish_time
            .map(|t| serde_json::json!(t.timestamp_millis())),
        project: parsed.as_ref().map(|p| p.project.clone()),
        topic: Some(topic.to_string()),
        subscription: Some(resources::short_name(subscription).to_string()),
        resource: Some(subscription.to_string()),
        ..FlowMessage::default()
    }
}
