use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message exchanged between nodes of a flow.
///
/// Only `payload` is required. The remaining fields are per-message
/// overrides on input (`time`, `attributes`, device addressing) or labels
/// added to messages the subscribe node emits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMessage {
    /// Message body. `Null` when the field is absent.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Event time, as epoch milliseconds or an ISO-8601 string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<serde_json::Value>,
    /// String attributes carried alongside the payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,

    // Device addressing overrides for command delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_region: Option<String>,

    // Labels set on messages delivered from a subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl FlowMessage {
    pub fn new(payload: impl Into<serde_json::Value>) -> Self {
        Self {
            payload: payload.into(),
            ..Self::default()
        }
    }

    /// Set the event time from a timestamp (stored as epoch milliseconds).
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(serde_json::json!(time.timestamp_millis()));
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Whether the message carries a payload worth forwarding.
    ///
    /// Absent, `null`, empty-string and empty byte-array payloads are
    /// treated as no payload at all.
    pub fn has_payload(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            _ => true,
        }
    }

    /// Payload as raw bytes.
    ///
    /// Strings are taken as UTF-8, arrays of octets as bytes and any other
    /// JSON value as its serialized text. Returns `None` when there is no
    /// payload.
    pub fn payload_bytes(&self) -> Option<Vec<u8>> {
        if !self.has_payload() {
            return None;
        }

        match &self.payload {
            serde_json::Value::String(s) => Some(s.as_bytes().to_vec()),
            serde_json::Value::Array(items) => {
                let octets: Option<Vec<u8>> = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                    .collect();
                octets.or_else(|| serde_json::to_vec(&self.payload).ok())
            }
            other => serde_json::to_vec(other).ok(),
        }
    }

    /// Event time carried by the message, if present and parseable.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self.time.as_ref()? {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.abs() < i64::MAX as f64)
                        .map(|f| f.round() as i64)
                })
                .and_then(DateTime::from_timestamp_millis),
            serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            _ => None,
        }
    }
}
