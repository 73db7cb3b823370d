//! Pub/Sub client trait and resource handles.

use async_trait::async_trait;

use gcn_protocol::{OutboundMessage, ReceivedMessage, resources};

use crate::error::PubSubResult;

/// Capability to publish to one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    /// Full resource name, `projects/{p}/topics/{t}`.
    pub name: String,
}

impl TopicHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn short_name(&self) -> &str {
        resources::short_name(&self.name)
    }
}

/// An attached subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    /// Full resource name, `projects/{p}/subscriptions/{s}`.
    pub name: String,
    /// Full name of the topic it is attached to.
    pub topic: String,
    /// Whether the lookup created the subscription.
    pub created: bool,
}

/// Settings applied when a subscription is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub ack_deadline_seconds: Option<u32>,
}

/// Abstraction over the Pub/Sub service.
///
/// Enables mocking in tests without talking to the real service.
#[async_trait]
pub trait PubSubClient: Send + Sync {
    /// Look up a topic, creating it when absent and `auto_create` is set.
    ///
    /// A create that races with another creator fails with
    /// [`PubSubError::Conflict`](crate::PubSubError::Conflict).
    async fn get_topic(&self, topic: &str, auto_create: bool) -> PubSubResult<TopicHandle>;

    /// Look up a subscription on `topic`, creating it when absent and `auto_create` is set.
    async fn get_subscription(
        &self,
        topic: &TopicHandle,
        subscription: &str,
        options: &SubscriptionOptions,
        auto_create: bool,
    ) -> PubSubResult<SubscriptionHandle>;

    /// Publish one message, returning the service-assigned message id.
    async fn publish(&self, topic: &TopicHandle, message: &OutboundMessage)
    -> PubSubResult<String>;

    /// Pull up to `max_messages` pending messages.
    async fn pull(
        &self,
        subscription: &SubscriptionHandle,
        max_messages: u32,
    ) -> PubSubResult<Vec<ReceivedMessage>>;

    /// Acknowledge delivered messages.
    async fn acknowledge(
        &self,
        subscription: &SubscriptionHandle,
        ack_ids: &[String],
    ) -> PubSubResult<()>;

    async fn delete_subscription(&self, subscription: &SubscriptionHandle) -> PubSubResult<()>;
}
