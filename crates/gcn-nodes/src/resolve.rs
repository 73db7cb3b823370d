//! Remote resource lookups with the conflict-retry rule.
//!
//! Auto-create is a lookup, then a create on not-found. Two nodes doing this
//! at once can lose the create race and see a conflict, in which case the
//! resource now exists and a single repeat of the lookup succeeds.

use gcn_pubsub_channel::{
    PubSubClient, PubSubResult, SubscriptionHandle, SubscriptionOptions, TopicHandle,
};

/// Get or create `topic`, repeating the request once on conflict.
pub async fn topic_with_retry(client: &dyn PubSubClient, topic: &str) -> PubSubResult<TopicHandle> {
    match client.get_topic(topic, true).await {
        Err(e) if e.is_conflict() => {
            tracing::debug!(topic, "topic created concurrently, retrying");
            client.get_topic(topic, true).await
        }
        result => result,
    }
}

/// Get or create `subscription` on `topic`, repeating the request once on conflict.
pub async fn subscription_with_retry(
    client: &dyn PubSubClient,
    topic: &TopicHandle,
    subscription: &str,
    options: &SubscriptionOptions,
) -> PubSubResult<SubscriptionHandle> {
    match client
        .get_subscription(topic, subscription, options, true)
        .await
    {
        Err(e) if e.is_conflict() => {
            tracing::debug!(subscription, "subscription created concurrently, retrying");
            client
                .get_subscription(topic, subscription, options, true)
                .await
        }
        result => result,
    }
}
