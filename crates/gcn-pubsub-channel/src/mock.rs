//! Mock Pub/Sub client for testing without the real service.
//!
//! Records topic lookups, publishes, acknowledgements and deletions for
//! assertion in tests. Topic lookups and publishes can be held open until
//! the test releases them, and failures can be scripted per call.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;

use gcn_protocol::{OutboundMessage, ReceivedMessage, resources};

use crate::client::{PubSubClient, SubscriptionHandle, SubscriptionOptions, TopicHandle};
use crate::error::{PubSubError, PubSubResult};

/// Project used for every resource name the mock hands out.
pub const MOCK_PROJECT: &str = "mock-project";

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub message: OutboundMessage,
}

/// Mock implementation of the `PubSubClient` trait.
///
/// Thread-safe via `Mutex` (fine for test contexts).
pub struct MockPubSub {
    topic_requests: Mutex<Vec<(String, bool)>>,
    topic_failures: Mutex<VecDeque<PubSubError>>,
    topic_gate: Option<Semaphore>,
    published: Mutex<Vec<PublishedMessage>>,
    publish_failures: Mutex<VecDeque<PubSubError>>,
    publish_gate: Option<Semaphore>,
    subscriptions: Mutex<HashSet<String>>,
    subscription_requests: Mutex<Vec<(String, SubscriptionOptions, bool)>>,
    subscription_failures: Mutex<VecDeque<PubSubError>>,
    inbox: Mutex<VecDeque<ReceivedMessage>>,
    pull_failures: Mutex<VecDeque<PubSubError>>,
    acked: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    delete_failure: Mutex<Option<PubSubError>>,
    next_ack: AtomicU64,
}

impl MockPubSub {
    pub fn new() -> Self {
        Self {
            topic_requests: Mutex::new(Vec::new()),
            topic_failures: Mutex::new(VecDeque::new()),
            topic_gate: None,
            published: Mutex::new(Vec::new()),
            publish_failures: Mutex::new(VecDeque::new()),
            publish_gate: None,
            subscriptions: Mutex::new(HashSet::new()),
            subscription_requests: Mutex::new(Vec::new()),
            subscription_failures: Mutex::new(VecDeque::new()),
            inbox: Mutex::new(VecDeque::new()),
            pull_failures: Mutex::new(VecDeque::new()),
            acked: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            delete_failure: Mutex::new(None),
            next_ack: AtomicU64::new(1),
        }
    }

    // ── Builders ──────────────────────────────────────────────

    /// Hold every topic lookup until [`release_topic`](Self::release_topic).
    pub fn hold_topic(mut self) -> Self {
        self.topic_gate = Some(Semaphore::new(0));
        self
    }

    /// Hold every publish until released with [`release_publishes`](Self::release_publishes).
    pub fn hold_publishes(mut self) -> Self {
        self.publish_gate = Some(Semaphore::new(0));
        self
    }

    /// Pre-create a subscription (short name).
    pub fn with_subscription(self, name: &str) -> Self {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(resources::subscription(MOCK_PROJECT, name));
        self
    }

    // ── Scripting ─────────────────────────────────────────────

    pub fn release_topic(&self) {
        if let Some(gate) = &self.topic_gate {
            gate.add_permits(1);
        }
    }

    pub fn release_publishes(&self, n: usize) {
        if let Some(gate) = &self.publish_gate {
            gate.add_permits(n);
        }
    }

    pub fn fail_next_topic(&self, error: PubSubError) {
        self.topic_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_publish(&self, error: PubSubError) {
        self.publish_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_subscription(&self, error: PubSubError) {
        self.subscription_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_next_pull(&self, error: PubSubError) {
        self.pull_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_delete(&self, error: PubSubError) {
        *self.delete_failure.lock().unwrap() = Some(error);
    }

    /// Queue a message for delivery on the next pull. Returns its ack id.
    pub fn deliver(&self, data: &[u8], attributes: BTreeMap<String, String>) -> String {
        let ack_id = format!("ack-{}", self.next_ack.fetch_add(1, Ordering::SeqCst));
        self.inbox.lock().unwrap().push_back(ReceivedMessage {
            ack_id: ack_id.clone(),
            message_id: Uuid::now_v7().to_string(),
            data: data.to_vec(),
            attributes,
            publish_time: Some(Utc::now()),
        });
        ack_id
    }

    // ── Inspection ────────────────────────────────────────────

    /// Every topic lookup as `(topic, auto_create)`.
    pub fn topic_requests(&self) -> Vec<(String, bool)> {
        self.topic_requests.lock().unwrap().clone()
    }

    /// Every publish call, in call order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Data of every publish call, in call order.
    pub fn published_data(&self) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.message.data.clone())
            .collect()
    }

    pub fn subscription_requests(&self) -> Vec<(String, SubscriptionOptions, bool)> {
        self.subscription_requests.lock().unwrap().clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.acked.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn pending_deliveries(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.topic_requests.lock().unwrap().clear();
        self.published.lock().unwrap().clear();
        self.subscription_requests.lock().unwrap().clear();
        self.acked.lock().unwrap().clear();
        self.deleted.lock().unwrap().clear();
    }

    async fn pass(gate: &Option<Semaphore>) {
        if let Some(gate) = gate {
            gate.acquire().await.expect("mock gate closed").forget();
        }
    }
}

impl Default for MockPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubClient for MockPubSub {
    async fn get_topic(&self, topic: &str, auto_create: bool) -> PubSubResult<TopicHandle> {
        self.topic_requests
            .lock()
            .unwrap()
            .push((topic.to_string(), auto_create));

        Self::pass(&self.topic_gate).await;

        if let Some(error) = self.topic_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(TopicHandle::new(resources::topic(MOCK_PROJECT, topic)))
    }

    async fn get_subscription(
        &self,
        topic: &TopicHandle,
        subscription: &str,
        options: &SubscriptionOptions,
        auto_create: bool,
    ) -> PubSubResult<SubscriptionHandle> {
        self.subscription_requests.lock().unwrap().push((
            subscription.to_string(),
            options.clone(),
            auto_create,
        ));

        if let Some(error) = self.subscription_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let name = resources::subscription(MOCK_PROJECT, subscription);
        let mut existing = self.subscriptions.lock().unwrap();
        let created = if existing.contains(&name) {
            false
        } else if auto_create {
            existing.insert(name.clone());
            true
        } else {
            return Err(PubSubError::NotFound(name));
        };

        Ok(SubscriptionHandle {
            name,
            topic: topic.name.clone(),
            created,
        })
    }

    async fn publish(
        &self,
        topic: &TopicHandle,
        message: &OutboundMessage,
    ) -> PubSubResult<String> {
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.name.clone(),
            message: message.clone(),
        });

        Self::pass(&self.publish_gate).await;

        if let Some(error) = self.publish_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(Uuid::now_v7().to_string())
    }

    async fn pull(
        &self,
        _subscription: &SubscriptionHandle,
        max_messages: u32,
    ) -> PubSubResult<Vec<ReceivedMessage>> {
        if let Some(error) = self.pull_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut inbox = self.inbox.lock().unwrap();
        let n = inbox.len().min(max_messages as usize);
        Ok(inbox.drain(..n).collect())
    }

    async fn acknowledge(
        &self,
        _subscription: &SubscriptionHandle,
        ack_ids: &[String],
    ) -> PubSubResult<()> {
        self.acked.lock().unwrap().extend(ack_ids.iter().cloned());
        Ok(())
    }

    async fn delete_subscription(&self, subscription: &SubscriptionHandle) -> PubSubResult<()> {
        self.deleted.lock().unwrap().push(subscription.name.clone());
        if let Some(error) = self.delete_failure.lock().unwrap().take() {
            return Err(error);
        }
        self.subscriptions.lock().unwrap().remove(&subscription.name);
        Ok(())
    }
}
