//! Pull-based subscription listener.
//!
//! Polls a subscription in a spawned task and hands every delivered
//! message to the listener over a channel. The first pull error is
//! delivered as an event and ends the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gcn_protocol::ReceivedMessage;

use crate::client::{PubSubClient, SubscriptionHandle};
use crate::error::PubSubError;

/// Listener buffer between the pull task and the consumer.
const EVENT_BUFFER: usize = 64;

/// How the subscription is polled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullSettings {
    /// Upper bound on messages returned by one pull.
    pub max_messages: u32,
    /// Pause after a pull that returned nothing.
    pub interval: Duration,
    /// Give up on a single pull after this long (treated as an empty pull).
    pub timeout: Option<Duration>,
}

impl Default for PullSettings {
    fn default() -> Self {
        Self {
            max_messages: 100,
            interval: Duration::from_millis(500),
            timeout: None,
        }
    }
}

/// What the listener receives.
#[derive(Debug)]
pub enum SubscriberEvent {
    Message(ReceivedMessage),
    Error(PubSubError),
}

/// Handle to a running pull loop. Dropping it detaches the listener.
pub struct Subscriber {
    subscription: SubscriptionHandle,
    task: JoinHandle<()>,
}

impl Subscriber {
    pub fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop pulling. Messages already handed to the listener stay queued.
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Start pulling `subscription`, returning the handle and the event stream.
pub fn subscribe(
    client: Arc<dyn PubSubClient>,
    subscription: SubscriptionHandle,
    settings: PullSettings,
) -> (Subscriber, mpsc::Receiver<SubscriberEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let task = tokio::spawn(pull_loop(client, subscription.clone(), settings, tx));
    (Subscriber { subscription, task }, rx)
}

async fn pull_loop(
    client: Arc<dyn PubSubClient>,
    subscription: SubscriptionHandle,
    settings: PullSettings,
    tx: mpsc::Sender<SubscriberEvent>,
) {
    tracing::debug!(subscription = %subscription.name, "pull loop started");

    loop {
        let pull = client.pull(&subscription, settings.max_messages);
        let pulled = match settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, pull).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(subscription = %subscription.name, "pull timed out");
                    Ok(Vec::new())
                }
            },
            None => pull.await,
        };

        match pulled {
            Ok(messages) if messages.is_empty() => {
                tokio::time::sleep(settings.interval).await;
            }
            Ok(messages) => {
                for message in messages {
                    if tx.send(SubscriberEvent::Message(message)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(subscription = %subscription.name, error = %e, "pull failed");
                let _ = tx.send(SubscriberEvent::Error(e)).await;
                return;
            }
        }
    }
}
