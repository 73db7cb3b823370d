//! Publish node: forwards flow messages to a Pub/Sub topic.
//!
//! The topic is resolved in the background once the node starts. Messages
//! arriving before it is ready are queued, then all published in arrival
//! order the moment it resolves. Live publishes are counted: status reads "publishing" while
//! any are outstanding, and a close requested meanwhile completes only when
//! the last one finishes.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};

use gcn_protocol::{FlowMessage, Identity, NodeStatus, OutboundMessage};
use gcn_pubsub_channel::{PubSubClient, PubSubResult, TopicHandle};

use crate::config::PublishNodeConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::host::{Closing, CredentialStore, NodeHost, report};
use crate::identity::resolve_identity;
use crate::resolve;

/// Snapshot of a publish node, for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishState {
    pub status: NodeStatus,
    /// Full topic resource name once resolved.
    pub topic: Option<String>,
    /// Messages waiting for the topic.
    pub queued: usize,
    /// Live publishes not yet finished.
    pub in_flight: usize,
    pub closed: bool,
}

/// Handle to a running publish node.
pub struct PublishNode {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Input(FlowMessage),
    Close(oneshot::Sender<()>),
    State(oneshot::Sender<PublishState>),
}

enum Completion {
    TopicResolved(PubSubResult<TopicHandle>),
    Published(PubSubResult<String>),
}

enum TopicState {
    Resolving,
    Ready(TopicHandle),
    Failed,
    Released,
}

impl PublishNode {
    /// Validate the configuration, build a client and start resolving the topic.
    ///
    /// `connect` builds the Pub/Sub client for the resolved identity. Must be
    /// called from within a tokio runtime.
    pub fn start<F>(
        config: PublishNodeConfig,
        host: Arc<dyn NodeHost>,
        credentials: &dyn CredentialStore,
        connect: F,
    ) -> ConnectorResult<Self>
    where
        F: FnOnce(&Identity) -> PubSubResult<Arc<dyn PubSubClient>>,
    {
        let client = match activate(&config, credentials, connect) {
            Ok(client) => client,
            Err(e) => {
                report(host.as_ref(), e.clone());
                host.status(NodeStatus::Disconnected.display());
                return Err(e);
            }
        };

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();

        let mut connector = PublishConnector {
            topic_name: config.topic,
            host,
            client: Some(client.clone()),
            topic: TopicState::Resolving,
            queue: VecDeque::new(),
            in_flight: 0,
            status: NodeStatus::Connecting,
            closed: false,
            finished: false,
            waiters: Vec::new(),
            completions: completions.clone(),
        };
        connector.set_status(NodeStatus::Connecting);
        tracing::info!(topic = %connector.topic_name, "publish node starting");

        let topic_name = connector.topic_name.clone();
        tokio::spawn(async move {
            let result = resolve::topic_with_retry(client.as_ref(), &topic_name).await;
            let _ = completions.send(Completion::TopicResolved(result));
        });
        tokio::spawn(connector.run(command_rx, completion_rx));

        Ok(Self { commands })
    }

    /// Hand a message to the node. Ignored once the node is closed.
    pub fn input(&self, message: FlowMessage) {
        let _ = self.commands.send(Command::Input(message));
    }

    /// Stop accepting input and release the topic.
    ///
    /// The returned signal completes once every live publish has finished.
    pub fn close(&self) -> Closing {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Close(tx));
        Closing::new(rx)
    }

    /// Current state, or `None` once the node has shut down.
    pub async fn state(&self) -> Option<PublishState> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::State(tx)).ok()?;
        rx.await.ok()
    }
}

fn activate<F>(
    config: &PublishNodeConfig,
    credentials: &dyn CredentialStore,
    connect: F,
) -> ConnectorResult<Arc<dyn PubSubClient>>
where
    F: FnOnce(&Identity) -> PubSubResult<Arc<dyn PubSubClient>>,
{
    if config.topic.trim().is_empty() {
        return Err(ConnectorError::Config("no topic supplied".into()));
    }
    let identity = resolve_identity(&config.identity, credentials)?;
    tracing::debug!(
        client_email = identity.client_email(),
        project = identity.project_id(),
        "identity resolved"
    );
    connect(&identity).map_err(|e| ConnectorError::Config(format!("cannot build client: {e}")))
}

/// State owned by the node's task.
struct PublishConnector {
    topic_name: String,
    host: Arc<dyn NodeHost>,
    client: Option<Arc<dyn PubSubClient>>,
    topic: TopicState,
    queue: VecDeque<OutboundMessage>,
    in_flight: usize,
    status: NodeStatus,
    closed: bool,
    finished: bool,
    waiters: Vec<oneshot::Sender<()>>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl PublishConnector {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let mut attached = true;

        while !self.finished {
            tokio::select! {
                command = commands.recv(), if attached => match command {
                    Some(Command::Input(message)) => self.on_input(message),
                    Some(Command::Close(done)) => self.on_close(Some(done)),
                    Some(Command::State(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    None => {
                        // Every handle is gone: close without anyone waiting.
                        attached = false;
                        self.on_close(None);
                    }
                },
                Some(completion) = completions.recv() => match completion {
                    Completion::TopicResolved(result) => self.on_topic(result),
                    Completion::Published(result) => self.on_published(result),
                },
            }
        }

        tracing::debug!(topic = %self.topic_name, "publish node stopped");
    }

    fn on_input(&mut self, message: FlowMessage) {
        if self.closed {
            tracing::debug!(topic = %self.topic_name, "input after close ignored");
            return;
        }
        let Some(outbound) = OutboundMessage::from_flow(&message, Utc::now()) else {
            return;
        };

        match &self.topic {
            TopicState::Resolving => {
                self.queue.push_back(outbound);
                tracing::debug!(topic = %self.topic_name, queued = self.queue.len(), "topic not ready, message queued");
            }
            TopicState::Ready(topic) => {
                let topic = topic.clone();
                self.publish(topic, outbound);
            }
            TopicState::Failed | TopicState::Released => {
                tracing::warn!(topic = %self.topic_name, "topic unavailable, message dropped");
            }
        }
    }

    fn publish(&mut self, topic: TopicHandle, message: OutboundMessage) {
        let Some(client) = self.client.clone() else {
            return;
        };

        if self.in_flight == 0 {
            self.set_status(NodeStatus::Publishing);
        }
        self.in_flight += 1;

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = client.publish(&topic, &message).await;
            let _ = completions.send(Completion::Published(result));
        });
    }

    fn on_published(&mut self, result: PubSubResult<String>) {
        self.in_flight = self.in_flight.saturating_sub(1);

        match result {
            Ok(message_id) => {
                tracing::debug!(topic = %self.topic_name, message_id = %message_id, pending = self.in_flight, "published");
            }
            Err(e) => report(self.host.as_ref(), ConnectorError::Publish(e.to_string())),
        }

        if self.in_flight == 0 {
            self.set_status(NodeStatus::Connected);
            if self.closed {
                self.finish();
            }
        }
    }

    fn on_topic(&mut self, result: PubSubResult<TopicHandle>) {
        if self.closed {
            tracing::debug!(topic = %self.topic_name, "topic resolved after close, ignored");
            return;
        }

        match result {
            Ok(topic) => {
                tracing::info!(topic = %topic.name, "topic ready");
                self.set_status(NodeStatus::Connected);
                self.flush(&topic);
                self.topic = TopicState::Ready(topic);
            }
            Err(e) => {
                self.topic = TopicState::Failed;
                self.set_status(NodeStatus::Disconnected);
                self.discard_queue("topic resolution failed");
                report(self.host.as_ref(), ConnectorError::Resolution(e.to_string()));
            }
        }
    }

    /// Publish everything queued before the topic was ready, in order.
    fn flush(&mut self, topic: &TopicHandle) {
        if self.queue.is_empty() {
            return;
        }
        let Some(client) = self.client.clone() else {
            return;
        };

        let batch: Vec<OutboundMessage> = self.queue.drain(..).collect();
        tracing::info!(topic = %topic.name, count = batch.len(), "flushing queued messages");

        // join_all polls in order on the first pass, so every publish is
        // issued at once and in arrival order.
        let host = self.host.clone();
        let topic = topic.clone();
        tokio::spawn(async move {
            let results =
                join_all(batch.iter().map(|message| client.publish(&topic, message))).await;
            for result in results {
                if let Err(e) = result {
                    report(host.as_ref(), ConnectorError::Publish(e.to_string()));
                }
            }
        });
    }

    fn on_close(&mut self, waiter: Option<oneshot::Sender<()>>) {
        if !self.closed {
            self.closed = true;
            self.client = None;
            self.topic = TopicState::Released;
            self.discard_queue("node closed");
            tracing::info!(topic = %self.topic_name, pending = self.in_flight, "publish node closing");
        }
        self.waiters.extend(waiter);

        if self.in_flight == 0 {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.set_status(NodeStatus::Disconnected);
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
        self.finished = true;
    }

    fn discard_queue(&mut self, reason: &str) {
        if !self.queue.is_empty() {
            tracing::warn!(topic = %self.topic_name, dropped = self.queue.len(), reason, "discarding queued messages");
            self.queue.clear();
        }
    }

    fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
        self.host.status(status.display());
    }

    fn snapshot(&self) -> PublishState {
        PublishState {
            status: self.status,
            topic: match &self.topic {
                TopicState::Ready(topic) => Some(topic.name.clone()),
                _ => None,
            },
            queued: self.queue.len(),
            in_flight: self.in_flight,
            closed: self.closed,
        }
    }
}
