//! Subscribe node: emits every message delivered on a Pub/Sub subscription.
//!
//! The topic and subscription are resolved in the background, creating
//! either when missing. A subscription this node created is deleted again
//! on close.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use gcn_protocol::{Identity, NodeStatus, ReceivedMessage, to_flow_message};
use gcn_pubsub_channel::{
    PubSubClient, PubSubResult, Subscriber, SubscriberEvent, SubscriptionHandle, subscribe,
};

use crate::config::SubscribeNodeConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::host::{Closing, CredentialStore, NodeHost, report};
use crate::identity::resolve_identity;
use crate::resolve;

/// Snapshot of a subscribe node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeState {
    pub status: NodeStatus,
    /// Full subscription resource name once attached.
    pub subscription: Option<String>,
    /// Whether this node created the subscription.
    pub created: bool,
    /// Whether the pull loop is running.
    pub listening: bool,
    /// Messages handed to the host so far.
    pub forwarded: u64,
}

/// Handle to a running subscribe node.
pub struct SubscribeNode {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Close(oneshot::Sender<()>),
    State(oneshot::Sender<SubscribeState>),
}

/// Outcome of resolution. `None` when no subscription name is configured.
type Resolved = PubSubResult<Option<SubscriptionHandle>>;

impl SubscribeNode {
    /// Validate the configuration, build a client and start resolving.
    pub fn start<F>(
        config: SubscribeNodeConfig,
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
        let (resolved_tx, resolved_rx) = oneshot::channel();

        host.status(NodeStatus::Connecting.display());
        tracing::info!(topic = %config.topic, subscription = ?config.subscription_name(), "subscribe node starting");

        let resolver = client.clone();
        let request = config.clone();
        tokio::spawn(async move {
            let _ = resolved_tx.send(resolve_subscription(resolver.as_ref(), &request).await);
        });

        let connector = SubscribeConnector {
            config,
            host,
            client: Some(client),
            subscription: None,
            listener: None,
            deliveries: None,
            status: NodeStatus::Connecting,
            forwarded: 0,
        };
        tokio::spawn(connector.run(command_rx, resolved_rx));

        Ok(Self { commands })
    }

    /// Detach from the subscription, deleting it if this node created it.
    ///
    /// The returned signal completes once the deletion has finished.
    pub fn close(&self) -> Closing {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Close(tx));
        Closing::new(rx)
    }

    pub async fn state(&self) -> Option<SubscribeState> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::State(tx)).ok()?;
        rx.await.ok()
    }
}

fn activate<F>(
    config: &SubscribeNodeConfig,
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
    connect(&identity).map_err(|e| ConnectorError::Config(format!("cannot build client: {e}")))
}

async fn resolve_subscription(client: &dyn PubSubClient, config: &SubscribeNodeConfig) -> Resolved {
    let topic = resolve::topic_with_retry(client, &config.topic).await?;
    match config.subscription_name() {
        Some(name) => {
            resolve::subscription_with_retry(client, &topic, name, &config.subscription_options())
                .await
                .map(Some)
        }
        None => Ok(None),
    }
}

struct SubscribeConnector {
    config: SubscribeNodeConfig,
    host: Arc<dyn NodeHost>,
    client: Option<Arc<dyn PubSubClient>>,
    subscription: Option<SubscriptionHandle>,
    listener: Option<Subscriber>,
    deliveries: Option<mpsc::Receiver<SubscriberEvent>>,
    status: NodeStatus,
    forwarded: u64,
}

impl SubscribeConnector {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut resolved: oneshot::Receiver<Resolved>,
    ) {
        let mut resolving = true;

        let waiter = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::State(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Close(done)) => break Some(done),
                    None => break None,
                },
                result = &mut resolved, if resolving => {
                    resolving = false;
                    match result {
                        Ok(result) => self.on_resolved(result),
                        Err(_) => tracing::warn!(topic = %self.config.topic, "resolution task vanished"),
                    }
                }
                event = next_event(&mut self.deliveries) => self.on_event(event),
            }
        };

        self.shutdown().await;
        if let Some(done) = waiter {
            let _ = done.send(());
        }
    }

    fn on_resolved(&mut self, result: Resolved) {
        match result {
            Ok(Some(subscription)) => {
                let Some(client) = self.client.clone() else {
                    return;
                };
                tracing::info!(
                    subscription = %subscription.name,
                    created = subscription.created,
                    "subscription ready"
                );
                self.set_status(NodeStatus::Connected);

                let (listener, deliveries) =
                    subscribe(client, subscription.clone(), self.config.pull_settings());
                self.listener = Some(listener);
                self.deliveries = Some(deliveries);
                self.subscription = Some(subscription);
            }
            Ok(None) => {
                self.set_status(NodeStatus::Disconnected);
                report(
                    self.host.as_ref(),
                    ConnectorError::Unsupported(
                        "no subscription name configured; automatic subscription naming is not implemented"
                            .into(),
                    ),
                );
            }
            Err(e) => {
                self.set_status(NodeStatus::Disconnected);
                report(self.host.as_ref(), ConnectorError::Resolution(e.to_string()));
            }
        }
    }

    fn on_event(&mut self, event: Option<SubscriberEvent>) {
        match event {
            Some(SubscriberEvent::Message(message)) => self.forward(message),
            Some(SubscriberEvent::Error(e)) => {
                self.detach();
                self.set_status(NodeStatus::Disconnected);
                report(self.host.as_ref(), ConnectorError::Delivery(e.to_string()));
            }
            None => self.deliveries = None,
        }
    }

    /// Hand a delivered message to the host, then acknowledge it.
    fn forward(&mut self, message: ReceivedMessage) {
        let (Some(client), Some(subscription)) = (self.client.clone(), self.subscription.clone())
        else {
            return;
        };

        let flow = to_flow_message(
            &message,
            &subscription.name,
            &self.config.topic,
            self.config.encoding,
        );
        self.host.send(flow);
        self.forwarded += 1;

        let host = self.host.clone();
        let ack_id = message.ack_id;
        tokio::spawn(async move {
            if let Err(e) = client.acknowledge(&subscription, &[ack_id]).await {
                report(host.as_ref(), ConnectorError::Delivery(format!("acknowledge: {e}")));
            }
        });
    }

    fn detach(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        self.deliveries = None;
    }

    async fn shutdown(&mut self) {
        self.set_status(NodeStatus::Disconnected);
        self.detach();

        let client = self.client.take();
        if let (Some(client), Some(subscription)) = (client, self.subscription.take()) {
            if subscription.created {
                match client.delete_subscription(&subscription).await {
                    Ok(()) => tracing::info!(subscription = %subscription.name, "subscription deleted"),
                    Err(e) => report(self.host.as_ref(), ConnectorError::CloseDelete(e.to_string())),
                }
            }
        }
        tracing::debug!(topic = %self.config.topic, "subscribe node stopped");
    }

    fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
        self.host.status(status.display());
    }

    fn snapshot(&self) -> SubscribeState {
        SubscribeState {
            status: self.status,
            subscription: self.subscription.as_ref().map(|s| s.name.clone()),
            created: self.subscription.as_ref().is_some_and(|s| s.created),
            listening: self.listener.as_ref().is_some_and(Subscriber::is_running),
            forwarded: self.forwarded,
        }
    }
}

async fn next_event(
    deliveries: &mut Option<mpsc::Receiver<SubscriberEvent>>,
) -> Option<SubscriberEvent> {
    match deliveries {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
