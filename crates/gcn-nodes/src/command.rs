//! Command node: sends each input message to a device as a command.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use gcn_iot_command::{CommandClient, CommandResult, DeviceTarget, SendCommandRequest};
use gcn_protocol::{FlowMessage, Identity, NodeStatus};

use crate::config::CommandNodeConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::host::{Closing, CredentialStore, NodeHost, report};
use crate::identity::resolve_identity;

/// Snapshot of a command node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandState {
    pub status: NodeStatus,
    /// Whether the command client finished setting up.
    pub ready: bool,
    pub sent: u64,
    pub failed: u64,
}

/// Handle to a running command node.
pub struct CommandNode {
    commands: mpsc::UnboundedSender<Command>,
}

enum Command {
    Input(FlowMessage),
    Close(oneshot::Sender<()>),
    State(oneshot::Sender<CommandState>),
}

enum Completion {
    Ready(CommandResult<Arc<dyn CommandClient>>),
    Sent {
        request: SendCommandRequest,
        result: CommandResult<()>,
    },
}

impl CommandNode {
    /// Resolve the identity and start setting up the command client.
    ///
    /// `connect` performs the (usually remote) client setup, such as API
    /// discovery. Input arriving before it finishes is rejected.
    pub fn start<F, Fut>(
        config: CommandNodeConfig,
        host: Arc<dyn NodeHost>,
        credentials: &dyn CredentialStore,
        connect: F,
    ) -> ConnectorResult<Self>
    where
        F: FnOnce(Identity) -> Fut,
        Fut: Future<Output = CommandResult<Arc<dyn CommandClient>>> + Send + 'static,
    {
        let identity = match resolve_identity(&config.identity, credentials) {
            Ok(identity) => identity,
            Err(e) => {
                report(host.as_ref(), e.clone());
                host.status(NodeStatus::Disconnected.display());
                return Err(e);
            }
        };

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (completions, completion_rx) = mpsc::unbounded_channel();

        host.status(NodeStatus::Connecting.display());
        tracing::info!(client_email = identity.client_email(), "command node starting");

        let setup = connect(identity);
        let ready = completions.clone();
        tokio::spawn(async move {
            let _ = ready.send(Completion::Ready(setup.await));
        });

        let connector = CommandConnector {
            config,
            host,
            client: None,
            status: NodeStatus::Connecting,
            sent: 0,
            failed: 0,
            completions,
        };
        tokio::spawn(connector.run(command_rx, completion_rx));

        Ok(Self { commands })
    }

    pub fn input(&self, message: FlowMessage) {
        let _ = self.commands.send(Command::Input(message));
    }

    /// Release the client. Completes immediately; sends already issued are
    /// not waited for.
    pub fn close(&self) -> Closing {
        let (tx, rx) = oneshot::channel();
        let _ = self.commands.send(Command::Close(tx));
        Closing::new(rx)
    }

    pub async fn state(&self) -> Option<CommandState> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(Command::State(tx)).ok()?;
        rx.await.ok()
    }
}

struct CommandConnector {
    config: CommandNodeConfig,
    host: Arc<dyn NodeHost>,
    client: Option<Arc<dyn CommandClient>>,
    status: NodeStatus,
    sent: u64,
    failed: u64,
    completions: mpsc::UnboundedSender<Completion>,
}

impl CommandConnector {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<Completion>,
    ) {
        let waiter = loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Input(message)) => self.on_input(message),
                    Some(Command::State(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Some(Command::Close(done)) => break Some(done),
                    None => break None,
                },
                Some(completion) = completions.recv() => match completion {
                    Completion::Ready(result) => self.on_ready(result),
                    Completion::Sent { request, result } => self.on_sent(request, result),
                },
            }
        };

        self.client = None;
        self.set_status(NodeStatus::Disconnected);
        tracing::debug!("command node stopped");
        if let Some(done) = waiter {
            let _ = done.send(());
        }
    }

    fn on_ready(&mut self, result: CommandResult<Arc<dyn CommandClient>>) {
        match result {
            Ok(client) => {
                self.client = Some(client);
                self.set_status(NodeStatus::Connected);
            }
            Err(e) => {
                self.host.log(&format!("error during API discovery: {e}"));
                self.set_status(NodeStatus::Disconnected);
                report(self.host.as_ref(), ConnectorError::Resolution(e.to_string()));
            }
        }
    }

    fn on_input(&mut self, message: FlowMessage) {
        let Some(command) = message.payload_bytes() else {
            return;
        };

        let Some(client) = self.client.clone() else {
            self.reject(ConnectorError::Command("command client is not ready".into()));
            return;
        };

        let target = match self.target_for(&message) {
            Ok(target) => target,
            Err(e) => {
                self.reject(e);
                return;
            }
        };

        let request = SendCommandRequest::new(&target, &command);
        tracing::debug!(device = %request.name, bytes = command.len(), "sending command");

        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = client.send_command_to_device(&request).await;
            let _ = completions.send(Completion::Sent { request, result });
        });
    }

    fn on_sent(&mut self, request: SendCommandRequest, result: CommandResult<()>) {
        match result {
            Ok(()) => self.sent += 1,
            Err(e) => {
                let body = serde_json::to_string(&request).unwrap_or_else(|_| request.name.clone());
                self.reject(ConnectorError::Command(format!(
                    "could not send command {body}: {e}"
                )));
            }
        }
    }

    /// Target device, taking each field from the message before the config.
    fn target_for(&self, message: &FlowMessage) -> ConnectorResult<DeviceTarget> {
        Ok(DeviceTarget {
            project_id: pick(&message.project_id, &self.config.project_id, "projectId")?,
            cloud_region: pick(&message.cloud_region, &self.config.cloud_region, "cloudRegion")?,
            registry_id: pick(&message.registry_id, &self.config.registry_id, "registryId")?,
            device_id: pick(&message.device_id, &self.config.device_id, "deviceId")?,
        })
    }

    fn reject(&mut self, error: ConnectorError) {
        self.failed += 1;
        report(self.host.as_ref(), error);
    }

    fn set_status(&mut self, status: NodeStatus) {
        self.status = status;
        self.host.status(status.display());
    }

    fn snapshot(&self) -> CommandState {
        CommandState {
            status: self.status,
            ready: self.client.is_some(),
            sent: self.sent,
            failed: self.failed,
        }
    }
}

fn pick(
    message: &Option<String>,
    default: &Option<String>,
    field: &str,
) -> ConnectorResult<String> {
    message
        .as_deref()
        .filter(|v| !v.is_empty())
        .or_else(|| default.as_deref().filter(|v| !v.is_empty()))
        .map(str::to_string)
        .ok_or_else(|| ConnectorError::Command(format!("no {field} given")))
}
