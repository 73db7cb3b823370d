//! Node host that reports through `tracing` and forwards output messages.

use tokio::sync::mpsc;

use gcn_nodes::{ConnectorError, NodeHost};
use gcn_protocol::{FlowMessage, StatusDisplay};

/// Host for one node of the bridge.
pub struct TracingHost {
    node: &'static str,
    output: Option<mpsc::UnboundedSender<FlowMessage>>,
}

impl TracingHost {
    /// Host for a node with no output.
    pub fn new(node: &'static str) -> Self {
        Self { node, output: None }
    }

    /// Host whose output messages are forwarded to `output`.
    pub fn with_output(node: &'static str, output: mpsc::UnboundedSender<FlowMessage>) -> Self {
        Self {
            node,
            output: Some(output),
        }
    }
}

impl NodeHost for TracingHost {
    fn status(&self, status: StatusDisplay) {
        tracing::info!(
            node = self.node,
            status = status.text,
            fill = ?status.fill,
            shape = ?status.shape,
            "node status"
        );
    }

    fn error(&self, error: &ConnectorError) {
        tracing::error!(node = self.node, error = %error, "node error");
    }

    fn log(&self, message: &str) {
        tracing::info!(node = self.node, "{message}");
    }

    fn send(&self, message: FlowMessage) {
        match &self.output {
            Some(output) => {
                if output.send(message).is_err() {
                    tracing::warn!(node = self.node, "output closed, message dropped");
                }
            }
            None => tracing::warn!(node = self.node, "node has no output, message dropped"),
        }
    }
}
