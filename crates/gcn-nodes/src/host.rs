//! The contract between nodes and the flow runtime hosting them.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use gcn_protocol::{FlowMessage, StatusDisplay};

use crate::error::ConnectorError;

/// Callbacks a node uses to talk back to its host.
pub trait NodeHost: Send + Sync {
    /// Update the status indicator shown for the node.
    fn status(&self, status: StatusDisplay);

    fn error(&self, error: &ConnectorError);

    fn log(&self, message: &str);

    /// Emit a message on the node's output.
    fn send(&self, message: FlowMessage);
}

/// The host's credential store, keyed by credential reference.
pub trait CredentialStore: Send + Sync {
    /// Service-account JSON stored under `reference`.
    fn account(&self, reference: &str) -> Option<String>;
}

/// In-memory credential store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials(HashMap<String, String>);

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, reference: impl Into<String>, json: impl Into<String>) -> Self {
        self.0.insert(reference.into(), json.into());
        self
    }
}

impl From<HashMap<String, String>> for MemoryCredentials {
    fn from(accounts: HashMap<String, String>) -> Self {
        Self(accounts)
    }
}

impl CredentialStore for MemoryCredentials {
    fn account(&self, reference: &str) -> Option<String> {
        self.0.get(reference).cloned()
    }
}

/// Log an error and hand it to the host.
pub(crate) fn report(host: &dyn NodeHost, error: ConnectorError) {
    tracing::error!(error = %error, "node error");
    host.error(&error);
}

/// Completion signal of a close request.
///
/// Resolves once the node has finished shutting down. A node that is
/// already gone counts as closed.
#[must_use = "a close request completes asynchronously"]
pub struct Closing {
    rx: oneshot::Receiver<()>,
    done: bool,
}

impl Closing {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx, done: false }
    }

    /// Check for completion without waiting.
    pub fn is_complete(&mut self) -> bool {
        if !self.done {
            self.done = !matches!(self.rx.try_recv(), Err(TryRecvError::Empty));
        }
        self.done
    }
}

impl Future for Closing {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.done {
            return Poll::Ready(());
        }
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(_) => {
                self.done = true;
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
