//! Mock command client for testing without the real API.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{CommandClient, SendCommandRequest};
use crate::error::{CommandError, CommandResult};

/// Records every request; failures can be scripted per call.
pub struct MockCommandClient {
    sent: Mutex<Vec<SendCommandRequest>>,
    failures: Mutex<VecDeque<CommandError>>,
}

impl MockCommandClient {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
        }
    }

    pub fn fail_next(&self, error: CommandError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Get all requests, in call order.
    pub fn sent(&self) -> Vec<SendCommandRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_sent(&self) -> Option<SendCommandRequest> {
        self.sent.lock().unwrap().last().cloned()
    }
}

impl Default for MockCommandClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandClient for MockCommandClient {
    async fn send_command_to_device(&self, request: &SendCommandRequest) -> CommandResult<()> {
        self.sent.lock().unwrap().push(request.clone());
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
