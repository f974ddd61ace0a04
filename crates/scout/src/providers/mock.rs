use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::ClientResult;
use crate::models::message::Message;
use crate::models::tool::ToolDescriptor;

use super::base::{LlmReply, Provider};

/// A scripted provider for tests: pops one reply per call and records the
/// conversation it was given.
#[derive(Clone)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<LlmReply>>>,
    calls: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    pub fn new(replies: Vec<LlmReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Conversations received so far, one entry per complete() call
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        messages: &[Message],
        _tools: &[ToolDescriptor],
    ) -> ClientResult<LlmReply> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let reply = self.replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or_else(|| LlmReply::content_only("Done")))
    }
}
