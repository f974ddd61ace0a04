use async_trait::async_trait;

use crate::errors::ClientResult;
use crate::models::message::Message;
use crate::models::tool::{ToolCallRequest, ToolDescriptor};

/// A reply from an LLM endpoint, normalized across dialects
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl LlmReply {
    /// A reply carrying only text, typically a diagnostic
    pub fn content_only<S: Into<String>>(content: S) -> Self {
        LlmReply {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Base trait for LLM endpoint dialects
///
/// A non-2xx response from the endpoint is reported as a content-only reply
/// carrying the status and body, so the agent can surface it as text; only
/// transport failures return an error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next reply for the given conversation and tool catalog
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> ClientResult<LlmReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_only_reply() {
        let reply = LlmReply::content_only("diagnostic");
        assert_eq!(reply.content.as_deref(), Some("diagnostic"));
        assert!(reply.tool_calls.is_empty());
    }
}
