use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::config::LlmConfig;
use crate::errors::{ClientError, ClientResult};
use crate::models::message::Message;
use crate::models::tool::ToolDescriptor;

use super::base::{LlmReply, Provider};
use super::utils::{build_headers, chat_response_to_reply, tools_to_llm_spec};

/// Client for chat-completions endpoints that follow the OpenAI dialect
pub struct OpenAiCompatibleProvider {
    client: Client,
    config: LlmConfig,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: LlmConfig) -> ClientResult<Self> {
        let headers = build_headers(config.api_key.as_deref(), config.headers.as_ref())?;
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

#[async_trait]
impl Provider for OpenAiCompatibleProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> ClientResult<LlmReply> {
        let payload = json!({
            "model": self.config.model,
            "messages": messages,
            "tools": tools_to_llm_spec(tools),
            "tool_choice": "auto",
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(url = %self.config.api_url, "sending chat completion request");
        let response = self
            .client
            .post(&self.config.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "LLM endpoint returned an error");
            return Ok(LlmReply::content_only(format!(
                "Error calling LLM: {status} - {body}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid LLM response: {e}")))?;
        Ok(chat_response_to_reply(&body))
    }
}
