use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, error, warn};

use crate::config::LlmConfig;
use crate::errors::{ClientError, ClientResult};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::models::tool::{ToolCallRequest, ToolDescriptor};

use super::base::{LlmReply, Provider};
use super::utils::{build_headers, tools_to_llm_spec};

lazy_static! {
    static ref TOOL_CALL_RE: Regex =
        Regex::new(r"(?i)invoke tool (\w+)\s+with arguments\s*\{([^}]*)\}").unwrap();
}

/// Client for endpoints that take a single flattened prompt instead of a
/// structured message list.
///
/// Such endpoints have no native tool calling; tool invocations are
/// recovered from free text by pattern matching. That recovery is a
/// best-effort fallback, not a contract: fragments that do not match the
/// pattern are ignored.
pub struct CustomProvider {
    client: Client,
    config: LlmConfig,
}

impl CustomProvider {
    pub fn new(config: LlmConfig) -> ClientResult<Self> {
        let headers = build_headers(config.api_key.as_deref(), config.headers.as_ref())?;
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }
}

/// Render the conversation as one prompt with role-specific headers,
/// ending on an open assistant cue for the model to continue.
pub fn flatten_messages(messages: &[Message]) -> String {
    let mut rendered = Vec::with_capacity(messages.len() + 1);

    for message in messages {
        let block = match message.role {
            Role::System => format!("Instructions:\n{}", message.content),
            Role::User => format!("User:\n{}", message.content),
            Role::Assistant => format!("Assistant:\n{}", message.content),
            Role::Tool => format!(
                "Tool result ({}):\n{}",
                message.tool_call_id.as_deref().unwrap_or(""),
                message.content
            ),
        };
        rendered.push(block);
    }

    rendered.push("Assistant:".to_string());
    rendered.join("\n\n")
}

/// Recover pseudo tool calls from free text.
///
/// Matches "invoke tool <name> with arguments {key: value, ...}" and splits
/// the argument list on commas and colons; quoted values are unquoted, and
/// every value stays a string. Fragments without a colon are skipped.
pub fn recover_tool_calls(content: &str) -> Vec<ToolCallRequest> {
    let mut tool_calls = Vec::new();

    for (index, captures) in TOOL_CALL_RE.captures_iter(content).enumerate() {
        let name = &captures[1];
        let mut arguments = Map::new();

        for pair in captures[2].split(',') {
            let Some((key, value)) = pair.split_once(':') else {
                continue;
            };
            let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            if key.is_empty() {
                continue;
            }
            arguments.insert(key.to_string(), Value::String(value.to_string()));
        }

        let arguments = Value::Object(arguments).to_string();
        tool_calls.push(ToolCallRequest::function(
            format!("call_{index}"),
            name,
            arguments,
        ));
    }

    tool_calls
}

#[async_trait]
impl Provider for CustomProvider {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDescriptor],
    ) -> ClientResult<LlmReply> {
        let payload = json!({
            "model": self.config.model,
            "prompt": flatten_messages(messages),
            "tools": tools_to_llm_spec(tools),
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        debug!(url = %self.config.api_url, "sending prompt completion request");
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

        let Some(content) = body.get("response").and_then(Value::as_str) else {
            warn!("reply carried no 'response' field");
            return Ok(LlmReply::content_only(
                "Could not interpret the reply from the LLM",
            ));
        };

        Ok(LlmReply {
            content: Some(content.to_string()),
            tool_calls: recover_tool_calls(content),
        })
    }
}
