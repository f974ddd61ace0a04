use std::collections::HashMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{json, Value};

use crate::errors::{ClientError, ClientResult};
use crate::models::tool::{ToolCallRequest, ToolDescriptor};

use super::base::LlmReply;

/// Convert the tool catalog to the function-calling specification the
/// chat-completions dialects expect
pub fn tools_to_llm_spec(tools: &[ToolDescriptor]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                }
            })
        })
        .collect()
}

/// Convert a chat-completions response body to a normalized reply.
///
/// An empty `choices` array yields a diagnostic content-only reply rather
/// than an error.
pub fn chat_response_to_reply(response: &Value) -> LlmReply {
    let message = match response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
    {
        Some(message) => message,
        None => return LlmReply::content_only("Received an empty reply from the LLM"),
    };

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .map(String::from);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let id = call["id"].as_str().unwrap_or_default();
            let name = call["function"]["name"].as_str().unwrap_or_default();
            let arguments = call["function"]["arguments"].as_str().unwrap_or_default();
            if name.is_empty() {
                continue;
            }
            tool_calls.push(ToolCallRequest::function(id, name, arguments));
        }
    }

    LlmReply {
        content,
        tool_calls,
    }
}

/// Build the default header map for an LLM endpoint client
pub fn build_headers(
    api_key: Option<&str>,
    extra: Option<&HashMap<String, String>>,
) -> ClientResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        let value = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| ClientError::Validation(format!("invalid api key: {e}")))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    if let Some(extra) = extra {
        for (name, value) in extra {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Validation(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::Validation(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tools_to_llm_spec() {
        let tool = ToolDescriptor::new(
            "search_internet",
            "Search the internet",
            json!({"type": "object", "properties": {"query": {"type": "string"}}}),
        );
        let spec = tools_to_llm_spec(&[tool]);

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "search_internet");
        assert_eq!(spec[0]["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn test_chat_response_with_text() {
        let response = json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Hello!"}
            }]
        });
        let reply = chat_response_to_reply(&response);
        assert_eq!(reply.content.as_deref(), Some("Hello!"));
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn test_chat_response_with_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_123",
                        "type": "function",
                        "function": {
                            "name": "search_internet",
                            "arguments": "{\"query\":\"rust\"}"
                        }
                    }]
                }
            }]
        });
        let reply = chat_response_to_reply(&response);
        assert!(reply.content.is_none());
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call_123");
        assert_eq!(reply.tool_calls[0].function.name, "search_internet");
    }

    #[test]
    fn test_chat_response_empty_choices() {
        let reply = chat_response_to_reply(&json!({"choices": []}));
        assert_eq!(
            reply.content.as_deref(),
            Some("Received an empty reply from the LLM")
        );
    }

    #[test]
    fn test_chat_response_skips_nameless_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "tool_calls": [{"id": "1", "function": {}}]
                }
            }]
        });
        let reply = chat_response_to_reply(&response);
        assert!(reply.tool_calls.is_empty());
    }

    #[test]
    fn test_build_headers_with_key() {
        let headers = build_headers(Some("sk-test"), None).unwrap();
        assert_eq!(headers["authorization"], "Bearer sk-test");
    }
}
