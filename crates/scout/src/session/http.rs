use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{ClientError, ClientResult};
use crate::models::content::Content;
use crate::models::tool::ToolDescriptor;

/// Tool backend reached over HTTP: a status probe, a tool catalog, and a
/// call endpoint.
pub struct HttpSession {
    base_url: String,
    client: Client,
}

impl HttpSession {
    pub fn new(host: &str, port: u16) -> Self {
        Self::from_base_url(format!("http://{host}:{port}"))
    }

    pub fn from_base_url<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Probe the backend; anything but a 200 status means it is unusable.
    pub async fn initialize(&self) -> ClientResult<()> {
        let response = self
            .client
            .get(format!("{}/status", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("status probe failed: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(ClientError::Connection(format!(
                "backend unavailable: {}",
                response.status()
            )));
        }
        debug!(base_url = %self.base_url, "tool backend reachable");
        Ok(())
    }

    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDescriptor>> {
        let response = self
            .client
            .get(format!("{}/tools", self.base_url))
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("tool catalog request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid tool catalog: {e}")))?;
        let tools = body
            .get("tools")
            .cloned()
            .ok_or_else(|| ClientError::Parse("tool catalog missing 'tools'".to_string()))?;
        serde_json::from_value(tools)
            .map_err(|e| ClientError::Parse(format!("invalid tool descriptor: {e}")))
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<Vec<Content>> {
        let payload = json!({
            "tool": name,
            "arguments": arguments,
        });
        let response = self
            .client
            .post(format!("{}/call", self.base_url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClientError::Connection(format!("tool call failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Upstream {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid tool result: {e}")))?;

        // The backend returns a flat list of strings
        let contents = body
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(Content::text)
                    .collect()
            })
            .unwrap_or_default();
        Ok(contents)
    }

    pub fn close(&mut self) {
        // Nothing held beyond the connection pool, which drops with the client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_initialize_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;

        let session = HttpSession::from_base_url(server.uri());
        assert!(session.initialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_initialize_non_200_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let session = HttpSession::from_base_url(server.uri());
        assert!(matches!(
            session.initialize().await,
            Err(ClientError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tools"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tools": [{
                    "name": "search_internet",
                    "description": "Search the internet",
                    "inputSchema": {"type": "object"}
                }]
            })))
            .mount(&server)
            .await;

        let session = HttpSession::from_base_url(server.uri());
        let tools = session.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search_internet");
    }

    #[tokio::test]
    async fn test_call_tool_converts_strings_to_text_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/call"))
            .and(body_partial_json(json!({"tool": "search_internet"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": ["first line", "second line"]
            })))
            .mount(&server)
            .await;

        let session = HttpSession::from_base_url(server.uri());
        let contents = session
            .call_tool("search_internet", json!({"query": "rust"}))
            .await
            .unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].as_text(), Some("first line"));
    }

    #[tokio::test]
    async fn test_call_tool_non_200_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/call"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let session = HttpSession::from_base_url(server.uri());
        let result = session.call_tool("echo", json!({})).await;
        assert!(matches!(
            result,
            Err(ClientError::Upstream { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_close_twice_is_fine() {
        let mut session = HttpSession::from_base_url("http://127.0.0.1:1");
        session.close();
        session.close();
    }
}
