use std::collections::HashMap;
use std::process::Stdio;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, warn};

use crate::errors::{ClientError, ClientResult};
use crate::models::content::Content;
use crate::models::tool::ToolDescriptor;

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Tool backend spawned as a subprocess, speaking JSON-RPC 2.0 over
/// stdin/stdout with one JSON object per line.
pub struct StdioSession {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<Lines<BufReader<ChildStdout>>>,
    next_id: u64,
}

impl StdioSession {
    /// Spawn the backend process and wire up its pipes.
    pub fn spawn(
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> ClientResult<Self> {
        debug!(%command, ?args, "starting tool backend process");
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::Connection(format!("failed to start {command}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Connection("backend stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Connection("backend stdout unavailable".to_string()))?;

        Ok(Self {
            child: Some(child),
            stdin: Some(stdin),
            reader: Some(BufReader::new(stdout).lines()),
            next_id: 0,
        })
    }

    async fn send(&mut self, message: Value) -> ClientResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ClientError::Connection("session is closed".to_string()))?;
        let mut line = message.to_string();
        line.push('\n');
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ClientError::Connection(format!("write to backend failed: {e}")))?;
        stdin
            .flush()
            .await
            .map_err(|e| ClientError::Connection(format!("write to backend failed: {e}")))
    }

    async fn request(&mut self, method: &str, params: Value) -> ClientResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.send(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| ClientError::Connection("session is closed".to_string()))?;
        loop {
            let line = reader
                .next_line()
                .await
                .map_err(|e| ClientError::Connection(format!("read from backend failed: {e}")))?
                .ok_or_else(|| {
                    ClientError::Connection("backend closed the stream".to_string())
                })?;
            if line.trim().is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(&line) {
                Ok(value) => value,
                Err(e) => {
                    warn!(%line, "skipping unparseable line from backend: {e}");
                    continue;
                }
            };
            // Server-initiated notifications and stale replies are skipped
            if message.get("id").and_then(Value::as_u64) != Some(id) {
                continue;
            }
            if let Some(error) = message.get("error") {
                let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
                let text = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                return Err(ClientError::Internal(format!(
                    "backend error {code}: {text}"
                )));
            }
            return Ok(message.get("result").cloned().unwrap_or(Value::Null));
        }
    }

    async fn notify(&mut self, method: &str) -> ClientResult<()> {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": method,
        }))
        .await
    }

    /// Perform the initialize handshake.
    pub async fn initialize(&mut self) -> ClientResult<()> {
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        )
        .await?;
        self.notify("notifications/initialized").await
    }

    pub async fn list_tools(&mut self) -> ClientResult<Vec<ToolDescriptor>> {
        let result = self.request("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .cloned()
            .ok_or_else(|| ClientError::Parse("tool catalog missing 'tools'".to_string()))?;
        serde_json::from_value(tools)
            .map_err(|e| ClientError::Parse(format!("invalid tool descriptor: {e}")))
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> ClientResult<Vec<Content>> {
        let result = self
            .request(
                "tools/call",
                json!({
                    "name": name,
                    "arguments": arguments,
                }),
            )
            .await?;

        // Non-text content kinds the backend may emit are dropped here
        let contents = result
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value::<Content>(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(contents)
    }

    /// Best-effort teardown: release the pipes, then kill the child.
    /// Idempotent; a failure in one step does not block the next.
    pub async fn close(&mut self) {
        self.stdin.take();
        self.reader.take();
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to kill tool backend process: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawn_missing_executable_is_connection_error() {
        let result = StdioSession::spawn("definitely-not-a-real-binary", &[], &HashMap::new());
        assert!(matches!(result, Err(ClientError::Connection(_))));
    }

    #[tokio::test]
    async fn test_close_twice_is_fine() {
        // `cat` echoes nothing useful but gives us a real child process
        let mut session = match StdioSession::spawn("cat", &[], &HashMap::new()) {
            Ok(session) => session,
            Err(_) => return, // environment without cat; nothing to assert
        };
        session.close().await;
        session.close().await;
    }

    #[tokio::test]
    async fn test_request_after_close_fails() {
        let mut session = match StdioSession::spawn("cat", &[], &HashMap::new()) {
            Ok(session) => session,
            Err(_) => return,
        };
        session.close().await;
        assert!(matches!(
            session.request("tools/list", json!({})).await,
            Err(ClientError::Connection(_))
        ));
    }
}
