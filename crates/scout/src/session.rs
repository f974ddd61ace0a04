pub mod connect;
pub mod http;
pub mod stdio;

pub use connect::{connect, ConnectType, ConnectionSpec};
pub use http::HttpSession;
pub use stdio::StdioSession;

use serde_json::Value;

use crate::errors::ClientResult;
use crate::models::content::Content;
use crate::models::tool::ToolDescriptor;

/// A live connection to a tool backend.
///
/// Callers never branch on the variant: both backends expose the same
/// capability surface, and the resolver in [`connect`] decides which one to
/// build.
pub enum Session {
    Http(HttpSession),
    Stdio(StdioSession),
}

impl Session {
    pub async fn initialize(&mut self) -> ClientResult<()> {
        match self {
            Session::Http(session) => session.initialize().await,
            Session::Stdio(session) => session.initialize().await,
        }
    }

    pub async fn list_tools(&mut self) -> ClientResult<Vec<ToolDescriptor>> {
        match self {
            Session::Http(session) => session.list_tools().await,
            Session::Stdio(session) => session.list_tools().await,
        }
    }

    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> ClientResult<Vec<Content>> {
        match self {
            Session::Http(session) => session.call_tool(name, arguments).await,
            Session::Stdio(session) => session.call_tool(name, arguments).await,
        }
    }

    /// Best-effort teardown; safe to call more than once.
    pub async fn close(&mut self) {
        match self {
            Session::Http(session) => session.close(),
            Session::Stdio(session) => session.close().await,
        }
    }
}
