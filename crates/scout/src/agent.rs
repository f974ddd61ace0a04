use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};
use tokio::time::timeout;
use tracing::{debug, error, info};

use crate::config::LlmConfig;
use crate::errors::ClientResult;
use crate::models::content::flatten_to_text;
use crate::models::message::Message;
use crate::models::tool::{ToolCallRequest, ToolDescriptor};
use crate::providers::base::Provider;
use crate::providers::factory::get_provider;
use crate::session::{connect, ConnectionSpec, Session};

/// Hard cap on model calls per query, wrap-up call excluded
pub const MAX_ITERATIONS: usize = 10;

const DEFAULT_LLM_CALL_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(300);

const EMPTY_RESPONSE: &str = "Empty response.";
const DEFAULT_INSTRUCTIONS: &str =
    "You are an assistant whose job is to help the user solve their tasks.";

lazy_static! {
    static ref BREAKS_RE: Regex = Regex::new(r"[\n\t]|-{5,}").unwrap();
    static ref SPACES_RE: Regex = Regex::new(r" {2,}").unwrap();
}

/// Collapse tabs, newlines and long dash runs so a tool description fits on
/// one line of the system message.
fn normalize_description(description: &str) -> String {
    let flattened = BREAKS_RE.replace_all(description, " ");
    SPACES_RE.replace_all(&flattened, " ").trim().to_string()
}

/// Agent pairs an LLM endpoint with the tools of one connected backend and
/// drives the conversation until an answer emerges.
///
/// The agent owns its session exclusively; one query runs at a time and its
/// conversation state is discarded when the query completes.
pub struct Agent {
    session: Session,
    provider: Box<dyn Provider + Send + Sync>,
    tools: Vec<ToolDescriptor>,
    instructions: String,
    llm_call_timeout: Duration,
    tool_call_timeout: Duration,
}

impl Agent {
    /// Resolve the connection, fetch the tool catalog once, and build the
    /// provider for the configured dialect.
    pub async fn connect(spec: &ConnectionSpec, llm_config: &LlmConfig) -> ClientResult<Self> {
        let provider = get_provider(llm_config)?;
        let mut session = connect(spec).await?;
        let tools = session.list_tools().await?;
        info!(
            server = spec.name.as_deref().unwrap_or("unnamed"),
            tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            "connected to tool backend"
        );

        Ok(Self::new(provider, session, tools, spec.instructions.clone()))
    }

    pub fn new(
        provider: Box<dyn Provider + Send + Sync>,
        session: Session,
        tools: Vec<ToolDescriptor>,
        instructions: Option<String>,
    ) -> Self {
        Self {
            session,
            provider,
            tools,
            instructions: instructions.unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            llm_call_timeout: DEFAULT_LLM_CALL_TIMEOUT,
            tool_call_timeout: DEFAULT_TOOL_CALL_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, llm_call: Duration, tool_call: Duration) -> Self {
        self.llm_call_timeout = llm_call;
        self.tool_call_timeout = tool_call;
        self
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Release the tool session. Safe to call more than once.
    pub async fn close(&mut self) {
        self.session.close().await;
    }

    /// Answer one query, driving the model and its tool calls to completion.
    ///
    /// Never returns an error: every failure mode degrades to a descriptive
    /// text answer here, at the single conversion boundary.
    pub async fn process_query(&mut self, query: &str) -> String {
        info!(%query, "processing query");
        match self.run_query(query).await {
            Ok(answer) => {
                info!("query finished");
                answer
            }
            Err(e) => {
                error!("query failed: {e}");
                format!("Failed to process the query: {e}")
            }
        }
    }

    async fn run_query(&mut self, query: &str) -> ClientResult<String> {
        // Fragments of the answer as they accumulate; the caller sees the
        // last non-empty one
        let mut transcript: Vec<String> = Vec::new();
        let mut messages = vec![
            Message::system(self.system_message()),
            Message::user(query),
        ];

        for iteration in 1..=MAX_ITERATIONS {
            debug!(iteration, "model call");

            let reply = match timeout(
                self.llm_call_timeout,
                self.provider.complete(&messages, &self.tools),
            )
            .await
            {
                Ok(Ok(reply)) => reply,
                Ok(Err(e)) => {
                    error!(iteration, "model call failed: {e}");
                    transcript.push(format!("Error on iteration {iteration}: {e}"));
                    break;
                }
                Err(_) => {
                    error!(iteration, "model call timed out");
                    transcript.push(format!("LLM timed out on iteration {iteration}"));
                    break;
                }
            };

            let content = reply.content.unwrap_or_default();
            if !content.is_empty() {
                debug!(%content, "model text");
                transcript.push(content.clone());
            }

            if reply.tool_calls.is_empty() {
                info!("no tool calls, finishing");
                break;
            }

            messages.push(Message::assistant(content).with_tool_calls(reply.tool_calls.clone()));

            // Sequential, in the model's given order; one tool message per
            // call id regardless of outcome
            let mut invoked = false;
            for call in &reply.tool_calls {
                let result = self.invoke_tool(call).await;
                invoked = true;
                messages.push(Message::tool(call.id.clone(), result));
            }

            if iteration == MAX_ITERATIONS && invoked {
                self.wrap_up(&messages, &mut transcript).await;
            }
        }

        let answer = transcript
            .iter()
            .rev()
            .find(|fragment| !fragment.is_empty())
            .cloned()
            .unwrap_or_else(|| EMPTY_RESPONSE.to_string());
        Ok(answer)
    }

    /// One extra bounded model call to summarize after the iteration budget
    /// is spent; failures are recorded in the transcript, not fatal.
    async fn wrap_up(&self, messages: &[Message], transcript: &mut Vec<String>) {
        match timeout(
            self.llm_call_timeout,
            self.provider.complete(messages, &self.tools),
        )
        .await
        {
            Ok(Ok(reply)) => {
                if let Some(content) = reply.content {
                    if !content.is_empty() {
                        transcript.push(format!("Final summary: {content}"));
                    }
                }
            }
            Ok(Err(e)) => {
                error!("failed to obtain a final summary: {e}");
                transcript.push(format!("Failed to obtain a final summary: {e}"));
            }
            Err(_) => {
                error!("timed out obtaining a final summary");
                transcript.push("Timed out obtaining a final summary".to_string());
            }
        }
    }

    /// Execute one tool call; every failure mode becomes the result text.
    async fn invoke_tool(&mut self, call: &ToolCallRequest) -> String {
        let name = &call.function.name;
        info!(tool = %name, "invoking tool");

        let raw = if call.function.arguments.is_empty() {
            "{}"
        } else {
            call.function.arguments.as_str()
        };
        let arguments: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                error!(tool = %name, "invalid tool arguments: {e}");
                return format!("Error calling tool {name}: invalid arguments: {e}");
            }
        };

        match timeout(
            self.tool_call_timeout,
            self.session.call_tool(name, arguments),
        )
        .await
        {
            Ok(Ok(contents)) => {
                let result = flatten_to_text(&contents);
                debug!(tool = %name, %result, "tool result");
                result
            }
            Ok(Err(e)) => {
                error!(tool = %name, "tool call failed: {e}");
                format!("Error calling tool {name}: {e}")
            }
            Err(_) => {
                error!(tool = %name, "tool call timed out");
                format!("Tool call {name} timed out")
            }
        }
    }

    fn system_message(&self) -> String {
        let catalog: Vec<Value> = self
            .tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": normalize_description(&tool.description),
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();

        format!(
            "{}\n\nYou have access to the following tools:\n{}",
            self.instructions,
            serde_json::to_string(&catalog).unwrap_or_default()
        )
    }
}
