use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scout::models::tool::ToolDescriptor;
use scout::search::{format_results, optimize, SearchClient, SearchOptions};

/// Content shorter than this is too thin to be worth showing the model
const MIN_CONTENT_LENGTH: usize = 30;

#[derive(Parser)]
#[command(name = "scoutd", about = "Serve the web search tool over HTTP")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Search API key
    #[arg(long, env = "SEARCH_API_KEY")]
    api_key: String,

    /// Cloud folder the search quota is billed to
    #[arg(long, env = "SEARCH_FOLDER_ID")]
    folder_id: String,
}

struct AppState {
    search: SearchClient,
    tools: Vec<ToolDescriptor>,
}

fn search_tool_descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "search_internet",
        "Search the internet. Returns a numbered list of results with titles, URLs and content.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num": {
                    "type": "integer",
                    "description": "Number of results (1-10, default 5)"
                }
            },
            "required": ["query"]
        }),
    )
}

#[derive(Deserialize)]
struct CallRequest {
    tool: String,
    #[serde(default)]
    arguments: Value,
}

async fn status() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({"tools": state.tools}))
}

/// Run the search tool; every failure mode degrades to a text answer so the
/// model can read it.
async fn search_internet(state: &AppState, arguments: &Value) -> String {
    let Some(query) = arguments.get("query").and_then(Value::as_str) else {
        return "Search error: the query must not be empty".to_string();
    };
    if query.is_empty() {
        return "Search error: the query must not be empty".to_string();
    }
    let num = arguments
        .get("num")
        .and_then(Value::as_u64)
        .unwrap_or(5)
        .clamp(1, 10) as u32;

    let options = SearchOptions {
        groups_on_page: num,
        ..SearchOptions::default()
    };
    let records = state.search.search(query, &options).await;
    let records = optimize(records, MIN_CONTENT_LENGTH, usize::MAX);
    format_results(&records, query)
}

async fn call(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CallRequest>,
) -> Json<Value> {
    info!(tool = %request.tool, "tool call");
    let result = match request.tool.as_str() {
        "search_internet" => search_internet(&state, &request.arguments).await,
        other => {
            error!(tool = %other, "unknown tool requested");
            format!("Unknown tool: {other}")
        }
    };
    Json(json!({"content": [result]}))
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/tools", get(tools))
        .route("/call", post(call))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let state = Arc::new(AppState {
        search: SearchClient::new(&cli.api_key, &cli.folder_id)?,
        tools: vec![search_tool_descriptor()],
    });

    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    info!(bind = %cli.bind, "search tool server listening");
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}
