use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use scout::agent::Agent;
use scout::config::load_config;

#[derive(Parser)]
#[command(name = "scout", about = "Chat with an LLM wired to a live tool backend")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Run a single query and exit instead of starting the prompt
    #[arg(short, long)]
    query: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let mut agent = Agent::connect(&config.server, &config.llm).await?;

    let tool_names: Vec<&str> = agent.tools().iter().map(|t| t.name.as_str()).collect();
    println!("Connected. Available tools: {}", tool_names.join(", "));

    if let Some(query) = cli.query {
        let answer = agent.process_query(&query).await;
        println!("{answer}");
        agent.close().await;
        return Ok(());
    }

    println!("Enter a query, or 'quit' to exit.");
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("\nquery> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line.to_lowercase().as_str(), "quit" | "exit") {
                    break;
                }
                editor.add_history_entry(line)?;
                let answer = agent.process_query(line).await;
                println!("{answer}");
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }

    agent.close().await;
    Ok(())
}
