//! Runs one query through the Helpful Assistant with a fixed run context.
//!
//! Usage: `advanced-handoff [query...]`
//!
//! Configuration comes from `AGENTS_CONFIG` (a TOML file) when set, otherwise
//! from `OPENAI_MODEL`, `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `AGENTS_MAX_TURNS`
//! and `AGENTS_TIMEOUT`. Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use advanced_handoff::assistants::helpful_assistant;
use advanced_handoff::{AppConfig, LoggingObserver, RunContext, Runner};
use tracing::info;

const DEFAULT_QUERY: &str = "What is the weather in karachi? and 2+10=?";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::var("AGENTS_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?,
        Err(_) => AppConfig::from_env()?,
    };

    let assistant = Arc::new(helpful_assistant(None, Arc::new(LoggingObserver))?);
    info!(handoffs = ?assistant.handoffs(), "assistant ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let query = if args.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        args.join(" ")
    };

    let context = RunContext::new()
        .with_name("Areeba Hammad")
        .with_age(20)
        .with_role("student");

    let runner = Runner::openai(config.openai_client(), config.run_config());
    let result = runner.run_sync(assistant, query, context)?;

    println!("{}", result.last_agent_name());
    println!("{}", result.final_output);
    Ok(())
}
