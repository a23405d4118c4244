//! NL→SQL server with OpenAI integration
//!
//! Accepts natural language questions over HTTP or MCP, translates them to SQL
//! with OpenAI and executes them against DuckDB.

use nlsql_server::{http, logging, mcp, Config, Orchestrator, Protocol};
use nlsql_translate::OpenAiModel;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Secrets live in .env
    dotenvy::dotenv().ok();

    let config_path = std::env::var("NLSQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;

    logging::init(&config.logging);
    info!(config = %config_path, "configuration loaded");

    let api_key = Config::get_openai_api_key()?;
    let openai_config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
    let openai_client = async_openai::Client::with_config(openai_config);
    let model = OpenAiModel::new(
        openai_client,
        config.llm.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    );
    info!("Using OpenAI model: {}", model.model());

    let orchestrator = Arc::new(Orchestrator::from_config(&config, Arc::new(model))?);

    match config.server.protocol {
        Protocol::Http => {
            let addr = format!("{}:{}", config.server.host, config.server.port);
            http::serve(&addr, orchestrator).await?;
        }
        Protocol::Mcp => {
            mcp::serve(config.server.host.clone(), config.server.port, orchestrator).await?;
        }
    }

    Ok(())
}
