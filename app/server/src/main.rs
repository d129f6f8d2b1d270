//! HTTP surface for the utslipp estimation assistant

mod routes;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use utslipp::agent::{default_registry, LlmPlanner, Orchestrator, PolicyConfig};
use utslipp::llm::{LlmClient, LlmProvider};
use utslipp::{ClimatiqClient, DirectEstimator, UtslippConfig};

use routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = UtslippConfig::from_env().map_err(|e| anyhow!(e))?;
    let client = Arc::new(ClimatiqClient::new(config)?);

    let provider = match std::env::var("LLM_PROVIDER").as_deref() {
        Ok("openai") => LlmProvider::OpenAi,
        Ok("anthropic") | Err(_) => LlmProvider::Anthropic,
        Ok(endpoint) => LlmProvider::Custom { endpoint: endpoint.to_string() },
    };
    let llm_key = std::env::var("LLM_API_KEY").context("LLM_API_KEY is not set")?;
    let llm_model = std::env::var("LLM_MODEL")
        .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
    let llm = LlmClient::new(provider, llm_key, llm_model)?;

    let registry = Arc::new(default_registry(client.clone()));
    let planner = Arc::new(LlmPlanner::new(llm));
    let orchestrator = Arc::new(Orchestrator::new(registry, planner, PolicyConfig::default()));
    let estimator = Arc::new(DirectEstimator::new(client));

    let state = AppState { orchestrator, estimator };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = routes::router(state).layer(cors);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "utslipp server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
