use iot_market_orchestrator::{
    api::start_server,
    config::PipelineConfig,
    orchestrator::PipelineOrchestrator,
    providers::{web_provider_from_env, DocumentIndex},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env()?;

    info!("🚀 IoT Market Orchestrator - API Server");
    info!("📍 Port: {}", config.port);

    let web = web_provider_from_env()?;
    let mut orchestrator = PipelineOrchestrator::new(web)
        .with_agents(config.agent_set()?)
        .with_retry_policy(config.retry.clone())
        .with_retrieval_top_k(config.rag_top_k);

    // Requests may ask for retrieval, so the index is loaded whenever documents exist
    match DocumentIndex::open(&config.rag_dir)? {
        Some(index) => {
            info!(dir = %config.rag_dir.display(), passages = index.len(), "Retrieval index loaded");
            orchestrator = orchestrator.with_retrieval(Arc::new(index));
        }
        None => warn!(dir = %config.rag_dir.display(), "No retrieval index; use_rag requests will run without retrieved context"),
    }

    info!("✅ Orchestrator initialized");

    start_server(Arc::new(orchestrator), config.port).await?;

    Ok(())
}
