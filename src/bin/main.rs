use iot_market_orchestrator::{
    config::PipelineConfig,
    orchestrator::PipelineOrchestrator,
    providers::{web_provider_from_env, DocumentIndex},
    report::{JsonRenderer, MarkdownRenderer, ReportRenderer},
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
    let company = config.load_company()?;

    info!(
        vertical = %config.vertical,
        regions = ?config.regions,
        use_rag = config.use_rag,
        segment_count = config.segment_count,
        "IoT market segmentation run starting"
    );

    let web = web_provider_from_env()?;
    let mut orchestrator = PipelineOrchestrator::new(web)
        .with_agents(config.agent_set()?)
        .with_retry_policy(config.retry.clone())
        .with_retrieval_top_k(config.rag_top_k);

    if config.use_rag {
        match DocumentIndex::open(&config.rag_dir)? {
            Some(index) => {
                info!(dir = %config.rag_dir.display(), passages = index.len(), "Retrieval index loaded");
                orchestrator = orchestrator.with_retrieval(Arc::new(index));
            }
            None => warn!(dir = %config.rag_dir.display(), "No documents to index; continuing without retrieved context"),
        }
    }

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
    };
    let report = orchestrator.run_until(config.to_request(company), shutdown).await?;

    std::fs::create_dir_all(&config.output_dir)?;
    let renderers: [&dyn ReportRenderer; 2] = [&MarkdownRenderer, &JsonRenderer];
    for renderer in renderers {
        let path = config
            .output_dir
            .join(format!("{}.{}", report.report_id, renderer.extension()));
        std::fs::write(&path, renderer.render(&report)?)?;
        info!(path = %path.display(), "Report written");
    }

    println!("\n=== SEGMENTATION RESULT ===");
    println!("Report ID: {}", report.report_id);
    println!("Vertical: {}", report.vertical.name);
    for (rank, segment) in report.ranked_segments.iter().enumerate() {
        println!(
            "  {}. {} ({}) priority {:.2}",
            rank + 1,
            segment.name,
            segment.region(),
            segment.priority_score
        );
    }
    for entry in &report.entries {
        println!("Positioning for {}: {}", entry.segment.name, entry.positioning.strategy);
    }
    println!("\n{}", report.disclaimer);

    Ok(())
}
