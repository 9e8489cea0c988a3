//! REST API for the segmentation pipeline
//!
//! Exposes report generation and audit lookups over HTTP

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{CompanyCapabilities, RunOptions, RunRequest};
use crate::orchestrator::PipelineOrchestrator;
use crate::report::{MarkdownRenderer, ReportRenderer};

//
// ================= Request Models =================
//

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ReportRequest {
    pub vertical: String,
    pub regions: Vec<String>,
    #[serde(default)]
    pub use_rag: bool,
    /// Defaults to true when more than one region is given
    #[serde(default)]
    pub multi_region: Option<bool>,
    #[serde(default)]
    pub segment_count: Option<usize>,
    #[serde(default)]
    pub company_capabilities: Option<CompanyCapabilities>,
    #[serde(default)]
    pub system_architecture: Option<String>,
}

impl ReportRequest {
    fn into_run_request(self) -> RunRequest {
        let multi_region = self.multi_region.unwrap_or(self.regions.len() > 1);
        RunRequest {
            vertical_name: self.vertical,
            regions: self.regions,
            options: RunOptions {
                use_rag: self.use_rag,
                multi_region,
                validate_company: self.company_capabilities,
                segment_count: self.segment_count.unwrap_or(1),
                system_architecture: self.system_architecture,
            },
        }
    }
}

//
// ================= Response Wrapper =================
//

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidConfiguration(_) => StatusCode::BAD_REQUEST,
        PipelineError::PipelineStageFailed { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(err: PipelineError) -> ApiResult {
    let status = status_for(&err);
    if status.is_server_error() {
        error!(error = %err, "Report request failed");
    }
    (status, Json(ApiResponse::error(err.to_string())))
}

//
// ================= State =================
//

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<PipelineOrchestrator>,
}

//
// ================= Handlers =================
//

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn create_report(State(state): State<ApiState>, Json(req): Json<ReportRequest>) -> ApiResult {
    info!(vertical = %req.vertical, regions = ?req.regions, "Received report request");

    let report = match state.orchestrator.run(req.into_run_request()).await {
        Ok(report) => report,
        Err(e) => return failure(e),
    };

    let markdown = match MarkdownRenderer.render(&report) {
        Ok(markdown) => markdown,
        Err(e) => return failure(e),
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "report": report,
            "markdown": markdown,
        }))),
    )
}

/// Released report by id, with the hash recorded at release
async fn get_report(State(state): State<ApiState>, Path(report_id): Path<Uuid>) -> ApiResult {
    let audit_log = state.orchestrator.audit_log();

    let record = match audit_log.get_by_report(report_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::error(format!("No report with id {}", report_id))),
            )
        }
        Err(e) => return failure(e),
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "audit_id": record.audit_id,
            "report_hash": record.report_hash,
            "report": record.report,
        }))),
    )
}

//
// ================= Router =================
//

pub fn create_router(orchestrator: Arc<PipelineOrchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/reports", post(create_report))
        .route("/api/reports/:report_id", get(get_report))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    orchestrator: Arc<PipelineOrchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}
