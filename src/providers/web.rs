//! Web research over HTTP
//!
//! `HttpWebResearchProvider` posts queries to a search service that answers
//! with summarised text plus sources. When no search service is configured
//! but a Gemini key is, research falls back to the Gemini client.

use super::WebResearchProvider;
use crate::error::PipelineError;
use crate::gemini::GeminiClient;
use crate::models::{Findings, Source};
use crate::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default, alias = "answer", alias = "summary")]
    text: String,
    #[serde(default, alias = "results")]
    sources: Vec<Source>,
}

pub struct HttpWebResearchProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
}

impl HttpWebResearchProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_results: 8,
        })
    }

    /// `RESEARCH_API_BASE_URL` (+ optional `RESEARCH_API_KEY`)
    pub fn from_env() -> Option<Result<Self>> {
        let base_url = std::env::var("RESEARCH_API_BASE_URL").ok()?;
        let api_key = std::env::var("RESEARCH_API_KEY").ok().filter(|k| !k.is_empty());
        Some(Self::new(&base_url, api_key))
    }
}

/// 401/403 will not fix themselves; everything else non-2xx is worth a retry
fn status_error(status: StatusCode, body: &str) -> PipelineError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PipelineError::InvalidConfiguration(
            format!("research API rejected credentials ({})", status),
        ),
        _ => PipelineError::ProviderUnavailable(format!("research API returned {}: {}", status, body)),
    }
}

#[async_trait]
impl WebResearchProvider for HttpWebResearchProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn query(&self, query: &str) -> Result<Findings> {
        let url = format!("{}/search", self.base_url);
        debug!(%url, query, "Web research query");

        let mut request = self.client.post(&url).json(&SearchRequest {
            query,
            max_results: self.max_results,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(error = %e, "Research API request failed");
            PipelineError::ProviderUnavailable(format!("research API request failed: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            PipelineError::ProviderUnavailable(format!("unreadable research response: {}", e))
        })?;

        Ok(Findings {
            text: parsed.text,
            sources: parsed.sources,
        })
    }
}

#[async_trait]
impl WebResearchProvider for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn query(&self, query: &str) -> Result<Findings> {
        let text = self.generate(query).await?;
        if text.trim().is_empty() {
            return Ok(Findings::default());
        }
        Ok(Findings::new(text).with_source("Gemini market research synthesis", None))
    }
}

/// Pick the research backend from the environment.
///
/// `RESEARCH_API_BASE_URL` wins over `GEMINI_API_KEY`; with neither set the
/// run cannot do research at all.
pub fn web_provider_from_env() -> Result<Arc<dyn WebResearchProvider>> {
    if let Some(provider) = HttpWebResearchProvider::from_env() {
        info!("Using HTTP research API");
        return Ok(Arc::new(provider?));
    }

    match std::env::var("GEMINI_API_KEY") {
        Ok(key) if !key.is_empty() => {
            info!("Using Gemini for web research");
            Ok(Arc::new(GeminiClient::new(key)?))
        }
        _ => Err(PipelineError::InvalidConfiguration(
            "set RESEARCH_API_BASE_URL or GEMINI_API_KEY".to_string(),
        )),
    }
}
