//! Gemini API client used as a research backend
//!
//! Uses a long-lived reqwest::Client for connection pooling.
//! The system prompt asks for the markdown layout the findings parser reads.

use crate::error::PipelineError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

const GEMINI_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

const SYSTEM_PROMPT: &str = r#"You are an IoT market research analyst.

Answer with markdown only:
- Use `##` headings for each requested topic
- Put facts in `-` bullets, and numbers as `Key: value` lines
- Score market variables as `Variable: N/5 - rationale`
- When asked for segments, start each with `### Segment N: <name>`

Be concise. If data is uncertain, give your best estimate."#;

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: GEMINI_URL.to_string(),
        })
    }

    /// Point the client at another `generateContent` endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub async fn generate(&self, query: &str) -> crate::Result<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::InvalidConfiguration(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: query.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        info!("Calling Gemini API");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                PipelineError::ProviderUnavailable(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                    PipelineError::InvalidConfiguration(format!("Gemini rejected request: {}", status))
                }
                _ => PipelineError::ProviderUnavailable(format!("Gemini API error: {}", status)),
            });
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            PipelineError::ProviderUnavailable(format!("Gemini parse error: {}", e))
        })?;

        // No candidates is an answer too: the agents fall back to synthetic defaults
        let Some(answer) = first_text(&gemini_response) else {
            warn!("Gemini returned no candidates");
            return Ok(String::new());
        };

        info!(chars = answer.len(), "Gemini response received");

        Ok(answer)
    }
}

fn first_text(response: &GeminiResponse) -> Option<String> {
    response
        .candidates
        .first()?
        .content
        .parts
        .first()
        .map(|p| p.text.clone())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization_uses_api_field_names() {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: "Smart Agriculture in Finland".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_PROMPT.to_string(),
                }],
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("Smart Agriculture in Finland"));
        assert!(json.contains("generationConfig"));
        assert!(json.contains("maxOutputTokens"));
    }

    #[test]
    fn test_first_text_handles_missing_candidates() {
        let empty: GeminiResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(first_text(&empty), None);

        let full: GeminiResponse = serde_json::from_str(
            r###"{"candidates":[{"content":{"parts":[{"text":"## Use cases"}]}}]}"###,
        )
        .unwrap();
        assert_eq!(first_text(&full).as_deref(), Some("## Use cases"));
    }

    async fn serve_once(body: serde_json::Value) -> String {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route("/generate", post(move || async move { Json(body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}/generate", addr)
    }

    #[tokio::test]
    async fn test_empty_candidates_degrade_to_empty_findings() {
        use crate::providers::WebResearchProvider;

        let url = serve_once(serde_json::json!({ "candidates": [] })).await;
        let client = GeminiClient::new("test-key".to_string()).unwrap().with_base_url(url);

        let findings = client.query("IoT vertical analysis for Smart Cities").await.unwrap();
        assert!(findings.is_empty());
        assert!(findings.sources.is_empty());
    }

    #[tokio::test]
    async fn test_answer_text_comes_back_with_source() {
        use crate::providers::WebResearchProvider;

        let url = serve_once(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": "## Use cases\n- Smart lighting" }] } }]
        }))
        .await;
        let client = GeminiClient::new("test-key".to_string()).unwrap().with_base_url(url);

        let findings = client.query("IoT vertical analysis for Smart Cities").await.unwrap();
        assert!(findings.text.contains("Smart lighting"));
        assert_eq!(findings.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_a_configuration_error() {
        let client = GeminiClient::new(String::new()).unwrap();
        let err = client.generate("anything").await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }
}
