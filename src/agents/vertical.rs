use super::{Agent, VerticalRequest};
use crate::findings::FindingsDocument;
use crate::models::{Stage, Vertical};
use crate::providers::WebResearchProvider;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

const USE_CASE_KEYS: [&str; 3] = ["use case", "application", "use-case"];
const TECHNOLOGY_KEYS: [&str; 4] = ["requirement", "technolog", "tech stack", "enabling"];
const TREND_KEYS: [&str; 3] = ["trend", "driver", "outlook"];
const BARRIER_KEYS: [&str; 4] = ["barrier", "challenge", "obstacle", "risk"];

/// Region-independent profile of an IoT vertical
pub struct VerticalAnalysisAgent;

impl VerticalAnalysisAgent {
    fn query(vertical_name: &str) -> String {
        format!(
            "IoT vertical analysis for {}: core use cases, technology requirements \
             (devices, connectivity, cloud, security), market trends, adoption barriers",
            vertical_name
        )
    }
}

#[async_trait]
impl Agent<VerticalRequest, Vertical> for VerticalAnalysisAgent {
    fn name(&self) -> &'static str {
        "vertical_analysis"
    }

    fn stage(&self) -> Stage {
        Stage::VerticalAnalysis
    }

    async fn analyze(&self, input: &VerticalRequest, web: &dyn WebResearchProvider) -> Result<Vertical> {
        let name = input.vertical_name.trim();
        let findings = web.query(&Self::query(name)).await?;
        let doc = FindingsDocument::parse(&findings.text);

        let vertical = Vertical {
            id: Uuid::new_v4(),
            name: name.to_string(),
            use_cases: doc.list(&USE_CASE_KEYS),
            technology_requirements: doc.list(&TECHNOLOGY_KEYS).into_iter().collect(),
            trends: doc.list(&TREND_KEYS),
            barriers: doc.list(&BARRIER_KEYS),
            sources: findings.sources,
            is_synthetic: true,
            created_at: Utc::now(),
        };

        info!(
            vertical = %vertical.name,
            use_cases = vertical.use_cases.len(),
            requirements = vertical.technology_requirements.len(),
            provider = web.name(),
            "Vertical profile structured"
        );

        Ok(vertical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Findings;
    use crate::providers::StaticWebResearch;

    const AGRICULTURE: &str = r#"
## Use Cases
- Precision irrigation
- Livestock monitoring
- Precision irrigation

## Technology Requirements
- Soil moisture sensors
- LoRaWAN connectivity
- Cloud analytics platform

## Market Trends
- Drone-based crop imaging

## Barriers
- High upfront cost
"#;

    #[tokio::test]
    async fn test_structures_sections_into_profile() {
        let web = StaticWebResearch::new().with_rule(
            "smart agriculture",
            Findings::new(AGRICULTURE).with_source("FAO digital agriculture report", None),
        );

        let vertical = VerticalAnalysisAgent
            .analyze(
                &VerticalRequest {
                    vertical_name: " Smart Agriculture ".into(),
                },
                &web,
            )
            .await
            .unwrap();

        assert_eq!(vertical.name, "Smart Agriculture");
        assert_eq!(vertical.use_cases, vec!["Precision irrigation", "Livestock monitoring"]);
        assert_eq!(vertical.technology_requirements.len(), 3);
        assert_eq!(vertical.trends, vec!["Drone-based crop imaging"]);
        assert_eq!(vertical.barriers, vec!["High upfront cost"]);
        assert_eq!(vertical.sources.len(), 1);
        assert!(vertical.is_synthetic);
    }

    #[tokio::test]
    async fn test_empty_findings_give_empty_synthetic_profile() {
        let web = StaticWebResearch::new();

        let vertical = VerticalAnalysisAgent
            .analyze(
                &VerticalRequest {
                    vertical_name: "Smart Retail".into(),
                },
                &web,
            )
            .await
            .unwrap();

        assert!(!vertical.has_content());
        assert!(vertical.is_synthetic);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates() {
        let web = StaticWebResearch::new().failing_first([
            crate::error::PipelineError::ProviderUnavailable("503".into()),
        ]);

        let result = VerticalAnalysisAgent
            .analyze(
                &VerticalRequest {
                    vertical_name: "Smart Retail".into(),
                },
                &web,
            )
            .await;

        assert!(result.unwrap_err().is_transient());
    }
}
