use super::{Agent, GeoRequest};
use crate::findings::{parse_money_millions, parse_percent, FindingsDocument};
use crate::models::{GeographicMarket, Stage};
use crate::providers::WebResearchProvider;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

const SIZE_KEYS: [&str; 3] = ["market size", "market value", "size"];
const GROWTH_KEYS: [&str; 2] = ["cagr", "growth"];
const REGULATORY_KEYS: [&str; 4] = ["regulat", "compliance", "policy", "policies"];
const COMPETITOR_KEYS: [&str; 4] = ["competitor", "player", "vendor", "competition"];

/// Profiles one region for an already analysed vertical
pub struct GeoSegmentationAgent;

impl GeoSegmentationAgent {
    fn query(vertical_name: &str, region: &str) -> String {
        format!(
            "IoT {} market in {}: market size, growth rate (CAGR), \
             regulatory factors, key competitors",
            vertical_name, region
        )
    }
}

#[async_trait]
impl Agent<GeoRequest, GeographicMarket> for GeoSegmentationAgent {
    fn name(&self) -> &'static str {
        "geo_segmentation"
    }

    fn stage(&self) -> Stage {
        Stage::GeoSegmentation
    }

    async fn analyze(&self, input: &GeoRequest, web: &dyn WebResearchProvider) -> Result<GeographicMarket> {
        let region = input.region.trim();
        let findings = web.query(&Self::query(&input.vertical.name, region)).await?;
        let doc = FindingsDocument::parse(&findings.text);

        let market = GeographicMarket {
            id: Uuid::new_v4(),
            region: region.to_string(),
            vertical_ref: input.vertical.reference(),
            market_size_estimate: doc.field(&SIZE_KEYS).and_then(parse_money_millions),
            growth_estimate: doc.field(&GROWTH_KEYS).and_then(parse_percent),
            regulatory_factors: doc.list(&REGULATORY_KEYS),
            competitors: doc.list(&COMPETITOR_KEYS),
            sources: findings.sources,
            is_synthetic: true,
            created_at: Utc::now(),
        };

        info!(
            vertical = %input.vertical.name,
            region = %market.region,
            market_size_musd = ?market.market_size_estimate,
            growth_pct = ?market.growth_estimate,
            "Geographic market structured"
        );

        Ok(market)
    }
}
