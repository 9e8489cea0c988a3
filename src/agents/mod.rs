//! Stage agents
//!
//! Each agent turns the artifacts of earlier stages into exactly one new
//! artifact. Agents hold no state between calls, query the web provider they
//! are handed, and structure the findings deterministically.
//! Sparse findings produce sparse artifacts; only provider errors fail.

pub mod company;
pub mod geo;
pub mod positioning;
pub mod segment;
pub mod vertical;

pub use company::CompanyFitAssessor;
pub use geo::GeoSegmentationAgent;
pub use positioning::{
    architecture_layers, classify, classify_preferring, LayerProfile, PositioningAgent,
    PositioningPolicy,
};
pub use segment::{compare_segments, rank_segments, ScoringPolicy, SegmentSynthesisAgent};
pub use vertical::VerticalAnalysisAgent;

use crate::models::{
    CompanyCapabilities, GeographicMarket, PositioningRecommendation, RagContextChunk, Segment,
    Stage, Vertical,
};
use crate::providers::WebResearchProvider;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Produces artifact `O` from input artifacts `I`
#[async_trait]
pub trait Agent<I, O>: Send + Sync
where
    I: Send + Sync,
    O: Send,
{
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    async fn analyze(&self, input: &I, web: &dyn WebResearchProvider) -> Result<O>;
}

//
// ================= Stage inputs =================
//

#[derive(Debug, Clone)]
pub struct VerticalRequest {
    pub vertical_name: String,
}

#[derive(Debug, Clone)]
pub struct GeoRequest {
    pub vertical: Arc<Vertical>,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct SegmentRequest {
    pub vertical: Arc<Vertical>,
    pub market: Arc<GeographicMarket>,
}

/// Retrieval chunks arrive here already fetched; agents never see the index
#[derive(Debug, Clone)]
pub struct PositioningRequest {
    pub segment: Arc<Segment>,
    pub context: Vec<RagContextChunk>,
    pub company: Option<CompanyCapabilities>,
    /// Free-text description of the company's existing system architecture
    pub architecture: Option<String>,
}

pub type VerticalAgent = Arc<dyn Agent<VerticalRequest, Vertical>>;
pub type GeoAgent = Arc<dyn Agent<GeoRequest, GeographicMarket>>;
pub type SegmentAgent = Arc<dyn Agent<SegmentRequest, Vec<Segment>>>;
pub type PositionAgent = Arc<dyn Agent<PositioningRequest, PositioningRecommendation>>;

/// One agent per stage; any of them can be swapped independently
#[derive(Clone)]
pub struct AgentSet {
    pub vertical: VerticalAgent,
    pub geo: GeoAgent,
    pub segment: SegmentAgent,
    pub positioning: PositionAgent,
    pub company: CompanyFitAssessor,
}

impl AgentSet {
    /// Fails with `InvalidConfiguration` when either policy is out of range
    pub fn with_policies(scoring: ScoringPolicy, positioning: PositioningPolicy) -> Result<Self> {
        let company = CompanyFitAssessor::new(&positioning);
        Ok(Self {
            vertical: Arc::new(VerticalAnalysisAgent),
            geo: Arc::new(GeoSegmentationAgent),
            segment: Arc::new(SegmentSynthesisAgent::new(scoring)?),
            positioning: Arc::new(PositioningAgent::new(positioning)?),
            company,
        })
    }
}

impl Default for AgentSet {
    fn default() -> Self {
        Self {
            vertical: Arc::new(VerticalAnalysisAgent),
            geo: Arc::new(GeoSegmentationAgent),
            segment: Arc::new(SegmentSynthesisAgent::default()),
            positioning: Arc::new(PositioningAgent::default()),
            company: CompanyFitAssessor::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_agent_set_covers_every_stage() {
        let agents = AgentSet::default();

        assert_eq!(agents.vertical.stage(), Stage::VerticalAnalysis);
        assert_eq!(agents.geo.stage(), Stage::GeoSegmentation);
        assert_eq!(agents.segment.stage(), Stage::SegmentSynthesis);
        assert_eq!(agents.positioning.stage(), Stage::Positioning);
    }

    #[test]
    fn test_invalid_policies_build_no_agent_set() {
        use crate::error::PipelineError;
        use crate::taxonomy::MarketVariable;

        let above_one = PositioningPolicy {
            single_layer_threshold: 1.5,
            ..PositioningPolicy::default()
        };
        assert!(matches!(
            AgentSet::with_policies(ScoringPolicy::default(), above_one),
            Err(PipelineError::InvalidConfiguration(_))
        ));

        let negative = ScoringPolicy::default().with_weight(MarketVariable::Profitability, -3.0);
        assert!(matches!(
            AgentSet::with_policies(negative, PositioningPolicy::default()),
            Err(PipelineError::InvalidConfiguration(_))
        ));

        assert!(AgentSet::with_policies(ScoringPolicy::default(), PositioningPolicy::default()).is_ok());
    }
}
