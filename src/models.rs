//! Core data models for the market research pipeline
//!
//! Every artifact is produced once by its stage and then shared forward
//! behind an `Arc`; later stages reference earlier artifacts, never mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::execution::StageRecord;
use crate::taxonomy::{Capability, MarketVariable, TechnologyLayer};
use crate::Result;

pub const DISCLAIMER: &str =
    "Disclaimer: The following data is synthetic and generated for illustrative purposes only.";

//
// ================= Stages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VerticalAnalysis,
    GeoSegmentation,
    SegmentSynthesis,
    RetrievalContext,
    Positioning,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::VerticalAnalysis => "vertical_analysis",
            Stage::GeoSegmentation => "geo_segmentation",
            Stage::SegmentSynthesis => "segment_synthesis",
            Stage::RetrievalContext => "retrieval_context",
            Stage::Positioning => "positioning",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Provider I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Source {
    pub fn citation(&self) -> String {
        match &self.url {
            Some(url) => format!("{} ({})", self.title, url),
            None => self.title.clone(),
        }
    }
}

/// Raw output of a web research query: unstructured text plus sources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Findings {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Findings {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, title: impl Into<String>, url: Option<&str>) -> Self {
        self.sources.push(Source {
            title: title.into(),
            url: url.map(str::to_string),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagContextChunk {
    pub source_id: String,
    pub text: String,
    pub relevance_score: f32,
}

//
// ================= Vertical =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vertical {
    pub id: Uuid,
    pub name: String,
    pub use_cases: Vec<String>,
    pub technology_requirements: BTreeSet<String>,
    pub trends: Vec<String>,
    pub barriers: Vec<String>,
    pub sources: Vec<Source>,
    pub is_synthetic: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerticalRef {
    pub id: Uuid,
    pub name: String,
}

impl Vertical {
    pub fn reference(&self) -> VerticalRef {
        VerticalRef {
            id: self.id,
            name: self.name.clone(),
        }
    }

    pub fn has_content(&self) -> bool {
        !self.use_cases.is_empty()
            || !self.technology_requirements.is_empty()
            || !self.trends.is_empty()
            || !self.barriers.is_empty()
    }
}

//
// ================= Geographic Market =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeographicMarket {
    pub id: Uuid,
    pub region: String,
    pub vertical_ref: VerticalRef,
    /// USD millions
    pub market_size_estimate: Option<f64>,
    /// Percent per year
    pub growth_estimate: Option<f64>,
    pub regulatory_factors: Vec<String>,
    pub competitors: Vec<String>,
    pub sources: Vec<Source>,
    pub is_synthetic: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketRef {
    pub id: Uuid,
    pub region: String,
}

impl GeographicMarket {
    pub fn reference(&self) -> MarketRef {
        MarketRef {
            id: self.id,
            region: self.region.clone(),
        }
    }

    pub fn has_content(&self) -> bool {
        self.market_size_estimate.is_some()
            || self.growth_estimate.is_some()
            || !self.regulatory_factors.is_empty()
            || !self.competitors.is_empty()
    }
}

//
// ================= Segment =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableValue {
    /// Attractiveness in `[0, 1]`, already polarity-adjusted
    pub score: f64,
    pub rationale: String,
    pub is_synthetic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: Uuid,
    pub name: String,
    pub vertical_ref: VerticalRef,
    pub market_ref: MarketRef,
    pub characteristics: BTreeMap<MarketVariable, VariableValue>,
    pub technology_requirements: BTreeSet<String>,
    pub priority_score: f64,
    pub is_synthetic: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentRef {
    pub id: Uuid,
    pub name: String,
    pub region: String,
}

impl Segment {
    pub fn reference(&self) -> SegmentRef {
        SegmentRef {
            id: self.id,
            name: self.name.clone(),
            region: self.market_ref.region.clone(),
        }
    }

    pub fn region(&self) -> &str {
        &self.market_ref.region
    }

    pub fn vertical_name(&self) -> &str {
        &self.vertical_ref.name
    }
}

//
// ================= Positioning =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PositioningStrategy {
    SingleLayer(TechnologyLayer),
    MultiLayer(BTreeSet<TechnologyLayer>),
    EndToEnd,
    CrossCutting(Capability),
}

impl PositioningStrategy {
    /// Layers the strategy commits to
    pub fn layers(&self) -> BTreeSet<TechnologyLayer> {
        match self {
            PositioningStrategy::SingleLayer(layer) => BTreeSet::from([*layer]),
            PositioningStrategy::MultiLayer(layers) => layers.clone(),
            PositioningStrategy::EndToEnd => TechnologyLayer::ALL.into_iter().collect(),
            PositioningStrategy::CrossCutting(_) => BTreeSet::from([TechnologyLayer::CrossCutting]),
        }
    }
}

impl fmt::Display for PositioningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositioningStrategy::SingleLayer(layer) => write!(f, "Single layer: {}", layer),
            PositioningStrategy::MultiLayer(layers) => {
                let names: Vec<_> = layers.iter().map(|l| l.label()).collect();
                write!(f, "Multi-layer: {}", names.join(" + "))
            }
            PositioningStrategy::EndToEnd => write!(f, "End-to-end (all layers)"),
            PositioningStrategy::CrossCutting(capability) => {
                write!(f, "Cross-cutting: {}", capability.label())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositioningRecommendation {
    pub id: Uuid,
    pub segment_ref: SegmentRef,
    pub strategy: PositioningStrategy,
    pub justification: String,
    pub citations: Vec<String>,
    #[serde(default)]
    pub downgraded_from: Option<PositioningStrategy>,
    pub is_synthetic: bool,
    pub created_at: DateTime<Utc>,
}

//
// ================= Company =================
//

/// Private capability profile; never quoted in report text
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompanyCapabilities {
    /// Readiness per layer on a 1..=5 scale
    pub layer_readiness: BTreeMap<TechnologyLayer, u8>,
    /// How well the company can act on each market variable, 1..=5
    #[serde(default)]
    pub variable_fit: BTreeMap<MarketVariable, u8>,
}

impl CompanyCapabilities {
    pub fn readiness(&self, layer: TechnologyLayer) -> u8 {
        self.layer_readiness.get(&layer).copied().unwrap_or(1)
    }

    pub fn supports(&self, layer: TechnologyLayer, min_readiness: u8) -> bool {
        self.readiness(layer) >= min_readiness
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((layer, score)) = self
            .layer_readiness
            .iter()
            .find(|(_, score)| !(1..=5).contains(*score))
        {
            return Err(PipelineError::InvalidConfiguration(format!(
                "readiness for {} must be within 1..=5, got {}",
                layer, score
            )));
        }

        if let Some((variable, score)) = self
            .variable_fit
            .iter()
            .find(|(_, score)| !(1..=5).contains(*score))
        {
            return Err(PipelineError::InvalidConfiguration(format!(
                "fit for {} must be within 1..=5, got {}",
                variable.key(),
                score
            )));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FitLevel {
    Weak,
    Moderate,
    Strong,
}

impl FitLevel {
    /// 4-5 strong, 3 moderate, below that weak
    pub fn from_rating(rating: u8) -> Self {
        match rating {
            4.. => FitLevel::Strong,
            3 => FitLevel::Moderate,
            _ => FitLevel::Weak,
        }
    }

    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            FitLevel::Strong
        } else if score >= 0.5 {
            FitLevel::Moderate
        } else {
            FitLevel::Weak
        }
    }
}

impl fmt::Display for FitLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FitLevel::Strong => "Strong",
            FitLevel::Moderate => "Moderate",
            FitLevel::Weak => "Weak",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerFit {
    pub layer: TechnologyLayer,
    /// Implicated by the segment's technology requirements
    pub required: bool,
    pub supported: bool,
}

/// Company-market fit for one segment.
///
/// Derived from the private profile but carries only levels and gaps,
/// never the stated readiness numbers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyFitAssessment {
    pub segment_ref: SegmentRef,
    /// All four layers in model order
    pub layers: Vec<LayerFit>,
    /// Required layers the company cannot yet deliver
    pub gaps: Vec<TechnologyLayer>,
    pub variable_fit: BTreeMap<MarketVariable, FitLevel>,
    /// 0.0..=1.0
    pub fit_score: f64,
    pub overall: FitLevel,
}

//
// ================= Run Request =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    #[serde(default)]
    pub use_rag: bool,
    #[serde(default)]
    pub multi_region: bool,
    #[serde(default)]
    pub validate_company: Option<CompanyCapabilities>,
    /// Number of top segments (K) that receive a positioning recommendation
    #[serde(default = "default_segment_count")]
    pub segment_count: usize,
    /// Free-text description of the company's existing system architecture
    #[serde(default)]
    pub system_architecture: Option<String>,
}

fn default_segment_count() -> usize {
    1
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            use_rag: false,
            multi_region: false,
            validate_company: None,
            segment_count: default_segment_count(),
            system_architecture: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub vertical_name: String,
    pub regions: Vec<String>,
    #[serde(default)]
    pub options: RunOptions,
}

impl RunRequest {
    pub fn new(vertical_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            vertical_name: vertical_name.into(),
            regions: vec![region.into()],
            options: RunOptions::default(),
        }
    }

    pub fn multi_region<I, S>(vertical_name: impl Into<String>, regions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vertical_name: vertical_name.into(),
            regions: regions.into_iter().map(Into::into).collect(),
            options: RunOptions {
                multi_region: true,
                ..RunOptions::default()
            },
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Checks that do not depend on which providers are configured
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::InvalidConfiguration(msg));

        if self.vertical_name.trim().is_empty() {
            return invalid("vertical name must not be empty".to_string());
        }

        if self.regions.is_empty() {
            return invalid("at least one region is required".to_string());
        }

        let mut seen = BTreeSet::new();
        for region in &self.regions {
            if region.trim().is_empty() {
                return invalid("region names must not be empty".to_string());
            }
            if !seen.insert(region.trim().to_lowercase()) {
                return invalid(format!("region '{}' is listed twice", region));
            }
        }

        if self.options.segment_count == 0 {
            return invalid("segment count K must be at least 1".to_string());
        }

        if self.regions.len() > 1 && !self.options.multi_region {
            return invalid(format!(
                "{} regions given but multi_region is disabled",
                self.regions.len()
            ));
        }

        if let Some(company) = &self.options.validate_company {
            company.validate()?;
        }

        Ok(())
    }
}

//
// ================= Final Report =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub segment: Arc<Segment>,
    pub positioning: Arc<PositioningRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub report_id: Uuid,
    pub vertical: Arc<Vertical>,
    /// One market per requested region, in request order
    pub markets: Vec<Arc<GeographicMarket>>,
    /// Full merged segment list in rank order
    pub ranked_segments: Vec<Arc<Segment>>,
    /// Positioned top-K segments in rank order
    pub entries: Vec<ReportEntry>,
    /// One assessment per ranked segment, in rank order; empty without a company profile
    #[serde(default)]
    pub company_fit: Vec<CompanyFitAssessment>,
    pub retrieval_used: bool,
    pub stage_trace: Vec<StageRecord>,
    pub disclaimer: String,
    pub generated_at: DateTime<Utc>,
}

impl FinalReport {
    pub fn top_entry(&self) -> Option<&ReportEntry> {
        self.entries.first()
    }

    pub fn company_fit_for(&self, segment_id: Uuid) -> Option<&CompanyFitAssessment> {
        self.company_fit.iter().find(|f| f.segment_ref.id == segment_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation_rejects_bad_input() {
        assert!(RunRequest::new("Smart Agriculture", "Finland").validate().is_ok());

        let cases = vec![
            RunRequest::new("  ", "Finland"),
            RunRequest::multi_region("Smart Agriculture", Vec::<String>::new()),
            RunRequest::new("Smart Agriculture", ""),
            RunRequest::multi_region("Smart Agriculture", ["Finland", "finland"]),
            RunRequest::new("Smart Agriculture", "Finland").with_options(RunOptions {
                segment_count: 0,
                ..RunOptions::default()
            }),
            RunRequest {
                vertical_name: "Smart Agriculture".to_string(),
                regions: vec!["Finland".to_string(), "Sweden".to_string()],
                options: RunOptions::default(),
            },
        ];

        for request in cases {
            assert!(matches!(
                request.validate(),
                Err(PipelineError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn test_company_readiness_bounds() {
        let mut company = CompanyCapabilities::default();
        company.layer_readiness.insert(TechnologyLayer::Cloud, 4);
        assert!(company.validate().is_ok());
        assert!(company.supports(TechnologyLayer::Cloud, 3));
        assert!(!company.supports(TechnologyLayer::Device, 3));

        company.layer_readiness.insert(TechnologyLayer::Device, 9);
        assert!(company.validate().is_err());
    }

    #[test]
    fn test_company_variable_fit_bounds_and_levels() {
        let mut company = CompanyCapabilities::default();
        company.variable_fit.insert(MarketVariable::Profitability, 5);
        assert!(company.validate().is_ok());

        company.variable_fit.insert(MarketVariable::RegulatoryFit, 0);
        assert!(company.validate().is_err());

        assert_eq!(FitLevel::from_rating(5), FitLevel::Strong);
        assert_eq!(FitLevel::from_rating(3), FitLevel::Moderate);
        assert_eq!(FitLevel::from_rating(2), FitLevel::Weak);
        assert_eq!(FitLevel::from_score(0.6), FitLevel::Moderate);
    }

    #[test]
    fn test_profile_without_variable_fit_still_parses() {
        let company: CompanyCapabilities =
            serde_json::from_str(r#"{"layer_readiness": {"cloud": 4}}"#).unwrap();
        assert!(company.variable_fit.is_empty());
        assert_eq!(company.readiness(TechnologyLayer::Cloud), 4);
    }

    #[test]
    fn test_strategy_layers() {
        assert_eq!(PositioningStrategy::EndToEnd.layers().len(), 4);
        assert_eq!(
            PositioningStrategy::CrossCutting(Capability::IdentitySecurity).layers(),
            BTreeSet::from([TechnologyLayer::CrossCutting])
        );
    }

    #[test]
    fn test_strategy_serializes_with_kind_tag() {
        let json = serde_json::to_value(PositioningStrategy::SingleLayer(TechnologyLayer::Cloud))
            .unwrap();
        assert_eq!(json["kind"], "single_layer");
        assert_eq!(json["value"], "cloud");
    }
}
