//! Segment synthesis and ranking
//!
//! Ranking order: `priority_score` descending, then region, vertical name and
//! segment name ascending. The score is a weighted mean of the 7 normalized
//! market variables.

use super::{Agent, SegmentRequest};
use crate::error::PipelineError;
use crate::findings::{parse_score, split_list, FindingsDocument};
use crate::models::{GeographicMarket, Segment, Stage, VariableValue, Vertical};
use crate::providers::WebResearchProvider;
use crate::taxonomy::MarketVariable;
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Score used for a variable the findings say nothing about
pub const NEUTRAL_SCORE: f64 = 0.5;

const REQUIREMENT_KEYS: [&str; 4] = ["technolog", "layer", "requirement", "tech stack"];

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringPolicy {
    weights: BTreeMap<MarketVariable, f64>,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights: MarketVariable::ALL.into_iter().map(|v| (v, 1.0)).collect(),
        }
    }
}

impl ScoringPolicy {
    pub fn with_weight(mut self, variable: MarketVariable, weight: f64) -> Self {
        self.weights.insert(variable, weight);
        self
    }

    pub fn weight(&self, variable: MarketVariable) -> f64 {
        self.weights.get(&variable).copied().unwrap_or(1.0)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((variable, weight)) = self
            .weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(PipelineError::InvalidConfiguration(format!(
                "weight for {} must be a finite non-negative number, got {}",
                variable.key(),
                weight
            )));
        }

        let total: f64 = MarketVariable::ALL.iter().map(|v| self.weight(*v)).sum();
        if total <= 0.0 {
            return Err(PipelineError::InvalidConfiguration(
                "at least one scoring weight must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Weighted mean over all 7 variables; a missing variable counts as neutral
    pub fn aggregate(&self, characteristics: &BTreeMap<MarketVariable, VariableValue>) -> f64 {
        let (weighted, total) = MarketVariable::ALL.iter().fold((0.0, 0.0), |(sum, total), v| {
            let weight = self.weight(*v);
            let score = characteristics
                .get(v)
                .map(|value| value.score)
                .unwrap_or(NEUTRAL_SCORE);
            (sum + weight * score, total + weight)
        });

        if total > 0.0 {
            weighted / total
        } else {
            NEUTRAL_SCORE
        }
    }
}

pub fn compare_segments(a: &Segment, b: &Segment) -> Ordering {
    b.priority_score
        .total_cmp(&a.priority_score)
        .then_with(|| a.region().cmp(b.region()))
        .then_with(|| a.vertical_name().cmp(b.vertical_name()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort in place into rank order
pub fn rank_segments<T: Borrow<Segment>>(segments: &mut [T]) {
    segments.sort_by(|a, b| compare_segments(a.borrow(), b.borrow()));
}

pub struct SegmentSynthesisAgent {
    policy: ScoringPolicy,
}

impl Default for SegmentSynthesisAgent {
    fn default() -> Self {
        Self {
            policy: ScoringPolicy::default(),
        }
    }
}

impl SegmentSynthesisAgent {
    /// Rejects weights that would make `priority_score` meaningless
    pub fn new(policy: ScoringPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    fn query(vertical_name: &str, region: &str) -> String {
        let variables: Vec<&str> = MarketVariable::ALL.iter().map(|v| v.label()).collect();
        format!(
            "Market segments for IoT {} in {}. For each segment rate 1-5: {}; \
             and list its technology requirements",
            vertical_name,
            region,
            variables.join(", ")
        )
    }

    fn build_segment(
        &self,
        name: String,
        fields: &[(String, String)],
        vertical: &Vertical,
        market: &GeographicMarket,
    ) -> Segment {
        let mut characteristics = BTreeMap::new();
        let mut requirements: BTreeSet<String> = vertical.technology_requirements.clone();

        for (key, value) in fields {
            match MarketVariable::from_label(key) {
                Some(variable) => {
                    if characteristics.contains_key(&variable) {
                        continue;
                    }
                    let score = parse_score(value)
                        .map(|(raw, scale)| variable.normalize(raw, scale))
                        .unwrap_or(NEUTRAL_SCORE);
                    characteristics.insert(
                        variable,
                        VariableValue {
                            score,
                            rationale: value.clone(),
                            is_synthetic: true,
                        },
                    );
                }
                None => {
                    let key = key.to_lowercase();
                    if REQUIREMENT_KEYS.iter().any(|k| key.contains(k)) {
                        requirements.extend(split_list(value));
                    }
                }
            }
        }

        for variable in MarketVariable::ALL {
            characteristics.entry(variable).or_insert_with(|| VariableValue {
                score: NEUTRAL_SCORE,
                rationale: "No data in findings; neutral default".to_string(),
                is_synthetic: true,
            });
        }

        let priority_score = self.policy.aggregate(&characteristics);

        Segment {
            id: Uuid::new_v4(),
            name,
            vertical_ref: vertical.reference(),
            market_ref: market.reference(),
            characteristics,
            technology_requirements: requirements,
            priority_score,
            is_synthetic: true,
            created_at: Utc::now(),
        }
    }
}

/// "Segment 2: Greenhouses" → "Greenhouses"
fn segment_name(heading: &str, index: usize) -> String {
    let name = match heading.split_once(':') {
        Some((_, rest)) => rest.trim().to_string(),
        None => heading
            .get("segment".len()..)
            .unwrap_or_default()
            .trim_start_matches(|c: char| c.is_ascii_digit() || " -–—.#)".contains(c))
            .trim()
            .to_string(),
    };

    if name.is_empty() {
        format!("Segment {}", index + 1)
    } else {
        name
    }
}

#[async_trait]
impl Agent<SegmentRequest, Vec<Segment>> for SegmentSynthesisAgent {
    fn name(&self) -> &'static str {
        "segment_synthesis"
    }

    fn stage(&self) -> Stage {
        Stage::SegmentSynthesis
    }

    async fn analyze(&self, input: &SegmentRequest, web: &dyn WebResearchProvider) -> Result<Vec<Segment>> {
        let vertical = input.vertical.as_ref();
        let market = input.market.as_ref();

        let findings = web.query(&Self::query(&vertical.name, &market.region)).await?;
        let doc = FindingsDocument::parse(&findings.text);
        // "Segment 1: ..." but not "Segmentation" or "Segments"
        let blocks: Vec<_> = doc
            .blocks("segment")
            .into_iter()
            .filter(|b| {
                b.heading
                    .get("segment".len()..)
                    .and_then(|rest| rest.chars().next())
                    .map_or(true, |c| !c.is_alphabetic())
            })
            .collect();

        let mut segments: Vec<Segment> = if blocks.is_empty() {
            debug!(region = %market.region, "No segment blocks in findings, using baseline segment");
            let fields: Vec<(String, String)> = doc
                .sections()
                .iter()
                .flat_map(|s| s.fields.iter().cloned())
                .collect();
            let name = format!("{} — {}", vertical.name, market.region);
            vec![self.build_segment(name, &fields, vertical, market)]
        } else {
            blocks
                .iter()
                .enumerate()
                .map(|(i, block)| {
                    self.build_segment(segment_name(&block.heading, i), &block.fields, vertical, market)
                })
                .collect()
        };

        rank_segments(&mut segments);

        info!(
            region = %market.region,
            segments = segments.len(),
            top_score = segments.first().map(|s| s.priority_score),
            "Segments synthesized"
        );

        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Findings, MarketRef, VerticalRef};
    use crate::providers::StaticWebResearch;
    use std::sync::Arc;

    fn vertical() -> Arc<Vertical> {
        Arc::new(Vertical {
            id: Uuid::new_v4(),
            name: "Smart Agriculture".into(),
            use_cases: vec![],
            technology_requirements: BTreeSet::from(["Soil moisture sensors".to_string()]),
            trends: vec![],
            barriers: vec![],
            sources: vec![],
            is_synthetic: true,
            created_at: Utc::now(),
        })
    }

    fn market(vertical: &Vertical, region: &str) -> Arc<GeographicMarket> {
        Arc::new(GeographicMarket {
            id: Uuid::new_v4(),
            region: region.into(),
            vertical_ref: vertical.reference(),
            market_size_estimate: None,
            growth_estimate: None,
            regulatory_factors: vec![],
            competitors: vec![],
            sources: vec![],
            is_synthetic: true,
            created_at: Utc::now(),
        })
    }

    fn bare_segment(name: &str, region: &str, vertical: &str, score: f64) -> Segment {
        Segment {
            id: Uuid::new_v4(),
            name: name.into(),
            vertical_ref: VerticalRef {
                id: Uuid::nil(),
                name: vertical.into(),
            },
            market_ref: MarketRef {
                id: Uuid::nil(),
                region: region.into(),
            },
            characteristics: BTreeMap::new(),
            technology_requirements: BTreeSet::new(),
            priority_score: score,
            is_synthetic: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ranking_ties_break_on_region_then_vertical() {
        let mut segments = vec![
            bare_segment("a", "Sweden", "Smart Cities", 0.6),
            bare_segment("b", "Finland", "Smart Cities", 0.6),
            bare_segment("c", "Finland", "Smart Agriculture", 0.6),
            bare_segment("d", "Norway", "Smart Cities", 0.9),
        ];

        rank_segments(&mut segments);

        let names: Vec<_> = segments.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn test_aggregate_is_weighted_mean() {
        let mut characteristics = BTreeMap::new();
        characteristics.insert(
            MarketVariable::MarketSizeGrowth,
            VariableValue {
                score: 1.0,
                rationale: String::new(),
                is_synthetic: true,
            },
        );

        // six neutral variables plus one at 1.0
        let unweighted = ScoringPolicy::default().aggregate(&characteristics);
        assert!((unweighted - 4.0 / 7.0).abs() < 1e-9);

        let weighted = ScoringPolicy::default()
            .with_weight(MarketVariable::MarketSizeGrowth, 6.0)
            .aggregate(&characteristics);
        assert!((weighted - 9.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_policy_validation() {
        assert!(ScoringPolicy::default().validate().is_ok());
        assert!(ScoringPolicy::default()
            .with_weight(MarketVariable::Profitability, -1.0)
            .validate()
            .is_err());

        let all_zero = MarketVariable::ALL
            .into_iter()
            .fold(ScoringPolicy::default(), |p, v| p.with_weight(v, 0.0));
        assert!(all_zero.validate().is_err());
    }

    #[test]
    fn test_agent_refuses_invalid_weights() {
        let negative = ScoringPolicy::default().with_weight(MarketVariable::Profitability, -3.0);
        assert!(matches!(
            SegmentSynthesisAgent::new(negative),
            Err(PipelineError::InvalidConfiguration(_))
        ));

        let nan = ScoringPolicy::default().with_weight(MarketVariable::RegulatoryFit, f64::NAN);
        assert!(SegmentSynthesisAgent::new(nan).is_err());
        assert!(SegmentSynthesisAgent::new(ScoringPolicy::default()).is_ok());
    }

    #[test]
    fn test_segment_name_extraction() {
        assert_eq!(segment_name("Segment 1: Large dairy farms", 0), "Large dairy farms");
        assert_eq!(segment_name("Segment 2 - Greenhouses", 1), "Greenhouses");
        assert_eq!(segment_name("Segment #3) Urban farms", 2), "Urban farms");
        assert_eq!(segment_name("Segment 4", 3), "Segment 4");
    }

    #[tokio::test]
    async fn test_blocks_become_ranked_segments() {
        let web = StaticWebResearch::new().with_fallback(Findings::new(
            "### Segment 1: Greenhouses\n\
             - Market size and growth: 2/5 niche\n\
             - Competitive intensity: 5/5 crowded\n\
             ### Segment 2: Large dairy farms\n\
             - Market size and growth: 5/5 consolidated herds\n\
             - Competitive intensity: 1/5 few vendors\n\
             - Technology: milking robots, herd analytics\n",
        ));
        let vertical = vertical();
        let request = SegmentRequest {
            market: market(&vertical, "Finland"),
            vertical,
        };

        let segments = SegmentSynthesisAgent::default()
            .analyze(&request, &web)
            .await
            .unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "Large dairy farms");
        assert!(segments[0].priority_score > segments[1].priority_score);
        assert_eq!(segments[0].characteristics.len(), 7);
        assert_eq!(
            segments[0].characteristics[&MarketVariable::CompetitiveIntensity].score,
            1.0
        );
        assert!(segments[0].technology_requirements.contains("herd analytics"));
        assert!(segments[0].technology_requirements.contains("Soil moisture sensors"));
        assert!(segments.iter().all(|s| s.is_synthetic));
    }

    #[tokio::test]
    async fn test_no_findings_yield_one_neutral_baseline_segment() {
        let web = StaticWebResearch::new();
        let vertical = vertical();
        let request = SegmentRequest {
            market: market(&vertical, "Finland"),
            vertical,
        };

        let segments = SegmentSynthesisAgent::default()
            .analyze(&request, &web)
            .await
            .unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].name, "Smart Agriculture — Finland");
        assert_eq!(segments[0].priority_score, NEUTRAL_SCORE);
        assert!(segments[0]
            .characteristics
            .values()
            .all(|v| v.is_synthetic && v.score == NEUTRAL_SCORE));
    }
}
