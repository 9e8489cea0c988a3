//! Layered positioning
//!
//! The segment's technology requirements are mapped onto the IoT layer
//! model, and the per-layer counts decide the strategy in this order:
//!
//! 1. nothing maps            → SingleLayer(fallback layer)
//! 2. all four layers hit     → EndToEnd
//! 3. cross-cutting strictly dominant → CrossCutting(most frequent capability)
//! 4. only one layer hit, or top layer share ≥ threshold → SingleLayer(top layer)
//! 5. otherwise               → MultiLayer(layers hit)
//!
//! Ties for the top layer go to layers the company's existing system
//! architecture already covers, then to layer order.
//!
//! Every segment gets exactly one strategy. A company profile can then shrink
//! the scope to what the company can deliver.

use super::{Agent, PositioningRequest};
use crate::error::PipelineError;
use crate::findings::{dedupe, split_list};
use crate::models::{
    CompanyCapabilities, Findings, PositioningRecommendation, PositioningStrategy, Segment, Stage,
};
use crate::providers::WebResearchProvider;
use crate::taxonomy::{map_requirement, Capability, MarketVariable, TechnologyLayer};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PositioningPolicy {
    /// Share of layer hits the top layer needs for a single-layer call
    pub single_layer_threshold: f64,
    /// Used when no requirement maps onto the model
    pub fallback_layer: TechnologyLayer,
    /// Company readiness (1..=5) at which a layer counts as supported
    pub min_readiness: u8,
}

impl Default for PositioningPolicy {
    fn default() -> Self {
        Self {
            single_layer_threshold: 0.75,
            fallback_layer: TechnologyLayer::Cloud,
            min_readiness: 3,
        }
    }
}

impl PositioningPolicy {
    pub fn validate(&self) -> Result<()> {
        let t = self.single_layer_threshold;
        if !t.is_finite() || t <= 0.0 || t > 1.0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "single layer threshold must be within (0, 1], got {}",
                t
            )));
        }
        if !(1..=5).contains(&self.min_readiness) {
            return Err(PipelineError::InvalidConfiguration(format!(
                "minimum layer readiness must be within 1..=5, got {}",
                self.min_readiness
            )));
        }
        Ok(())
    }
}

/// How a requirement set spreads over the layer model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerProfile {
    /// Requirements touching each layer (a requirement can touch several)
    pub layer_counts: BTreeMap<TechnologyLayer, usize>,
    pub capability_counts: BTreeMap<Capability, usize>,
    pub mapped: usize,
    pub unmapped: usize,
}

impl LayerProfile {
    pub fn from_requirements<'a, I>(requirements: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut profile = LayerProfile::default();

        for requirement in requirements {
            let capabilities = map_requirement(requirement);
            if capabilities.is_empty() {
                profile.unmapped += 1;
                continue;
            }
            profile.mapped += 1;

            let layers: BTreeSet<TechnologyLayer> =
                capabilities.iter().map(|c| c.layer()).collect();
            for layer in layers {
                *profile.layer_counts.entry(layer).or_insert(0) += 1;
            }
            for capability in capabilities {
                *profile.capability_counts.entry(capability).or_insert(0) += 1;
            }
        }

        profile
    }

    pub fn count(&self, layer: TechnologyLayer) -> usize {
        self.layer_counts.get(&layer).copied().unwrap_or(0)
    }

    pub fn layers(&self) -> BTreeSet<TechnologyLayer> {
        self.layer_counts.keys().copied().collect()
    }

    /// Ties go to a preferred layer, then to layer order
    fn top_layer(&self, preferred: &BTreeSet<TechnologyLayer>) -> Option<(TechnologyLayer, usize)> {
        let mut best: Option<(TechnologyLayer, usize)> = None;
        for layer in TechnologyLayer::ALL {
            let n = self.count(layer);
            let wins = match best {
                None => n > 0,
                Some((current, m)) => {
                    n > m || (n == m && preferred.contains(&layer) && !preferred.contains(&current))
                }
            };
            if wins {
                best = Some((layer, n));
            }
        }
        best
    }

    /// Most frequent capability of `layer`; ties go to taxonomy order
    pub fn top_capability(&self, layer: TechnologyLayer) -> Option<Capability> {
        let mut best: Option<(Capability, usize)> = None;
        for capability in layer.capabilities() {
            let n = self.capability_counts.get(capability).copied().unwrap_or(0);
            if n > 0 && best.map_or(true, |(_, m)| n > m) {
                best = Some((*capability, n));
            }
        }
        best.map(|(capability, _)| capability)
    }
}

/// Layers named by a free-text system architecture description
pub fn architecture_layers(architecture: &str) -> BTreeSet<TechnologyLayer> {
    LayerProfile::from_requirements(&split_list(architecture)).layers()
}

pub fn classify(profile: &LayerProfile, policy: &PositioningPolicy) -> PositioningStrategy {
    classify_preferring(profile, policy, &BTreeSet::new())
}

pub fn classify_preferring(
    profile: &LayerProfile,
    policy: &PositioningPolicy,
    preferred: &BTreeSet<TechnologyLayer>,
) -> PositioningStrategy {
    let Some((top, top_count)) = profile.top_layer(preferred) else {
        return PositioningStrategy::SingleLayer(policy.fallback_layer);
    };

    if profile.layer_counts.len() == TechnologyLayer::ALL.len() {
        return PositioningStrategy::EndToEnd;
    }

    let cross_cutting = profile.count(TechnologyLayer::CrossCutting);
    let cross_cutting_dominates = cross_cutting > 0
        && TechnologyLayer::ALL
            .iter()
            .filter(|l| **l != TechnologyLayer::CrossCutting)
            .all(|l| profile.count(*l) < cross_cutting);
    if cross_cutting_dominates {
        if let Some(capability) = profile.top_capability(TechnologyLayer::CrossCutting) {
            return PositioningStrategy::CrossCutting(capability);
        }
    }

    // A multi-layer scope needs at least two layers whatever the threshold
    if profile.layer_counts.len() == 1 {
        return PositioningStrategy::SingleLayer(top);
    }

    let total: usize = profile.layer_counts.values().sum();
    if top_count as f64 / total as f64 >= policy.single_layer_threshold {
        return PositioningStrategy::SingleLayer(top);
    }

    PositioningStrategy::MultiLayer(profile.layers())
}

//
// ================= Company validation =================
//

#[derive(Debug, Clone, PartialEq)]
struct CompanyFit {
    strategy: PositioningStrategy,
    downgraded_from: Option<PositioningStrategy>,
    gaps: Vec<TechnologyLayer>,
}

fn single_scope(layer: TechnologyLayer, profile: &LayerProfile) -> PositioningStrategy {
    match layer {
        TechnologyLayer::CrossCutting => profile
            .top_capability(layer)
            .map(PositioningStrategy::CrossCutting)
            .unwrap_or(PositioningStrategy::SingleLayer(layer)),
        _ => PositioningStrategy::SingleLayer(layer),
    }
}

fn fit_to_company(
    strategy: PositioningStrategy,
    profile: &LayerProfile,
    company: &CompanyCapabilities,
    min_readiness: u8,
) -> CompanyFit {
    let required = strategy.layers();
    let gaps: Vec<TechnologyLayer> = required
        .iter()
        .copied()
        .filter(|l| !company.supports(*l, min_readiness))
        .collect();

    if gaps.is_empty() {
        return CompanyFit {
            strategy,
            downgraded_from: None,
            gaps,
        };
    }

    let replacement = match &strategy {
        PositioningStrategy::EndToEnd | PositioningStrategy::MultiLayer(_) => {
            let kept: BTreeSet<TechnologyLayer> = required
                .iter()
                .copied()
                .filter(|l| company.supports(*l, min_readiness))
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.into_iter().next().map(|l| single_scope(l, profile)),
                _ => Some(PositioningStrategy::MultiLayer(kept)),
            }
        }
        PositioningStrategy::SingleLayer(_) | PositioningStrategy::CrossCutting(_) => {
            let mut implicated = profile.layers();
            implicated.extend(required.iter().copied());

            let mut best: Option<(TechnologyLayer, u8)> = None;
            for layer in implicated {
                let readiness = company.readiness(layer);
                if readiness >= min_readiness && best.map_or(true, |(_, r)| readiness > r) {
                    best = Some((layer, readiness));
                }
            }
            best.map(|(layer, _)| single_scope(layer, profile))
        }
    };

    match replacement {
        Some(downgraded) => CompanyFit {
            strategy: downgraded,
            downgraded_from: Some(strategy),
            gaps,
        },
        None => CompanyFit {
            strategy,
            downgraded_from: None,
            gaps,
        },
    }
}

//
// ================= Agent =================
//

pub struct PositioningAgent {
    policy: PositioningPolicy,
}

impl Default for PositioningAgent {
    fn default() -> Self {
        Self {
            policy: PositioningPolicy::default(),
        }
    }
}

impl PositioningAgent {
    pub fn new(policy: PositioningPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self { policy })
    }

    fn query(segment: &Segment) -> String {
        format!(
            "IoT solution providers for {} ({} in {}): which technology layers they \
             cover (device, connectivity, cloud, security and integration) and where gaps remain",
            segment.name,
            segment.vertical_name(),
            segment.region()
        )
    }

    /// Deterministic part of the stage: same request, same strategy
    pub fn recommend(&self, input: &PositioningRequest, findings: &Findings) -> PositioningRecommendation {
        let segment = input.segment.as_ref();
        let profile = LayerProfile::from_requirements(&segment.technology_requirements);
        let existing = input
            .architecture
            .as_deref()
            .map(architecture_layers)
            .unwrap_or_default();
        let proposed = classify_preferring(&profile, &self.policy, &existing);

        let fit = match &input.company {
            Some(company) => fit_to_company(proposed, &profile, company, self.policy.min_readiness),
            None => CompanyFit {
                strategy: proposed,
                downgraded_from: None,
                gaps: Vec::new(),
            },
        };

        let justification = self.justify(segment, &profile, &fit, &existing, input.context.len());

        let citations = dedupe(
            findings
                .sources
                .iter()
                .map(|s| s.citation())
                .chain(input.context.iter().map(|c| c.source_id.clone()))
                .collect(),
        );

        PositioningRecommendation {
            id: Uuid::new_v4(),
            segment_ref: segment.reference(),
            strategy: fit.strategy,
            justification,
            citations,
            downgraded_from: fit.downgraded_from,
            is_synthetic: true,
            created_at: Utc::now(),
        }
    }

    fn justify(
        &self,
        segment: &Segment,
        profile: &LayerProfile,
        fit: &CompanyFit,
        existing: &BTreeSet<TechnologyLayer>,
        passages: usize,
    ) -> String {
        let mut parts = Vec::new();

        if profile.layer_counts.is_empty() {
            parts.push(format!(
                "None of the {} technology requirements maps onto a specific layer; defaulting to {}.",
                segment.technology_requirements.len(),
                self.policy.fallback_layer
            ));
        } else {
            let spread: Vec<String> = profile
                .layer_counts
                .iter()
                .map(|(layer, n)| format!("{} ({})", layer, n))
                .collect();
            parts.push(format!(
                "{} of {} technology requirements map to: {}.",
                profile.mapped,
                profile.mapped + profile.unmapped,
                spread.join(", ")
            ));
        }

        parts.push(format!("Recommended scope: {}.", fit.strategy));

        if !existing.is_empty() {
            let covered: Vec<&str> = existing.iter().map(|l| l.label()).collect();
            parts.push(format!("Existing architecture covers: {}.", covered.join(", ")));
        }

        let mut strongest: Vec<(MarketVariable, f64)> = segment
            .characteristics
            .iter()
            .map(|(variable, value)| (*variable, value.score))
            .collect();
        strongest.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if !strongest.is_empty() {
            let named: Vec<String> = strongest
                .iter()
                .take(2)
                .map(|(variable, score)| format!("{} ({:.2})", variable, score))
                .collect();
            parts.push(format!("Strongest market variables: {}.", named.join(", ")));
        }

        if passages > 0 {
            parts.push(format!("{} retrieved context passages considered.", passages));
        }

        if let Some(original) = &fit.downgraded_from {
            parts.push(format!(
                "Scope reduced from {} to match delivery readiness.",
                original
            ));
        } else if !fit.gaps.is_empty() {
            let gaps: Vec<&str> = fit.gaps.iter().map(|l| l.label()).collect();
            parts.push(format!(
                "Delivery readiness gap on: {}; no supported alternative scope.",
                gaps.join(", ")
            ));
        }

        parts.join(" ")
    }
}

#[async_trait]
impl Agent<PositioningRequest, PositioningRecommendation> for PositioningAgent {
    fn name(&self) -> &'static str {
        "positioning"
    }

    fn stage(&self) -> Stage {
        Stage::Positioning
    }

    async fn analyze(
        &self,
        input: &PositioningRequest,
        web: &dyn WebResearchProvider,
    ) -> Result<PositioningRecommendation> {
        let findings = web.query(&Self::query(&input.segment)).await?;
        let recommendation = self.recommend(input, &findings);

        info!(
            segment = %input.segment.name,
            region = %input.segment.region(),
            strategy = %recommendation.strategy,
            downgraded = recommendation.downgraded_from.is_some(),
            "Positioning recommended"
        );

        Ok(recommendation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MarketRef, RagContextChunk, VariableValue, VerticalRef};
    use crate::providers::StaticWebResearch;
    use std::sync::Arc;

    fn profile(requirements: &[&str]) -> LayerProfile {
        let owned: Vec<String> = requirements.iter().map(|r| r.to_string()).collect();
        LayerProfile::from_requirements(&owned)
    }

    fn segment(requirements: &[&str]) -> Arc<Segment> {
        let characteristics = MarketVariable::ALL
            .into_iter()
            .map(|v| {
                let score = if v == MarketVariable::Profitability { 0.75 } else { 0.5 };
                (
                    v,
                    VariableValue {
                        score,
                        rationale: String::new(),
                        is_synthetic: true,
                    },
                )
            })
            .collect();

        Arc::new(Segment {
            id: Uuid::new_v4(),
            name: "Large dairy farms".into(),
            vertical_ref: VerticalRef {
                id: Uuid::new_v4(),
                name: "Smart Agriculture".into(),
            },
            market_ref: MarketRef {
                id: Uuid::new_v4(),
                region: "Finland".into(),
            },
            characteristics,
            technology_requirements: requirements.iter().map(|r| r.to_string()).collect(),
            priority_score: 0.54,
            is_synthetic: true,
            created_at: Utc::now(),
        })
    }

    fn request(requirements: &[&str], company: Option<CompanyCapabilities>) -> PositioningRequest {
        PositioningRequest {
            segment: segment(requirements),
            context: Vec::new(),
            company,
            architecture: None,
        }
    }

    fn company(readiness: [(TechnologyLayer, u8); 4]) -> CompanyCapabilities {
        CompanyCapabilities {
            layer_readiness: readiness.into_iter().collect(),
            ..Default::default()
        }
    }

    const DEVICE_HEAVY: [&str; 4] = [
        "Soil moisture sensors",
        "Edge gateways",
        "Firmware updates",
        "Cloud dashboard",
    ];

    const FULL_STACK: [&str; 4] = [
        "Soil sensors",
        "NB-IoT connectivity",
        "Analytics platform",
        "ERP integration",
    ];

    #[test]
    fn test_no_mapped_requirement_falls_back() {
        let policy = PositioningPolicy::default();
        assert_eq!(
            classify(&profile(&[]), &policy),
            PositioningStrategy::SingleLayer(TechnologyLayer::Cloud)
        );
        assert_eq!(
            classify(&profile(&["Farmer training"]), &policy),
            PositioningStrategy::SingleLayer(TechnologyLayer::Cloud)
        );
    }

    #[test]
    fn test_all_four_layers_is_end_to_end() {
        assert_eq!(
            classify(&profile(&FULL_STACK), &PositioningPolicy::default()),
            PositioningStrategy::EndToEnd
        );
    }

    #[test]
    fn test_dominant_security_is_cross_cutting() {
        let p = profile(&["Data encryption", "Identity management", "GDPR compliance", "Cloud platform"]);
        assert_eq!(
            classify(&p, &PositioningPolicy::default()),
            PositioningStrategy::CrossCutting(Capability::IdentitySecurity)
        );
    }

    #[test]
    fn test_threshold_separates_single_from_multi() {
        let policy = PositioningPolicy::default();
        assert_eq!(
            classify(&profile(&DEVICE_HEAVY), &policy),
            PositioningStrategy::SingleLayer(TechnologyLayer::Device)
        );

        let spread = profile(&["Soil moisture sensors", "LoRaWAN network", "Cloud dashboard"]);
        assert_eq!(
            classify(&spread, &policy),
            PositioningStrategy::MultiLayer(BTreeSet::from([
                TechnologyLayer::Device,
                TechnologyLayer::Connectivity,
                TechnologyLayer::Cloud,
            ]))
        );

        let strict = PositioningPolicy {
            single_layer_threshold: 0.9,
            ..PositioningPolicy::default()
        };
        assert!(matches!(
            classify(&profile(&DEVICE_HEAVY), &strict),
            PositioningStrategy::MultiLayer(_)
        ));
    }

    #[test]
    fn test_classification_is_total_over_requirement_subsets() {
        let pool = [
            "Soil moisture sensors",
            "LoRaWAN network",
            "Cloud dashboard",
            "Data encryption",
            "ERP integration",
            "Weather data feeds",
            "Farmer training",
        ];
        let policy = PositioningPolicy::default();

        for mask in 0u32..(1 << pool.len()) {
            let subset: Vec<&str> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, r)| *r)
                .collect();
            let p = profile(&subset);

            let first = classify(&p, &policy);
            assert_eq!(first, classify(&p, &policy));
            if let PositioningStrategy::MultiLayer(layers) = &first {
                assert!((2..=3).contains(&layers.len()), "{:?}", subset);
            }
        }
    }

    #[test]
    fn test_policy_validation() {
        assert!(PositioningPolicy::default().validate().is_ok());
        let bad = PositioningPolicy {
            single_layer_threshold: 1.5,
            ..PositioningPolicy::default()
        };
        assert!(bad.validate().is_err());
        let bad = PositioningPolicy {
            min_readiness: 0,
            ..PositioningPolicy::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_agent_refuses_invalid_policy() {
        for threshold in [1.5, 0.0, f64::NAN] {
            let policy = PositioningPolicy {
                single_layer_threshold: threshold,
                ..PositioningPolicy::default()
            };
            assert!(matches!(
                PositioningAgent::new(policy),
                Err(PipelineError::InvalidConfiguration(_))
            ));
        }
        assert!(PositioningAgent::new(PositioningPolicy::default()).is_ok());
    }

    #[test]
    fn test_one_layer_is_never_multi_layer() {
        // classify stays total for an unvalidated policy
        let unreachable = PositioningPolicy {
            single_layer_threshold: 1.5,
            ..PositioningPolicy::default()
        };
        assert_eq!(
            classify(&profile(&["Soil moisture sensors"]), &unreachable),
            PositioningStrategy::SingleLayer(TechnologyLayer::Device)
        );
        assert_eq!(
            classify(&profile(&["Soil moisture sensors", "Edge gateways"]), &unreachable),
            PositioningStrategy::SingleLayer(TechnologyLayer::Device)
        );
    }

    #[test]
    fn test_architecture_breaks_top_layer_ties() {
        let tied = PositioningPolicy {
            single_layer_threshold: 0.5,
            ..PositioningPolicy::default()
        };
        let p = profile(&["Soil moisture sensors", "Cloud dashboard"]);

        assert_eq!(
            classify(&p, &tied),
            PositioningStrategy::SingleLayer(TechnologyLayer::Device)
        );
        assert_eq!(
            classify_preferring(&p, &tied, &architecture_layers("AWS cloud platform, analytics")),
            PositioningStrategy::SingleLayer(TechnologyLayer::Cloud)
        );
    }

    #[test]
    fn test_architecture_is_named_in_justification() {
        let mut input = request(&DEVICE_HEAVY, None);
        input.architecture = Some("Cloud platform; LoRaWAN network".into());

        let rec = PositioningAgent::default().recommend(&input, &Findings::default());

        assert_eq!(rec.strategy, PositioningStrategy::SingleLayer(TechnologyLayer::Device));
        assert!(rec
            .justification
            .contains("Existing architecture covers: Connectivity Layer, IoT Cloud Layer."));
    }

    #[test]
    fn test_end_to_end_shrinks_to_supported_layers() {
        use TechnologyLayer::*;
        let agent = PositioningAgent::default();
        let profile_company = company([(Device, 5), (Connectivity, 2), (Cloud, 4), (CrossCutting, 1)]);

        let rec = agent.recommend(&request(&FULL_STACK, Some(profile_company)), &Findings::default());

        assert_eq!(
            rec.strategy,
            PositioningStrategy::MultiLayer(BTreeSet::from([Device, Cloud]))
        );
        assert_eq!(rec.downgraded_from, Some(PositioningStrategy::EndToEnd));
        assert!(rec.justification.contains("Scope reduced"));
    }

    #[test]
    fn test_unsupported_single_layer_moves_to_best_supported_layer() {
        use TechnologyLayer::*;
        let agent = PositioningAgent::default();
        let weak_devices = company([(Device, 1), (Connectivity, 3), (Cloud, 5), (CrossCutting, 3)]);

        let rec = agent.recommend(&request(&DEVICE_HEAVY, Some(weak_devices)), &Findings::default());

        assert_eq!(rec.strategy, PositioningStrategy::SingleLayer(Cloud));
        assert_eq!(rec.downgraded_from, Some(PositioningStrategy::SingleLayer(Device)));
    }

    #[test]
    fn test_nothing_supported_keeps_strategy_and_names_gap() {
        use TechnologyLayer::*;
        let agent = PositioningAgent::default();
        let beginner = company([(Device, 1), (Connectivity, 1), (Cloud, 2), (CrossCutting, 1)]);

        let rec = agent.recommend(&request(&DEVICE_HEAVY, Some(beginner)), &Findings::default());

        assert_eq!(rec.strategy, PositioningStrategy::SingleLayer(Device));
        assert_eq!(rec.downgraded_from, None);
        assert!(rec.justification.contains("gap"));
    }

    #[test]
    fn test_supported_strategy_is_untouched() {
        use TechnologyLayer::*;
        let agent = PositioningAgent::default();
        let strong = company([(Device, 5), (Connectivity, 5), (Cloud, 5), (CrossCutting, 5)]);

        let rec = agent.recommend(&request(&FULL_STACK, Some(strong)), &Findings::default());

        assert_eq!(rec.strategy, PositioningStrategy::EndToEnd);
        assert_eq!(rec.downgraded_from, None);
    }

    #[tokio::test]
    async fn test_analyze_cites_web_sources_and_passages() {
        let web = StaticWebResearch::new().with_fallback(
            Findings::new("Vendors cover sensing and cloud").with_source("Vendor landscape", None),
        );
        let mut input = request(&DEVICE_HEAVY, None);
        input.context = vec![RagContextChunk {
            source_id: "finland.md#2".into(),
            text: "Dairy farms adopt robots".into(),
            relevance_score: 0.8,
        }];

        let rec = PositioningAgent::default()
            .analyze(&input, &web)
            .await
            .unwrap();

        assert_eq!(rec.citations, vec!["Vendor landscape", "finland.md#2"]);
        assert_eq!(rec.segment_ref.region, "Finland");
        assert!(rec.justification.contains("1 retrieved context passages"));
        assert!(rec.justification.contains("Profitability potential (0.75)"));
        assert!(rec.is_synthetic);
    }
}
