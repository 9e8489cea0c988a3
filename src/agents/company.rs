//! Company-market fit
//!
//! Deterministic: checks each ranked segment against the private company
//! profile. The result carries levels and gaps only.

use super::positioning::{LayerProfile, PositioningPolicy};
use crate::models::{CompanyCapabilities, CompanyFitAssessment, FitLevel, LayerFit, Segment};
use crate::taxonomy::{MarketVariable, TechnologyLayer};
use std::collections::{BTreeMap, BTreeSet};

/// 1..=5 rating onto 0.0..=1.0
fn normalize_rating(rating: u8) -> f64 {
    (f64::from(rating.clamp(1, 5)) - 1.0) / 4.0
}

#[derive(Debug, Clone)]
pub struct CompanyFitAssessor {
    min_readiness: u8,
    fallback_layer: TechnologyLayer,
}

impl Default for CompanyFitAssessor {
    fn default() -> Self {
        Self::new(&PositioningPolicy::default())
    }
}

impl CompanyFitAssessor {
    pub fn new(policy: &PositioningPolicy) -> Self {
        Self {
            min_readiness: policy.min_readiness,
            fallback_layer: policy.fallback_layer,
        }
    }

    pub fn assess(&self, segment: &Segment, company: &CompanyCapabilities) -> CompanyFitAssessment {
        let mut required: BTreeSet<TechnologyLayer> =
            LayerProfile::from_requirements(&segment.technology_requirements).layers();
        if required.is_empty() {
            required.insert(self.fallback_layer);
        }

        let layers: Vec<LayerFit> = TechnologyLayer::ALL
            .into_iter()
            .map(|layer| LayerFit {
                layer,
                required: required.contains(&layer),
                supported: company.supports(layer, self.min_readiness),
            })
            .collect();
        let gaps: Vec<TechnologyLayer> = layers
            .iter()
            .filter(|l| l.required && !l.supported)
            .map(|l| l.layer)
            .collect();

        let layer_part = required
            .iter()
            .map(|l| normalize_rating(company.readiness(*l)))
            .sum::<f64>()
            / required.len() as f64;

        // Variables that make the segment attractive count for more
        let (weighted, weight) = company
            .variable_fit
            .iter()
            .map(|(variable, rating)| {
                let w = segment
                    .characteristics
                    .get(variable)
                    .map_or(0.5, |v| v.score);
                (w * normalize_rating(*rating), w)
            })
            .fold((0.0, 0.0), |(a, b), (x, w)| (a + x, b + w));

        let fit_score = if weight > 0.0 {
            (layer_part + weighted / weight) / 2.0
        } else {
            layer_part
        };

        let overall = if gaps.len() == required.len() {
            FitLevel::Weak
        } else if gaps.is_empty() {
            FitLevel::from_score(fit_score)
        } else {
            FitLevel::from_score(fit_score).min(FitLevel::Moderate)
        };

        CompanyFitAssessment {
            segment_ref: segment.reference(),
            layers,
            gaps,
            variable_fit: company
                .variable_fit
                .iter()
                .map(|(variable, rating)| (*variable, FitLevel::from_rating(*rating)))
                .collect::<BTreeMap<MarketVariable, FitLevel>>(),
            fit_score,
            overall,
        }
    }
}
