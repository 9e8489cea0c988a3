//! The canonical market variables
//!
//! The set is an enum on purpose: it cannot grow or shrink at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether a higher raw score makes a segment more or less attractive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Benefit,
    Cost,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketVariable {
    MarketSizeGrowth,
    Profitability,
    RegulatoryFit,
    CompetitiveIntensity,
    DigitalMaturity,
    CustomerConsolidation,
    TechnologicalReadiness,
}

impl MarketVariable {
    pub const ALL: [MarketVariable; 7] = [
        MarketVariable::MarketSizeGrowth,
        MarketVariable::Profitability,
        MarketVariable::RegulatoryFit,
        MarketVariable::CompetitiveIntensity,
        MarketVariable::DigitalMaturity,
        MarketVariable::CustomerConsolidation,
        MarketVariable::TechnologicalReadiness,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MarketVariable::MarketSizeGrowth => "Market size and growth rate",
            MarketVariable::Profitability => "Profitability potential",
            MarketVariable::RegulatoryFit => "Regulatory requirements and fit",
            MarketVariable::CompetitiveIntensity => "Competitive intensity",
            MarketVariable::DigitalMaturity => "Digital maturity",
            MarketVariable::CustomerConsolidation => "Customer consolidation",
            MarketVariable::TechnologicalReadiness => "Technological readiness",
        }
    }

    /// Stable identifier used in configuration (`SCORING_WEIGHTS`)
    pub fn key(&self) -> &'static str {
        match self {
            MarketVariable::MarketSizeGrowth => "market_size_growth",
            MarketVariable::Profitability => "profitability",
            MarketVariable::RegulatoryFit => "regulatory_fit",
            MarketVariable::CompetitiveIntensity => "competitive_intensity",
            MarketVariable::DigitalMaturity => "digital_maturity",
            MarketVariable::CustomerConsolidation => "customer_consolidation",
            MarketVariable::TechnologicalReadiness => "technological_readiness",
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            MarketVariable::CompetitiveIntensity => Polarity::Cost,
            _ => Polarity::Benefit,
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            MarketVariable::MarketSizeGrowth => {
                &["market size", "market growth", "growth rate", "market potential"]
            }
            MarketVariable::Profitability => &["profitability", "roi", "margin"],
            MarketVariable::RegulatoryFit => &["regulatory", "regulation", "compliance"],
            MarketVariable::CompetitiveIntensity => &["competitive", "competition", "rivalry"],
            MarketVariable::DigitalMaturity => &["digital maturity", "digital readiness"],
            MarketVariable::CustomerConsolidation => {
                &["customer consolidation", "consolidation", "purchasing"]
            }
            MarketVariable::TechnologicalReadiness => &[
                "technological readiness",
                "technology readiness",
                "technical readiness",
                "integrability",
            ],
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        Self::ALL.into_iter().find(|v| v.key() == key)
    }

    /// Match a free-text heading or field name against the variable aliases.
    pub fn from_label(text: &str) -> Option<Self> {
        let lowered = text.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|v| v.aliases().iter().any(|alias| lowered.contains(alias)))
    }

    /// Map a raw score on a `1..=scale` range onto an attractiveness value in `[0, 1]`.
    pub fn normalize(&self, raw: f64, scale: f64) -> f64 {
        let span = (scale - 1.0).max(f64::EPSILON);
        let value = ((raw - 1.0) / span).clamp(0.0, 1.0);

        match self.polarity() {
            Polarity::Benefit => value,
            Polarity::Cost => 1.0 - value,
        }
    }
}

impl fmt::Display for MarketVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
