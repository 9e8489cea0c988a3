//! Verification engine for assembled reports
//!
//! Rules-based checks run on every FinalReport before it is released.
//! Deterministic; a failing rule at Medium severity or above blocks release.

use crate::agents::compare_segments;
use crate::models::FinalReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Reported, never blocks
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn rank(&self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    fn blocks_release(&self) -> bool {
        *self >= Severity::Medium
    }
}

impl PartialOrd for Severity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Severity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// What the run asked for, to check the report against
#[derive(Debug, Clone)]
pub struct VerificationContext {
    pub regions: Vec<String>,
    /// Sum of per-region segment counts before the merge
    pub expected_segment_count: usize,
    pub segment_count: usize,
}

pub struct RuleOutcome {
    pub passed: bool,
    pub details: String,
}

pub trait VerificationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn severity(&self) -> Severity;

    fn verify(&self, report: &FinalReport, context: &VerificationContext) -> RuleOutcome;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCheck {
    pub rule_name: String,
    pub severity: Severity,
    pub passed: bool,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub checks: Vec<RuleCheck>,
    /// Failed rules that block release
    pub issues: Vec<String>,
    /// Failed rules that are only advisory
    pub warnings: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

pub struct VerificationEngine {
    rules: Vec<Box<dyn VerificationRule>>,
}

impl VerificationEngine {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn VerificationRule>) {
        self.rules.push(rule);
    }

    pub fn verify(&self, report: &FinalReport, context: &VerificationContext) -> VerificationResult {
        let mut checks = Vec::with_capacity(self.rules.len());
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        for rule in &self.rules {
            let outcome = rule.verify(report, context);

            if !outcome.passed {
                let line = format!("{}: {}", rule.name(), outcome.details);
                if rule.severity().blocks_release() {
                    issues.push(line);
                } else {
                    warnings.push(line);
                }
            }

            checks.push(RuleCheck {
                rule_name: rule.name().to_string(),
                severity: rule.severity(),
                passed: outcome.passed,
                details: outcome.details,
            });
        }

        let verified = issues.is_empty();

        if warnings.is_empty() {
            info!(report_id = %report.report_id, rule_count = self.rules.len(), verified, "Verification completed");
        } else {
            warn!(report_id = %report.report_id, verified, ?warnings, "Verification completed with warnings");
        }

        VerificationResult {
            verified,
            checks,
            issues,
            warnings,
            verified_at: Utc::now(),
        }
    }
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= Rules =================
//

pub struct NonEmptySegmentsRule;

impl VerificationRule for NonEmptySegmentsRule {
    fn name(&self) -> &'static str {
        "non_empty_segments"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn verify(&self, report: &FinalReport, _context: &VerificationContext) -> RuleOutcome {
        RuleOutcome {
            passed: !report.ranked_segments.is_empty() && !report.entries.is_empty(),
            details: format!(
                "{} ranked segments, {} positioned",
                report.ranked_segments.len(),
                report.entries.len()
            ),
        }
    }
}

pub struct RankingOrderRule;

impl VerificationRule for RankingOrderRule {
    fn name(&self) -> &'static str {
        "ranking_order"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn verify(&self, report: &FinalReport, _context: &VerificationContext) -> RuleOutcome {
        let out_of_order = report
            .ranked_segments
            .windows(2)
            .position(|pair| compare_segments(&pair[0], &pair[1]) == Ordering::Greater);

        RuleOutcome {
            passed: out_of_order.is_none(),
            details: match out_of_order {
                Some(i) => format!("segments at rank {} and {} are out of order", i + 1, i + 2),
                None => "ranked by priority score, region, vertical".to_string(),
            },
        }
    }
}

pub struct MergeCompletenessRule;

impl VerificationRule for MergeCompletenessRule {
    fn name(&self) -> &'static str {
        "merge_completeness"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn verify(&self, report: &FinalReport, context: &VerificationContext) -> RuleOutcome {
        RuleOutcome {
            passed: report.ranked_segments.len() == context.expected_segment_count,
            details: format!(
                "merged {} of {} per-region segments",
                report.ranked_segments.len(),
                context.expected_segment_count
            ),
        }
    }
}

/// Every generated artifact must carry the synthetic marker
pub struct SyntheticMarkerRule;

impl VerificationRule for SyntheticMarkerRule {
    fn name(&self) -> &'static str {
        "synthetic_markers"
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn verify(&self, report: &FinalReport, _context: &VerificationContext) -> RuleOutcome {
        let mut unmarked = Vec::new();

        if !report.vertical.is_synthetic {
            unmarked.push(format!("vertical '{}'", report.vertical.name));
        }
        for market in report.markets.iter().filter(|m| !m.is_synthetic) {
            unmarked.push(format!("market '{}'", market.region));
        }
        for segment in &report.ranked_segments {
            if !segment.is_synthetic || segment.characteristics.values().any(|v| !v.is_synthetic) {
                unmarked.push(format!("segment '{}'", segment.name));
            }
        }
        for entry in report.entries.iter().filter(|e| !e.positioning.is_synthetic) {
            unmarked.push(format!("positioning for '{}'", entry.segment.name));
        }

        RuleOutcome {
            passed: unmarked.is_empty(),
            details: if unmarked.is_empty() {
                "all generated values marked synthetic".to_string()
            } else {
                format!("unmarked: {}", unmarked.join(", "))
            },
        }
    }
}

/// Exactly the top min(K, n) segments are positioned, in rank order
pub struct PositioningCoverageRule;

impl VerificationRule for PositioningCoverageRule {
    fn name(&self) -> &'static str {
        "positioning_coverage"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn verify(&self, report: &FinalReport, context: &VerificationContext) -> RuleOutcome {
        let expected = context.segment_count.min(report.ranked_segments.len());

        let aligned = report
            .entries
            .iter()
            .zip(&report.ranked_segments)
            .all(|(entry, ranked)| {
                entry.segment.id == ranked.id && entry.positioning.segment_ref.id == ranked.id
            });

        RuleOutcome {
            passed: report.entries.len() == expected && aligned,
            details: format!(
                "{} positioned of {} expected{}",
                report.entries.len(),
                expected,
                if aligned { "" } else { ", not in rank order" }
            ),
        }
    }
}

/// One market per requested region, and every segment points at one of them
pub struct MarketCoverageRule;

impl VerificationRule for MarketCoverageRule {
    fn name(&self) -> &'static str {
        "market_coverage"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn verify(&self, report: &FinalReport, context: &VerificationContext) -> RuleOutcome {
        let regions: Vec<&str> = report.markets.iter().map(|m| m.region.as_str()).collect();
        let requested: Vec<&str> = context.regions.iter().map(|r| r.trim()).collect();
        let market_ids: HashSet<_> = report.markets.iter().map(|m| m.id).collect();
        let orphans = report
            .ranked_segments
            .iter()
            .filter(|s| !market_ids.contains(&s.market_ref.id))
            .count();

        RuleOutcome {
            passed: regions == requested && orphans == 0,
            details: format!(
                "markets [{}] for regions [{}], {} orphan segments",
                regions.join(", "),
                requested.join(", "),
                orphans
            ),
        }
    }
}

/// Company fit is either absent or given for every ranked segment, in rank order
pub struct CompanyFitCoverageRule;

impl VerificationRule for CompanyFitCoverageRule {
    fn name(&self) -> &'static str {
        "company_fit_coverage"
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn verify(&self, report: &FinalReport, _context: &VerificationContext) -> RuleOutcome {
        if report.company_fit.is_empty() {
            return RuleOutcome {
                passed: true,
                details: "no company profile given".to_string(),
            };
        }

        let aligned = report.company_fit.len() == report.ranked_segments.len()
            && report
                .company_fit
                .iter()
                .zip(&report.ranked_segments)
                .all(|(fit, segment)| fit.segment_ref.id == segment.id);

        RuleOutcome {
            passed: aligned,
            details: format!(
                "{} fit assessments for {} ranked segments",
                report.company_fit.len(),
                report.ranked_segments.len()
            ),
        }
    }
}

/// Advisory: the providers returned little or nothing
pub struct SparseFindingsRule;

impl VerificationRule for SparseFindingsRule {
    fn name(&self) -> &'static str {
        "sparse_findings"
    }

    fn severity(&self) -> Severity {
        Severity::Low
    }

    fn verify(&self, report: &FinalReport, _context: &VerificationContext) -> RuleOutcome {
        let empty_markets: Vec<&str> = report
            .markets
            .iter()
            .filter(|m| !m.has_content())
            .map(|m| m.region.as_str())
            .collect();
        let vertical_ok = report.vertical.has_content();

        RuleOutcome {
            passed: vertical_ok && empty_markets.is_empty(),
            details: match (vertical_ok, empty_markets.is_empty()) {
                (true, true) => "findings present for every artifact".to_string(),
                (false, _) => "vertical profile has no findings".to_string(),
                (true, false) => format!("no market findings for {}", empty_markets.join(", ")),
            },
        }
    }
}

/// Create a default verification engine with the standard report rules
pub fn create_default_verification_engine() -> VerificationEngine {
    let mut engine = VerificationEngine::new();
    engine.add_rule(Box::new(NonEmptySegmentsRule));
    engine.add_rule(Box::new(RankingOrderRule));
    engine.add_rule(Box::new(MergeCompletenessRule));
    engine.add_rule(Box::new(SyntheticMarkerRule));
    engine.add_rule(Box::new(PositioningCoverageRule));
    engine.add_rule(Box::new(MarketCoverageRule));
    engine.add_rule(Box::new(CompanyFitCoverageRule));
    engine.add_rule(Box::new(SparseFindingsRule));
    engine
}

//
// ================= Tests =================
//
