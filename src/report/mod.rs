//! Report rendering
//!
//! The pipeline emits a structured `FinalReport`; renderers turn it into
//! something a person or another service reads. Every generated value is
//! printed next to a synthetic marker.

use crate::findings::dedupe;
use crate::models::FinalReport;
use crate::taxonomy::MarketVariable;
use crate::Result;

const SYNTHETIC: &str = "(synthetic)";

pub trait ReportRenderer: Send + Sync {
    fn extension(&self) -> &'static str;

    fn render(&self, report: &FinalReport) -> Result<String>;
}

pub struct JsonRenderer;

impl ReportRenderer for JsonRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, report: &FinalReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }
}

pub struct MarkdownRenderer;

fn bullet_list(out: &mut String, title: &str, items: &[String]) {
    out.push_str(&format!("### {}\n\n", title));
    if items.is_empty() {
        out.push_str("_No findings._\n\n");
        return;
    }
    for item in items {
        out.push_str(&format!("- {}\n", item));
    }
    out.push('\n');
}

/// Provider text inside a table row must not open new columns or rows
fn escape_cell(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('|', "\\|")
        .replace(['\r', '\n'], " ")
}

fn joined_cell(items: &[String]) -> String {
    if items.is_empty() {
        "—".to_string()
    } else {
        escape_cell(&items.join("; "))
    }
}

fn marker(is_synthetic: bool) -> &'static str {
    if is_synthetic {
        SYNTHETIC
    } else {
        ""
    }
}

impl ReportRenderer for MarkdownRenderer {
    fn extension(&self) -> &'static str {
        "md"
    }

    fn render(&self, report: &FinalReport) -> Result<String> {
        let mut out = String::new();
        let vertical = &report.vertical;

        out.push_str(&format!("# IoT Market Segmentation Report: {}\n\n", vertical.name));
        out.push_str(&format!("> {}\n\n", report.disclaimer));
        out.push_str(&format!(
            "Report `{}` • generated {} • regions: {} • retrieval context: {}\n\n",
            report.report_id,
            report.generated_at.format("%Y-%m-%d %H:%M UTC"),
            report
                .markets
                .iter()
                .map(|m| m.region.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            if report.retrieval_used { "used" } else { "not used" }
        ));

        // ── Vertical ──
        out.push_str(&format!("## Vertical Profile {}\n\n", marker(vertical.is_synthetic)));
        bullet_list(&mut out, "Use Cases", &vertical.use_cases);
        let requirements: Vec<String> = vertical.technology_requirements.iter().cloned().collect();
        bullet_list(&mut out, "Technology Requirements", &requirements);
        bullet_list(&mut out, "Trends", &vertical.trends);
        bullet_list(&mut out, "Barriers", &vertical.barriers);

        // ── Markets ──
        out.push_str("## Geographic Markets\n\n");
        out.push_str("| Region | Market size (USD m) | Growth (%/yr) | Regulatory factors | Competitors | Data |\n");
        out.push_str("|--------|---------------------|---------------|--------------------|-------------|------|\n");
        for market in &report.markets {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} |\n",
                escape_cell(&market.region),
                market
                    .market_size_estimate
                    .map(|v| format!("{:.0}", v))
                    .unwrap_or_else(|| "—".into()),
                market
                    .growth_estimate
                    .map(|v| format!("{:.1}", v))
                    .unwrap_or_else(|| "—".into()),
                joined_cell(&market.regulatory_factors),
                joined_cell(&market.competitors),
                marker(market.is_synthetic),
            ));
        }
        out.push('\n');

        // ── Ranking ──
        let with_fit = !report.company_fit.is_empty();
        out.push_str("## Segment Ranking\n\n");
        out.push_str("| Rank | Segment | Region | Priority |");
        for variable in MarketVariable::ALL {
            out.push_str(&format!(" {} |", variable.label()));
        }
        if with_fit {
            out.push_str(" Company fit |");
        }
        out.push_str(" Data |\n|------|---------|--------|----------|");
        for _ in MarketVariable::ALL {
            out.push_str("---|");
        }
        if with_fit {
            out.push_str("---|");
        }
        out.push_str("------|\n");

        for (rank, segment) in report.ranked_segments.iter().enumerate() {
            out.push_str(&format!(
                "| {} | {} | {} | {:.2} |",
                rank + 1,
                escape_cell(&segment.name),
                escape_cell(segment.region()),
                segment.priority_score
            ));
            for variable in MarketVariable::ALL {
                let cell = segment
                    .characteristics
                    .get(&variable)
                    .map(|v| format!("{:.2}", v.score))
                    .unwrap_or_else(|| "—".into());
                out.push_str(&format!(" {} |", cell));
            }
            if with_fit {
                let cell = report
                    .company_fit_for(segment.id)
                    .map(|fit| format!("{} ({:.2})", fit.overall, fit.fit_score))
                    .unwrap_or_else(|| "—".into());
                out.push_str(&format!(" {} |", cell));
            }
            out.push_str(&format!(" {} |\n", marker(segment.is_synthetic)));
        }
        out.push('\n');

        // ── Company fit ──
        if with_fit {
            out.push_str("## Company Fit\n\n");
            for fit in &report.company_fit {
                out.push_str(&format!(
                    "- **{} ({})**: {} ({:.2})",
                    fit.segment_ref.name, fit.segment_ref.region, fit.overall, fit.fit_score
                ));
                if fit.gaps.is_empty() {
                    out.push_str("; no layer gaps");
                } else {
                    let gaps: Vec<&str> = fit.gaps.iter().map(|l| l.label()).collect();
                    out.push_str(&format!("; gaps: {}", gaps.join(", ")));
                }
                if !fit.variable_fit.is_empty() {
                    let variables: Vec<String> = fit
                        .variable_fit
                        .iter()
                        .map(|(variable, level)| format!("{} {}", variable.label(), level))
                        .collect();
                    out.push_str(&format!("; variable fit: {}", variables.join(", ")));
                }
                out.push('\n');
            }
            out.push('\n');
        }

        // ── Positioning ──
        out.push_str("## Positioning Recommendations\n\n");
        for (i, entry) in report.entries.iter().enumerate() {
            let positioning = &entry.positioning;
            out.push_str(&format!(
                "### {}. {} ({}) {}\n\n",
                i + 1,
                entry.segment.name,
                entry.segment.region(),
                marker(positioning.is_synthetic)
            ));
            out.push_str(&format!("**Strategy:** {}\n\n", positioning.strategy));
            if let Some(original) = &positioning.downgraded_from {
                out.push_str(&format!("**Reduced from:** {}\n\n", original));
            }
            out.push_str(&format!("{}\n\n", positioning.justification));
            if !positioning.citations.is_empty() {
                out.push_str("Citations:\n");
                for citation in &positioning.citations {
                    out.push_str(&format!("- {}\n", citation));
                }
                out.push('\n');
            }
        }

        // ── Sources ──
        let sources = dedupe(
            vertical
                .sources
                .iter()
                .chain(report.markets.iter().flat_map(|m| m.sources.iter()))
                .map(|s| s.citation())
                .collect(),
        );
        if !sources.is_empty() {
            out.push_str("## Sources\n\n");
            for source in sources {
                out.push_str(&format!("- {}\n", source));
            }
            out.push('\n');
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Source, DISCLAIMER};
    use crate::verification::tests::sample_report;
    use std::sync::Arc;

    #[test]
    fn test_markdown_carries_disclaimer_and_markers() {
        let (report, _) = sample_report();
        let markdown = MarkdownRenderer.render(&report).unwrap();

        assert!(markdown.starts_with("# IoT Market Segmentation Report: Smart Agriculture"));
        assert!(markdown.contains(DISCLAIMER));
        assert!(markdown.contains("## Vertical Profile (synthetic)"));
        assert!(markdown.contains("| 1 | Dairy | Finland | 0.80 |"));
        assert!(markdown.contains("| 2 | Greenhouses | Sweden | 0.60 |"));
        assert!(markdown.contains("**Strategy:** Single layer: IoT Cloud Layer"));
        assert!(markdown.contains("_No findings._"));
    }

    #[test]
    fn test_markdown_lists_sources_once() {
        let (mut report, _) = sample_report();
        let source = Source {
            title: "Eurostat".into(),
            url: Some("https://ec.europa.eu/eurostat".into()),
        };
        let mut vertical = (*report.vertical).clone();
        vertical.sources = vec![source.clone(), source];
        report.vertical = Arc::new(vertical);

        let markdown = MarkdownRenderer.render(&report).unwrap();
        assert_eq!(markdown.matches("- Eurostat (https://ec.europa.eu/eurostat)").count(), 1);
    }

    #[test]
    fn test_table_cells_escape_pipes_and_newlines() {
        let (mut report, _) = sample_report();
        let mut segment = (*report.ranked_segments[1]).clone();
        segment.name = "Dairy | Beef\nfarms".into();
        report.ranked_segments[1] = Arc::new(segment);

        let mut market = (*report.markets[0]).clone();
        market.competitors = vec!["Acme | Co".into()];
        report.markets[0] = Arc::new(market);

        let markdown = MarkdownRenderer.render(&report).unwrap();

        assert!(markdown.contains("| 2 | Dairy \\| Beef farms | Sweden | 0.60 |"));
        assert!(markdown.contains("| Acme \\| Co |"));

        // Every ranking row keeps the header's column count
        let columns = |line: &str| line.matches('|').count() - line.matches("\\|").count();
        let rows: Vec<&str> = markdown
            .lines()
            .skip_while(|l| !l.starts_with("| Rank"))
            .take_while(|l| l.starts_with('|'))
            .collect();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|row| columns(row) == columns(rows[0])));
    }

    #[test]
    fn test_company_fit_column_and_section() {
        use crate::agents::CompanyFitAssessor;
        use crate::models::CompanyCapabilities;
        use crate::taxonomy::TechnologyLayer;

        let (mut report, _) = sample_report();
        let markdown = MarkdownRenderer.render(&report).unwrap();
        assert!(!markdown.contains("Company fit"));

        let company = CompanyCapabilities {
            layer_readiness: [(TechnologyLayer::Cloud, 5)].into_iter().collect(),
            variable_fit: [(MarketVariable::Profitability, 3)].into_iter().collect(),
        };
        let assessor = CompanyFitAssessor::default();
        report.company_fit = report
            .ranked_segments
            .iter()
            .map(|s| assessor.assess(s, &company))
            .collect();

        let markdown = MarkdownRenderer.render(&report).unwrap();
        assert!(markdown.contains("| Company fit | Data |"));
        assert!(markdown.contains("## Company Fit"));
        assert!(markdown.contains("**Dairy (Finland)**"));
        assert!(markdown.contains("variable fit: Profitability potential Moderate"));
        assert!(!markdown.contains("readiness"));
    }

    #[test]
    fn test_json_round_trips_report_id() {
        let (report, _) = sample_report();
        let json = JsonRenderer.render(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["report_id"], report.report_id.to_string());
        assert_eq!(value["entries"][0]["positioning"]["strategy"]["kind"], "single_layer");
        assert_eq!(JsonRenderer.extension(), "json");
    }
}
