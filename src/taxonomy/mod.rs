//! Static reference data shared by every stage
//!
//! - `MarketVariable`: the closed set of 7 analytic dimensions segments are scored on
//! - `TechnologyLayer` / `Capability`: the layered IoT architecture used for positioning

pub mod layers;
pub mod variables;

pub use layers::{map_requirement, Capability, TechnologyLayer};
pub use variables::{MarketVariable, Polarity};

/// Whole-word containment check on already-lowercased text.
///
/// `"ai"` matches `"ai-driven analytics"` but not `"maintenance"`.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }

    haystack.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_term_respects_word_boundaries() {
        assert!(contains_term("ai-driven analytics", "ai"));
        assert!(contains_term("edge ai", "ai"));
        assert!(!contains_term("predictive maintenance", "ai"));
        assert!(contains_term("nb-iot modules", "nb-iot"));
        assert!(!contains_term("anything", ""));
    }
}
