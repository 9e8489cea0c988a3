//! Provider seams for external knowledge
//!
//! Agents only talk to the outside world through these two traits:
//! - `WebResearchProvider`: free-text query → `Findings`
//! - `RetrievalContextProvider`: query → ranked `RagContextChunk`s
//!
//! Transient failures surface as `PipelineError::ProviderUnavailable`;
//! retry and timeout belong to the stage runner, not to providers.

pub mod retrieval;
pub mod web;

pub use retrieval::DocumentIndex;
pub use web::{web_provider_from_env, HttpWebResearchProvider};

use crate::error::PipelineError;
use crate::models::{Findings, RagContextChunk};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[async_trait]
pub trait WebResearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn query(&self, query: &str) -> Result<Findings>;
}

#[async_trait]
pub trait RetrievalContextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// At most `top_k` chunks, highest relevance first
    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<RagContextChunk>>;
}

//
// ================= In-memory providers =================
//

/// Canned findings keyed by query substring.
///
/// Used by tests and offline runs. Rules are checked in insertion order;
/// queries that match nothing get the fallback (empty findings by default).
#[derive(Default)]
pub struct StaticWebResearch {
    rules: Vec<(String, Findings)>,
    fallback: Findings,
    failures: Mutex<VecDeque<PipelineError>>,
    calls: AtomicUsize,
}

impl StaticWebResearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any query containing `needle` (case-insensitive) with `findings`
    pub fn with_rule(mut self, needle: &str, findings: Findings) -> Self {
        self.rules.push((needle.to_lowercase(), findings));
        self
    }

    pub fn with_fallback(mut self, findings: Findings) -> Self {
        self.fallback = findings;
        self
    }

    /// Fail the next queries, one queued error per call, before answering normally
    pub fn failing_first(self, errors: impl IntoIterator<Item = PipelineError>) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.extend(errors);
        }
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebResearchProvider for StaticWebResearch {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn query(&self, query: &str) -> Result<Findings> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let queued = self.failures.lock().ok().and_then(|mut f| f.pop_front());
        if let Some(err) = queued {
            return Err(err);
        }

        let lowered = query.to_lowercase();
        let findings = self
            .rules
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, findings)| findings.clone())
            .unwrap_or_else(|| self.fallback.clone());

        Ok(findings)
    }
}

/// Fixed passages returned for every query
#[derive(Default)]
pub struct StaticRetrieval {
    chunks: Vec<RagContextChunk>,
    calls: AtomicUsize,
}

impl StaticRetrieval {
    pub fn new(chunks: Vec<RagContextChunk>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalContextProvider for StaticRetrieval {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn query(&self, _query: &str, top_k: usize) -> Result<Vec<RagContextChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut chunks = self.chunks.clone();
        chunks.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        chunks.truncate(top_k);
        Ok(chunks)
    }
}
