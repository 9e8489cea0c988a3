//! Local document index for retrieval context
//!
//! A RAG directory holds the curated documents for one vertical/region pair.
//! Files are split into paragraphs and scored by term overlap with the query.
//! A missing or empty directory means "no index", which is not an error.

use super::RetrievalContextProvider;
use crate::error::PipelineError;
use crate::models::RagContextChunk;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

const INDEXED_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Paragraphs shorter than this carry no useful context
const MIN_CHUNK_CHARS: usize = 40;

const STOPWORDS: [&str; 12] = [
    "the", "and", "for", "with", "from", "that", "this", "are", "was", "into", "over", "its",
];

struct IndexedChunk {
    source_id: String,
    text: String,
    terms: HashSet<String>,
}

pub struct DocumentIndex {
    chunks: Vec<IndexedChunk>,
}

impl DocumentIndex {
    /// Index every document under `dir`; `None` when there is nothing to index.
    pub fn open(dir: &Path) -> Result<Option<Self>> {
        if !dir.is_dir() {
            info!(path = %dir.display(), "RAG directory not found, running without retrieval");
            return Ok(None);
        }

        let mut chunks = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| PipelineError::IoError(e.into()))?;
            let path = entry.path();

            let indexed = entry.file_type().is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| INDEXED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                    .unwrap_or(false);
            if !indexed {
                continue;
            }

            let content = std::fs::read_to_string(path)?;
            let relative = path
                .strip_prefix(dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            for (n, paragraph) in paragraphs(&content).into_iter().enumerate() {
                chunks.push(IndexedChunk {
                    source_id: format!("{}#{}", relative, n + 1),
                    terms: terms(&paragraph),
                    text: paragraph,
                });
            }
        }

        if chunks.is_empty() {
            info!(path = %dir.display(), "RAG directory is empty, running without retrieval");
            return Ok(None);
        }

        info!(path = %dir.display(), chunks = chunks.len(), "Indexed RAG documents");
        Ok(Some(Self { chunks }))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    fn search(&self, query: &str, top_k: usize) -> Vec<RagContextChunk> {
        let query_terms = terms(query);
        if query_terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<RagContextChunk> = self
            .chunks
            .iter()
            .filter_map(|chunk| {
                let overlap = query_terms.intersection(&chunk.terms).count();
                (overlap > 0).then(|| RagContextChunk {
                    source_id: chunk.source_id.clone(),
                    text: chunk.text.clone(),
                    relevance_score: overlap as f32 / query_terms.len() as f32,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl RetrievalContextProvider for DocumentIndex {
    fn name(&self) -> &'static str {
        "document_index"
    }

    async fn query(&self, query: &str, top_k: usize) -> Result<Vec<RagContextChunk>> {
        let results = self.search(query, top_k);
        debug!(query, hits = results.len(), "Retrieval query");
        Ok(results)
    }
}

fn paragraphs(content: &str) -> Vec<String> {
    content
        .split("\n\n")
        .map(|p| p.lines().map(str::trim).collect::<Vec<_>>().join(" "))
        .map(|p| p.trim().to_string())
        .filter(|p| p.len() >= MIN_CHUNK_CHARS)
        .collect()
}

fn terms(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}
