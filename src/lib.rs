//! IoT Market Segmentation Orchestrator
//!
//! Runs a fixed chain of research agents to produce a market-segmentation and
//! technology-positioning report for an IoT vertical:
//! - Profiles the vertical, then each geographic market
//! - Synthesizes and ranks segments on the seven market variables
//! - Recommends a positioning scope on the layered IoT model for the top segments
//! - Optionally grounds positioning in passages from a local document index
//! - Verifies the assembled report before release and records it for audit
//!
//! PIPELINE:
//! VERTICAL → GEO (per region) → SEGMENTS → RANK → [RETRIEVE] → POSITION → VERIFY

pub mod agents;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod execution;
pub mod findings;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod report;
pub mod taxonomy;
pub mod verification;

pub use error::{PipelineError, Result};

// Re-export common types
pub use config::PipelineConfig;
pub use models::*;
pub use orchestrator::PipelineOrchestrator;
pub use providers::{RetrievalContextProvider, WebResearchProvider};
