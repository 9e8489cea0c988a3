//! Error types for the market research pipeline

use crate::models::Stage;
use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {

    // =============================
    // Core Pipeline Errors
    // =============================

    /// Rejected before any stage runs
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transient provider failure (transport error, timeout, bad status)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Stage {stage} failed: {cause}")]
    PipelineStageFailed {
        stage: Stage,
        #[source]
        cause: Box<PipelineError>,
    },

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Report rejected by verification: {0}")]
    ReportRejected(String),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PipelineError {
    /// Only provider unavailability is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::ProviderUnavailable(_))
    }

    /// Stage that failed, if this is a stage failure.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineError::PipelineStageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_provider_errors_are_transient() {
        assert!(PipelineError::ProviderUnavailable("timeout".into()).is_transient());
        assert!(!PipelineError::InvalidConfiguration("empty".into()).is_transient());
        assert!(!PipelineError::Cancelled("shutdown".into()).is_transient());
    }

    #[test]
    fn test_stage_failure_display_names_stage_and_cause() {
        let err = PipelineError::PipelineStageFailed {
            stage: Stage::GeoSegmentation,
            cause: Box::new(PipelineError::ProviderUnavailable("503".into())),
        };

        assert_eq!(err.failed_stage(), Some(Stage::GeoSegmentation));
        assert_eq!(
            err.to_string(),
            "Stage geo_segmentation failed: Provider unavailable: 503"
        );
    }
}
