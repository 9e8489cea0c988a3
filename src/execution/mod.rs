//! Stage execution with bounded retry
//!
//! Every provider-backed stage runs through `StageRunner`, which applies the
//! per-attempt timeout, retries transient failures with exponential backoff,
//! and records one `StageRecord` per stage invocation.
//! Agents never retry on their own.

use crate::error::PipelineError;
use crate::models::Stage;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on attempts, whatever the configuration says
const MAX_ATTEMPTS_CAP: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub provider_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            provider_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(2u32.pow(exponent))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_CAP {
            return Err(PipelineError::InvalidConfiguration(format!(
                "max attempts must be within 1..={}, got {}",
                MAX_ATTEMPTS_CAP, self.max_attempts
            )));
        }
        if self.provider_timeout.is_zero() {
            return Err(PipelineError::InvalidConfiguration(
                "provider timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
}

/// Trace entry for one stage invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub record_id: Uuid,
    pub stage: Stage,
    /// Region or segment the invocation was scoped to
    pub scope: Option<String>,
    pub attempts: u32,
    pub elapsed_ms: u64,
    pub status: StageStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Runs stage operations under a `RetryPolicy`.
///
/// Cheap to clone; clones share the same trace so concurrent region tasks
/// all report into one run.
#[derive(Clone)]
pub struct StageRunner {
    policy: RetryPolicy,
    trace: Arc<Mutex<Vec<StageRecord>>>,
}

impl StageRunner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Any terminal failure comes back as `PipelineStageFailed` naming `stage`.
    pub async fn run<T, F, Fut>(&self, stage: Stage, scope: Option<&str>, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut attempts = 0;

        debug!(%stage, scope = ?scope, "Starting stage");

        let outcome = loop {
            attempts += 1;

            let result = match tokio::time::timeout(self.policy.provider_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(PipelineError::ProviderUnavailable(format!(
                    "no response within {:?}",
                    self.policy.provider_timeout
                ))),
            };

            match result {
                Ok(value) => break Ok(value),
                Err(e) if e.is_transient() && attempts < self.policy.max_attempts => {
                    let delay = self.policy.backoff_for(attempts);
                    warn!(
                        %stage,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient stage failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => break Err(e),
            }
        };

        let record = StageRecord {
            record_id: Uuid::new_v4(),
            stage,
            scope: scope.map(str::to_string),
            attempts,
            elapsed_ms: start.elapsed().as_millis() as u64,
            status: if outcome.is_ok() {
                StageStatus::Succeeded
            } else {
                StageStatus::Failed
            },
            error: outcome.as_ref().err().map(|e| e.to_string()),
            started_at,
        };
        self.trace.lock().await.push(record);

        outcome.map_err(|cause| {
            warn!(%stage, attempts, error = %cause, "Stage failed");
            PipelineError::PipelineStageFailed {
                stage,
                cause: Box::new(cause),
            }
        })
    }

    /// Records so far, in completion order
    pub async fn trace(&self) -> Vec<StageRecord> {
        self.trace.lock().await.clone()
    }
}
