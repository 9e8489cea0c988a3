//! Run configuration from the environment

use crate::agents::{AgentSet, PositioningPolicy, ScoringPolicy};
use crate::error::PipelineError;
use crate::execution::RetryPolicy;
use crate::models::{CompanyCapabilities, RunOptions, RunRequest};
use crate::taxonomy::MarketVariable;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_VERTICAL: &str = "Smart Cities";
const DEFAULT_REGION: &str = "Finland";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub vertical: String,
    pub regions: Vec<String>,
    pub use_rag: bool,
    pub multi_region: bool,
    pub segment_count: usize,
    pub rag_dir: PathBuf,
    pub rag_top_k: usize,
    pub company_profile: Option<PathBuf>,
    pub system_architecture: Option<String>,
    pub scoring: ScoringPolicy,
    pub positioning: PositioningPolicy,
    pub retry: RetryPolicy,
    pub output_dir: PathBuf,
    pub port: u16,
}

impl PipelineConfig {
    /// Load `.env` (if any) and read the process environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let vertical = get("VERTICAL").unwrap_or_else(|| DEFAULT_VERTICAL.to_string());
        let regions: Vec<String> = get("REGIONS")
            .or_else(|| get("REGION"))
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();

        let multi_region = match get("MULTI_REGION") {
            Some(value) => parse_bool("MULTI_REGION", &value)?,
            None => regions.len() > 1,
        };
        let use_rag = match get("USE_RAG") {
            Some(value) => parse_bool("USE_RAG", &value)?,
            None => false,
        };

        let segment_count: i64 = parse_or("SEGMENT_COUNT", get("SEGMENT_COUNT"), 1)?;
        if segment_count <= 0 {
            return Err(PipelineError::InvalidConfiguration(format!(
                "SEGMENT_COUNT must be at least 1, got {}",
                segment_count
            )));
        }

        let scoring = match get("SCORING_WEIGHTS") {
            Some(value) => parse_weights(&value)?,
            None => ScoringPolicy::default(),
        };
        scoring.validate()?;

        let positioning = PositioningPolicy {
            single_layer_threshold: parse_or(
                "SINGLE_LAYER_THRESHOLD",
                get("SINGLE_LAYER_THRESHOLD"),
                PositioningPolicy::default().single_layer_threshold,
            )?,
            min_readiness: parse_or(
                "MIN_LAYER_READINESS",
                get("MIN_LAYER_READINESS"),
                PositioningPolicy::default().min_readiness,
            )?,
            ..PositioningPolicy::default()
        };
        positioning.validate()?;

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: parse_or("PROVIDER_MAX_ATTEMPTS", get("PROVIDER_MAX_ATTEMPTS"), defaults.max_attempts)?,
            backoff_base: Duration::from_millis(parse_or(
                "PROVIDER_BACKOFF_MS",
                get("PROVIDER_BACKOFF_MS"),
                defaults.backoff_base.as_millis() as u64,
            )?),
            provider_timeout: Duration::from_secs(parse_or(
                "PROVIDER_TIMEOUT_SECS",
                get("PROVIDER_TIMEOUT_SECS"),
                defaults.provider_timeout.as_secs(),
            )?),
        };
        retry.validate()?;

        let rag_top_k: usize = parse_or("RAG_TOP_K", get("RAG_TOP_K"), 5)?;
        if rag_top_k == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "RAG_TOP_K must be at least 1".to_string(),
            ));
        }

        let port: u16 = match get("PORT").or_else(|| get("API_PORT")) {
            Some(value) => parse_value("PORT", &value)?,
            None => 8080,
        };

        Ok(Self {
            vertical,
            regions,
            use_rag,
            multi_region,
            segment_count: segment_count as usize,
            rag_dir: get("RAG_DIR").unwrap_or_else(|| "RAG".to_string()).into(),
            rag_top_k,
            company_profile: get("COMPANY_PROFILE").map(PathBuf::from),
            system_architecture: get("SYSTEM_ARCHITECTURE"),
            scoring,
            positioning,
            retry,
            output_dir: get("OUTPUT_DIR").unwrap_or_else(|| "outputs".to_string()).into(),
            port,
        })
    }

    /// Read and check the company profile, if one is configured
    pub fn load_company(&self) -> Result<Option<CompanyCapabilities>> {
        let Some(path) = &self.company_profile else {
            return Ok(None);
        };

        let raw = std::fs::read_to_string(path)?;
        let company: CompanyCapabilities = serde_json::from_str(&raw)?;
        company.validate()?;
        Ok(Some(company))
    }

    pub fn to_request(&self, company: Option<CompanyCapabilities>) -> RunRequest {
        RunRequest {
            vertical_name: self.vertical.clone(),
            regions: self.regions.clone(),
            options: RunOptions {
                use_rag: self.use_rag,
                multi_region: self.multi_region,
                validate_company: company,
                segment_count: self.segment_count,
                system_architecture: self.system_architecture.clone(),
            },
        }
    }

    pub fn agent_set(&self) -> Result<AgentSet> {
        AgentSet::with_policies(self.scoring.clone(), self.positioning.clone())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(PipelineError::InvalidConfiguration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        PipelineError::InvalidConfiguration(format!("{} has an invalid value '{}'", key, value))
    })
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T> {
    match value {
        Some(value) => parse_value(key, &value),
        None => Ok(default),
    }
}

/// "profitability=2, competitive_intensity=0.5"; unnamed variables keep weight 1
fn parse_weights(value: &str) -> Result<ScoringPolicy> {
    let mut policy = ScoringPolicy::default();

    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (key, weight) = pair.split_once('=').ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!(
                "SCORING_WEIGHTS entry '{}' is not variable=weight",
                pair
            ))
        })?;
        let variable = MarketVariable::from_key(key).ok_or_else(|| {
            PipelineError::InvalidConfiguration(format!("unknown market variable '{}'", key.trim()))
        })?;
        policy = policy.with_weight(variable, parse_value("SCORING_WEIGHTS", weight.trim())?);
    }

    Ok(policy)
}
