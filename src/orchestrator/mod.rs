//! Pipeline orchestrator
//!
//! VERTICAL → (per region: GEO → SEGMENTS) → RANK → [RETRIEVE] → POSITION → VERIFY → RECORD
//!
//! Stages run strictly in that order. Regions fan out as independent tasks
//! and are joined before ranking. Any stage that exhausts its retries aborts
//! the whole run; a report is only returned once it is complete and verified.

use crate::agents::{
    rank_segments, Agent, AgentSet, GeoRequest, PositioningRequest, SegmentRequest, VerticalRequest,
};
use crate::audit::{AuditLog, RunRecord};
use crate::error::PipelineError;
use crate::execution::{RetryPolicy, StageRunner};
use crate::models::{
    FinalReport, GeographicMarket, ReportEntry, RunRequest, Segment, Stage, Vertical, DISCLAIMER,
};
use crate::providers::{RetrievalContextProvider, WebResearchProvider};
use crate::verification::{create_default_verification_engine, VerificationContext, VerificationEngine};
use crate::Result;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_RETRIEVAL_TOP_K: usize = 5;

/// What one region contributes before the merge barrier
struct RegionOutcome {
    market: Arc<GeographicMarket>,
    segments: Vec<Segment>,
}

async fn run_agent<I, O>(
    runner: &StageRunner,
    agent: &dyn Agent<I, O>,
    input: &I,
    web: &dyn WebResearchProvider,
    scope: Option<&str>,
) -> Result<O>
where
    I: Send + Sync,
    O: Send,
{
    runner
        .run(agent.stage(), scope, || agent.analyze(input, web))
        .await
}

async fn analyze_region(
    runner: StageRunner,
    agents: AgentSet,
    web: Arc<dyn WebResearchProvider>,
    vertical: Arc<Vertical>,
    region: String,
) -> Result<RegionOutcome> {
    let geo_request = GeoRequest {
        vertical: vertical.clone(),
        region: region.clone(),
    };
    let market = Arc::new(
        run_agent(&runner, agents.geo.as_ref(), &geo_request, web.as_ref(), Some(&region)).await?,
    );

    let segment_request = SegmentRequest {
        vertical,
        market: market.clone(),
    };
    let segments = run_agent(
        &runner,
        agents.segment.as_ref(),
        &segment_request,
        web.as_ref(),
        Some(&region),
    )
    .await?;

    info!(region = %region, segments = segments.len(), "Region analysed");

    Ok(RegionOutcome { market, segments })
}

pub struct PipelineOrchestrator {
    web: Arc<dyn WebResearchProvider>,
    retrieval: Option<Arc<dyn RetrievalContextProvider>>,
    agents: AgentSet,
    retry_policy: RetryPolicy,
    verification: VerificationEngine,
    audit_log: AuditLog,
    retrieval_top_k: usize,
}

impl PipelineOrchestrator {
    pub fn new(web: Arc<dyn WebResearchProvider>) -> Self {
        Self {
            web,
            retrieval: None,
            agents: AgentSet::default(),
            retry_policy: RetryPolicy::default(),
            verification: create_default_verification_engine(),
            audit_log: AuditLog::new(),
            retrieval_top_k: DEFAULT_RETRIEVAL_TOP_K,
        }
    }

    pub fn with_retrieval(mut self, retrieval: Arc<dyn RetrievalContextProvider>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    pub fn with_agents(mut self, agents: AgentSet) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_verification(mut self, engine: VerificationEngine) -> Self {
        self.verification = engine;
        self
    }

    pub fn with_audit_log(mut self, audit_log: AuditLog) -> Self {
        self.audit_log = audit_log;
        self
    }

    pub fn with_retrieval_top_k(mut self, top_k: usize) -> Self {
        self.retrieval_top_k = top_k;
        self
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }

    fn validate(&self, request: &RunRequest) -> Result<()> {
        request.validate()?;
        self.retry_policy.validate()?;

        if request.options.use_rag && self.retrieval_top_k == 0 {
            return Err(PipelineError::InvalidConfiguration(
                "retrieval top_k must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Run the pipeline once; either a complete verified report or one error
    pub async fn run(&self, request: RunRequest) -> Result<FinalReport> {
        let start_time = Instant::now();
        self.validate(&request)?;

        let options = &request.options;
        let runner = StageRunner::new(self.retry_policy.clone());

        let retrieval = match (&self.retrieval, options.use_rag) {
            (Some(retrieval), true) => Some(retrieval),
            (None, true) => {
                warn!("use_rag requested but no retrieval index is loaded; positioning without retrieved context");
                None
            }
            _ => None,
        };

        info!(
            vertical = %request.vertical_name,
            regions = ?request.regions,
            use_rag = options.use_rag,
            segment_count = options.segment_count,
            provider = self.web.name(),
            "Pipeline run started"
        );

        // === VERTICAL ===
        let vertical_request = VerticalRequest {
            vertical_name: request.vertical_name.trim().to_string(),
        };
        let vertical = Arc::new(
            run_agent(
                &runner,
                self.agents.vertical.as_ref(),
                &vertical_request,
                self.web.as_ref(),
                None,
            )
            .await?,
        );

        // === GEO + SEGMENTS (per region) ===
        let regions: Vec<String> = request.regions.iter().map(|r| r.trim().to_string()).collect();
        let outcomes = self.analyze_regions(&runner, &vertical, &regions).await?;

        // === MERGE + RANK ===
        let expected_segment_count: usize = outcomes.iter().map(|o| o.segments.len()).sum();
        let markets: Vec<Arc<GeographicMarket>> = outcomes.iter().map(|o| o.market.clone()).collect();
        let mut ranked: Vec<Arc<Segment>> = outcomes
            .into_iter()
            .flat_map(|o| o.segments.into_iter().map(Arc::new))
            .collect();
        rank_segments(&mut ranked);

        info!(
            segments = ranked.len(),
            top = ranked.first().map(|s| s.name.as_str()),
            "Segments merged and ranked"
        );

        // === RETRIEVE + POSITION (top K) ===
        let mut entries = Vec::with_capacity(options.segment_count.min(ranked.len()));
        for segment in ranked.iter().take(options.segment_count) {
            let context = match retrieval {
                Some(retrieval) => {
                    let query = format!("{} {}", segment.vertical_name(), segment.region());
                    let top_k = self.retrieval_top_k;
                    runner
                        .run(Stage::RetrievalContext, Some(segment.region()), || {
                            retrieval.query(&query, top_k)
                        })
                        .await?
                }
                None => Vec::new(),
            };

            let positioning_request = PositioningRequest {
                segment: segment.clone(),
                context,
                company: options.validate_company.clone(),
                architecture: options.system_architecture.clone(),
            };
            let positioning = run_agent(
                &runner,
                self.agents.positioning.as_ref(),
                &positioning_request,
                self.web.as_ref(),
                Some(&segment.name),
            )
            .await?;

            entries.push(ReportEntry {
                segment: segment.clone(),
                positioning: Arc::new(positioning),
            });
        }

        // === COMPANY FIT ===
        let company_fit = match &options.validate_company {
            Some(company) => ranked
                .iter()
                .map(|segment| self.agents.company.assess(segment, company))
                .collect(),
            None => Vec::new(),
        };

        // === ASSEMBLE + VERIFY ===
        let report = FinalReport {
            report_id: Uuid::new_v4(),
            vertical,
            markets,
            ranked_segments: ranked,
            entries,
            company_fit,
            retrieval_used: retrieval.is_some(),
            stage_trace: runner.trace().await,
            disclaimer: DISCLAIMER.to_string(),
            generated_at: Utc::now(),
        };

        let context = VerificationContext {
            regions,
            expected_segment_count,
            segment_count: options.segment_count,
        };
        let verification = self.verification.verify(&report, &context);
        if !verification.verified {
            warn!(report_id = %report.report_id, issues = ?verification.issues, "Report rejected");
            return Err(PipelineError::ReportRejected(verification.issues.join("; ")));
        }

        // === RECORD ===
        let report = Arc::new(report);
        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        let audit_id = self
            .audit_log
            .record(RunRecord::new(report.clone(), verification, execution_time_ms))
            .await?;

        info!(
            report_id = %report.report_id,
            audit_id = %audit_id,
            entries = report.entries.len(),
            elapsed_ms = execution_time_ms,
            "Pipeline run completed"
        );

        Ok(report.as_ref().clone())
    }

    /// Like `run`, but gives up with `Cancelled` as soon as `shutdown` resolves.
    /// In-flight region tasks and provider calls are dropped; nothing is recorded.
    pub async fn run_until<F>(&self, request: RunRequest, shutdown: F) -> Result<FinalReport>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(request) => result,
            _ = shutdown => {
                warn!("Shutdown requested, abandoning pipeline run");
                Err(PipelineError::Cancelled(
                    "shutdown requested before the report was complete".to_string(),
                ))
            }
        }
    }

    /// One region runs inline; several fan out and meet at a barrier.
    /// Results come back in request order regardless of completion order.
    async fn analyze_regions(
        &self,
        runner: &StageRunner,
        vertical: &Arc<Vertical>,
        regions: &[String],
    ) -> Result<Vec<RegionOutcome>> {
        if let [region] = regions {
            let outcome = analyze_region(
                runner.clone(),
                self.agents.clone(),
                self.web.clone(),
                vertical.clone(),
                region.clone(),
            )
            .await?;
            return Ok(vec![outcome]);
        }

        let mut set = JoinSet::new();
        for (index, region) in regions.iter().enumerate() {
            let task = analyze_region(
                runner.clone(),
                self.agents.clone(),
                self.web.clone(),
                vertical.clone(),
                region.clone(),
            );
            set.spawn(async move { (index, task.await) });
        }

        let mut collected: Vec<Option<RegionOutcome>> = regions.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(outcome))) => collected[index] = Some(outcome),
                Ok((_, Err(e))) => {
                    set.abort_all();
                    return Err(e);
                }
                Err(join_error) => {
                    set.abort_all();
                    return Err(PipelineError::TaskJoin(join_error.to_string()));
                }
            }
        }

        collected
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PipelineError::TaskJoin("a region task produced no result".to_string()))
    }
}
