//! Orchestrator: wires sources, validation, semantic ranking, scoring and
//! selection into one run, and owns background execution.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use rivalscout_common::{
    BrandContext, Candidate, CompetitorUpsert, DiscoveryPolicy, OrchestrateRequest,
    OrchestrationRun, PersistPlan, PersistStats, Result, RivalScoutError, RunPhase, RunSummary,
    Shortlist,
};
use rivalscout_events::{DiagnosticEvent, EventCode, EventLevel, EventSink};

use crate::aggregator::CandidateAggregator;
use crate::evidence::EvidenceText;
use crate::job_state::{JobStateStore, MemoryJobStateStore};
use crate::lifecycle::RunLifecycleManager;
use crate::scoring::{Evaluation, ScoringEngine};
use crate::selection::SelectionPolicy;
use crate::semantic::{rank_with_deadline, SemanticCandidate, SemanticRanker, SemanticRequest};
use crate::sources::{CollectContext, DiscoverySources};
use crate::store::RunStore;
use crate::validation::{ValidationReport, ValidatorSet};

/// What a finished run hands back to its caller.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResult {
    pub run_id: Uuid,
    pub summary: RunSummary,
    /// Every evaluation of the run, in rank order.
    pub evaluations: Vec<Evaluation>,
    pub persist_stats: PersistStats,
}

impl OrchestrationResult {
    pub fn selected(&self) -> impl Iterator<Item = &Evaluation> {
        self.evaluations.iter().filter(|e| e.is_selected())
    }
}

/// Result of waiting on a run for a bounded time.
#[derive(Debug)]
pub enum DeadlineOutcome {
    Completed(OrchestrationResult),
    /// Still going in the background. Poll `shortlist` or the run row.
    Running { run_id: Uuid },
}

/// Handle to a run executing on the tokio runtime.
///
/// Dropping or detaching the handle does not cancel the run.
pub struct RunTask {
    run_id: Uuid,
    handle: Option<JoinHandle<Result<OrchestrationResult>>>,
}

impl RunTask {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Wait up to `deadline`. `None` means the run is still going.
    pub async fn wait(&mut self, deadline: Duration) -> Option<Result<OrchestrationResult>> {
        let handle = self.handle.as_mut()?;
        match tokio::time::timeout(deadline, handle).await {
            Ok(joined) => {
                self.handle = None;
                Some(flatten_join(self.run_id, joined))
            }
            Err(_) => None,
        }
    }

    pub async fn join(mut self) -> Result<OrchestrationResult> {
        match self.handle.take() {
            Some(handle) => flatten_join(self.run_id, handle.await),
            None => Err(RivalScoutError::Pipeline(format!(
                "run {} was already joined",
                self.run_id
            ))),
        }
    }

    pub fn detach(self) {
        info!(run_id = %self.run_id, "Run detached, continuing in background");
    }
}

fn flatten_join(
    run_id: Uuid,
    joined: std::result::Result<Result<OrchestrationResult>, tokio::task::JoinError>,
) -> Result<OrchestrationResult> {
    joined.map_err(|e| RivalScoutError::Pipeline(format!("run {run_id} task aborted: {e}")))?
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn RunStore>,
    events: Arc<dyn EventSink>,
    policy: Arc<DiscoveryPolicy>,
    sources: DiscoverySources,
    validators: ValidatorSet,
    ranker: Option<Arc<dyn SemanticRanker>>,
    job_state: Arc<dyn JobStateStore>,
    lifecycle: RunLifecycleManager,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RunStore>, events: Arc<dyn EventSink>, policy: DiscoveryPolicy) -> Self {
        let lifecycle = RunLifecycleManager::new(store.clone(), events.clone(), policy.staleness.clone());
        Self {
            store,
            events,
            policy: Arc::new(policy),
            sources: DiscoverySources::default(),
            validators: ValidatorSet::default(),
            ranker: None,
            job_state: Arc::new(MemoryJobStateStore::new()),
            lifecycle,
        }
    }

    pub fn with_sources(mut self, sources: DiscoverySources) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_validators(mut self, validators: ValidatorSet) -> Self {
        self.validators = validators;
        self
    }

    pub fn with_ranker(mut self, ranker: Arc<dyn SemanticRanker>) -> Self {
        self.ranker = Some(ranker);
        self
    }

    pub fn with_job_state(mut self, job_state: Arc<dyn JobStateStore>) -> Self {
        self.job_state = job_state;
        self
    }

    pub fn policy(&self) -> &DiscoveryPolicy {
        &self.policy
    }

    /// Run the whole pipeline and wait for it.
    pub async fn orchestrate(
        &self,
        research_job_id: Uuid,
        request: OrchestrateRequest,
    ) -> Result<OrchestrationResult> {
        let (brand, run) = self.begin(research_job_id, &request).await?;
        self.run_pipeline(brand, run, request).await
    }

    /// Claim the job now, run the pipeline on the runtime. Conflicts and bad
    /// requests are returned here, before anything is spawned.
    pub async fn start_background(
        &self,
        research_job_id: Uuid,
        request: OrchestrateRequest,
    ) -> Result<RunTask> {
        let (brand, run) = self.begin(research_job_id, &request).await?;
        let run_id = run.id;
        let this = self.clone();
        let handle = tokio::spawn(async move { this.run_pipeline(brand, run, request).await });
        Ok(RunTask {
            run_id,
            handle: Some(handle),
        })
    }

    /// Wait up to `deadline` for the run; past that, leave it running.
    pub async fn orchestrate_with_deadline(
        &self,
        research_job_id: Uuid,
        request: OrchestrateRequest,
        deadline: Duration,
    ) -> Result<DeadlineOutcome> {
        let mut task = self.start_background(research_job_id, request).await?;
        match task.wait(deadline).await {
            Some(result) => Ok(DeadlineOutcome::Completed(result?)),
            None => {
                let run_id = task.run_id();
                task.detach();
                Ok(DeadlineOutcome::Running { run_id })
            }
        }
    }

    /// Read back a run's decisions. Defaults to the job's latest run.
    pub async fn shortlist(&self, research_job_id: Uuid, run_id: Option<Uuid>) -> Result<Shortlist> {
        let run = match run_id {
            Some(id) => self
                .store
                .find_run(id)
                .await?
                .filter(|r| r.research_job_id == research_job_id)
                .ok_or(RivalScoutError::RunNotFound(id))?,
            None => self
                .store
                .latest_run(research_job_id)
                .await?
                .ok_or(RivalScoutError::RunNotFound(research_job_id))?,
        };
        let rows = self.store.competitors_for_run(research_job_id, run.id).await?;
        Ok(Shortlist::from_rows(&run, rows))
    }

    async fn begin(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
    ) -> Result<(BrandContext, OrchestrationRun)> {
        request.validate()?;
        let brand = self
            .store
            .load_brand_context(research_job_id)
            .await?
            .ok_or(RivalScoutError::JobNotFound(research_job_id))?;
        let run = self.lifecycle.start(research_job_id, request).await?;
        Ok((brand, run))
    }

    /// Execute a started run. Errors and panics both end with the run FAILED.
    async fn run_pipeline(
        &self,
        brand: BrandContext,
        run: OrchestrationRun,
        request: OrchestrateRequest,
    ) -> Result<OrchestrationResult> {
        let mut summary = run.summary.clone();
        let outcome = AssertUnwindSafe(self.execute(&brand, &run, &request, &mut summary))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok((evaluations, persist_stats))) => Ok(OrchestrationResult {
                run_id: run.id,
                summary,
                evaluations,
                persist_stats,
            }),
            Ok(Err(e)) => {
                self.lifecycle.fail(&run, &mut summary, &e.to_string()).await;
                Err(e)
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "pipeline panicked".to_string());
                self.lifecycle.fail(&run, &mut summary, &message).await;
                Err(RivalScoutError::Pipeline(message))
            }
        }
    }

    async fn execute(
        &self,
        brand: &BrandContext,
        run: &OrchestrationRun,
        request: &OrchestrateRequest,
        summary: &mut RunSummary,
    ) -> Result<(Vec<Evaluation>, PersistStats)> {
        let policy = self.policy.as_ref();
        let job_id = run.research_job_id;

        // 1. Collect
        self.lifecycle.progress(run.id, RunPhase::Collecting, summary).await;
        let ctx = CollectContext {
            job_id,
            run_id: run.id,
            brand,
            request,
            policy: &policy.aggregation,
        };
        let report = self
            .sources
            .collect(&ctx, self.store.as_ref(), self.job_state.as_ref(), self.events.as_ref())
            .await;
        summary.sources_completed = report.completed.len() as u32;
        summary.sources_failed = report.failed.len() as u32;

        // 2. Aggregate
        let mut aggregator = CandidateAggregator::new(&policy.aggregation, &request.platforms);
        aggregator.ingest_all(report.mentions);
        let aggregated = aggregator.finish();
        summary.candidates_discovered = aggregated.candidates.len() as u32;
        merge_counts(&mut summary.rejections, aggregated.rejections_by_reason());

        info!(
            run_id = %run.id,
            mentions = aggregated.mentions_seen,
            candidates = aggregated.candidates.len(),
            sources_failed = summary.sources_failed,
            call_failures = report.call_failures,
            "Candidate pool aggregated"
        );
        self.emit(
            DiagnosticEvent::new(
                job_id,
                EventCode::PlanGenerated,
                format!("Aggregated {} candidates", aggregated.candidates.len()),
            )
            .with_run_id(run.id)
            .with_metrics(json!({
                "mentions": aggregated.mentions_seen,
                "candidates": aggregated.candidates.len(),
                "sourcesCompleted": summary.sources_completed,
                "sourcesFailed": summary.sources_failed,
                "callFailures": report.call_failures,
            }))
            .with_metadata(json!({
                "rejections": aggregated.rejections_by_reason(),
                "failedSources": report
                    .failed
                    .iter()
                    .map(|(kind, error)| json!({"source": kind, "error": error}))
                    .collect::<Vec<_>>(),
            })),
        )
        .await;
        let candidates = aggregated.candidates;

        // 3. Validate
        self.lifecycle.progress(run.id, RunPhase::Validating, summary).await;
        let validation = self
            .validators
            .validate_pool(&candidates, brand, &policy.validation)
            .await;
        summary.candidates_validated = validation.validated;
        summary.validation_degraded = validation.degraded;
        self.emit(
            DiagnosticEvent::new(
                job_id,
                EventCode::ValidationCompleted,
                format!(
                    "Validated {} of {} candidates",
                    validation.validated,
                    candidates.len()
                ),
            )
            .with_run_id(run.id)
            .with_metrics(json!({
                "candidates": candidates.len(),
                "validated": validation.validated,
                "degraded": validation.degraded,
                "negative": validation.negative,
            })),
        )
        .await;

        // 4. Semantic ranking
        self.lifecycle.progress(run.id, RunPhase::Ranking, summary).await;
        let request_batch = semantic_request(brand, &candidates, &validation, policy.semantic.max_candidates);
        let semantic = rank_with_deadline(
            self.ranker.as_deref(),
            &request_batch,
            Duration::from_secs(policy.semantic.deadline_secs),
        )
        .await;
        summary.semantic_available = semantic.available;
        if !semantic.available {
            self.emit(
                DiagnosticEvent::new(
                    job_id,
                    EventCode::SemanticUnavailable,
                    format!(
                        "Semantic ranking unavailable: {}",
                        semantic.error.as_deref().unwrap_or("unknown")
                    ),
                )
                .with_run_id(run.id)
                .with_level(EventLevel::Warn)
                .with_metrics(json!({"requested": request_batch.candidates.len()})),
            )
            .await;
        }

        // 5. Score
        self.lifecycle.progress(run.id, RunPhase::Scoring, summary).await;
        let engine = ScoringEngine::new(policy, brand);
        let evaluations: Vec<Evaluation> = candidates
            .into_iter()
            .map(|candidate| {
                let key = candidate.key();
                let outcome = validation.outcome(&key).clone();
                let ai = semantic.scores.get(&key).copied();
                engine.evaluate(candidate, outcome, ai)
            })
            .collect();
        summary.candidates_evaluated = evaluations.len() as u32;

        // 6. Select
        let (evaluations, stats) =
            SelectionPolicy::new(policy, brand, request.target_count).apply(evaluations);
        summary.top_picks = stats.top_picks;
        summary.shortlisted = stats.shortlisted;
        summary.coverage_promotions = stats.coverage_promotions;
        summary.exploratory_promotions = stats.exploratory_promotions;
        summary.candidates_filtered = stats.filtered;
        merge_counts(&mut summary.rejections, stats.rejections.clone());

        self.emit(
            DiagnosticEvent::new(
                job_id,
                EventCode::CandidatesFiltered,
                format!(
                    "Filtered {} candidates ({} hard-rejected)",
                    stats.filtered, stats.hard_rejected
                ),
            )
            .with_run_id(run.id)
            .with_metrics(json!({
                "filtered": stats.filtered,
                "hardRejected": stats.hard_rejected,
                "retained": stats.retained_filtered,
            }))
            .with_metadata(json!({"rejections": stats.rejections})),
        )
        .await;
        self.emit(
            DiagnosticEvent::new(
                job_id,
                EventCode::ShortlistGenerated,
                format!(
                    "{} top picks, {} shortlisted",
                    stats.top_picks, stats.shortlisted
                ),
            )
            .with_run_id(run.id)
            .with_metrics(json!({
                "topPicks": stats.top_picks,
                "shortlisted": stats.shortlisted,
                "coveragePromotions": stats.coverage_promotions,
                "exploratoryPromotions": stats.exploratory_promotions,
                "targetCount": request.target_count,
            })),
        )
        .await;

        // 7. Persist
        self.lifecycle.progress(run.id, RunPhase::Persisting, summary).await;
        let plan = persist_plan(&evaluations, &policy.version);
        let persist_stats = self.lifecycle.complete(run, &plan, summary).await?;

        Ok((evaluations, persist_stats))
    }

    async fn emit(&self, event: DiagnosticEvent) {
        self.lifecycle.emit(event).await;
    }
}

/// The batch sent to the ranker: validated candidates first, then by initial
/// score, truncated to `max`.
fn semantic_request(
    brand: &BrandContext,
    candidates: &[Candidate],
    validation: &ValidationReport,
    max: usize,
) -> SemanticRequest {
    let mut ordered: Vec<&Candidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| {
        let va = validation.outcome(&a.key()).signal().is_some();
        let vb = validation.outcome(&b.key()).signal().is_some();
        vb.cmp(&va)
            .then_with(|| b.initial_score.total_cmp(&a.initial_score))
            .then_with(|| a.handle.cmp(&b.handle))
    });
    if ordered.len() > max {
        warn!(
            candidates = ordered.len(),
            max, "Semantic batch truncated"
        );
    }

    SemanticRequest {
        brand: brand.brand_name.clone(),
        niche: brand.niche.clone(),
        candidates: ordered
            .into_iter()
            .take(max)
            .map(|c| {
                let outcome = validation.outcome(&c.key());
                SemanticCandidate {
                    key: c.key().to_string(),
                    handle: c.handle.clone(),
                    platform: c.platform,
                    evidence: EvidenceText::for_candidate(c, outcome.bio()).raw,
                }
            })
            .collect(),
    }
}

/// Selected and retained evaluations become upserts; hard rejections mark
/// existing rows.
fn persist_plan(evaluations: &[Evaluation], policy_version: &str) -> PersistPlan {
    let mut plan = PersistPlan::default();
    for eval in evaluations {
        if eval.hard_reject.is_some() {
            plan.hard_rejected.push(eval.key());
            continue;
        }
        if !eval.is_selected() && !eval.retained {
            continue;
        }
        let discovery_reason = eval
            .candidate
            .reasons
            .first()
            .cloned()
            .unwrap_or_else(|| eval.decision_reason.clone());
        plan.upserts.push(CompetitorUpsert {
            platform: eval.candidate.platform,
            handle: eval.candidate.handle.clone(),
            selection_state: eval.selection_state,
            relevance_score: eval.total_score,
            score_breakdown: eval.score_breakdown(policy_version),
            evidence: eval.evidence(),
            discovery_reason,
        });
    }
    plan
}

fn merge_counts(into: &mut BTreeMap<String, u32>, from: BTreeMap<String, u32>) {
    for (reason, count) in from {
        *into.entry(reason).or_insert(0) += count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::candidate;
    use crate::validation::{ValidationOutcome, ValidationSignal};
    use rivalscout_common::{Platform, SelectionState, SourceKind};

    #[test]
    fn semantic_batch_prefers_validated_and_truncates() {
        let mut low = candidate(Platform::Instagram, "lowscore", &[SourceKind::Direct]);
        low.initial_score = 0.2;
        let mut high = candidate(Platform::Instagram, "highscore", &[SourceKind::Direct]);
        high.initial_score = 0.9;
        let confirmed = candidate(Platform::TikTok, "confirmed", &[SourceKind::Ai]);

        let mut report = ValidationReport::default();
        report.outcomes.insert(
            confirmed.key(),
            ValidationOutcome::Confirmed(ValidationSignal {
                active: Some(true),
                relevant: Some(true),
                confidence: 0.8,
                follower_estimate: None,
                bio: Some("vegan cakes".into()),
            }),
        );

        let brand = BrandContext {
            brand_name: "Crumb & Co".into(),
            niche: "vegan bakery".into(),
            ..Default::default()
        };
        let req = semantic_request(&brand, &[low, high, confirmed], &report, 2);

        let keys: Vec<_> = req.candidates.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["tiktok:confirmed", "instagram:highscore"]);
        assert!(req.candidates[0].evidence.contains("vegan cakes"));
    }

    #[test]
    fn merge_counts_adds_per_reason() {
        let mut into = BTreeMap::from([("too_short".to_string(), 2)]);
        merge_counts(
            &mut into,
            BTreeMap::from([("too_short".to_string(), 1), ("self_account".to_string(), 1)]),
        );
        assert_eq!(into["too_short"], 3);
        assert_eq!(into["self_account"], 1);
    }

    #[test]
    fn filtered_rows_are_only_persisted_when_retained() {
        let policy = DiscoveryPolicy::default();
        let brand = BrandContext::default();
        let engine = ScoringEngine::new(&policy, &brand);

        let mut kept = engine.evaluate(
            candidate(Platform::Instagram, "kept", &[SourceKind::Direct]),
            ValidationOutcome::Unavailable,
            None,
        );
        kept.retained = true;
        let dropped = engine.evaluate(
            candidate(Platform::Instagram, "dropped", &[SourceKind::Direct]),
            ValidationOutcome::Unavailable,
            None,
        );
        let mut picked = engine.evaluate(
            candidate(Platform::Instagram, "picked", &[SourceKind::Direct]),
            ValidationOutcome::Unavailable,
            None,
        );
        picked.selection_state = SelectionState::Shortlisted;

        let plan = persist_plan(&[kept, dropped, picked], "test");
        let handles: Vec<_> = plan.upserts.iter().map(|u| u.handle.as_str()).collect();
        assert_eq!(handles, vec!["kept", "picked"]);
        assert!(plan.hard_rejected.is_empty());
        assert_eq!(plan.upserts[0].selection_state, SelectionState::FilteredOut);
    }
}
