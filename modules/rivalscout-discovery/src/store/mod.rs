//! Durable state: orchestration runs, competitor rows, brand context, history.

pub mod postgres;

pub use postgres::PgRunStore;

use async_trait::async_trait;
use uuid::Uuid;

use rivalscout_common::policy::StalenessPolicy;
use rivalscout_common::{
    BrandContext, HistoricalCompetitor, OrchestrateRequest, OrchestrationRun, PersistPlan,
    PersistStats, PersistedCompetitor, Result, RunSummary,
};

/// Result of starting a run.
#[derive(Debug, Clone)]
pub struct BeginOutcome {
    pub run: OrchestrationRun,
    /// A stale RUNNING row that was marked FAILED to make room for this one.
    pub replaced_run_id: Option<Uuid>,
}

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn load_brand_context(&self, research_job_id: Uuid) -> Result<Option<BrandContext>>;

    /// Atomically claim the job: fails with `AlreadyRunning` while a fresh
    /// RUNNING row exists, takes over a stale one.
    async fn begin_run(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
        staleness: &StalenessPolicy,
    ) -> Result<BeginOutcome>;

    /// Store progress counters and bump the heartbeat.
    async fn record_progress(&self, run_id: Uuid, summary: &RunSummary) -> Result<()>;

    /// Apply the persist plan with the run's append/replace semantics and mark
    /// the run COMPLETED, all in one transaction.
    async fn complete_run(
        &self,
        run_id: Uuid,
        plan: &PersistPlan,
        summary: &RunSummary,
    ) -> Result<PersistStats>;

    async fn fail_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()>;

    async fn find_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>>;

    async fn latest_run(&self, research_job_id: Uuid) -> Result<Option<OrchestrationRun>>;

    /// Rows written by `run_id`, plus APPROVED rows for the job.
    async fn competitors_for_run(
        &self,
        research_job_id: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<PersistedCompetitor>>;

    /// High-relevance competitors recorded for the same client on other jobs.
    async fn historical_competitors(
        &self,
        client_id: Uuid,
        exclude_job_id: Uuid,
        min_relevance: f64,
    ) -> Result<Vec<HistoricalCompetitor>>;
}

/// `summary.error` written on a run taken over after going stale.
pub const STALE_REPLACED: &str = "STALE_REPLACED";
