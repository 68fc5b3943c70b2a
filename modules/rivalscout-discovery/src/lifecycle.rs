//! Run lifecycle: start (with the per-job mutex), progress heartbeats,
//! completion and failure, each paired with its diagnostic event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use rivalscout_common::policy::StalenessPolicy;
use rivalscout_common::{
    OrchestrateRequest, OrchestrationRun, PersistPlan, PersistStats, Result, RunPhase, RunStatus,
    RunSummary,
};
use rivalscout_events::{emit_best_effort, DiagnosticEvent, EventCode, EventSink};

use crate::store::RunStore;

/// Whether a RUNNING row has gone quiet long enough to be taken over.
///
/// Runs still in an early phase with nothing recorded get the short window;
/// everything else gets the default one. Both are measured from the last
/// heartbeat.
pub fn is_stale(run: &OrchestrationRun, now: DateTime<Utc>, policy: &StalenessPolicy) -> bool {
    if run.status != RunStatus::Running {
        return false;
    }
    let window = if run.summary.phase.is_early() && !run.summary.has_progress() {
        policy.early_secs
    } else {
        policy.default_secs
    };
    (now - run.updated_at).num_seconds() > window
}

#[derive(Clone)]
pub struct RunLifecycleManager {
    store: Arc<dyn RunStore>,
    events: Arc<dyn EventSink>,
    staleness: StalenessPolicy,
}

impl RunLifecycleManager {
    pub fn new(store: Arc<dyn RunStore>, events: Arc<dyn EventSink>, staleness: StalenessPolicy) -> Self {
        Self {
            store,
            events,
            staleness,
        }
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Claim the job and create the RUNNING row. Conflicts surface as
    /// `AlreadyRunning` before any work is done.
    pub async fn start(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
    ) -> Result<OrchestrationRun> {
        let outcome = self
            .store
            .begin_run(research_job_id, request, &self.staleness)
            .await?;
        let run = outcome.run;

        if let Some(replaced) = outcome.replaced_run_id {
            warn!(%research_job_id, run_id = %run.id, %replaced, "Replaced stale orchestration run");
            self.emit(
                DiagnosticEvent::new(
                    research_job_id,
                    EventCode::StaleRunReplaced,
                    format!("Stale run {replaced} marked FAILED and replaced"),
                )
                .with_run_id(run.id)
                .with_metadata(json!({"replacedRunId": replaced})),
            )
            .await;
        }

        info!(
            %research_job_id,
            run_id = %run.id,
            mode = %request.mode,
            target_count = request.target_count,
            "Orchestration run started"
        );
        self.emit(
            DiagnosticEvent::new(research_job_id, EventCode::RunStarted, "Orchestration run started")
                .with_run_id(run.id)
                .with_metadata(json!({
                    "mode": request.mode,
                    "platforms": request.platforms,
                    "targetCount": request.target_count,
                    "sources": request.sources,
                })),
        )
        .await;
        Ok(run)
    }

    /// Heartbeat. A failed write is logged; the pipeline keeps going.
    pub async fn progress(&self, run_id: Uuid, phase: RunPhase, summary: &mut RunSummary) {
        summary.phase = phase;
        if let Err(e) = self.store.record_progress(run_id, summary).await {
            warn!(%run_id, ?phase, error = %e, "Failed to record run progress");
        }
    }

    pub async fn complete(
        &self,
        run: &OrchestrationRun,
        plan: &PersistPlan,
        summary: &mut RunSummary,
    ) -> Result<PersistStats> {
        summary.phase = RunPhase::Finished;
        let stats = self.store.complete_run(run.id, plan, summary).await?;

        info!(
            research_job_id = %run.research_job_id,
            run_id = %run.id,
            inserted = stats.inserted,
            updated = stats.updated,
            approved_preserved = stats.approved_preserved,
            swept = stats.swept_to_rejected,
            "Orchestration run completed"
        );
        self.emit(
            DiagnosticEvent::new(run.research_job_id, EventCode::RunCompleted, "Orchestration run completed")
                .with_run_id(run.id)
                .with_metrics(json!({
                    "topPicks": summary.top_picks,
                    "shortlisted": summary.shortlisted,
                    "filtered": summary.candidates_filtered,
                    "inserted": stats.inserted,
                    "updated": stats.updated,
                    "approvedPreserved": stats.approved_preserved,
                    "sweptToRejected": stats.swept_to_rejected,
                    "hardRejectedMarked": stats.hard_rejected_marked,
                })),
        )
        .await;
        Ok(stats)
    }

    /// Mark the run FAILED. Never fails itself: the original error is what the
    /// caller reports.
    pub async fn fail(&self, run: &OrchestrationRun, summary: &mut RunSummary, message: &str) {
        summary.error = Some(message.to_string());
        error!(research_job_id = %run.research_job_id, run_id = %run.id, error = message, "Orchestration run failed");

        if let Err(e) = self.store.fail_run(run.id, summary).await {
            error!(run_id = %run.id, error = %e, "Failed to mark run FAILED");
        }
        self.emit(
            DiagnosticEvent::new(
                run.research_job_id,
                EventCode::RunFailed,
                format!("Orchestration run failed: {message}"),
            )
            .with_run_id(run.id)
            .with_metadata(json!({"phase": summary.phase})),
        )
        .await;
    }

    pub async fn emit(&self, event: DiagnosticEvent) {
        emit_best_effort(self.events.as_ref(), event).await;
    }
}
