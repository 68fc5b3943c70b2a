//! PgRunStore: Postgres-backed `RunStore`.
//!
//! The per-job mutex is the RUNNING row itself, claimed inside a serializable
//! transaction and backed by a partial unique index.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use rivalscout_common::policy::StalenessPolicy;
use rivalscout_common::{
    BrandContext, ClientHandle, CompetitorStatus, HistoricalCompetitor, OrchestrateRequest,
    OrchestrationRun, PersistPlan, PersistStats, PersistedCompetitor, Platform, Result,
    RivalScoutError, RunMode, RunStatus, RunSummary, SelectionState,
};

use super::{BeginOutcome, RunStore, STALE_REPLACED};
use crate::lifecycle::is_stale;

const MAX_START_ATTEMPTS: u32 = 3;

const RUN_COLUMNS: &str = "id, research_job_id, mode, platforms, target_count, status, summary, \
                           started_at, updated_at, completed_at";

const COMPETITOR_COLUMNS: &str = "id, research_job_id, platform, handle, selection_state, status, \
                                  relevance_score, score_breakdown, evidence, discovery_reason, \
                                  orchestration_run_id, updated_at";

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

/// Why a single start attempt did not produce a run.
enum StartError {
    Conflict(Uuid),
    Sql(sqlx::Error),
}

impl From<sqlx::Error> for StartError {
    fn from(e: sqlx::Error) -> Self {
        StartError::Sql(e)
    }
}

fn sql_state(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|d| d.code())
        .map(|c| c.into_owned())
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations from the workspace `migrations/` directory.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| RivalScoutError::Database(format!("running migrations: {e}")))
    }

    async fn try_begin(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
        staleness: &StalenessPolicy,
    ) -> std::result::Result<BeginOutcome, StartError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let existing = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM orchestration_runs \
             WHERE research_job_id = $1 AND status = 'RUNNING' FOR UPDATE"
        ))
        .bind(research_job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let mut replaced_run_id = None;
        if let Some(row) = existing {
            let current = run_from_row(&row)?;
            if !is_stale(&current, Utc::now(), staleness) {
                return Err(StartError::Conflict(current.id));
            }

            let mut summary = current.summary.clone();
            summary.error = Some(STALE_REPLACED.to_string());
            sqlx::query(
                r#"
                UPDATE orchestration_runs
                SET status = 'FAILED', summary = $2, completed_at = now(), updated_at = now()
                WHERE id = $1
                "#,
            )
            .bind(current.id)
            .bind(Json(&summary))
            .execute(&mut *tx)
            .await?;
            replaced_run_id = Some(current.id);
        }

        let summary = RunSummary {
            replaced_run_id,
            ..Default::default()
        };
        let platforms: Vec<String> = request.platforms.iter().map(|p| p.as_str().to_string()).collect();

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO orchestration_runs
                (id, research_job_id, mode, platforms, target_count, status, summary)
            VALUES ($1, $2, $3, $4, $5, 'RUNNING', $6)
            RETURNING {RUN_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(research_job_id)
        .bind(request.mode.as_str())
        .bind(&platforms)
        .bind(request.target_count as i32)
        .bind(Json(&summary))
        .fetch_one(&mut *tx)
        .await?;
        let run = run_from_row(&row)?;

        tx.commit().await?;
        Ok(BeginOutcome {
            run,
            replaced_run_id,
        })
    }

    async fn running_run_id(&self, research_job_id: Uuid) -> Option<Uuid> {
        sqlx::query_as::<_, (Uuid,)>(
            "SELECT id FROM orchestration_runs WHERE research_job_id = $1 AND status = 'RUNNING'",
        )
        .bind(research_job_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten()
        .map(|(id,)| id)
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn load_brand_context(&self, research_job_id: Uuid) -> Result<Option<BrandContext>> {
        let row = sqlx::query(
            r#"
            SELECT id, client_id, brand_name, niche, description, instagram_handle, tiktok_handle,
                   business_keywords, audience_keywords, context_keywords, client_follower_count
            FROM research_jobs
            WHERE id = $1
            "#,
        )
        .bind(research_job_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut client_handles = Vec::new();
        for (platform, column) in [
            (Platform::Instagram, "instagram_handle"),
            (Platform::TikTok, "tiktok_handle"),
        ] {
            let handle: Option<String> = row.try_get(column)?;
            if let Some(handle) = handle.filter(|h| !h.trim().is_empty()) {
                client_handles.push(ClientHandle {
                    platform,
                    handle: handle.trim().trim_start_matches('@').to_lowercase(),
                });
            }
        }
        let follower_count: Option<i64> = row.try_get("client_follower_count")?;

        Ok(Some(BrandContext {
            research_job_id: row.try_get("id")?,
            client_id: row.try_get("client_id")?,
            brand_name: row.try_get("brand_name")?,
            niche: row.try_get("niche")?,
            description: row.try_get("description")?,
            client_handles,
            business_keywords: row.try_get("business_keywords")?,
            audience_keywords: row.try_get("audience_keywords")?,
            context_keywords: row.try_get("context_keywords")?,
            client_follower_count: follower_count.and_then(|n| u64::try_from(n).ok()),
        }))
    }

    async fn begin_run(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
        staleness: &StalenessPolicy,
    ) -> Result<BeginOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_begin(research_job_id, request, staleness).await {
                Ok(outcome) => return Ok(outcome),
                Err(StartError::Conflict(run_id)) => {
                    return Err(RivalScoutError::AlreadyRunning {
                        research_job_id,
                        run_id,
                    })
                }
                Err(StartError::Sql(e)) => match sql_state(&e).as_deref() {
                    Some("40001") if attempt < MAX_START_ATTEMPTS => {
                        warn!(%research_job_id, attempt, "Serialization failure starting run, retrying");
                        continue;
                    }
                    // Lost the race on the partial unique index, or ran out of retries.
                    Some("23505") | Some("40001") => {
                        let running = self.running_run_id(research_job_id).await;
                        return Err(lost_start_race(research_job_id, running, e));
                    }
                    _ => return Err(e.into()),
                },
            }
        }
    }

    async fn record_progress(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET summary = $2, updated_at = now()
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(run_id)
        .bind(Json(summary))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(%run_id, "Progress write skipped, run is no longer RUNNING");
        }
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        plan: &PersistPlan,
        summary: &RunSummary,
    ) -> Result<PersistStats> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT research_job_id, mode, status FROM orchestration_runs WHERE id = $1 FOR UPDATE",
        )
        .bind(run_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RivalScoutError::RunNotFound(run_id))?;
        let (research_job_id, mode, status) = row;
        let mode: RunMode = mode.parse()?;
        let status: RunStatus = status.parse()?;
        if status != RunStatus::Running {
            return Err(RivalScoutError::Pipeline(format!(
                "run {run_id} is {status}, not RUNNING"
            )));
        }

        let mut stats = PersistStats::default();

        if mode == RunMode::Replace {
            let swept = sqlx::query(
                r#"
                UPDATE competitors
                SET selection_state = 'REJECTED', updated_at = now()
                WHERE research_job_id = $1
                  AND selection_state NOT IN ('APPROVED', 'REJECTED')
                "#,
            )
            .bind(research_job_id)
            .execute(&mut *tx)
            .await?;
            stats.swept_to_rejected = swept.rows_affected() as u32;
        }

        for upsert in &plan.upserts {
            let (inserted, state): (bool, String) = sqlx::query_as(
                r#"
                INSERT INTO competitors
                    (id, research_job_id, platform, handle, selection_state, status,
                     relevance_score, score_breakdown, evidence, discovery_reason, orchestration_run_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (research_job_id, platform, handle) DO UPDATE SET
                    selection_state = CASE
                        WHEN competitors.selection_state = 'APPROVED' THEN 'APPROVED'
                        ELSE EXCLUDED.selection_state
                    END,
                    relevance_score = EXCLUDED.relevance_score,
                    score_breakdown = EXCLUDED.score_breakdown,
                    evidence = EXCLUDED.evidence,
                    discovery_reason = EXCLUDED.discovery_reason,
                    orchestration_run_id = EXCLUDED.orchestration_run_id,
                    updated_at = now()
                RETURNING (xmax = 0) AS inserted, selection_state
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(research_job_id)
            .bind(upsert.platform.as_str())
            .bind(&upsert.handle)
            .bind(upsert.selection_state.as_str())
            .bind(CompetitorStatus::Suggested.as_str())
            .bind(upsert.relevance_score)
            .bind(&upsert.score_breakdown)
            .bind(&upsert.evidence)
            .bind(&upsert.discovery_reason)
            .bind(run_id)
            .fetch_one(&mut *tx)
            .await?;

            if inserted {
                stats.inserted += 1;
            } else if state == SelectionState::Approved.as_str()
                && upsert.selection_state != SelectionState::Approved
            {
                stats.approved_preserved += 1;
            } else {
                stats.updated += 1;
            }
        }

        let include_approved = mode == RunMode::Replace;
        for key in &plan.hard_rejected {
            let marked = sqlx::query(
                r#"
                UPDATE competitors
                SET selection_state = 'REJECTED', orchestration_run_id = $4, updated_at = now()
                WHERE research_job_id = $1 AND platform = $2 AND handle = $3
                  AND selection_state <> 'REJECTED'
                  AND ($5 OR selection_state <> 'APPROVED')
                "#,
            )
            .bind(research_job_id)
            .bind(key.platform.as_str())
            .bind(&key.handle)
            .bind(run_id)
            .bind(include_approved)
            .execute(&mut *tx)
            .await?;
            stats.hard_rejected_marked += marked.rows_affected() as u32;
        }

        sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET status = 'COMPLETED', summary = $2, completed_at = now(), updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(run_id)
        .bind(Json(summary))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(stats)
    }

    async fn fail_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orchestration_runs
            SET status = 'FAILED', summary = $2, completed_at = now(), updated_at = now()
            WHERE id = $1 AND status = 'RUNNING'
            "#,
        )
        .bind(run_id)
        .bind(Json(summary))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM orchestration_runs WHERE id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(run_from_row).transpose()?)
    }

    async fn latest_run(&self, research_job_id: Uuid) -> Result<Option<OrchestrationRun>> {
        let row = sqlx::query(&format!(
            "SELECT {RUN_COLUMNS} FROM orchestration_runs \
             WHERE research_job_id = $1 ORDER BY started_at DESC LIMIT 1"
        ))
        .bind(research_job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(run_from_row).transpose()?)
    }

    async fn competitors_for_run(
        &self,
        research_job_id: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<PersistedCompetitor>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPETITOR_COLUMNS} FROM competitors \
             WHERE research_job_id = $1 \
               AND (orchestration_run_id = $2 OR selection_state = 'APPROVED') \
             ORDER BY relevance_score DESC, handle ASC"
        ))
        .bind(research_job_id)
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(competitor_from_row)
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn historical_competitors(
        &self,
        client_id: Uuid,
        exclude_job_id: Uuid,
        min_relevance: f64,
    ) -> Result<Vec<HistoricalCompetitor>> {
        let rows = sqlx::query_as::<_, (String, String, f64, Option<String>)>(
            r#"
            SELECT DISTINCT ON (c.platform, c.handle)
                   c.platform, c.handle, c.relevance_score, c.discovery_reason
            FROM competitors c
            JOIN research_jobs j ON j.id = c.research_job_id
            WHERE j.client_id = $1
              AND c.research_job_id <> $2
              AND c.relevance_score >= $3
              AND c.selection_state IN ('TOP_PICK', 'SHORTLISTED', 'APPROVED')
            ORDER BY c.platform, c.handle, c.relevance_score DESC
            "#,
        )
        .bind(client_id)
        .bind(exclude_job_id)
        .bind(min_relevance)
        .fetch_all(&self.pool)
        .await?;

        let mut history = Vec::with_capacity(rows.len());
        for (platform, handle, relevance_score, discovery_reason) in rows {
            let Ok(platform) = platform.parse::<Platform>() else {
                warn!(%platform, %handle, "Skipping historical competitor with unknown platform");
                continue;
            };
            history.push(HistoricalCompetitor {
                platform,
                handle,
                relevance_score,
                discovery_reason,
            });
        }
        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// A failed start is only a conflict when a RUNNING row is actually there.
fn lost_start_race(research_job_id: Uuid, running: Option<Uuid>, e: sqlx::Error) -> RivalScoutError {
    match running {
        Some(run_id) => RivalScoutError::AlreadyRunning {
            research_job_id,
            run_id,
        },
        None => e.into(),
    }
}

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn run_from_row(row: &PgRow) -> std::result::Result<OrchestrationRun, sqlx::Error> {
    let mode: String = row.try_get("mode")?;
    let status: String = row.try_get("status")?;
    let platforms: Vec<String> = row.try_get("platforms")?;
    let target_count: i32 = row.try_get("target_count")?;
    let summary: Json<RunSummary> = row.try_get("summary")?;

    Ok(OrchestrationRun {
        id: row.try_get("id")?,
        research_job_id: row.try_get("research_job_id")?,
        mode: mode.parse().map_err(decode_err)?,
        platforms: platforms
            .iter()
            .map(|p| p.parse::<Platform>())
            .collect::<std::result::Result<_, _>>()
            .map_err(decode_err)?,
        target_count: target_count.max(0) as u32,
        status: status.parse().map_err(decode_err)?,
        summary: summary.0,
        started_at: row.try_get("started_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn competitor_from_row(row: &PgRow) -> std::result::Result<PersistedCompetitor, sqlx::Error> {
    let platform: String = row.try_get("platform")?;
    let selection_state: String = row.try_get("selection_state")?;
    let status: String = row.try_get("status")?;

    Ok(PersistedCompetitor {
        id: row.try_get("id")?,
        research_job_id: row.try_get("research_job_id")?,
        platform: platform.parse().map_err(decode_err)?,
        handle: row.try_get("handle")?,
        selection_state: selection_state.parse().map_err(decode_err)?,
        status: status.parse().map_err(decode_err)?,
        relevance_score: row.try_get("relevance_score")?,
        score_breakdown: row.try_get("score_breakdown")?,
        evidence: row.try_get("evidence")?,
        discovery_reason: row.try_get("discovery_reason")?,
        orchestration_run_id: row.try_get("orchestration_run_id")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_start_race_needs_a_running_row_to_conflict() {
        let job = Uuid::new_v4();
        let winner = Uuid::new_v4();

        let err = lost_start_race(job, Some(winner), sqlx::Error::PoolTimedOut);
        assert!(err.is_conflict());
        assert!(matches!(err, RivalScoutError::AlreadyRunning { run_id, .. } if run_id == winner));

        let err = lost_start_race(job, None, sqlx::Error::PoolTimedOut);
        assert!(!err.is_conflict());
        assert!(matches!(err, RivalScoutError::Database(_)));
    }
}
