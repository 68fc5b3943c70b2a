//! PgEventStore: append-only log of diagnostic events in `orchestration_events`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use uuid::Uuid;

use crate::sink::EventSink;
use crate::types::{DiagnosticEvent, EventCode, EventLevel, StoredDiagnostic};

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &DiagnosticEvent) -> Result<i64> {
        let row = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO orchestration_events
                (research_job_id, run_id, source, code, level, message, metrics, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING seq
            "#,
        )
        .bind(event.research_job_id)
        .bind(event.run_id)
        .bind(&event.source)
        .bind(event.code.as_str())
        .bind(event.level.as_str())
        .bind(&event.message)
        .bind(&event.metrics)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await
        .context("inserting orchestration event")?;

        Ok(row.0)
    }

    /// All events for a run, in emission order.
    pub async fn read_by_run(&self, run_id: Uuid) -> Result<Vec<StoredDiagnostic>> {
        let rows = sqlx::query_as::<_, StoredDiagnostic>(
            r#"
            SELECT seq, ts, research_job_id, run_id, source, code, level, message, metrics, metadata
            FROM orchestration_events
            WHERE run_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Most recent events for a research job, newest first.
    pub async fn read_by_job(&self, research_job_id: Uuid, limit: usize) -> Result<Vec<StoredDiagnostic>> {
        let rows = sqlx::query_as::<_, StoredDiagnostic>(
            r#"
            SELECT seq, ts, research_job_id, run_id, source, code, level, message, metrics, metadata
            FROM orchestration_events
            WHERE research_job_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#,
        )
        .bind(research_job_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl EventSink for PgEventStore {
    async fn emit(&self, event: DiagnosticEvent) -> Result<()> {
        self.append(&event).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

impl<'r> FromRow<'r, PgRow> for StoredDiagnostic {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let code: String = row.try_get("code")?;
        let level: String = row.try_get("level")?;
        let ts: DateTime<Utc> = row.try_get("ts")?;

        let code: EventCode = serde_json::from_value(serde_json::Value::String(code))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let level: EventLevel = serde_json::from_value(serde_json::Value::String(level))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(StoredDiagnostic {
            seq: row.try_get("seq")?,
            ts,
            event: DiagnosticEvent {
                research_job_id: row.try_get("research_job_id")?,
                run_id: row.try_get("run_id")?,
                source: row.try_get("source")?,
                code,
                level,
                message: row.try_get("message")?,
                metrics: row.try_get("metrics")?,
                metadata: row.try_get("metadata")?,
            },
        })
    }
}
