//! Integration tests for PgEventStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use rivalscout_events::{emit_best_effort, DiagnosticEvent, EventCode, EventLevel, PgEventStore};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Get a test database pool, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS orchestration_events (
            seq             BIGSERIAL    PRIMARY KEY,
            ts              TIMESTAMPTZ  NOT NULL DEFAULT now(),
            research_job_id UUID         NOT NULL,
            run_id          UUID,
            source          TEXT         NOT NULL,
            code            TEXT         NOT NULL,
            level           TEXT         NOT NULL,
            message         TEXT         NOT NULL,
            metrics         JSONB,
            metadata        JSONB
        )
        "#,
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

#[tokio::test]
async fn append_and_read_by_run_preserves_order() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgEventStore::new(pool);
    let job = Uuid::new_v4();
    let run = Uuid::new_v4();

    for code in [EventCode::RunStarted, EventCode::SourceFailed, EventCode::RunCompleted] {
        let event = DiagnosticEvent::new(job, code, code.as_str()).with_run_id(run);
        store.append(&event).await.unwrap();
    }

    let events = store.read_by_run(run).await.unwrap();
    let codes: Vec<_> = events.iter().map(|e| e.event.code).collect();
    assert_eq!(
        codes,
        vec![EventCode::RunStarted, EventCode::SourceFailed, EventCode::RunCompleted]
    );
    assert_eq!(events[1].event.level, EventLevel::Warn);
    assert!(events[0].seq < events[2].seq);
}

#[tokio::test]
async fn metrics_and_metadata_round_trip_as_jsonb() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PgEventStore::new(pool);
    let job = Uuid::new_v4();
    let run = Uuid::new_v4();

    let event = DiagnosticEvent::new(job, EventCode::ValidationCompleted, "validated 12")
        .with_run_id(run)
        .with_source("validation")
        .with_metrics(json!({"validated": 12, "degraded": 2}))
        .with_metadata(json!({"platforms": ["instagram"]}));
    emit_best_effort(&store, event.clone()).await;

    let events = store.read_by_job(job, 10).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, event);
}
