//! Run lifecycle through the orchestrator: the per-job mutex, stale takeover,
//! failure handling and background execution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use rivalscout_common::{
    OrchestrateRequest, Platform, RivalScoutError, RunMode, RunStatus, RunSummary, SourceKind,
};
use rivalscout_discovery::sources::{AlgorithmicSearch, DiscoverySources};
use rivalscout_discovery::testing::*;
use rivalscout_discovery::validation::ValidatorSet;
use rivalscout_discovery::{DeadlineOutcome, Orchestrator};
use rivalscout_events::{EventCode, EventLevel, MemoryEventSink};

fn setup() -> (Uuid, Arc<MemoryRunStore>, Arc<MemoryEventSink>) {
    let job = Uuid::new_v4();
    let store = Arc::new(MemoryRunStore::new().with_brand(bakery_brand(job)));
    (job, store, Arc::new(MemoryEventSink::new()))
}

fn algorithmic_only(search: MockAlgorithmic) -> DiscoverySources {
    DiscoverySources::new().with_algorithmic(Arc::new(search))
}

fn request() -> OrchestrateRequest {
    OrchestrateRequest::new(RunMode::Append, vec![Platform::Instagram], 5)
        .with_sources(vec![SourceKind::Algorithmic])
}

fn orchestrator(
    store: &Arc<MemoryRunStore>,
    events: &Arc<MemoryEventSink>,
    sources: DiscoverySources,
) -> Orchestrator {
    Orchestrator::new(store.clone(), events.clone(), fast_policy())
        .with_sources(sources)
        .with_validators(
            ValidatorSet::new()
                .with_instagram(Arc::new(MockInstagramValidator::confirming(true, true, 0.8))),
        )
}

#[tokio::test]
async fn completed_run_emits_lifecycle_events_in_order() {
    let (job, store, events) = setup();
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let result = o.orchestrate(job, request()).await.unwrap();

    let runs = store.runs(job);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].id, result.run_id);
    assert_eq!(runs[0].status, RunStatus::Completed);
    assert!(runs[0].completed_at.is_some());
    assert_eq!(runs[0].summary, result.summary);

    let codes = events.codes();
    assert_eq!(codes.first(), Some(&EventCode::RunStarted));
    assert_eq!(codes.last(), Some(&EventCode::RunCompleted));
    let position = |code| codes.iter().position(|c| *c == code).unwrap();
    assert!(position(EventCode::SourceStarted) < position(EventCode::PlanGenerated));
    assert!(position(EventCode::PlanGenerated) < position(EventCode::ValidationCompleted));
    assert!(position(EventCode::ValidationCompleted) < position(EventCode::CandidatesFiltered));
    assert!(position(EventCode::CandidatesFiltered) < position(EventCode::ShortlistGenerated));
    assert!(events
        .events()
        .iter()
        .all(|e| e.research_job_id == job && e.run_id == Some(result.run_id)));

    let unavailable: Vec<_> = events
        .events()
        .into_iter()
        .filter(|e| e.code == EventCode::SemanticUnavailable)
        .collect();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].level, EventLevel::Warn);
}

#[tokio::test]
async fn invalid_request_is_rejected_before_a_run_exists() {
    let (job, store, events) = setup();
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&[])));

    let too_many = OrchestrateRequest::new(RunMode::Append, vec![Platform::Instagram], 11);
    let err = o.orchestrate(job, too_many).await.unwrap_err();
    assert!(matches!(err, RivalScoutError::InvalidRequest(_)));
    assert_eq!(err.http_status(), 400);

    let dup = OrchestrateRequest::new(RunMode::Append, vec![Platform::TikTok, Platform::TikTok], 5);
    assert!(matches!(
        o.orchestrate(job, dup).await,
        Err(RivalScoutError::InvalidRequest(_))
    ));

    assert!(store.runs(job).is_empty());
    assert!(events.events().is_empty());
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let (_, store, events) = setup();
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&[])));
    let missing = Uuid::new_v4();

    let err = o.orchestrate(missing, request()).await.unwrap_err();
    assert!(matches!(err, RivalScoutError::JobNotFound(id) if id == missing));
    assert_eq!(err.code(), "JOB_NOT_FOUND");
    assert!(store.runs(missing).is_empty());
}

#[tokio::test]
async fn fresh_running_run_blocks_a_second_start() {
    let (job, store, events) = setup();
    let planted = store.insert_running_run(job, RunSummary::default(), Utc::now());
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let err = o.orchestrate(job, request()).await.unwrap_err();
    match &err {
        RivalScoutError::AlreadyRunning {
            research_job_id,
            run_id,
        } => {
            assert_eq!(*research_job_id, job);
            assert_eq!(*run_id, planted);
        }
        other => panic!("expected conflict, got {other:?}"),
    }
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.code(), "ORCHESTRATION_ALREADY_RUNNING");

    // The blocking run is untouched.
    assert_eq!(store.runs(job).len(), 1);
    assert_eq!(store.running_count(job), 1);
}

#[tokio::test]
async fn stale_run_is_failed_and_replaced() {
    let (job, store, events) = setup();
    let stale = store.insert_running_run(
        job,
        RunSummary::default(),
        Utc::now() - chrono::Duration::minutes(6),
    );
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let result = o.orchestrate(job, request()).await.unwrap();

    let runs = store.runs(job);
    let old = runs.iter().find(|r| r.id == stale).unwrap();
    assert_eq!(old.status, RunStatus::Failed);
    assert_eq!(old.summary.error.as_deref(), Some("STALE_REPLACED"));

    let new = runs.iter().find(|r| r.id == result.run_id).unwrap();
    assert_eq!(new.status, RunStatus::Completed);
    assert_eq!(new.summary.replaced_run_id, Some(stale));
    assert_eq!(events.count(EventCode::StaleRunReplaced), 1);
    assert_eq!(store.running_count(job), 0);
}

#[tokio::test]
async fn progressed_run_keeps_the_longer_staleness_window() {
    let (job, store, events) = setup();
    let summary = RunSummary {
        phase: rivalscout_common::RunPhase::Validating,
        sources_completed: 2,
        ..Default::default()
    };
    store.insert_running_run(job, summary, Utc::now() - chrono::Duration::minutes(6));
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&[])));

    let err = o.orchestrate(job, request()).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_admit_exactly_one_run() {
    let (job, store, events) = setup();
    let o = orchestrator(
        &store,
        &events,
        algorithmic_only(MockAlgorithmic::returning(&["ovenlove"]).delayed(Duration::from_secs(10))),
    );

    let (a, b) = tokio::join!(o.orchestrate(job, request()), o.orchestrate(job, request()));

    let outcomes = [a, b];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_conflict()))
            .count(),
        1
    );
    assert_eq!(store.runs(job).len(), 1);
    assert_eq!(store.running_count(job), 0);
}

#[tokio::test]
async fn persistence_failure_marks_the_run_failed() {
    let job = Uuid::new_v4();
    let store = Arc::new(
        MemoryRunStore::new()
            .with_brand(bakery_brand(job))
            .failing_completion(),
    );
    let events = Arc::new(MemoryEventSink::new());
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let err = o.orchestrate(job, request()).await.unwrap_err();
    assert_eq!(err.code(), "DATABASE_ERROR");

    let runs = store.runs(job);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0]
        .summary
        .error
        .as_deref()
        .is_some_and(|e| e.contains("connection reset")));
    assert_eq!(store.running_count(job), 0);
    assert_eq!(events.count(EventCode::RunFailed), 1);
    assert_eq!(events.count(EventCode::RunCompleted), 0);
    assert!(store.competitors(job).is_empty());

    // The job is free again.
    let err = o.orchestrate(job, request()).await.unwrap_err();
    assert!(!err.is_conflict());
}

struct PanickingSearch;

#[async_trait]
impl AlgorithmicSearch for PanickingSearch {
    async fn search(&self, _seed: &str, _niche_hint: &str, _max: usize) -> anyhow::Result<Vec<String>> {
        panic!("similar-account index corrupted");
    }
}

#[tokio::test]
async fn panicking_pipeline_marks_the_run_failed() {
    let (job, store, events) = setup();
    let o = orchestrator(
        &store,
        &events,
        DiscoverySources::new().with_algorithmic(Arc::new(PanickingSearch)),
    );

    let err = o.orchestrate(job, request()).await.unwrap_err();
    assert!(matches!(&err, RivalScoutError::Pipeline(m) if m.contains("index corrupted")));

    let runs = store.runs(job);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert_eq!(store.running_count(job), 0);
    assert_eq!(events.count(EventCode::RunFailed), 1);
}

#[tokio::test]
async fn broken_event_sink_never_fails_a_run() {
    let job = Uuid::new_v4();
    let store = Arc::new(MemoryRunStore::new().with_brand(bakery_brand(job)));
    let events = Arc::new(MemoryEventSink::failing());
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let result = o.orchestrate(job, request()).await.unwrap();
    assert_eq!(store.runs(job)[0].status, RunStatus::Completed);
    assert_eq!(result.summary.sources_completed, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_hands_back_a_running_run() {
    let (job, store, events) = setup();
    let o = orchestrator(
        &store,
        &events,
        algorithmic_only(MockAlgorithmic::returning(&["ovenlove"]).delayed(Duration::from_secs(30))),
    );

    let outcome = o
        .orchestrate_with_deadline(job, request(), Duration::from_secs(5))
        .await
        .unwrap();
    let DeadlineOutcome::Running { run_id } = outcome else {
        panic!("expected the run to outlive the deadline");
    };
    assert_eq!(store.runs(job)[0].status, RunStatus::Running);

    tokio::time::sleep(Duration::from_secs(60)).await;

    let run = store.runs(job).into_iter().find(|r| r.id == run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    let shortlist = o.shortlist(job, Some(run_id)).await.unwrap();
    assert_eq!(shortlist.status, RunStatus::Completed);
}

#[tokio::test]
async fn quick_run_completes_within_the_deadline() {
    let (job, store, events) = setup();
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let outcome = o
        .orchestrate_with_deadline(job, request(), Duration::from_secs(30))
        .await
        .unwrap();
    match outcome {
        DeadlineOutcome::Completed(result) => {
            assert_eq!(store.runs(job)[0].id, result.run_id);
            assert_eq!(store.runs(job)[0].status, RunStatus::Completed);
        }
        DeadlineOutcome::Running { .. } => panic!("run should have finished"),
    }
}

#[tokio::test(start_paused = true)]
async fn background_task_can_be_polled_and_joined() {
    let (job, store, events) = setup();
    let o = orchestrator(
        &store,
        &events,
        algorithmic_only(MockAlgorithmic::returning(&["ovenlove"]).delayed(Duration::from_secs(20))),
    );

    let mut task = o.start_background(job, request()).await.unwrap();
    let run_id = task.run_id();
    assert!(!task.is_finished());
    assert!(task.wait(Duration::from_secs(1)).await.is_none());

    // A second start is refused while the task holds the job.
    assert!(matches!(
        o.start_background(job, request()).await,
        Err(e) if e.is_conflict()
    ));

    let result = task.join().await.unwrap();
    assert_eq!(result.run_id, run_id);
    assert_eq!(store.running_count(job), 0);
}

#[tokio::test(start_paused = true)]
async fn detached_task_runs_to_completion() {
    let (job, store, events) = setup();
    let o = orchestrator(
        &store,
        &events,
        algorithmic_only(MockAlgorithmic::returning(&["ovenlove"]).delayed(Duration::from_secs(20))),
    );

    let task = o.start_background(job, request()).await.unwrap();
    let run_id = task.run_id();
    task.detach();

    tokio::time::sleep(Duration::from_secs(60)).await;
    let run = store.runs(job).into_iter().find(|r| r.id == run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
}

#[tokio::test]
async fn shortlist_reads_back_the_latest_run() {
    let (job, store, events) = setup();
    let o = orchestrator(&store, &events, algorithmic_only(MockAlgorithmic::returning(&["ovenlove"])));

    let err = o.shortlist(job, None).await.unwrap_err();
    assert!(matches!(err, RivalScoutError::RunNotFound(id) if id == job));

    let result = o.orchestrate(job, request()).await.unwrap();
    let shortlist = o.shortlist(job, None).await.unwrap();
    assert_eq!(shortlist.run_id, result.run_id);
    assert_eq!(shortlist.summary, result.summary);
    let persisted = shortlist.top_picks.len() + shortlist.shortlist.len() + shortlist.filtered_out.len();
    assert_eq!(persisted, store.competitors(job).len());

    // A run id from another job is not visible here.
    let other = Uuid::new_v4();
    let err = o.shortlist(other, Some(result.run_id)).await.unwrap_err();
    assert!(matches!(err, RivalScoutError::RunNotFound(id) if id == result.run_id));
}
