//! End-to-end selection scenarios against the in-memory run store.
//!
//! The brand is a vegan bakery (`bakery_brand`). Scripted sources and
//! validators make every score deterministic, so the tests assert decisions
//! rather than exact floats.

use std::sync::Arc;

use uuid::Uuid;

use rivalscout_common::{
    BrandContext, DiscoveryPolicy, OrchestrateRequest, Platform, RunMode, SelectionState,
    SourceKind,
};
use rivalscout_discovery::scoring::Evaluation;
use rivalscout_discovery::selection::{DecisionTag, HardRejectReason};
use rivalscout_discovery::sources::DiscoverySources;
use rivalscout_discovery::testing::*;
use rivalscout_discovery::validation::ValidatorSet;
use rivalscout_discovery::{OrchestrationResult, Orchestrator};
use rivalscout_events::{EventCode, MemoryEventSink};

const BAKERY_AI_REASON: &str = "Vegan cakes and sourdough bakes for plant-based foodies";
const RYE_RIOT_BIO: &str = "Sourdough and pastry for plant-based foodies";

struct Harness {
    job: Uuid,
    brand: BrandContext,
    store: Arc<MemoryRunStore>,
    events: Arc<MemoryEventSink>,
}

impl Harness {
    fn new() -> Self {
        let job = Uuid::new_v4();
        let brand = bakery_brand(job);
        Self {
            job,
            store: Arc::new(MemoryRunStore::new().with_brand(brand.clone())),
            brand,
            events: Arc::new(MemoryEventSink::new()),
        }
    }

    fn orchestrator(&self, policy: DiscoveryPolicy) -> Orchestrator {
        Orchestrator::new(self.store.clone(), self.events.clone(), policy)
    }

    /// Direct search finds two bakeries; the AI adds one of them, the client
    /// itself and an unrelated cooking account. Only rye.riot has a bio.
    fn bakery_run(&self, policy: DiscoveryPolicy) -> Orchestrator {
        self.orchestrator(policy)
            .with_sources(bakery_sources())
            .with_validators(confirming_validators())
    }
}

fn bakery_sources() -> DiscoverySources {
    DiscoverySources::new()
        .with_algorithmic(Arc::new(MockAlgorithmic::returning(&[])))
        .with_direct(Arc::new(
            MockDirect::new().on(Platform::Instagram, &["ovenlove", "rye.riot"]),
        ))
        .with_ai(Arc::new(bakery_ai()))
}

fn bakery_ai() -> MockAi {
    MockAi::new()
        .suggest(Platform::Instagram, "ovenlove", 0.8, BAKERY_AI_REASON)
        .suggest(Platform::Instagram, "crumbco", 0.9, "The client's own account")
        .suggest(Platform::Instagram, "randomchef", 0.6, "Cooking videos and kitchen hacks")
}

fn confirming_validators() -> ValidatorSet {
    ValidatorSet::new().with_instagram(Arc::new(
        MockInstagramValidator::confirming(true, true, 0.8).with_bio_for("rye.riot", RYE_RIOT_BIO),
    ))
}

fn instagram(mode: RunMode, target: u32) -> OrchestrateRequest {
    OrchestrateRequest::new(mode, vec![Platform::Instagram], target)
}

fn eval<'a>(result: &'a OrchestrationResult, handle: &str) -> &'a Evaluation {
    result
        .evaluations
        .iter()
        .find(|e| e.candidate.handle == handle)
        .unwrap_or_else(|| panic!("no evaluation for {handle}"))
}

fn state_of(h: &Harness, handle: &str) -> Option<SelectionState> {
    h.store
        .competitor(h.job, Platform::Instagram, handle)
        .map(|c| c.selection_state)
}

#[tokio::test]
async fn bakery_run_partitions_candidates() {
    let h = Harness::new();
    let result = h
        .bakery_run(fast_policy())
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    let oven = eval(&result, "ovenlove");
    assert_eq!(oven.selection_state, SelectionState::TopPick);
    assert!(oven.total_score > 79.0 && oven.total_score < 80.0, "{}", oven.total_score);
    // Only the AI reasoning speaks to the niche; the search query does not.
    assert_eq!(oven.peer_overlap, 0.5);
    assert!(oven.candidate.sources.contains(&SourceKind::Direct));
    assert!(oven.candidate.sources.contains(&SourceKind::Ai));

    let rye = eval(&result, "rye.riot");
    assert_eq!(rye.selection_state, SelectionState::Shortlisted);
    assert!(rye.decision_reason.starts_with("Shortlisted on strong overlap"));

    let chef = eval(&result, "randomchef");
    assert_eq!(chef.selection_state, SelectionState::FilteredOut);
    assert!(chef.retained);
    assert!(chef.decision_reason.starts_with("Insufficient evidence"));

    let own = eval(&result, "crumbco");
    assert_eq!(own.hard_reject, Some(HardRejectReason::SelfAccount));
    assert_eq!(own.selection_state, SelectionState::FilteredOut);

    let s = &result.summary;
    assert_eq!(s.candidates_discovered, 4);
    assert_eq!(s.candidates_evaluated, 4);
    assert_eq!(s.top_picks, 1);
    assert_eq!(s.shortlisted, 1);
    assert_eq!(s.candidates_filtered, 2);
    assert_eq!(s.sources_completed, 4);
    assert_eq!(s.sources_failed, 0);
    assert_eq!(s.rejections.get("self_account"), Some(&1));
    assert!(!s.semantic_available);

    assert_eq!(result.persist_stats.inserted, 3);
    assert_eq!(state_of(&h, "ovenlove"), Some(SelectionState::TopPick));
    assert_eq!(state_of(&h, "rye.riot"), Some(SelectionState::Shortlisted));
    assert_eq!(state_of(&h, "randomchef"), Some(SelectionState::FilteredOut));
    assert_eq!(state_of(&h, "crumbco"), None);
}

#[tokio::test]
async fn evaluations_come_back_in_rank_order() {
    let h = Harness::new();
    let result = h
        .bakery_run(fast_policy())
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    let totals: Vec<f64> = result.evaluations.iter().map(|e| e.total_score).collect();
    assert!(totals.windows(2).all(|w| w[0] >= w[1]), "{totals:?}");
    let selected: Vec<_> = result.selected().map(|e| e.candidate.handle.as_str()).collect();
    assert_eq!(selected, vec!["ovenlove", "rye.riot"]);
}

#[tokio::test]
async fn corroborated_validated_candidate_is_shortlisted() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new()
                .with_algorithmic(Arc::new(MockAlgorithmic::returning(&["ovenlove"])))
                .with_direct(Arc::new(MockDirect::new().on(Platform::Instagram, &["ovenlove"]))),
        )
        .with_validators(ValidatorSet::new().with_instagram(Arc::new(
            MockInstagramValidator::confirming(true, true, 0.8).with_bio("Vegan cakes and sourdough bakes"),
        )));

    let request = instagram(RunMode::Append, 5)
        .with_sources(vec![SourceKind::Algorithmic, SourceKind::Direct]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    let oven = eval(&result, "ovenlove");
    assert!(oven.is_cross_source());
    assert!(oven.validated);
    assert!(oven.total_score >= 65.0 && oven.total_score < 78.0, "{}", oven.total_score);
    assert_eq!(oven.selection_state, SelectionState::Shortlisted);
    assert_eq!(oven.decision, DecisionTag::Standard);
}

#[tokio::test]
async fn selection_never_exceeds_target_count() {
    let handles = [
        "ovenlove",
        "rye.riot",
        "sourdoughsam",
        "flourpower",
        "proofedlondon",
        "doughdiary",
        "bunsandroses",
        "levainlab",
        "crustclub",
        "tartandtin",
        "yeastmode",
        "sweetrescue",
    ];
    let h = Harness::new();
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new().with_direct(Arc::new(MockDirect::new().on(Platform::Instagram, &handles))),
        )
        .with_validators(ValidatorSet::new().with_instagram(Arc::new(
            MockInstagramValidator::confirming(true, true, 0.8).with_bio("Vegan cakes and sourdough bakes"),
        )));

    let request = instagram(RunMode::Append, 5).with_sources(vec![SourceKind::Direct]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    assert_eq!(result.selected().count(), 5);
    assert_eq!(result.summary.candidates_filtered, 7);
    for e in result.evaluations.iter().filter(|e| !e.is_selected()) {
        assert!(
            e.decision_reason.contains("target of 5 is filled"),
            "{}: {}",
            e.candidate.handle,
            e.decision_reason
        );
    }
    // Qualifying overflow is kept for review.
    assert_eq!(h.store.competitors(h.job).len(), 12);
}

#[tokio::test]
async fn weak_pool_falls_back_to_exploratory_picks() {
    let h = Harness::new();
    let ai = MockAi::new()
        .suggest(Platform::Instagram, "chefalpha", 0.6, "Cooking videos")
        .suggest(Platform::Instagram, "chefbravo", 0.6, "Cooking videos")
        .suggest(Platform::Instagram, "chefcharlie", 0.6, "Cooking videos")
        .suggest(Platform::Instagram, "chefdelta", 0.6, "Cooking videos");
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(DiscoverySources::new().with_ai(Arc::new(ai)))
        .with_validators(confirming_validators());

    let request = instagram(RunMode::Append, 5).with_sources(vec![SourceKind::Ai]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    let exploratory: Vec<_> = result
        .selected()
        .inspect(|e| assert_eq!(e.decision, DecisionTag::Exploratory))
        .map(|e| e.candidate.handle.as_str())
        .collect();
    assert_eq!(exploratory, vec!["chefalpha", "chefbravo", "chefcharlie"]);
    assert_eq!(result.summary.exploratory_promotions, 3);
    assert_eq!(eval(&result, "chefdelta").selection_state, SelectionState::FilteredOut);
}

#[tokio::test]
async fn unvalidated_single_source_pool_selects_nothing() {
    let h = Harness::new();
    let ai = MockAi::new()
        .suggest(Platform::Instagram, "chefalpha", 0.6, "Cooking videos")
        .suggest(Platform::Instagram, "chefbravo", 0.6, "Cooking videos");
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(DiscoverySources::new().with_ai(Arc::new(ai)));

    let request = instagram(RunMode::Append, 5).with_sources(vec![SourceKind::Ai]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    assert_eq!(result.selected().count(), 0);
    assert_eq!(result.summary.top_picks, 0);
    assert_eq!(result.summary.shortlisted, 0);
    assert_eq!(result.summary.exploratory_promotions, 0);
    assert_eq!(result.summary.rejections.get("insufficient_evidence"), Some(&2));
    assert!(h.store.competitors(h.job).is_empty());
}

#[tokio::test]
async fn self_account_is_never_promoted_even_with_perfect_semantics() {
    let h = Harness::new();
    let ranker = Arc::new(MockRanker::new().score_all(1.0, 1.0, 1.0));
    let orchestrator = h.bakery_run(fast_policy()).with_ranker(ranker.clone());

    let result = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    let own = eval(&result, "crumbco");
    assert_eq!(own.hard_reject, Some(HardRejectReason::SelfAccount));
    assert_eq!(own.decision_reason, "Self account");
    assert!(!own.is_selected());
    assert!(result.summary.semantic_available);
    assert_eq!(h.events.count(EventCode::SemanticUnavailable), 0);
    assert_eq!(ranker.requests().len(), 1);
}

#[tokio::test]
async fn semantic_scores_lift_an_unconvincing_candidate() {
    let h = Harness::new();
    let ranker = MockRanker::new().score("instagram:randomchef", 0.95, 0.9, 0.95);
    let orchestrator = h.bakery_run(fast_policy()).with_ranker(Arc::new(ranker));

    let result = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    let chef = eval(&result, "randomchef");
    assert!(chef.ai_scores.is_some());
    assert!(chef.total_score > 48.75, "{}", chef.total_score);
    // Unscored candidates keep their heuristic components.
    assert!(eval(&result, "rye.riot").ai_scores.is_none());
}

#[tokio::test]
async fn failed_ranker_degrades_to_heuristics() {
    let h = Harness::new();
    let orchestrator = h.bakery_run(fast_policy()).with_ranker(Arc::new(MockRanker::failing()));

    let result = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    assert!(!result.summary.semantic_available);
    assert_eq!(h.events.count(EventCode::SemanticUnavailable), 1);
    assert_eq!(eval(&result, "ovenlove").selection_state, SelectionState::TopPick);
}

#[tokio::test]
async fn repeated_append_runs_are_idempotent() {
    let h = Harness::new();
    let orchestrator = h.bakery_run(fast_policy());

    orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();
    let before = h.store.competitors(h.job);

    let second = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();
    let after = h.store.competitors(h.job);

    assert_eq!(second.persist_stats.inserted, 0);
    assert_eq!(second.persist_stats.updated, 3);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        assert_eq!(b.handle, a.handle);
        assert_eq!(b.selection_state, a.selection_state);
        assert_eq!(b.relevance_score, a.relevance_score);
        assert_eq!(a.orchestration_run_id, Some(second.run_id));
    }
}

#[tokio::test]
async fn approved_rows_survive_later_runs() {
    let h = Harness::new();
    let orchestrator = h.bakery_run(fast_policy());
    orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();
    assert!(h
        .store
        .set_selection_state(h.job, Platform::Instagram, "rye.riot", SelectionState::Approved));

    let second = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    assert_eq!(second.persist_stats.approved_preserved, 1);
    assert_eq!(state_of(&h, "rye.riot"), Some(SelectionState::Approved));

    let shortlist = orchestrator.shortlist(h.job, None).await.unwrap();
    assert_eq!(shortlist.run_id, second.run_id);
    assert!(shortlist.shortlist.iter().any(|c| c.handle == "rye.riot"));
}

#[tokio::test]
async fn replace_sweeps_unapproved_rows_and_keeps_approved() {
    let h = Harness::new();
    let orchestrator = h.bakery_run(fast_policy());
    orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();
    h.store
        .set_selection_state(h.job, Platform::Instagram, "rye.riot", SelectionState::Approved);

    let replaced = orchestrator
        .orchestrate(h.job, instagram(RunMode::Replace, 5))
        .await
        .unwrap();

    let stats = &replaced.persist_stats;
    assert_eq!(stats.swept_to_rejected, 2);
    assert_eq!(stats.updated, 2);
    assert_eq!(stats.approved_preserved, 1);
    assert_eq!(stats.inserted, 0);
    assert_eq!(state_of(&h, "ovenlove"), Some(SelectionState::TopPick));
    assert_eq!(state_of(&h, "rye.riot"), Some(SelectionState::Approved));
    assert_eq!(state_of(&h, "randomchef"), Some(SelectionState::FilteredOut));
}

#[tokio::test]
async fn hard_reject_overrides_approval_only_in_replace_mode() {
    let mut blacklisting = fast_policy();
    blacklisting.hard_reject.universal_blacklist.push("riot".to_string());

    for (mode, expected) in [
        (RunMode::Append, SelectionState::Approved),
        (RunMode::Replace, SelectionState::Rejected),
    ] {
        let h = Harness::new();
        h.bakery_run(fast_policy())
            .orchestrate(h.job, instagram(RunMode::Append, 5))
            .await
            .unwrap();
        h.store
            .set_selection_state(h.job, Platform::Instagram, "rye.riot", SelectionState::Approved);

        let result = h
            .bakery_run(blacklisting.clone())
            .orchestrate(h.job, instagram(mode, 5))
            .await
            .unwrap();

        assert_eq!(
            eval(&result, "rye.riot").hard_reject,
            Some(HardRejectReason::Blacklisted)
        );
        assert_eq!(state_of(&h, "rye.riot"), Some(expected), "{mode}");
        let marked = u32::from(expected == SelectionState::Rejected);
        assert_eq!(result.persist_stats.hard_rejected_marked, marked, "{mode}");
    }
}

#[tokio::test]
async fn failing_source_does_not_change_the_outcome() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new()
                .with_algorithmic(Arc::new(MockAlgorithmic::failing("rate limited")))
                .with_direct(Arc::new(
                    MockDirect::new().on(Platform::Instagram, &["ovenlove", "rye.riot"]),
                ))
                .with_ai(Arc::new(bakery_ai())),
        )
        .with_validators(confirming_validators());

    let result = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    assert_eq!(result.summary.sources_failed, 1);
    assert_eq!(result.summary.sources_completed, 3);
    assert_eq!(h.events.count(EventCode::SourceFailed), 1);
    assert_eq!(eval(&result, "ovenlove").selection_state, SelectionState::TopPick);
    assert_eq!(eval(&result, "rye.riot").selection_state, SelectionState::Shortlisted);
}

#[tokio::test]
async fn requested_source_without_connector_counts_as_failed() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new()
                .with_direct(Arc::new(MockDirect::new().on(Platform::Instagram, &["ovenlove"]))),
        )
        .with_validators(confirming_validators());

    let result = orchestrator
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    // Algorithmic and AI are unconfigured; history has nothing yet.
    assert_eq!(result.summary.sources_failed, 2);
    assert_eq!(result.summary.sources_completed, 2);
    assert_eq!(h.events.count(EventCode::SourceFailed), 2);
}

#[tokio::test]
async fn ai_suggestions_are_cached_between_runs() {
    let h = Harness::new();
    let ai = Arc::new(bakery_ai());
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(DiscoverySources::new().with_ai(ai.clone()))
        .with_validators(confirming_validators());
    let request = instagram(RunMode::Append, 5).with_sources(vec![SourceKind::Ai]);

    let first = orchestrator.orchestrate(h.job, request.clone()).await.unwrap();
    let second = orchestrator.orchestrate(h.job, request).await.unwrap();

    assert_eq!(ai.calls(), 1);
    assert_eq!(
        first.summary.candidates_discovered,
        second.summary.candidates_discovered
    );
}

#[tokio::test]
async fn past_top_picks_reseed_sibling_jobs_of_the_same_client() {
    let job = Uuid::new_v4();
    let sibling = Uuid::new_v4();
    let brand = bakery_brand(job);
    let sibling_brand = BrandContext {
        research_job_id: sibling,
        ..brand.clone()
    };
    let h = Harness {
        job,
        store: Arc::new(MemoryRunStore::new().with_brand(brand.clone()).with_brand(sibling_brand)),
        brand,
        events: Arc::new(MemoryEventSink::new()),
    };
    h.bakery_run(fast_policy())
        .orchestrate(h.job, instagram(RunMode::Append, 5))
        .await
        .unwrap();

    let result = h
        .orchestrator(fast_policy())
        .orchestrate(
            sibling,
            instagram(RunMode::Append, 5).with_sources(vec![SourceKind::Historical]),
        )
        .await
        .unwrap();

    let oven = eval(&result, "ovenlove");
    assert!(oven.candidate.sources.contains(&SourceKind::Historical));
    assert!(oven.candidate.initial_score > 0.75);
    // Below the historical relevance floor.
    assert!(result.evaluations.iter().all(|e| e.candidate.handle != "rye.riot"));
    assert!(result.evaluations.iter().all(|e| e.candidate.handle != "randomchef"));
}

#[tokio::test]
async fn search_hits_without_outside_evidence_are_rejected() {
    let h = Harness::new();
    let request = instagram(RunMode::Append, 5);

    let direct = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new()
                .with_direct(Arc::new(MockDirect::new().on(Platform::Instagram, &["zzqxunrelated"]))),
        )
        .orchestrate(h.job, request.clone().with_sources(vec![SourceKind::Direct]))
        .await
        .unwrap();
    let algorithmic = h
        .orchestrator(fast_policy())
        .with_sources(
            DiscoverySources::new()
                .with_algorithmic(Arc::new(MockAlgorithmic::returning(&["zzqxunrelated"]))),
        )
        .orchestrate(h.job, request.with_sources(vec![SourceKind::Algorithmic]))
        .await
        .unwrap();

    for result in [&direct, &algorithmic] {
        let e = eval(result, "zzqxunrelated");
        assert_eq!(e.peer_overlap, 0.0);
        assert_eq!(e.rag_affinity, 0.0);
        assert_eq!(e.hard_reject, Some(HardRejectReason::InsufficientEvidence));
        // The provenance label is still recorded.
        assert_eq!(e.candidate.reasons.len(), 1);
    }
    assert!(direct.evaluations[0].candidate.reasons[0].starts_with("Matched search"));
}

#[tokio::test]
async fn failed_queries_keep_the_rest_of_the_source() {
    let h = Harness::new();
    let direct = Arc::new(
        MockDirect::new()
            .on(Platform::Instagram, &["ovenlove", "rye.riot"])
            .failing_on(Platform::TikTok, "quota exceeded"),
    );
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(DiscoverySources::new().with_direct(direct.clone()))
        .with_validators(confirming_validators());

    let request = OrchestrateRequest::new(RunMode::Append, vec![Platform::Instagram, Platform::TikTok], 5)
        .with_sources(vec![SourceKind::Direct]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    assert_eq!(direct.calls(), 6);
    assert_eq!(result.summary.sources_completed, 1);
    assert_eq!(result.summary.sources_failed, 0);
    assert_eq!(result.summary.candidates_discovered, 2);
    assert_eq!(eval(&result, "rye.riot").selection_state, SelectionState::Shortlisted);

    let completed: Vec<_> = h
        .events
        .events()
        .into_iter()
        .filter(|e| e.code == EventCode::SourceCompleted && e.source == "direct")
        .collect();
    assert_eq!(completed.len(), 1);
    let metrics = completed[0].metrics.as_ref().unwrap();
    assert_eq!(metrics["mentions"], 6);
    assert_eq!(metrics["failures"], 3);
    assert_eq!(h.events.count(EventCode::SourceFailed), 0);
}

#[tokio::test]
async fn source_fails_only_when_every_call_fails() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator(fast_policy())
        .with_sources(DiscoverySources::new().with_direct(Arc::new(
            MockDirect::new()
                .failing_on(Platform::Instagram, "quota exceeded")
                .failing_on(Platform::TikTok, "quota exceeded"),
        )));

    let request = OrchestrateRequest::new(RunMode::Append, vec![Platform::Instagram, Platform::TikTok], 5)
        .with_sources(vec![SourceKind::Direct]);
    let result = orchestrator.orchestrate(h.job, request).await.unwrap();

    assert_eq!(result.summary.sources_failed, 1);
    assert_eq!(result.summary.sources_completed, 0);
    assert_eq!(h.events.count(EventCode::SourceFailed), 1);
    assert_eq!(h.events.count(EventCode::SourceCompleted), 0);
}
