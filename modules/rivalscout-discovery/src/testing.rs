//! In-memory collaborators and fixtures for tests.
//!
//! `MemoryRunStore` mirrors the Postgres store's semantics (per-job mutex,
//! append/replace merge, APPROVED stickiness) so pipeline tests run without a
//! database.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use rivalscout_common::policy::StalenessPolicy;
use rivalscout_common::{
    BrandContext, Candidate, CandidateKey, ClientHandle, CompetitorStatus, DiscoveryPolicy,
    HistoricalCompetitor, OrchestrateRequest, OrchestrationRun, PersistPlan, PersistStats,
    PersistedCompetitor, Platform, Result, RivalScoutError, RunMode, RunStatus, RunSummary,
    SelectionState, SourceKind,
};

use crate::lifecycle::is_stale;
use crate::semantic::{SemanticRanker, SemanticRequest, SemanticScore};
use crate::sources::{
    AiSuggester, AiSuggestion, AlgorithmicSearch, DirectSearch, SearchHit, SuggestionContext,
    WebSearch,
};
use crate::store::{BeginOutcome, RunStore, STALE_REPLACED};
use crate::validation::{
    InstagramValidation, InstagramValidator, TikTokValidation, TikTokValidator,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn candidate(platform: Platform, handle: &str, sources: &[SourceKind]) -> Candidate {
    Candidate {
        platform,
        handle: handle.to_string(),
        sources: sources.iter().copied().collect::<BTreeSet<_>>(),
        initial_score: 0.55,
        reasons: Vec::new(),
        titles: Vec::new(),
        snippets: Vec::new(),
    }
}

/// A vegan bakery brand with an Instagram handle and a 20K follower baseline.
pub fn bakery_brand(research_job_id: Uuid) -> BrandContext {
    BrandContext {
        research_job_id,
        client_id: Some(Uuid::new_v4()),
        brand_name: "Crumb & Co".to_string(),
        niche: "vegan bakery".to_string(),
        description: Some("Plant-based cakes and sourdough from a small London bakery".to_string()),
        client_handles: vec![ClientHandle {
            platform: Platform::Instagram,
            handle: "crumbco".to_string(),
        }],
        business_keywords: vec!["cakes".into(), "sourdough".into(), "pastry".into()],
        audience_keywords: vec!["plant-based".into(), "foodies".into(), "dairy-free".into()],
        context_keywords: vec!["baking".into(), "recipes".into(), "bakes".into()],
        client_follower_count: Some(20_000),
    }
}

/// Default policy without the pause between validation batches.
pub fn fast_policy() -> DiscoveryPolicy {
    let mut policy = DiscoveryPolicy::default();
    policy.validation.inter_batch_delay_ms = 0;
    policy
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    brands: HashMap<Uuid, BrandContext>,
    history: Vec<HistoricalCompetitor>,
    runs: Vec<OrchestrationRun>,
    competitors: Vec<PersistedCompetitor>,
    fail_completion: bool,
    fail_history: bool,
}

#[derive(Default)]
pub struct MemoryRunStore {
    state: Mutex<MemoryState>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_brand(self, brand: BrandContext) -> Self {
        self.state
            .lock()
            .unwrap()
            .brands
            .insert(brand.research_job_id, brand);
        self
    }

    /// Extra history returned for any job that has a client id.
    pub fn with_history(self, history: Vec<HistoricalCompetitor>) -> Self {
        self.state.lock().unwrap().history.extend(history);
        self
    }

    /// `complete_run` fails without touching anything.
    pub fn failing_completion(self) -> Self {
        self.state.lock().unwrap().fail_completion = true;
        self
    }

    pub fn failing_history(self) -> Self {
        self.state.lock().unwrap().fail_history = true;
        self
    }

    /// Plant a RUNNING row whose last heartbeat was at `updated_at`.
    pub fn insert_running_run(
        &self,
        research_job_id: Uuid,
        summary: RunSummary,
        updated_at: DateTime<Utc>,
    ) -> Uuid {
        let run = OrchestrationRun {
            id: Uuid::new_v4(),
            research_job_id,
            mode: RunMode::Append,
            platforms: vec![Platform::Instagram],
            target_count: 5,
            status: RunStatus::Running,
            summary,
            started_at: updated_at,
            updated_at,
            completed_at: None,
        };
        let id = run.id;
        self.state.lock().unwrap().runs.push(run);
        id
    }

    /// Manual review override, as the review UI would apply it.
    pub fn set_selection_state(
        &self,
        research_job_id: Uuid,
        platform: Platform,
        handle: &str,
        selection_state: SelectionState,
    ) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.competitors.iter_mut().find(|c| {
            c.research_job_id == research_job_id && c.platform == platform && c.handle == handle
        }) {
            Some(row) => {
                row.selection_state = selection_state;
                row.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn competitors(&self, research_job_id: Uuid) -> Vec<PersistedCompetitor> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .competitors
            .iter()
            .filter(|c| c.research_job_id == research_job_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.platform.cmp(&b.platform).then_with(|| a.handle.cmp(&b.handle)));
        rows
    }

    pub fn competitor(&self, research_job_id: Uuid, platform: Platform, handle: &str) -> Option<PersistedCompetitor> {
        self.competitors(research_job_id)
            .into_iter()
            .find(|c| c.platform == platform && c.handle == handle)
    }

    pub fn runs(&self, research_job_id: Uuid) -> Vec<OrchestrationRun> {
        self.state
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.research_job_id == research_job_id)
            .cloned()
            .collect()
    }

    pub fn running_count(&self, research_job_id: Uuid) -> usize {
        self.runs(research_job_id)
            .iter()
            .filter(|r| r.status == RunStatus::Running)
            .count()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn load_brand_context(&self, research_job_id: Uuid) -> Result<Option<BrandContext>> {
        Ok(self.state.lock().unwrap().brands.get(&research_job_id).cloned())
    }

    async fn begin_run(
        &self,
        research_job_id: Uuid,
        request: &OrchestrateRequest,
        staleness: &StalenessPolicy,
    ) -> Result<BeginOutcome> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let mut replaced_run_id = None;
        if let Some(current) = state
            .runs
            .iter_mut()
            .find(|r| r.research_job_id == research_job_id && r.status == RunStatus::Running)
        {
            if !is_stale(current, now, staleness) {
                return Err(RivalScoutError::AlreadyRunning {
                    research_job_id,
                    run_id: current.id,
                });
            }
            current.status = RunStatus::Failed;
            current.summary.error = Some(STALE_REPLACED.to_string());
            current.completed_at = Some(now);
            current.updated_at = now;
            replaced_run_id = Some(current.id);
        }

        let run = OrchestrationRun {
            id: Uuid::new_v4(),
            research_job_id,
            mode: request.mode,
            platforms: request.platforms.clone(),
            target_count: request.target_count,
            status: RunStatus::Running,
            summary: RunSummary {
                replaced_run_id,
                ..Default::default()
            },
            started_at: now,
            updated_at: now,
            completed_at: None,
        };
        state.runs.push(run.clone());
        Ok(BeginOutcome {
            run,
            replaced_run_id,
        })
    }

    async fn record_progress(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
        {
            run.summary = summary.clone();
            run.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: Uuid,
        plan: &PersistPlan,
        summary: &RunSummary,
    ) -> Result<PersistStats> {
        let mut state = self.state.lock().unwrap();
        if state.fail_completion {
            return Err(RivalScoutError::Database("connection reset during commit".to_string()));
        }

        let run = state
            .runs
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
            .ok_or(RivalScoutError::RunNotFound(run_id))?;
        if run.status != RunStatus::Running {
            return Err(RivalScoutError::Pipeline(format!(
                "run {run_id} is {}, not RUNNING",
                run.status
            )));
        }

        let job = run.research_job_id;
        let now = Utc::now();
        let mut stats = PersistStats::default();

        if run.mode == RunMode::Replace {
            for row in state.competitors.iter_mut().filter(|c| c.research_job_id == job) {
                if !matches!(row.selection_state, SelectionState::Approved | SelectionState::Rejected) {
                    row.selection_state = SelectionState::Rejected;
                    row.updated_at = now;
                    stats.swept_to_rejected += 1;
                }
            }
        }

        for upsert in &plan.upserts {
            let existing = state.competitors.iter_mut().find(|c| {
                c.research_job_id == job && c.platform == upsert.platform && c.handle == upsert.handle
            });
            match existing {
                Some(row) => {
                    if row.selection_state == SelectionState::Approved
                        && upsert.selection_state != SelectionState::Approved
                    {
                        stats.approved_preserved += 1;
                    } else {
                        row.selection_state = upsert.selection_state;
                        stats.updated += 1;
                    }
                    row.relevance_score = upsert.relevance_score;
                    row.score_breakdown = upsert.score_breakdown.clone();
                    row.evidence = upsert.evidence.clone();
                    row.discovery_reason = Some(upsert.discovery_reason.clone());
                    row.orchestration_run_id = Some(run_id);
                    row.updated_at = now;
                }
                None => {
                    state.competitors.push(PersistedCompetitor {
                        id: Uuid::new_v4(),
                        research_job_id: job,
                        platform: upsert.platform,
                        handle: upsert.handle.clone(),
                        selection_state: upsert.selection_state,
                        status: CompetitorStatus::Suggested,
                        relevance_score: upsert.relevance_score,
                        score_breakdown: upsert.score_breakdown.clone(),
                        evidence: upsert.evidence.clone(),
                        discovery_reason: Some(upsert.discovery_reason.clone()),
                        orchestration_run_id: Some(run_id),
                        updated_at: now,
                    });
                    stats.inserted += 1;
                }
            }
        }

        let hard_rejected: HashSet<&CandidateKey> = plan.hard_rejected.iter().collect();
        for row in state.competitors.iter_mut().filter(|c| c.research_job_id == job) {
            if !hard_rejected.contains(&row.key()) || row.selection_state == SelectionState::Rejected {
                continue;
            }
            if row.selection_state == SelectionState::Approved && run.mode != RunMode::Replace {
                continue;
            }
            row.selection_state = SelectionState::Rejected;
            row.orchestration_run_id = Some(run_id);
            row.updated_at = now;
            stats.hard_rejected_marked += 1;
        }

        if let Some(run) = state.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = RunStatus::Completed;
            run.summary = summary.clone();
            run.completed_at = Some(now);
            run.updated_at = now;
        }
        Ok(stats)
    }

    async fn fail_run(&self, run_id: Uuid, summary: &RunSummary) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(run) = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id && r.status == RunStatus::Running)
        {
            let now = Utc::now();
            run.status = RunStatus::Failed;
            run.summary = summary.clone();
            run.completed_at = Some(now);
            run.updated_at = now;
        }
        Ok(())
    }

    async fn find_run(&self, run_id: Uuid) -> Result<Option<OrchestrationRun>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == run_id)
            .cloned())
    }

    async fn latest_run(&self, research_job_id: Uuid) -> Result<Option<OrchestrationRun>> {
        // `max_by_key` keeps the last maximum, so later inserts win ties.
        Ok(self
            .state
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.research_job_id == research_job_id)
            .max_by_key(|r| r.started_at)
            .cloned())
    }

    async fn competitors_for_run(
        &self,
        research_job_id: Uuid,
        run_id: Uuid,
    ) -> Result<Vec<PersistedCompetitor>> {
        let mut rows: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .competitors
            .iter()
            .filter(|c| c.research_job_id == research_job_id)
            .filter(|c| {
                c.orchestration_run_id == Some(run_id)
                    || c.selection_state == SelectionState::Approved
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        Ok(rows)
    }

    async fn historical_competitors(
        &self,
        client_id: Uuid,
        exclude_job_id: Uuid,
        min_relevance: f64,
    ) -> Result<Vec<HistoricalCompetitor>> {
        let state = self.state.lock().unwrap();
        if state.fail_history {
            return Err(RivalScoutError::Database("history query timed out".to_string()));
        }

        let client_jobs: HashSet<Uuid> = state
            .brands
            .values()
            .filter(|b| b.client_id == Some(client_id) && b.research_job_id != exclude_job_id)
            .map(|b| b.research_job_id)
            .collect();

        let mut best: HashMap<CandidateKey, HistoricalCompetitor> = HashMap::new();
        let recorded = state
            .competitors
            .iter()
            .filter(|c| client_jobs.contains(&c.research_job_id))
            .filter(|c| {
                matches!(
                    c.selection_state,
                    SelectionState::TopPick | SelectionState::Shortlisted | SelectionState::Approved
                )
            })
            .map(|c| HistoricalCompetitor {
                platform: c.platform,
                handle: c.handle.clone(),
                relevance_score: c.relevance_score,
                discovery_reason: c.discovery_reason.clone(),
            });

        for h in recorded.chain(state.history.iter().cloned()) {
            if h.relevance_score < min_relevance {
                continue;
            }
            let key = CandidateKey::new(h.platform, h.handle.clone());
            match best.get(&key) {
                Some(existing) if existing.relevance_score >= h.relevance_score => {}
                _ => {
                    best.insert(key, h);
                }
            }
        }

        let mut history: Vec<_> = best.into_values().collect();
        history.sort_by(|a, b| a.platform.cmp(&b.platform).then_with(|| a.handle.cmp(&b.handle)));
        Ok(history)
    }
}

// ---------------------------------------------------------------------------
// Scripted discovery sources
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    results: Vec<String>,
    by_platform: HashMap<Platform, Vec<String>>,
    error: Option<String>,
    failing_platforms: HashMap<Platform, String>,
    delay: Option<Duration>,
    calls: Mutex<u32>,
}

impl Script {
    async fn play(&self, platform: Option<Platform>, max_results: usize) -> anyhow::Result<Vec<String>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.error {
            bail!("{error}");
        }
        if let Some(error) = platform.and_then(|p| self.failing_platforms.get(&p)) {
            bail!("{error}");
        }
        let results = platform
            .and_then(|p| self.by_platform.get(&p))
            .unwrap_or(&self.results);
        Ok(results.iter().take(max_results).cloned().collect())
    }
}

/// Similar-account search returning a fixed list.
#[derive(Default)]
pub struct MockAlgorithmic {
    script: Script,
}

impl MockAlgorithmic {
    pub fn returning(handles: &[&str]) -> Self {
        Self {
            script: Script {
                results: handles.iter().map(|h| h.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            script: Script {
                error: Some(error.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        *self.script.calls.lock().unwrap()
    }
}

#[async_trait]
impl AlgorithmicSearch for MockAlgorithmic {
    async fn search(&self, _seed: &str, _niche_hint: &str, max_results: usize) -> anyhow::Result<Vec<String>> {
        self.script.play(None, max_results).await
    }
}

/// Query search with per-platform answers. Every query gets the same answer.
#[derive(Default)]
pub struct MockDirect {
    script: Script,
}

impl MockDirect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, platform: Platform, handles: &[&str]) -> Self {
        self.script
            .by_platform
            .insert(platform, handles.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn failing(error: &str) -> Self {
        Self {
            script: Script {
                error: Some(error.to_string()),
                ..Default::default()
            },
        }
    }

    /// Every query for `platform` errors; other platforms answer normally.
    pub fn failing_on(mut self, platform: Platform, error: &str) -> Self {
        self.script.failing_platforms.insert(platform, error.to_string());
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.script.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        *self.script.calls.lock().unwrap()
    }
}

#[async_trait]
impl DirectSearch for MockDirect {
    async fn search(&self, _query: &str, platform: Platform, max_results: usize) -> anyhow::Result<Vec<String>> {
        self.script.play(Some(platform), max_results).await
    }
}

#[derive(Default)]
pub struct MockAi {
    suggestions: Vec<AiSuggestion>,
    error: Option<String>,
    calls: Mutex<u32>,
}

impl MockAi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn suggest(mut self, platform: Platform, handle: &str, relevance_score: f64, reasoning: &str) -> Self {
        self.suggestions.push(AiSuggestion {
            handle: handle.to_string(),
            platform,
            reasoning: reasoning.to_string(),
            relevance_score,
            competitor_type: None,
        });
        self
    }

    pub fn failing(error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl AiSuggester for MockAi {
    async fn suggest(
        &self,
        _brand: &str,
        _niche: &str,
        context: &SuggestionContext,
    ) -> anyhow::Result<Vec<AiSuggestion>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(error) = &self.error {
            bail!("{error}");
        }
        Ok(self
            .suggestions
            .iter()
            .filter(|s| s.platform == context.platform)
            .take(context.count)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Validators
// ---------------------------------------------------------------------------

pub struct MockInstagramValidator {
    default: InstagramValidation,
    profiles: HashMap<String, InstagramValidation>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockInstagramValidator {
    /// Every handle exists with the given activity, relevance and confidence.
    pub fn confirming(active: bool, relevant: bool, confidence: f64) -> Self {
        Self {
            default: InstagramValidation {
                is_valid: true,
                exists: true,
                is_active: Some(active),
                is_relevant: Some(relevant),
                confidence_score: confidence,
                follower_estimate: None,
                bio: None,
            },
            profiles: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every handle is confidently missing.
    pub fn not_found() -> Self {
        let mut v = Self::confirming(false, false, 0.9);
        v.default.is_valid = false;
        v.default.exists = false;
        v.default.is_active = None;
        v.default.is_relevant = None;
        v
    }

    pub fn with_followers(mut self, followers: u64) -> Self {
        self.default.follower_estimate = Some(followers);
        self
    }

    pub fn with_bio(mut self, bio: &str) -> Self {
        self.default.bio = Some(bio.to_string());
        self
    }

    /// Same answer as the default, with `bio` for this one handle.
    pub fn with_bio_for(mut self, handle: &str, bio: &str) -> Self {
        let mut profile = self.default.clone();
        profile.bio = Some(bio.to_string());
        self.profiles.insert(handle.to_string(), profile);
        self
    }

    pub fn with_profile(mut self, handle: &str, validation: InstagramValidation) -> Self {
        self.profiles.insert(handle.to_string(), validation);
        self
    }

    pub fn failing_for(mut self, handle: &str) -> Self {
        self.failing.insert(handle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl InstagramValidator for MockInstagramValidator {
    async fn validate(
        &self,
        handle: &str,
        _niche: &str,
        _target_handle: Option<&str>,
    ) -> anyhow::Result<InstagramValidation> {
        self.calls.lock().unwrap().push(handle.to_string());
        if self.failing.contains(handle) {
            bail!("profile scrape failed for {handle}");
        }
        Ok(self
            .profiles
            .get(handle)
            .cloned()
            .unwrap_or_else(|| self.default.clone()))
    }
}

pub struct MockTikTokValidator {
    default: TikTokValidation,
    slow: HashMap<String, Duration>,
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl MockTikTokValidator {
    pub fn valid(confidence: f64) -> Self {
        Self {
            default: TikTokValidation {
                is_valid: true,
                confidence,
                reason: "referenced in search results".to_string(),
                follower_estimate: None,
            },
            slow: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn invalid() -> Self {
        let mut v = Self::valid(0.2);
        v.default.is_valid = false;
        v.default.reason = "no references found".to_string();
        v
    }

    pub fn slow_for(mut self, handle: &str, delay: Duration) -> Self {
        self.slow.insert(handle.to_string(), delay);
        self
    }

    pub fn failing_for(mut self, handle: &str) -> Self {
        self.failing.insert(handle.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TikTokValidator for MockTikTokValidator {
    async fn validate(&self, handle: &str) -> anyhow::Result<TikTokValidation> {
        self.calls.lock().unwrap().push(handle.to_string());
        if let Some(delay) = self.slow.get(handle) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(handle) {
            bail!("search presence lookup failed for {handle}");
        }
        Ok(self.default.clone())
    }
}

// ---------------------------------------------------------------------------
// Semantic ranker
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockRanker {
    scores: Vec<SemanticScore>,
    /// Applied to every requested candidate without an explicit score.
    fallback: Option<(f64, f64, f64)>,
    delay: Option<Duration>,
    error: Option<String>,
    requests: Mutex<Vec<SemanticRequest>>,
}

impl MockRanker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(mut self, key: &str, offer: f64, audience: f64, niche: f64) -> Self {
        self.scores.push(SemanticScore {
            key: key.to_string(),
            offer_overlap: offer,
            audience_overlap: audience,
            niche_semantic_match: niche,
            explanation: "scripted".to_string(),
        });
        self
    }

    pub fn score_all(mut self, offer: f64, audience: f64, niche: f64) -> Self {
        self.fallback = Some((offer, audience, niche));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing() -> Self {
        Self {
            error: Some("model overloaded".to_string()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<SemanticRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticRanker for MockRanker {
    async fn rank(&self, request: &SemanticRequest) -> anyhow::Result<Vec<SemanticScore>> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.error {
            bail!("{error}");
        }

        let mut out = self.scores.clone();
        if let Some((offer, audience, niche)) = self.fallback {
            for c in &request.candidates {
                if out.iter().any(|s| s.key == c.key) {
                    continue;
                }
                out.push(SemanticScore {
                    key: c.key.clone(),
                    offer_overlap: offer,
                    audience_overlap: audience,
                    niche_semantic_match: niche,
                    explanation: "scripted".to_string(),
                });
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Web search
// ---------------------------------------------------------------------------

/// Answers a query with the hits of the first registered substring it contains.
#[derive(Default)]
pub struct MockWebSearch {
    routes: Vec<(String, Vec<SearchHit>)>,
    failing: bool,
    queries: Mutex<Vec<String>>,
}

impl MockWebSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, contains: &str, hits: Vec<SearchHit>) -> Self {
        self.routes.push((contains.to_string(), hits));
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for MockWebSearch {
    async fn search(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<SearchHit>> {
        self.queries.lock().unwrap().push(query.to_string());
        if self.failing {
            bail!("search quota exhausted");
        }
        Ok(self
            .routes
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
            .map(|(_, hits)| hits.iter().take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}
