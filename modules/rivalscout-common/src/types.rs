use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RivalScoutError;

// --- Platforms & provenance ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    #[serde(rename = "tiktok")]
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 2] = [Platform::Instagram, Platform::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::TikTok => "tiktok",
        }
    }

    /// Host fragment used to recognise profile links for this platform.
    pub fn host(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram.com",
            Platform::TikTok => "tiktok.com",
        }
    }

    /// Canonical profile URL for a normalized handle.
    pub fn profile_url(&self, handle: &str) -> String {
        match self {
            Platform::Instagram => format!("https://www.instagram.com/{handle}/"),
            Platform::TikTok => format!("https://www.tiktok.com/@{handle}"),
        }
    }

    /// Infer the platform from a profile URL or host-bearing string.
    pub fn from_url(raw: &str) -> Option<Platform> {
        let lower = raw.to_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| lower.contains(p.host()))
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "instagram" | "ig" => Ok(Platform::Instagram),
            "tiktok" | "tik_tok" | "tt" => Ok(Platform::TikTok),
            other => Err(RivalScoutError::InvalidRequest(format!(
                "unsupported platform '{other}'"
            ))),
        }
    }
}

/// Which discovery method produced a candidate mention.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Algorithmic,
    Direct,
    Ai,
    /// Competitors previously confirmed for the same client.
    Historical,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Algorithmic,
        SourceKind::Direct,
        SourceKind::Ai,
        SourceKind::Historical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Algorithmic => "algorithmic",
            SourceKind::Direct => "direct",
            SourceKind::Ai => "ai",
            SourceKind::Historical => "historical",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "algorithmic" => Ok(SourceKind::Algorithmic),
            "direct" => Ok(SourceKind::Direct),
            "ai" => Ok(SourceKind::Ai),
            "historical" => Ok(SourceKind::Historical),
            other => Err(RivalScoutError::InvalidRequest(format!(
                "unknown discovery source '{other}'"
            ))),
        }
    }
}

// --- Run enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Append,
    Replace,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Append => "append",
            RunMode::Replace => "replace",
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunMode {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(RunMode::Append),
            "replace" => Ok(RunMode::Replace),
            other => Err(RivalScoutError::InvalidRequest(format!(
                "mode must be 'append' or 'replace', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(RunStatus::Running),
            "COMPLETED" => Ok(RunStatus::Completed),
            "FAILED" => Ok(RunStatus::Failed),
            other => Err(RivalScoutError::Database(format!(
                "unknown run status '{other}'"
            ))),
        }
    }
}

/// Pipeline phase recorded in the run summary. Drives the staleness window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Started,
    Collecting,
    Validating,
    Ranking,
    Scoring,
    Persisting,
    Finished,
}

impl RunPhase {
    /// Early phases get a shorter staleness window when no progress was recorded.
    pub fn is_early(&self) -> bool {
        matches!(self, RunPhase::Started | RunPhase::Collecting)
    }
}

// --- Competitor decision states ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectionState {
    TopPick,
    Shortlisted,
    /// Manual override. Sticky across append-mode runs.
    Approved,
    FilteredOut,
    Rejected,
}

impl SelectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionState::TopPick => "TOP_PICK",
            SelectionState::Shortlisted => "SHORTLISTED",
            SelectionState::Approved => "APPROVED",
            SelectionState::FilteredOut => "FILTERED_OUT",
            SelectionState::Rejected => "REJECTED",
        }
    }

    pub fn is_selected(&self) -> bool {
        matches!(self, SelectionState::TopPick | SelectionState::Shortlisted)
    }
}

impl std::fmt::Display for SelectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionState {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TOP_PICK" => Ok(SelectionState::TopPick),
            "SHORTLISTED" => Ok(SelectionState::Shortlisted),
            "APPROVED" => Ok(SelectionState::Approved),
            "FILTERED_OUT" => Ok(SelectionState::FilteredOut),
            "REJECTED" => Ok(SelectionState::Rejected),
            other => Err(RivalScoutError::Database(format!(
                "unknown selection state '{other}'"
            ))),
        }
    }
}

/// Downstream scraping lifecycle of a persisted competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitorStatus {
    Suggested,
    Scraping,
    Scraped,
    Confirmed,
    Failed,
    Rejected,
}

impl CompetitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitorStatus::Suggested => "SUGGESTED",
            CompetitorStatus::Scraping => "SCRAPING",
            CompetitorStatus::Scraped => "SCRAPED",
            CompetitorStatus::Confirmed => "CONFIRMED",
            CompetitorStatus::Failed => "FAILED",
            CompetitorStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for CompetitorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompetitorStatus {
    type Err = RivalScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUGGESTED" => Ok(CompetitorStatus::Suggested),
            "SCRAPING" => Ok(CompetitorStatus::Scraping),
            "SCRAPED" => Ok(CompetitorStatus::Scraped),
            "CONFIRMED" => Ok(CompetitorStatus::Confirmed),
            "FAILED" => Ok(CompetitorStatus::Failed),
            "REJECTED" => Ok(CompetitorStatus::Rejected),
            other => Err(RivalScoutError::Database(format!(
                "unknown competitor status '{other}'"
            ))),
        }
    }
}

// --- Candidates ---

/// Normalized identity of a candidate: `(platform, handle)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateKey {
    pub platform: Platform,
    pub handle: String,
}

impl CandidateKey {
    pub fn new(platform: Platform, handle: impl Into<String>) -> Self {
        Self {
            platform,
            handle: handle.into(),
        }
    }
}

impl std::fmt::Display for CandidateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.handle)
    }
}

/// A deduplicated, provenance-tagged candidate produced by aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub platform: Platform,
    pub handle: String,
    pub sources: BTreeSet<SourceKind>,
    /// 0.0-1.0, max over all mentions.
    pub initial_score: f64,
    /// How the engine came across the handle. Provenance only, never scored.
    pub reasons: Vec<String>,
    /// Search result titles naming the account.
    pub titles: Vec<String>,
    /// Descriptive text from outside the engine, such as AI reasoning.
    pub snippets: Vec<String>,
}

impl Candidate {
    pub fn key(&self) -> CandidateKey {
        CandidateKey::new(self.platform, self.handle.clone())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}

// --- Brand context ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientHandle {
    pub platform: Platform,
    pub handle: String,
}

/// Everything the engine knows about the client brand behind a research job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandContext {
    pub research_job_id: Uuid,
    pub client_id: Option<Uuid>,
    pub brand_name: String,
    pub niche: String,
    pub description: Option<String>,
    pub client_handles: Vec<ClientHandle>,
    pub business_keywords: Vec<String>,
    pub audience_keywords: Vec<String>,
    /// Peer-context keywords beyond the niche itself (products, formats, themes).
    pub context_keywords: Vec<String>,
    pub client_follower_count: Option<u64>,
}

impl BrandContext {
    pub fn client_handle_for(&self, platform: Platform) -> Option<&str> {
        self.client_handles
            .iter()
            .find(|h| h.platform == platform)
            .map(|h| h.handle.as_str())
    }
}

/// A competitor previously recorded with high confidence for the same client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalCompetitor {
    pub platform: Platform,
    pub handle: String,
    /// 0-100 relevance from the earlier run.
    pub relevance_score: f64,
    pub discovery_reason: Option<String>,
}

// --- Orchestration request & run ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrateRequest {
    pub mode: RunMode,
    pub platforms: Vec<Platform>,
    pub target_count: u32,
    pub sources: Vec<SourceKind>,
}

pub const MIN_TARGET_COUNT: u32 = 5;
pub const MAX_TARGET_COUNT: u32 = 10;

impl OrchestrateRequest {
    pub fn new(mode: RunMode, platforms: Vec<Platform>, target_count: u32) -> Self {
        Self {
            mode,
            platforms,
            target_count,
            sources: SourceKind::ALL.to_vec(),
        }
    }

    pub fn with_sources(mut self, sources: Vec<SourceKind>) -> Self {
        self.sources = sources;
        self
    }

    /// Reject malformed requests before any work begins.
    pub fn validate(&self) -> Result<(), RivalScoutError> {
        if !(MIN_TARGET_COUNT..=MAX_TARGET_COUNT).contains(&self.target_count) {
            return Err(RivalScoutError::InvalidRequest(format!(
                "targetCount must be between {MIN_TARGET_COUNT} and {MAX_TARGET_COUNT}, got {}",
                self.target_count
            )));
        }
        if self.platforms.is_empty() {
            return Err(RivalScoutError::InvalidRequest(
                "at least one platform is required".to_string(),
            ));
        }
        let unique: BTreeSet<_> = self.platforms.iter().collect();
        if unique.len() != self.platforms.len() {
            return Err(RivalScoutError::InvalidRequest(
                "platforms must not contain duplicates".to_string(),
            ));
        }
        if self.sources.is_empty() {
            return Err(RivalScoutError::InvalidRequest(
                "at least one discovery source is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wants(&self, source: SourceKind) -> bool {
        self.sources.contains(&source)
    }
}

/// Progress counters and final tallies for a run. Stored as JSON on the run row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSummary {
    pub phase: RunPhase,
    pub candidates_discovered: u32,
    pub candidates_evaluated: u32,
    pub candidates_filtered: u32,
    pub shortlisted: u32,
    pub top_picks: u32,
    pub coverage_promotions: u32,
    pub exploratory_promotions: u32,
    pub sources_completed: u32,
    pub sources_failed: u32,
    pub candidates_validated: u32,
    pub validation_degraded: u32,
    pub semantic_available: bool,
    pub rejections: BTreeMap<String, u32>,
    pub error: Option<String>,
    pub replaced_run_id: Option<Uuid>,
}

impl RunSummary {
    /// True once any work beyond starting has been recorded.
    pub fn has_progress(&self) -> bool {
        self.sources_completed > 0
            || self.sources_failed > 0
            || self.candidates_discovered > 0
            || self.candidates_validated > 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationRun {
    pub id: Uuid,
    pub research_job_id: Uuid,
    pub mode: RunMode,
    pub platforms: Vec<Platform>,
    pub target_count: u32,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub started_at: DateTime<Utc>,
    /// Heartbeat, bumped on every progress write.
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

// --- Persisted competitors ---

/// The durable record downstream consumers read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCompetitor {
    pub id: Uuid,
    pub research_job_id: Uuid,
    pub platform: Platform,
    pub handle: String,
    pub selection_state: SelectionState,
    pub status: CompetitorStatus,
    pub relevance_score: f64,
    pub score_breakdown: serde_json::Value,
    pub evidence: serde_json::Value,
    pub discovery_reason: Option<String>,
    pub orchestration_run_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedCompetitor {
    pub fn key(&self) -> CandidateKey {
        CandidateKey::new(self.platform, self.handle.clone())
    }
}

/// One row the lifecycle manager writes for an evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorUpsert {
    pub platform: Platform,
    pub handle: String,
    pub selection_state: SelectionState,
    pub relevance_score: f64,
    pub score_breakdown: serde_json::Value,
    pub evidence: serde_json::Value,
    pub discovery_reason: String,
}

impl CompetitorUpsert {
    pub fn key(&self) -> CandidateKey {
        CandidateKey::new(self.platform, self.handle.clone())
    }
}

/// Everything a completed run writes to the competitor table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistPlan {
    pub upserts: Vec<CompetitorUpsert>,
    /// Hard-rejected this run. Existing rows for these keys are marked REJECTED
    /// (APPROVED rows only in replace mode).
    pub hard_rejected: Vec<CandidateKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistStats {
    pub inserted: u32,
    pub updated: u32,
    pub approved_preserved: u32,
    pub swept_to_rejected: u32,
    pub hard_rejected_marked: u32,
}

/// Read-back view of a run's decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortlist {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub summary: RunSummary,
    pub top_picks: Vec<PersistedCompetitor>,
    pub shortlist: Vec<PersistedCompetitor>,
    pub filtered_out: Vec<PersistedCompetitor>,
}

impl Shortlist {
    /// Partition persisted rows into the three review buckets, best first.
    pub fn from_rows(run: &OrchestrationRun, mut rows: Vec<PersistedCompetitor>) -> Self {
        rows.sort_by(|a, b| {
            b.relevance_score
                .total_cmp(&a.relevance_score)
                .then_with(|| a.handle.cmp(&b.handle))
        });

        let mut top_picks = Vec::new();
        let mut shortlist = Vec::new();
        let mut filtered_out = Vec::new();
        for row in rows {
            match row.selection_state {
                SelectionState::TopPick => top_picks.push(row),
                SelectionState::Shortlisted | SelectionState::Approved => shortlist.push(row),
                SelectionState::FilteredOut => filtered_out.push(row),
                SelectionState::Rejected => {}
            }
        }

        Self {
            run_id: run.id,
            status: run.status,
            summary: run.summary.clone(),
            top_picks,
            shortlist,
            filtered_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(target_count: u32) -> OrchestrateRequest {
        OrchestrateRequest::new(RunMode::Append, vec![Platform::Instagram], target_count)
    }

    #[test]
    fn target_count_outside_range_is_rejected() {
        assert!(request(4).validate().is_err());
        assert!(request(11).validate().is_err());
        assert!(request(5).validate().is_ok());
        assert!(request(10).validate().is_ok());
    }

    #[test]
    fn duplicate_platforms_are_rejected() {
        let mut req = request(6);
        req.platforms = vec![Platform::TikTok, Platform::TikTok];
        let err = req.validate().unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }

    #[test]
    fn empty_sources_are_rejected() {
        let req = request(6).with_sources(vec![]);
        assert!(req.validate().is_err());
    }

    #[test]
    fn platform_parses_aliases_and_urls() {
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert_eq!("ig".parse::<Platform>().unwrap(), Platform::Instagram);
        assert!("myspace".parse::<Platform>().is_err());
        assert_eq!(
            Platform::from_url("https://www.tiktok.com/@someone"),
            Some(Platform::TikTok)
        );
        assert_eq!(Platform::from_url("@someone"), None);
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = RunSummary {
            top_picks: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["topPicks"], 2);
        assert_eq!(json["phase"], "started");
    }

    #[test]
    fn summary_tolerates_missing_fields() {
        let summary: RunSummary = serde_json::from_str(r#"{"shortlisted": 3}"#).unwrap();
        assert_eq!(summary.shortlisted, 3);
        assert_eq!(summary.phase, RunPhase::Started);
    }
}
