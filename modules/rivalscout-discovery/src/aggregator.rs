//! Candidate aggregation: raw mentions from every discovery source are
//! normalized, quality-filtered and merged into one deduplicated pool.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use rivalscout_common::policy::AggregationPolicy;
use rivalscout_common::{Candidate, CandidateKey, Platform, SourceKind};

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\w.@])@([A-Za-z0-9_.]{1,30})").expect("valid regex"));
static INSTAGRAM_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)instagram\.com/([A-Za-z0-9_.]{1,30})").expect("valid regex")
});
static TIKTOK_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)tiktok\.com/@([A-Za-z0-9_.]{1,30})").expect("valid regex"));
static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*([kmb])?").expect("valid regex"));
static FOLLOWERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?\s*[kmb]?)\s+followers").expect("valid regex")
});

/// Path segments that look like handles in profile links but are not accounts.
const LINK_PATH_SKIP: &[&str] = &[
    "p", "explore", "reel", "reels", "stories", "tv", "accounts", "tags", "tag", "discover",
    "music", "video",
];

// ---------------------------------------------------------------------------
// Raw mentions
// ---------------------------------------------------------------------------

/// One sighting of a possible competitor from one source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMention {
    /// As produced by the source: bare handle, `@handle` or profile URL.
    pub handle: String,
    pub platform_hint: Option<Platform>,
    pub source: SourceKind,
    /// Provenance label written by the source.
    pub reason: String,
    pub title: Option<String>,
    /// Text describing the account that did not come from the engine itself.
    pub snippet: Option<String>,
    /// 0.0-1.0. Falls back to the source's base score when absent.
    pub explicit_score: Option<f64>,
}

impl RawMention {
    pub fn new(handle: impl Into<String>, source: SourceKind, reason: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            platform_hint: None,
            source,
            reason: reason.into(),
            title: None,
            snippet: None,
            explicit_score: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform_hint = Some(platform);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.explicit_score = Some(score.clamp(0.0, 1.0));
        self
    }

    /// A platform named by the raw value's URL wins over the hint.
    pub fn resolve_platform(&self) -> Option<Platform> {
        Platform::from_url(&self.handle).or(self.platform_hint)
    }
}

/// Why a mention never made it into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleRejection {
    TooShort,
    TooLong,
    InvalidCharacters,
    NumericOnly,
    ReservedToken,
    LowSignal,
    GenericAccount,
    UnknownPlatform,
    PlatformNotRequested,
    PoolCapExceeded,
}

impl HandleRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleRejection::TooShort => "too_short",
            HandleRejection::TooLong => "too_long",
            HandleRejection::InvalidCharacters => "invalid_characters",
            HandleRejection::NumericOnly => "numeric_only",
            HandleRejection::ReservedToken => "reserved_token",
            HandleRejection::LowSignal => "low_signal",
            HandleRejection::GenericAccount => "generic_account",
            HandleRejection::UnknownPlatform => "unknown_platform",
            HandleRejection::PlatformNotRequested => "platform_not_requested",
            HandleRejection::PoolCapExceeded => "pool_cap_exceeded",
        }
    }
}

impl std::fmt::Display for HandleRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Handle normalization & quality filter
// ---------------------------------------------------------------------------

/// Reduce `@Handle`, `https://www.instagram.com/handle/?hl=en` and friends to `handle`.
pub fn normalize_handle(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = s.strip_prefix(scheme) {
            s = rest.to_string();
        }
    }
    for prefix in ["www.", "m."] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.to_string();
        }
    }
    for platform in Platform::ALL {
        if let Some(rest) = s.strip_prefix(&format!("{}/", platform.host())) {
            s = rest.to_string();
        }
    }

    let s = s.trim_start_matches('@');
    let end = s.find(['/', '?', '#']).unwrap_or(s.len());
    s[..end].trim().to_string()
}

/// Format and quality rules for an already-normalized handle.
pub fn check_handle(handle: &str, policy: &AggregationPolicy) -> Result<(), HandleRejection> {
    let len = handle.chars().count();
    if len < policy.min_handle_len {
        return Err(HandleRejection::TooShort);
    }
    if len > policy.max_handle_len {
        return Err(HandleRejection::TooLong);
    }
    let charset_ok = handle
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_');
    if !charset_ok || handle.starts_with('.') || handle.ends_with('.') || handle.contains("..") {
        return Err(HandleRejection::InvalidCharacters);
    }
    if handle.chars().all(|c| c.is_ascii_digit()) {
        return Err(HandleRejection::NumericOnly);
    }
    if policy.reserved_tokens.iter().any(|t| t == handle) {
        return Err(HandleRejection::ReservedToken);
    }
    if policy
        .low_signal_substrings
        .iter()
        .any(|s| handle.contains(s.as_str()))
    {
        return Err(HandleRejection::LowSignal);
    }
    if policy.generic_accounts.iter().any(|g| g == handle) {
        return Err(HandleRejection::GenericAccount);
    }
    Ok(())
}

/// Extract handles for `platform` from free text: profile links and `@mentions`.
/// Order of first appearance is preserved; duplicates are dropped.
pub fn handles_from_text(text: &str, platform: Platform) -> Vec<String> {
    let link_re = match platform {
        Platform::Instagram => &*INSTAGRAM_LINK_RE,
        Platform::TikTok => &*TIKTOK_LINK_RE,
    };

    let mut found: Vec<(usize, String)> = link_re
        .captures_iter(text)
        .chain(MENTION_RE.captures_iter(text))
        .filter_map(|caps| {
            let m = caps.get(1)?;
            let handle = m.as_str().trim_end_matches('.').to_lowercase();
            Some((m.start(), handle))
        })
        .filter(|(_, h)| !h.is_empty() && !LINK_PATH_SKIP.contains(&h.as_str()))
        .collect();
    found.sort_by_key(|(pos, _)| *pos);

    let mut out: Vec<String> = Vec::new();
    for (_, handle) in found {
        if !out.contains(&handle) {
            out.push(handle);
        }
    }
    out
}

/// Parse abbreviated counts: `"1.2K"` -> 1200, `"3M"` -> 3_000_000, `"12,345"` -> 12345.
pub fn parse_follower_count(raw: &str) -> Option<u64> {
    let cleaned = raw.replace(',', "").to_lowercase();
    let caps = COUNT_RE.captures(&cleaned)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("k") => 1_000.0,
        Some("m") => 1_000_000.0,
        Some("b") => 1_000_000_000.0,
        _ => 1.0,
    };
    Some((value * multiplier).round() as u64)
}

/// Find a "N followers" phrase in text and parse it.
pub fn followers_from_text(text: &str) -> Option<u64> {
    let caps = FOLLOWERS_RE.captures(text)?;
    parse_follower_count(caps.get(1)?.as_str())
}

// ---------------------------------------------------------------------------
// CandidateAggregator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct AggregationResult {
    pub candidates: Vec<Candidate>,
    pub rejections: BTreeMap<HandleRejection, u32>,
    pub mentions_seen: u32,
}

impl AggregationResult {
    pub fn rejections_by_reason(&self) -> BTreeMap<String, u32> {
        self.rejections
            .iter()
            .map(|(reason, count)| (reason.as_str().to_string(), *count))
            .collect()
    }
}

/// Merges mentions keyed by normalized `(platform, handle)`.
pub struct CandidateAggregator<'a> {
    policy: &'a AggregationPolicy,
    platforms: Vec<Platform>,
    candidates: HashMap<CandidateKey, Candidate>,
    rejections: BTreeMap<HandleRejection, u32>,
    mentions_seen: u32,
}

impl<'a> CandidateAggregator<'a> {
    pub fn new(policy: &'a AggregationPolicy, platforms: &[Platform]) -> Self {
        Self {
            policy,
            platforms: platforms.to_vec(),
            candidates: HashMap::new(),
            rejections: BTreeMap::new(),
            mentions_seen: 0,
        }
    }

    pub fn ingest(&mut self, mention: RawMention) -> Result<CandidateKey, HandleRejection> {
        self.mentions_seen += 1;
        match self.admit(&mention) {
            Ok(key) => {
                self.merge(key.clone(), mention);
                Ok(key)
            }
            Err(reason) => {
                debug!(handle = %mention.handle, source = %mention.source, %reason, "Mention rejected");
                *self.rejections.entry(reason).or_insert(0) += 1;
                Err(reason)
            }
        }
    }

    pub fn ingest_all(&mut self, mentions: impl IntoIterator<Item = RawMention>) {
        for mention in mentions {
            let _ = self.ingest(mention);
        }
    }

    fn admit(&self, mention: &RawMention) -> Result<CandidateKey, HandleRejection> {
        let platform = mention
            .resolve_platform()
            .ok_or(HandleRejection::UnknownPlatform)?;
        let handle = normalize_handle(&mention.handle);
        check_handle(&handle, self.policy)?;
        if !self.platforms.contains(&platform) {
            return Err(HandleRejection::PlatformNotRequested);
        }
        Ok(CandidateKey::new(platform, handle))
    }

    fn merge(&mut self, key: CandidateKey, mention: RawMention) {
        let score = mention
            .explicit_score
            .unwrap_or_else(|| self.policy.base_score(mention.source));

        let candidate = self
            .candidates
            .entry(key.clone())
            .or_insert_with(|| Candidate {
                platform: key.platform,
                handle: key.handle.clone(),
                sources: Default::default(),
                initial_score: 0.0,
                reasons: Vec::new(),
                titles: Vec::new(),
                snippets: Vec::new(),
            });

        candidate.sources.insert(mention.source);
        candidate.initial_score = candidate.initial_score.max(score);
        let reason = mention.reason.trim();
        if !reason.is_empty() && !candidate.reasons.iter().any(|r| r == reason) {
            candidate.reasons.push(reason.to_string());
        }
        if let Some(title) = mention.title {
            let title = title.trim();
            if !title.is_empty() && !candidate.titles.iter().any(|t| t == title) {
                candidate.titles.push(title.to_string());
            }
        }
        if let Some(snippet) = mention.snippet {
            let snippet = snippet.trim();
            if !snippet.is_empty() && !candidate.snippets.iter().any(|s| s == snippet) {
                candidate.snippets.push(snippet.to_string());
            }
        }
    }

    /// Apply the per-platform pool cap and return the ordered pool.
    pub fn finish(mut self) -> AggregationResult {
        let mut by_platform: BTreeMap<Platform, Vec<Candidate>> = BTreeMap::new();
        for (_, candidate) in self.candidates.drain() {
            by_platform.entry(candidate.platform).or_default().push(candidate);
        }

        let cap = self.policy.pool_cap_per_platform;
        let mut candidates = Vec::new();
        for (_, mut pool) in by_platform {
            pool.sort_by(pool_order);
            if pool.len() > cap {
                let dropped = (pool.len() - cap) as u32;
                *self
                    .rejections
                    .entry(HandleRejection::PoolCapExceeded)
                    .or_insert(0) += dropped;
                pool.truncate(cap);
            }
            candidates.extend(pool);
        }

        AggregationResult {
            candidates,
            rejections: self.rejections,
            mentions_seen: self.mentions_seen,
        }
    }
}

/// Source count desc, score desc, handle asc.
fn pool_order(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.source_count()
        .cmp(&a.source_count())
        .then_with(|| b.initial_score.total_cmp(&a.initial_score))
        .then_with(|| a.handle.cmp(&b.handle))
}
