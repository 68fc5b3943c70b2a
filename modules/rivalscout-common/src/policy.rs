//! Versioned tunables for discovery, scoring and selection.
//!
//! Every threshold the engine compares against lives here so that a policy
//! file can be swapped without touching code. `DiscoveryPolicy::default()` is
//! the production baseline; `load` overlays a JSON file on top of it.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RivalScoutError};
use crate::types::SourceKind;

pub const POLICY_VERSION: &str = "2025-01";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryPolicy {
    pub version: String,
    pub weights: ScoreWeights,
    pub thresholds: SelectionThresholds,
    pub eligibility: EligibilityThresholds,
    pub hard_reject: HardRejectRules,
    pub aggregation: AggregationPolicy,
    pub validation: ValidationPolicy,
    pub semantic: SemanticPolicy,
    pub staleness: StalenessPolicy,
    pub size_bands: SizeBands,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            weights: ScoreWeights::default(),
            thresholds: SelectionThresholds::default(),
            eligibility: EligibilityThresholds::default(),
            hard_reject: HardRejectRules::default(),
            aggregation: AggregationPolicy::default(),
            validation: ValidationPolicy::default(),
            semantic: SemanticPolicy::default(),
            staleness: StalenessPolicy::default(),
            size_bands: SizeBands::default(),
        }
    }
}

impl DiscoveryPolicy {
    /// Read a JSON policy file. Missing fields fall back to the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            RivalScoutError::Config(format!("reading policy {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let policy: DiscoveryPolicy = serde_json::from_str(raw)
            .map_err(|e| RivalScoutError::Config(format!("parsing policy: {e}")))?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        let sum = self.weights.sum();
        if sum != 100 {
            return Err(RivalScoutError::Config(format!(
                "score weights must sum to 100, got {sum}"
            )));
        }
        let t = &self.thresholds;
        if !(t.promotion_min <= t.shortlist_relaxed_min
            && t.shortlist_relaxed_min <= t.shortlist_min
            && t.shortlist_min <= t.top_pick_min)
        {
            return Err(RivalScoutError::Config(
                "thresholds must satisfy promotion <= relaxed shortlist <= shortlist <= top pick"
                    .to_string(),
            ));
        }
        let a = &self.aggregation;
        if a.min_handle_len == 0 || a.min_handle_len > a.max_handle_len {
            return Err(RivalScoutError::Config(format!(
                "invalid handle length bounds {}..={}",
                a.min_handle_len, a.max_handle_len
            )));
        }
        if self.validation.batch_size == 0 {
            return Err(RivalScoutError::Config(
                "validation batch size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// --- Scoring ---

/// Integer weights per score component. Must sum to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub offer_overlap: u32,
    pub audience_overlap: u32,
    pub niche_semantic_match: u32,
    pub activity_recency: u32,
    pub size_similarity: u32,
    pub source_confidence: u32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            offer_overlap: 30,
            audience_overlap: 25,
            niche_semantic_match: 20,
            activity_recency: 10,
            size_similarity: 10,
            source_confidence: 5,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> u32 {
        self.offer_overlap
            + self.audience_overlap
            + self.niche_semantic_match
            + self.activity_recency
            + self.size_similarity
            + self.source_confidence
    }
}

/// Follower ratio (candidate / client) bands for size similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeBands {
    /// `(low, high, score)`, checked in order; first band containing the ratio wins.
    pub bands: Vec<(f64, f64, f64)>,
    pub outside_score: f64,
    /// Used when either follower count is unknown.
    pub neutral_score: f64,
}

impl Default for SizeBands {
    fn default() -> Self {
        Self {
            bands: vec![(0.4, 2.5, 1.0), (0.2, 5.0, 0.7), (0.1, 10.0, 0.4)],
            outside_score: 0.15,
            neutral_score: 0.55,
        }
    }
}

// --- Selection ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionThresholds {
    pub top_pick_min: f64,
    pub top_pick_cap: u32,
    pub shortlist_min: f64,
    /// Lower shortlist bar for candidates with very strong keyword overlap.
    pub shortlist_relaxed_min: f64,
    pub shortlist_relaxed_overlap: f64,
    pub promotion_min: f64,
    /// Coverage promotion fills the selection up to this many rows.
    pub min_review: u32,
    pub exploratory_offset: f64,
    pub exploratory_max: u32,
    pub filtered_retention_max: u32,
    pub filtered_retention_min_score: f64,
}

impl Default for SelectionThresholds {
    fn default() -> Self {
        Self {
            top_pick_min: 78.0,
            top_pick_cap: 6,
            shortlist_min: 65.0,
            shortlist_relaxed_min: 62.0,
            shortlist_relaxed_overlap: 0.45,
            promotion_min: 55.0,
            min_review: 5,
            exploratory_offset: 10.0,
            exploratory_max: 3,
            filtered_retention_max: 20,
            filtered_retention_min_score: 35.0,
        }
    }
}

impl SelectionThresholds {
    pub fn exploratory_min(&self) -> f64 {
        self.promotion_min - self.exploratory_offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityThresholds {
    pub strong_overlap: f64,
    pub moderate_overlap: f64,
    pub strong_semantic: f64,
    pub decent_semantic: f64,
    pub high_ai_semantic: f64,
    pub degraded_semantic: f64,
    pub degraded_min_sources: usize,
    pub top_pick_min_overlap: f64,
}

impl Default for EligibilityThresholds {
    fn default() -> Self {
        Self {
            strong_overlap: 0.35,
            moderate_overlap: 0.2,
            strong_semantic: 0.6,
            decent_semantic: 0.45,
            high_ai_semantic: 0.7,
            degraded_semantic: 0.55,
            degraded_min_sources: 2,
            top_pick_min_overlap: 0.25,
        }
    }
}

/// A blacklist term that only applies when the brand itself is not in that space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualTerm {
    pub term: String,
    /// If the niche or description mentions any of these, the term is inactive.
    pub allow_when: Vec<String>,
}

impl ContextualTerm {
    fn new(term: &str, allow_when: &[&str]) -> Self {
        Self {
            term: term.to_string(),
            allow_when: allow_when.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardRejectRules {
    pub universal_blacklist: Vec<String>,
    pub contextual_blacklist: Vec<ContextualTerm>,
    pub brand_adjacent_min_len: usize,
    pub insufficient_overlap: f64,
    pub insufficient_semantic: f64,
}

impl Default for HardRejectRules {
    fn default() -> Self {
        Self {
            universal_blacklist: ["fanpage", "parody", "repost", "giveaway", "followers", "leaks"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            contextual_blacklist: vec![
                ContextualTerm::new("news", &["news", "media", "journalism", "publisher"]),
                ContextualTerm::new("shop", &["shop", "store", "retail", "ecommerce"]),
                ContextualTerm::new("deals", &["deals", "coupon", "discount", "savings"]),
                ContextualTerm::new("meme", &["meme", "humor", "comedy", "entertainment"]),
            ],
            brand_adjacent_min_len: 4,
            insufficient_overlap: 0.12,
            insufficient_semantic: 0.35,
        }
    }
}

// --- Aggregation ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationPolicy {
    pub min_handle_len: usize,
    pub max_handle_len: usize,
    pub pool_cap_per_platform: usize,
    pub max_results_per_source: usize,
    /// Budget for a single discovery source call before it counts as failed.
    pub source_timeout_secs: u64,
    pub source_base_scores: BTreeMap<SourceKind, f64>,
    pub reserved_tokens: Vec<String>,
    pub low_signal_substrings: Vec<String>,
    pub generic_accounts: Vec<String>,
    /// Minimum 0-100 relevance for a past competitor to be re-seeded.
    pub historical_min_relevance: f64,
    pub ai_suggestion_ttl_secs: u64,
}

impl Default for AggregationPolicy {
    fn default() -> Self {
        let source_base_scores = BTreeMap::from([
            (SourceKind::Algorithmic, 0.5),
            (SourceKind::Direct, 0.55),
            (SourceKind::Ai, 0.6),
            (SourceKind::Historical, 0.7),
        ]);
        Self {
            min_handle_len: 2,
            max_handle_len: 30,
            pool_cap_per_platform: 30,
            max_results_per_source: 25,
            source_timeout_secs: 90,
            source_base_scores,
            reserved_tokens: [
                "p", "explore", "reel", "reels", "stories", "tv", "accounts", "about", "legal",
                "developer", "direct", "tags", "tag", "music", "video", "discover", "login",
                "signup", "share", "embed",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            low_signal_substrings: [
                "giveaway", "follow4follow", "f4f", "like4like", "l4l", "followback",
                "spam4spam", "freefollowers",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            generic_accounts: [
                "instagram", "tiktok", "cristiano", "leomessi", "selenagomez", "kyliejenner",
                "therock", "arianagrande", "kimkardashian", "beyonce", "nike", "adidas",
                "natgeo", "netflix", "cocacola", "mrbeast", "khaby.lame", "charlidamelio",
                "google", "amazon", "apple",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            historical_min_relevance: 70.0,
            ai_suggestion_ttl_secs: 6 * 60 * 60,
        }
    }
}

impl AggregationPolicy {
    pub fn base_score(&self, source: SourceKind) -> f64 {
        self.source_base_scores.get(&source).copied().unwrap_or(0.5)
    }
}

// --- Collaborator budgets ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub call_timeout_secs: u64,
    /// Minimum validator confidence for a candidate to count as validated.
    pub validated_min_confidence: f64,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay_ms: 400,
            call_timeout_secs: 20,
            validated_min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticPolicy {
    pub deadline_secs: u64,
    pub max_candidates: usize,
}

impl Default for SemanticPolicy {
    fn default() -> Self {
        Self {
            deadline_secs: 45,
            max_candidates: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StalenessPolicy {
    /// Window for runs stuck in an early phase with no recorded progress.
    pub early_secs: i64,
    pub default_secs: i64,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            early_secs: 5 * 60,
            default_secs: 20 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        let policy = DiscoveryPolicy::default();
        assert_eq!(policy.weights.sum(), 100);
        policy.validate().unwrap();
        assert_eq!(policy.thresholds.exploratory_min(), 45.0);
    }

    #[test]
    fn partial_json_overlays_defaults() {
        let policy =
            DiscoveryPolicy::from_json(r#"{"version": "test", "thresholds": {"top_pick_min": 80.0}}"#)
                .unwrap();
        assert_eq!(policy.version, "test");
        assert_eq!(policy.thresholds.top_pick_min, 80.0);
        assert_eq!(policy.thresholds.shortlist_min, 65.0);
        assert_eq!(policy.weights, ScoreWeights::default());
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let err = DiscoveryPolicy::from_json(r#"{"weights": {"offer_overlap": 50}}"#).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut policy = DiscoveryPolicy::default();
        policy.thresholds.shortlist_min = 90.0;
        assert!(policy.validate().is_err());
    }
}
