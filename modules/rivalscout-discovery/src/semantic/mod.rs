//! Batched AI relevance scoring, raced against a deadline.

pub mod claude;

pub use claude::ClaudeSemanticRanker;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rivalscout_common::{CandidateKey, Platform};

use crate::scoring::AiScores;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticCandidate {
    /// `platform:handle`, echoed back in the scores.
    pub key: String,
    pub handle: String,
    pub platform: Platform,
    pub evidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticRequest {
    pub brand: String,
    pub niche: String,
    pub candidates: Vec<SemanticCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticScore {
    pub key: String,
    pub offer_overlap: f64,
    pub audience_overlap: f64,
    pub niche_semantic_match: f64,
    pub explanation: String,
}

#[async_trait]
pub trait SemanticRanker: Send + Sync {
    async fn rank(&self, request: &SemanticRequest) -> Result<Vec<SemanticScore>>;
}

#[derive(Debug, Default)]
pub struct SemanticOutcome {
    pub scores: HashMap<CandidateKey, AiScores>,
    pub available: bool,
    pub error: Option<String>,
}

/// Run one batched ranking call under `deadline`. Failure, timeout or a
/// missing ranker degrade to an empty score map; keys the ranker invents are
/// ignored and every score is clamped to [0, 1].
pub async fn rank_with_deadline(
    ranker: Option<&dyn SemanticRanker>,
    request: &SemanticRequest,
    deadline: Duration,
) -> SemanticOutcome {
    let Some(ranker) = ranker else {
        return SemanticOutcome {
            error: Some("semantic ranker not configured".to_string()),
            ..Default::default()
        };
    };
    if request.candidates.is_empty() {
        return SemanticOutcome {
            available: true,
            ..Default::default()
        };
    }

    let scored = match tokio::time::timeout(deadline, ranker.rank(request)).await {
        Ok(Ok(scores)) => scores,
        Ok(Err(e)) => {
            warn!(error = %e, "Semantic ranking failed, scoring without it");
            return SemanticOutcome {
                error: Some(e.to_string()),
                ..Default::default()
            };
        }
        Err(_) => {
            warn!(deadline_secs = deadline.as_secs(), "Semantic ranking timed out");
            return SemanticOutcome {
                error: Some(format!("timed out after {}s", deadline.as_secs())),
                ..Default::default()
            };
        }
    };

    let known: HashMap<&str, CandidateKey> = request
        .candidates
        .iter()
        .map(|c| (c.key.as_str(), CandidateKey::new(c.platform, c.handle.clone())))
        .collect();

    let mut scores = HashMap::new();
    let mut unknown = 0;
    for s in scored {
        let Some(key) = known.get(s.key.trim()) else {
            unknown += 1;
            continue;
        };
        scores.insert(
            key.clone(),
            AiScores {
                offer: s.offer_overlap.clamp(0.0, 1.0),
                audience: s.audience_overlap.clamp(0.0, 1.0),
                niche: s.niche_semantic_match.clamp(0.0, 1.0),
            },
        );
    }

    info!(
        requested = request.candidates.len(),
        scored = scores.len(),
        unknown,
        "Semantic ranking complete"
    );
    SemanticOutcome {
        scores,
        available: true,
        error: None,
    }
}
