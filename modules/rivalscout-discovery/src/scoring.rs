//! Composite 0-100 scoring from keyword evidence, validation, AI relevance
//! and provenance.

use serde::Serialize;
use serde_json::{json, Value};

use rivalscout_common::policy::{DiscoveryPolicy, ScoreWeights, SizeBands};
use rivalscout_common::{BrandContext, Candidate, CandidateKey, SelectionState};

use crate::evidence::{EvidenceText, KeywordProfile};
use crate::selection::{DecisionTag, EligibilityRule, HardRejectReason};
use crate::validation::ValidationOutcome;

/// Weight of the AI score when blended with the keyword heuristic.
const AI_BLEND: f64 = 0.7;

/// AI relevance scores for one candidate, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AiScores {
    pub offer: f64,
    pub audience: f64,
    pub niche: f64,
}

impl AiScores {
    /// Single semantic score used by the eligibility gate.
    pub fn mean(&self) -> f64 {
        (self.offer + self.audience + self.niche) / 3.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComponents {
    pub offer_overlap: f64,
    pub audience_overlap: f64,
    pub niche_semantic_match: f64,
    pub activity_recency: f64,
    pub size_similarity: f64,
    pub source_confidence: f64,
}

impl ScoreComponents {
    /// Weighted sum, rounded to two decimals.
    pub fn total(&self, w: &ScoreWeights) -> f64 {
        let raw = self.offer_overlap * w.offer_overlap as f64
            + self.audience_overlap * w.audience_overlap as f64
            + self.niche_semantic_match * w.niche_semantic_match as f64
            + self.activity_recency * w.activity_recency as f64
            + self.size_similarity * w.size_similarity as f64
            + self.source_confidence * w.source_confidence as f64;
        (raw * 100.0).round() / 100.0
    }
}

/// A scored candidate and, once selection has run, its decision.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub candidate: Candidate,
    pub peer_overlap: f64,
    pub rag_affinity: f64,
    pub ai_scores: Option<AiScores>,
    pub validation: ValidationOutcome,
    pub validated: bool,
    pub components: ScoreComponents,
    pub total_score: f64,
    pub hard_reject: Option<HardRejectReason>,
    pub eligibility: Option<EligibilityRule>,
    pub selection_state: SelectionState,
    pub decision: DecisionTag,
    pub decision_reason: String,
    /// Whether a FILTERED_OUT row is kept for persistence.
    pub retained: bool,
}

impl Evaluation {
    pub fn key(&self) -> CandidateKey {
        self.candidate.key()
    }

    pub fn ai_semantic(&self) -> Option<f64> {
        self.ai_scores.map(|s| s.mean())
    }

    pub fn overlap(&self) -> f64 {
        self.peer_overlap.max(self.rag_affinity)
    }

    /// AI semantic score when present, the blended niche component otherwise.
    pub fn semantic(&self) -> f64 {
        self.ai_semantic()
            .unwrap_or(self.components.niche_semantic_match)
    }

    pub fn is_cross_source(&self) -> bool {
        self.candidate.source_count() >= 2
    }

    pub fn is_selected(&self) -> bool {
        self.selection_state.is_selected()
    }

    pub fn score_breakdown(&self, policy_version: &str) -> Value {
        json!({
            "policyVersion": policy_version,
            "totalScore": self.total_score,
            "components": self.components,
            "peerOverlap": self.peer_overlap,
            "ragAffinity": self.rag_affinity,
            "aiSemantic": self.ai_semantic(),
            "aiScores": self.ai_scores,
        })
    }

    pub fn evidence(&self) -> Value {
        json!({
            "sources": self.candidate.sources,
            "initialScore": self.candidate.initial_score,
            "reasons": self.candidate.reasons,
            "titles": self.candidate.titles,
            "snippets": self.candidate.snippets,
            "validation": self.validation,
            "validated": self.validated,
            "hardReject": self.hard_reject,
            "eligibility": self.eligibility,
            "decision": self.decision,
            "decisionReason": self.decision_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// ScoringEngine
// ---------------------------------------------------------------------------

pub struct ScoringEngine<'a> {
    policy: &'a DiscoveryPolicy,
    keywords: KeywordProfile,
    client_followers: Option<u64>,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(policy: &'a DiscoveryPolicy, brand: &BrandContext) -> Self {
        Self {
            policy,
            keywords: KeywordProfile::from_brand(brand),
            client_followers: brand.client_follower_count,
        }
    }

    pub fn evaluate(
        &self,
        candidate: Candidate,
        validation: ValidationOutcome,
        ai: Option<AiScores>,
    ) -> Evaluation {
        let evidence = EvidenceText::for_candidate(&candidate, validation.bio());
        let peer = self.keywords.peer_overlap(&evidence);
        let rag = self.keywords.rag_affinity(&evidence);
        let validated = validation.is_validated(self.policy.validation.validated_min_confidence);

        let v = validator_relevance(&validation);
        let offer_h = (0.5 * peer + 0.2 * rag + 0.5 * v).clamp(0.0, 1.0);
        let audience_h = (0.2 * peer + 0.5 * rag + 0.5 * v).clamp(0.0, 1.0);
        let niche_h = (0.35 * peer + 0.15 * rag + 0.6 * v).clamp(0.0, 1.0);

        let (offer, audience, niche) = match ai {
            Some(ai) => (
                blend(ai.offer, offer_h),
                blend(ai.audience, audience_h),
                blend(ai.niche, niche_h),
            ),
            None => (offer_h, audience_h, niche_h),
        };

        let components = ScoreComponents {
            offer_overlap: offer,
            audience_overlap: audience,
            niche_semantic_match: niche,
            activity_recency: activity_score(&validation),
            size_similarity: size_similarity(
                validation.follower_estimate(),
                self.client_followers,
                &self.policy.size_bands,
            ),
            source_confidence: source_confidence(&candidate),
        };
        let total_score = components.total(&self.policy.weights);

        Evaluation {
            candidate,
            peer_overlap: peer,
            rag_affinity: rag,
            ai_scores: ai,
            validation,
            validated,
            components,
            total_score,
            hard_reject: None,
            eligibility: None,
            selection_state: SelectionState::FilteredOut,
            decision: DecisionTag::Standard,
            decision_reason: String::new(),
            retained: false,
        }
    }
}

fn blend(ai: f64, heuristic: f64) -> f64 {
    (AI_BLEND * ai + (1.0 - AI_BLEND) * heuristic).clamp(0.0, 1.0)
}

/// How much the validator vouches for niche relevance.
pub fn validator_relevance(outcome: &ValidationOutcome) -> f64 {
    match outcome.signal() {
        Some(s) => match s.relevant {
            Some(true) => s.confidence,
            Some(false) => 0.35 * s.confidence,
            None => 0.6 * s.confidence,
        },
        None => 0.0,
    }
}

pub fn activity_score(outcome: &ValidationOutcome) -> f64 {
    match outcome {
        ValidationOutcome::Confirmed(s) => match s.active {
            Some(true) => 1.0,
            None => 0.7,
            Some(false) => 0.25,
        },
        ValidationOutcome::Degraded { .. } => 0.5,
        ValidationOutcome::Unavailable => 0.45,
        ValidationOutcome::Negative { .. } => 0.0,
    }
}

pub fn size_similarity(candidate: Option<u64>, client: Option<u64>, bands: &SizeBands) -> f64 {
    let (Some(candidate), Some(client)) = (candidate, client) else {
        return bands.neutral_score;
    };
    if client == 0 {
        return bands.neutral_score;
    }
    let ratio = candidate as f64 / client as f64;
    bands
        .bands
        .iter()
        .find(|(low, high, _)| ratio >= *low && ratio <= *high)
        .map(|(_, _, score)| *score)
        .unwrap_or(bands.outside_score)
}

/// Blend of the best source score and how many sources agree.
pub fn source_confidence(candidate: &Candidate) -> f64 {
    let corroboration = (candidate.source_count().clamp(1, 3) - 1) as f64 / 2.0;
    (0.55 * candidate.initial_score + 0.45 * corroboration).clamp(0.0, 1.0)
}
