//! Selection: hard rejects, the eligibility gate, and partitioning scored
//! candidates into top picks, shortlist and filtered-out rows.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use rivalscout_common::policy::{DiscoveryPolicy, EligibilityThresholds, HardRejectRules};
use rivalscout_common::{BrandContext, SelectionState};

use crate::aggregator::{check_handle, normalize_handle};
use crate::scoring::Evaluation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HardRejectReason {
    InvalidFormat,
    SelfAccount,
    BrandAdjacent,
    Blacklisted,
    ContextBlacklisted,
    InsufficientEvidence,
}

impl HardRejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardRejectReason::InvalidFormat => "invalid_format",
            HardRejectReason::SelfAccount => "self_account",
            HardRejectReason::BrandAdjacent => "brand_adjacent",
            HardRejectReason::Blacklisted => "blacklisted",
            HardRejectReason::ContextBlacklisted => "context_blacklisted",
            HardRejectReason::InsufficientEvidence => "insufficient_evidence",
        }
    }
}

/// The rule that let a candidate through the eligibility gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityRule {
    StrongOverlap,
    ValidatedModerateOverlap,
    CrossSourceHighSemantic,
    DegradedCorroborated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTag {
    Standard,
    Coverage,
    Exploratory,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionStats {
    pub top_picks: u32,
    pub shortlisted: u32,
    pub coverage_promotions: u32,
    pub exploratory_promotions: u32,
    pub filtered: u32,
    pub retained_filtered: u32,
    pub hard_rejected: u32,
    pub rejections: BTreeMap<String, u32>,
}

// ---------------------------------------------------------------------------
// Hard reject
// ---------------------------------------------------------------------------

/// First matching rule wins.
pub fn hard_reject(
    eval: &Evaluation,
    brand: &BrandContext,
    policy: &DiscoveryPolicy,
) -> Option<(HardRejectReason, String)> {
    let rules = &policy.hard_reject;
    let handle = eval.candidate.handle.as_str();

    if let Err(e) = check_handle(handle, &policy.aggregation) {
        return Some((HardRejectReason::InvalidFormat, format!("Invalid handle format ({e})")));
    }

    let client_handles: Vec<String> = brand
        .client_handles
        .iter()
        .map(|h| normalize_handle(&h.handle))
        .filter(|h| !h.is_empty())
        .collect();

    if client_handles.iter().any(|c| c == handle) {
        return Some((HardRejectReason::SelfAccount, "Self account".to_string()));
    }
    if let Some(client) = client_handles
        .iter()
        .filter(|c| c.chars().count() >= rules.brand_adjacent_min_len)
        .find(|c| handle.contains(c.as_str()) || c.contains(handle))
    {
        return Some((
            HardRejectReason::BrandAdjacent,
            format!("Brand-adjacent handle (overlaps @{client})"),
        ));
    }

    if let Some(term) = rules
        .universal_blacklist
        .iter()
        .find(|t| handle.contains(t.as_str()))
    {
        return Some((HardRejectReason::Blacklisted, format!("Blacklisted term \"{term}\"")));
    }

    if let Some(term) = active_context_term(handle, brand, rules) {
        return Some((
            HardRejectReason::ContextBlacklisted,
            format!("Blacklisted term \"{term}\" outside the brand's space"),
        ));
    }

    if eval.peer_overlap < rules.insufficient_overlap
        && eval.rag_affinity < rules.insufficient_overlap
        && eval.ai_semantic().unwrap_or(0.0) < rules.insufficient_semantic
        && eval.candidate.source_count() == 1
        && !eval.validated
    {
        return Some((
            HardRejectReason::InsufficientEvidence,
            "Insufficient evidence: single source, no keyword overlap, not validated".to_string(),
        ));
    }

    None
}

fn active_context_term<'r>(
    handle: &str,
    brand: &BrandContext,
    rules: &'r HardRejectRules,
) -> Option<&'r str> {
    let brand_text = format!(
        "{} {}",
        brand.niche,
        brand.description.as_deref().unwrap_or_default()
    )
    .to_lowercase();

    rules
        .contextual_blacklist
        .iter()
        .filter(|ct| handle.contains(ct.term.as_str()))
        .find(|ct| !ct.allow_when.iter().any(|w| brand_text.contains(w.as_str())))
        .map(|ct| ct.term.as_str())
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

pub fn eligibility(eval: &Evaluation, t: &EligibilityThresholds) -> Option<EligibilityRule> {
    let overlap = eval.overlap();
    let semantic = eval.semantic();
    let cross_source = eval.is_cross_source();

    if overlap >= t.strong_overlap && (semantic >= t.strong_semantic || eval.validated || cross_source) {
        return Some(EligibilityRule::StrongOverlap);
    }
    if eval.validated && overlap >= t.moderate_overlap && semantic >= t.decent_semantic {
        return Some(EligibilityRule::ValidatedModerateOverlap);
    }
    if cross_source
        && overlap >= t.moderate_overlap
        && eval.ai_semantic().is_some_and(|ai| ai >= t.high_ai_semantic)
    {
        return Some(EligibilityRule::CrossSourceHighSemantic);
    }
    if eval.validation.is_degraded()
        && eval.candidate.source_count() >= t.degraded_min_sources
        && semantic >= t.degraded_semantic
    {
        return Some(EligibilityRule::DegradedCorroborated);
    }
    None
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

fn is_eligible(eval: &Evaluation) -> bool {
    eval.hard_reject.is_none() && eval.eligibility.is_some()
}

/// total desc, peer desc, rag desc, source count desc, AI semantic desc, then
/// handle and platform so the order is total.
pub fn rank_order(a: &Evaluation, b: &Evaluation) -> Ordering {
    b.total_score
        .total_cmp(&a.total_score)
        .then_with(|| b.peer_overlap.total_cmp(&a.peer_overlap))
        .then_with(|| b.rag_affinity.total_cmp(&a.rag_affinity))
        .then_with(|| b.candidate.source_count().cmp(&a.candidate.source_count()))
        .then_with(|| {
            let (x, y) = (a.ai_semantic().unwrap_or(-1.0), b.ai_semantic().unwrap_or(-1.0));
            y.total_cmp(&x)
        })
        .then_with(|| a.candidate.handle.cmp(&b.candidate.handle))
        .then_with(|| a.candidate.platform.cmp(&b.candidate.platform))
}

pub struct SelectionPolicy<'a> {
    policy: &'a DiscoveryPolicy,
    brand: &'a BrandContext,
    target_count: u32,
}

impl<'a> SelectionPolicy<'a> {
    pub fn new(policy: &'a DiscoveryPolicy, brand: &'a BrandContext, target_count: u32) -> Self {
        Self {
            policy,
            brand,
            target_count,
        }
    }

    /// Assign every evaluation exactly one of TOP_PICK, SHORTLISTED or
    /// FILTERED_OUT. Returns the evaluations in rank order.
    pub fn apply(&self, mut evals: Vec<Evaluation>) -> (Vec<Evaluation>, SelectionStats) {
        let t = &self.policy.thresholds;
        let target = self.target_count as usize;
        let mut stats = SelectionStats::default();

        for eval in evals.iter_mut() {
            eval.selection_state = SelectionState::FilteredOut;
            eval.decision = DecisionTag::Standard;
            eval.retained = false;
            match hard_reject(eval, self.brand, self.policy) {
                Some((reason, detail)) => {
                    eval.hard_reject = Some(reason);
                    eval.eligibility = None;
                    eval.decision_reason = detail;
                    stats.hard_rejected += 1;
                    *stats.rejections.entry(reason.as_str().to_string()).or_insert(0) += 1;
                }
                None => {
                    eval.hard_reject = None;
                    eval.eligibility = eligibility(eval, &self.policy.eligibility);
                }
            }
        }

        evals.sort_by(rank_order);
        let mut selected = 0usize;

        // (a) top picks
        let top_cap = (t.top_pick_cap as usize).min(target);
        for eval in evals.iter_mut() {
            if selected >= top_cap {
                break;
            }
            let secondary = (eval.validated || eval.is_cross_source())
                && eval.overlap() >= self.policy.eligibility.top_pick_min_overlap;
            if is_eligible(eval) && eval.total_score >= t.top_pick_min && secondary {
                eval.selection_state = SelectionState::TopPick;
                eval.decision_reason = format!("Top pick: score {:.2} with corroborating evidence", eval.total_score);
                selected += 1;
                stats.top_picks += 1;
            }
        }

        // (b) shortlist
        for eval in evals.iter_mut() {
            if selected >= target {
                break;
            }
            if eval.is_selected() || !is_eligible(eval) {
                continue;
            }
            let relaxed = eval.total_score >= t.shortlist_relaxed_min
                && eval.overlap() >= t.shortlist_relaxed_overlap;
            if eval.total_score >= t.shortlist_min || relaxed {
                eval.selection_state = SelectionState::Shortlisted;
                eval.decision_reason = if eval.total_score >= t.shortlist_min {
                    format!("Shortlisted: score {:.2}", eval.total_score)
                } else {
                    format!("Shortlisted on strong overlap: score {:.2}", eval.total_score)
                };
                selected += 1;
                stats.shortlisted += 1;
            }
        }

        // (c) coverage promotion
        let min_review = (t.min_review as usize).min(target);
        for eval in evals.iter_mut() {
            if selected >= min_review {
                break;
            }
            if eval.is_selected() || !is_eligible(eval) || eval.total_score < t.promotion_min {
                continue;
            }
            eval.selection_state = SelectionState::Shortlisted;
            eval.decision = DecisionTag::Coverage;
            eval.decision_reason = format!(
                "Coverage promotion: score {:.2} to reach {min_review} for review",
                eval.total_score
            );
            selected += 1;
            stats.shortlisted += 1;
            stats.coverage_promotions += 1;
        }

        // (d) exploratory fallback
        if selected == 0 {
            let floor = t.exploratory_min();
            for eval in evals.iter_mut() {
                if stats.exploratory_promotions >= t.exploratory_max {
                    break;
                }
                if eval.hard_reject.is_some() || eval.total_score < floor {
                    continue;
                }
                eval.selection_state = SelectionState::Shortlisted;
                eval.decision = DecisionTag::Exploratory;
                eval.decision_reason = format!(
                    "Exploratory: score {:.2}, evidence incomplete",
                    eval.total_score
                );
                stats.shortlisted += 1;
                stats.exploratory_promotions += 1;
            }
        }

        // Everything else is filtered; keep the best few for review.
        for eval in evals.iter_mut() {
            if eval.is_selected() {
                continue;
            }
            stats.filtered += 1;
            if eval.hard_reject.is_some() {
                continue;
            }
            eval.decision_reason = self.filter_reason(eval, selected >= target);
            if stats.retained_filtered < t.filtered_retention_max
                && eval.total_score >= t.filtered_retention_min_score
            {
                eval.retained = true;
                stats.retained_filtered += 1;
            }
        }

        info!(
            evaluated = evals.len(),
            top_picks = stats.top_picks,
            shortlisted = stats.shortlisted,
            coverage = stats.coverage_promotions,
            exploratory = stats.exploratory_promotions,
            filtered = stats.filtered,
            hard_rejected = stats.hard_rejected,
            "Selection complete"
        );
        (evals, stats)
    }

    fn filter_reason(&self, eval: &Evaluation, selection_full: bool) -> String {
        let t = &self.policy.thresholds;
        if eval.eligibility.is_none() {
            return format!(
                "Insufficient evidence for shortlist (overlap {:.2}, semantic {:.2})",
                eval.overlap(),
                eval.semantic()
            );
        }
        if selection_full && eval.total_score >= t.promotion_min {
            return format!(
                "Score {:.2} qualifies but target of {} is filled",
                eval.total_score, self.target_count
            );
        }
        format!(
            "Score {:.2} below shortlist threshold {:.0}",
            eval.total_score, t.shortlist_min
        )
    }
}
