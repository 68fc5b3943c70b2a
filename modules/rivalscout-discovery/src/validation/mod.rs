//! Candidate validation: does the account exist, is it active, is it in the niche.
//!
//! A validator that errors or times out yields a *degraded* outcome, which is
//! kept distinct from a confident negative so selection can treat "we could not
//! check" differently from "we checked and it is not there".

pub mod apify;
pub mod search;

pub use apify::ApifyInstagramValidator;
pub use search::SearchPresenceValidator;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rivalscout_common::policy::ValidationPolicy;
use rivalscout_common::{BrandContext, Candidate, CandidateKey, Platform};

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstagramValidation {
    pub is_valid: bool,
    pub exists: bool,
    pub is_active: Option<bool>,
    pub is_relevant: Option<bool>,
    /// 0.0-1.0
    pub confidence_score: f64,
    pub follower_estimate: Option<u64>,
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TikTokValidation {
    pub is_valid: bool,
    /// 0.0-1.0
    pub confidence: f64,
    pub reason: String,
    pub follower_estimate: Option<u64>,
}

#[async_trait]
pub trait InstagramValidator: Send + Sync {
    async fn validate(
        &self,
        handle: &str,
        niche: &str,
        target_handle: Option<&str>,
    ) -> Result<InstagramValidation>;
}

#[async_trait]
pub trait TikTokValidator: Send + Sync {
    async fn validate(&self, handle: &str) -> Result<TikTokValidation>;
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// What a successful check established.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSignal {
    pub active: Option<bool>,
    pub relevant: Option<bool>,
    pub confidence: f64,
    pub follower_estimate: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// The validator found the account.
    Confirmed(ValidationSignal),
    /// The validator answered and the account does not hold up.
    Negative { reason: String },
    /// The validator errored or timed out.
    Degraded { reason: String },
    /// No validator is configured for the platform.
    Unavailable,
}

impl ValidationOutcome {
    pub fn from_instagram(v: InstagramValidation) -> Self {
        if !v.exists {
            return ValidationOutcome::Negative {
                reason: "profile not found".to_string(),
            };
        }
        if !v.is_valid {
            return ValidationOutcome::Negative {
                reason: "profile failed validation".to_string(),
            };
        }
        ValidationOutcome::Confirmed(ValidationSignal {
            active: v.is_active,
            relevant: v.is_relevant,
            confidence: v.confidence_score.clamp(0.0, 1.0),
            follower_estimate: v.follower_estimate,
            bio: v.bio,
        })
    }

    pub fn from_tiktok(v: TikTokValidation) -> Self {
        if !v.is_valid {
            return ValidationOutcome::Negative { reason: v.reason };
        }
        ValidationOutcome::Confirmed(ValidationSignal {
            active: None,
            relevant: None,
            confidence: v.confidence.clamp(0.0, 1.0),
            follower_estimate: v.follower_estimate,
            bio: None,
        })
    }

    pub fn signal(&self) -> Option<&ValidationSignal> {
        match self {
            ValidationOutcome::Confirmed(signal) => Some(signal),
            _ => None,
        }
    }

    /// Confirmed with at least `min_confidence`.
    pub fn is_validated(&self, min_confidence: f64) -> bool {
        self.signal().is_some_and(|s| s.confidence >= min_confidence)
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ValidationOutcome::Degraded { .. })
    }

    pub fn bio(&self) -> Option<&str> {
        self.signal().and_then(|s| s.bio.as_deref())
    }

    pub fn follower_estimate(&self) -> Option<u64> {
        self.signal().and_then(|s| s.follower_estimate)
    }
}

// ---------------------------------------------------------------------------
// ValidatorSet
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub outcomes: HashMap<CandidateKey, ValidationOutcome>,
    pub validated: u32,
    pub degraded: u32,
    pub negative: u32,
}

impl ValidationReport {
    pub fn outcome(&self, key: &CandidateKey) -> &ValidationOutcome {
        self.outcomes
            .get(key)
            .unwrap_or(&ValidationOutcome::Unavailable)
    }
}

#[derive(Clone, Default)]
pub struct ValidatorSet {
    instagram: Option<Arc<dyn InstagramValidator>>,
    tiktok: Option<Arc<dyn TikTokValidator>>,
}

impl ValidatorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instagram(mut self, validator: Arc<dyn InstagramValidator>) -> Self {
        self.instagram = Some(validator);
        self
    }

    pub fn with_tiktok(mut self, validator: Arc<dyn TikTokValidator>) -> Self {
        self.tiktok = Some(validator);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.instagram.is_none() && self.tiktok.is_none()
    }

    /// Validate the pool in fixed-size batches with a pause between batches.
    /// Never fails: every candidate gets an outcome.
    pub async fn validate_pool(
        &self,
        candidates: &[Candidate],
        brand: &BrandContext,
        policy: &ValidationPolicy,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();
        if candidates.is_empty() {
            return report;
        }

        let call_timeout = Duration::from_secs(policy.call_timeout_secs);
        let delay = Duration::from_millis(policy.inter_batch_delay_ms);
        let batches: Vec<&[Candidate]> = candidates.chunks(policy.batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            let results = join_all(
                batch
                    .iter()
                    .map(|c| self.validate_one(c, brand, call_timeout)),
            )
            .await;

            for (candidate, outcome) in batch.iter().zip(results) {
                debug!(candidate = %candidate.key(), ?outcome, "Validated");
                report.outcomes.insert(candidate.key(), outcome);
            }

            if i + 1 < batch_count && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        for outcome in report.outcomes.values() {
            match outcome {
                o if o.is_validated(policy.validated_min_confidence) => report.validated += 1,
                ValidationOutcome::Degraded { .. } => report.degraded += 1,
                ValidationOutcome::Negative { .. } => report.negative += 1,
                _ => {}
            }
        }

        info!(
            candidates = candidates.len(),
            batches = batch_count,
            validated = report.validated,
            degraded = report.degraded,
            negative = report.negative,
            "Validation complete"
        );
        report
    }

    async fn validate_one(
        &self,
        candidate: &Candidate,
        brand: &BrandContext,
        call_timeout: Duration,
    ) -> ValidationOutcome {
        let result = match candidate.platform {
            Platform::Instagram => {
                let Some(validator) = &self.instagram else {
                    return ValidationOutcome::Unavailable;
                };
                let call = validator.validate(
                    &candidate.handle,
                    &brand.niche,
                    brand.client_handle_for(Platform::Instagram),
                );
                tokio::time::timeout(call_timeout, call)
                    .await
                    .map(|r| r.map(ValidationOutcome::from_instagram))
            }
            Platform::TikTok => {
                let Some(validator) = &self.tiktok else {
                    return ValidationOutcome::Unavailable;
                };
                tokio::time::timeout(call_timeout, validator.validate(&candidate.handle))
                    .await
                    .map(|r| r.map(ValidationOutcome::from_tiktok))
            }
        };

        match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => ValidationOutcome::Degraded {
                reason: e.to_string(),
            },
            Err(_) => ValidationOutcome::Degraded {
                reason: format!("timed out after {}s", call_timeout.as_secs()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{candidate, MockInstagramValidator, MockTikTokValidator};
    use rivalscout_common::SourceKind;

    fn policy() -> ValidationPolicy {
        ValidationPolicy {
            inter_batch_delay_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn missing_profile_is_a_confident_negative() {
        let outcome = ValidationOutcome::from_instagram(InstagramValidation {
            is_valid: false,
            exists: false,
            is_active: None,
            is_relevant: None,
            confidence_score: 0.9,
            follower_estimate: None,
            bio: None,
        });
        assert!(matches!(outcome, ValidationOutcome::Negative { .. }));
        assert!(!outcome.is_validated(0.5));
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(ValidationOutcome::Degraded {
            reason: "boom".into(),
        })
        .unwrap();
        assert_eq!(json["outcome"], "degraded");
        assert_eq!(json["reason"], "boom");
    }

    #[tokio::test]
    async fn errors_degrade_and_missing_validators_are_unavailable() {
        let set = ValidatorSet::new().with_instagram(Arc::new(
            MockInstagramValidator::confirming(true, true, 0.8).failing_for("brokenbakes"),
        ));
        let pool = vec![
            candidate(Platform::Instagram, "goodbakes", &[SourceKind::Direct]),
            candidate(Platform::Instagram, "brokenbakes", &[SourceKind::Direct]),
            candidate(Platform::TikTok, "tokbakes", &[SourceKind::Direct]),
        ];

        let report = set
            .validate_pool(&pool, &BrandContext::default(), &policy())
            .await;
        assert_eq!(report.validated, 1);
        assert_eq!(report.degraded, 1);
        assert!(report.outcome(&pool[0].key()).is_validated(0.5));
        assert!(report.outcome(&pool[1].key()).is_degraded());
        assert_eq!(*report.outcome(&pool[2].key()), ValidationOutcome::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_degraded() {
        let set = ValidatorSet::new().with_tiktok(Arc::new(
            MockTikTokValidator::valid(0.7).slow_for("sleepy", Duration::from_secs(60)),
        ));
        let pool = vec![
            candidate(Platform::TikTok, "sleepy", &[SourceKind::Ai]),
            candidate(Platform::TikTok, "quick", &[SourceKind::Ai]),
        ];

        let report = set
            .validate_pool(&pool, &BrandContext::default(), &policy())
            .await;
        assert!(report.outcome(&pool[0].key()).is_degraded());
        assert!(report.outcome(&pool[1].key()).is_validated(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_spaced_out() {
        let validator = Arc::new(MockTikTokValidator::valid(0.7));
        let set = ValidatorSet::new().with_tiktok(validator.clone());
        let pool: Vec<_> = (0..12)
            .map(|i| candidate(Platform::TikTok, &format!("acct{i}"), &[SourceKind::Ai]))
            .collect();

        let started = tokio::time::Instant::now();
        let report = set
            .validate_pool(&pool, &BrandContext::default(), &ValidationPolicy::default())
            .await;

        assert_eq!(report.outcomes.len(), 12);
        assert_eq!(validator.calls().len(), 12);
        // Three batches of five, two pauses between them.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(800), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(1200), "{elapsed:?}");
    }
}
