use std::time::Duration;

use anyhow::Result;
use apify_client::{ApifyClient, InstagramProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{InstagramValidation, InstagramValidator};
use crate::evidence::tokenize;

const POSTS_PER_PROFILE: u32 = 6;
const ACTIVE_WITHIN_DAYS: i64 = 45;

/// Validates Instagram candidates by scraping the profile through Apify.
pub struct ApifyInstagramValidator {
    client: ApifyClient,
    max_wait: Duration,
}

impl ApifyInstagramValidator {
    pub fn new(client: ApifyClient) -> Self {
        Self {
            client,
            max_wait: Duration::from_secs(18),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

#[async_trait]
impl InstagramValidator for ApifyInstagramValidator {
    async fn validate(
        &self,
        handle: &str,
        niche: &str,
        target_handle: Option<&str>,
    ) -> Result<InstagramValidation> {
        let profiles = self
            .client
            .instagram_profiles(&[handle.to_string()], POSTS_PER_PROFILE, self.max_wait)
            .await?;

        let profile = profiles
            .into_iter()
            .find(|p| p.username.eq_ignore_ascii_case(handle));

        let validation = match profile {
            Some(profile) => assess_profile(&profile, niche, target_handle, Utc::now()),
            None => {
                debug!(handle, "Instagram profile not found");
                InstagramValidation {
                    is_valid: false,
                    exists: false,
                    is_active: None,
                    is_relevant: None,
                    confidence_score: 0.8,
                    follower_estimate: None,
                    bio: None,
                }
            }
        };

        info!(
            handle,
            exists = validation.exists,
            active = ?validation.is_active,
            relevant = ?validation.is_relevant,
            confidence = validation.confidence_score,
            "Instagram profile validated"
        );
        Ok(validation)
    }
}

/// Judge a scraped profile: activity from the newest post, relevance from
/// niche terms (or a mention of the client) in the bio and captions.
fn assess_profile(
    profile: &InstagramProfile,
    niche: &str,
    target_handle: Option<&str>,
    now: DateTime<Utc>,
) -> InstagramValidation {
    let is_active = profile
        .latest_post_at()
        .map(|at| now.signed_duration_since(at).num_days() <= ACTIVE_WITHIN_DAYS);

    let blob = profile.text_blob();
    let niche_terms = tokenize(niche);
    let mentions_target = target_handle
        .map(|t| blob.contains(&format!("@{}", t.to_lowercase())))
        .unwrap_or(false);
    let is_relevant = if niche_terms.is_empty() && !mentions_target {
        None
    } else {
        Some(mentions_target || niche_terms.iter().any(|t| blob.contains(t.as_str())))
    };

    let mut confidence: f64 = 0.6;
    if is_active == Some(true) {
        confidence += 0.15;
    }
    if is_relevant == Some(true) {
        confidence += 0.15;
    }
    if profile.private {
        confidence -= 0.2;
    }

    InstagramValidation {
        is_valid: true,
        exists: true,
        is_active,
        is_relevant,
        confidence_score: confidence.clamp(0.1, 0.95),
        follower_estimate: profile.followers_count,
        bio: profile.biography.clone(),
    }
}
