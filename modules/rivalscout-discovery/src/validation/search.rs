use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use rivalscout_common::Platform;

use super::{InstagramValidation, InstagramValidator, TikTokValidation, TikTokValidator};
use crate::aggregator::{followers_from_text, handles_from_text};
use crate::evidence::tokenize;
use crate::sources::{SearchHit, WebSearch};

const RESULTS_PER_CHECK: usize = 10;

/// Validates a handle by how often web search results reference it exactly.
/// Used where no profile scraper is available.
pub struct SearchPresenceValidator {
    web: Arc<dyn WebSearch>,
}

/// How a handle shows up across a page of search results.
#[derive(Debug, Default, PartialEq)]
struct Presence {
    references: u32,
    follower_estimate: Option<u64>,
    text: String,
}

impl Presence {
    fn from_hits(hits: &[SearchHit], handle: &str, platform: Platform) -> Self {
        let handle = handle.to_lowercase();
        let mut presence = Presence::default();
        for hit in hits {
            let mut hit_refs = 0;
            if handles_from_text(&hit.link, platform).contains(&handle) {
                hit_refs += 1;
            }
            let body = format!("{} {}", hit.title, hit.snippet);
            if handles_from_text(&body, platform).contains(&handle) {
                hit_refs += 1;
            }
            if hit_refs > 0 {
                presence.references += hit_refs;
                if presence.follower_estimate.is_none() {
                    presence.follower_estimate = followers_from_text(&body);
                }
                presence.text.push_str(&body.to_lowercase());
                presence.text.push(' ');
            }
        }
        presence
    }

    /// `(is_valid, confidence)`
    fn verdict(&self) -> (bool, f64) {
        let n = self.references as f64;
        match self.references {
            0 => (false, 0.2),
            1..=2 => (true, 0.5 + 0.1 * n),
            _ => (true, (0.3 + 0.15 * n).min(0.95)),
        }
    }
}

impl SearchPresenceValidator {
    pub fn new(web: Arc<dyn WebSearch>) -> Self {
        Self { web }
    }

    async fn presence(&self, handle: &str, platform: Platform) -> Result<Presence> {
        let query = format!("\"@{handle}\" {platform}");
        let hits = self.web.search(&query, RESULTS_PER_CHECK).await?;
        let presence = Presence::from_hits(&hits, handle, platform);
        debug!(handle, %platform, references = presence.references, "Search presence");
        Ok(presence)
    }
}

#[async_trait]
impl TikTokValidator for SearchPresenceValidator {
    async fn validate(&self, handle: &str) -> Result<TikTokValidation> {
        let presence = self.presence(handle, Platform::TikTok).await?;
        let (is_valid, confidence) = presence.verdict();
        Ok(TikTokValidation {
            is_valid,
            confidence,
            reason: format!("{} exact references in search results", presence.references),
            follower_estimate: presence.follower_estimate,
        })
    }
}

#[async_trait]
impl InstagramValidator for SearchPresenceValidator {
    async fn validate(
        &self,
        handle: &str,
        niche: &str,
        _target_handle: Option<&str>,
    ) -> Result<InstagramValidation> {
        let presence = self.presence(handle, Platform::Instagram).await?;
        let (is_valid, confidence) = presence.verdict();
        let niche_terms = tokenize(niche);
        let is_relevant = (is_valid && !niche_terms.is_empty())
            .then(|| niche_terms.iter().any(|t| presence.text.contains(t.as_str())));

        Ok(InstagramValidation {
            is_valid,
            exists: is_valid,
            is_active: None,
            is_relevant,
            confidence_score: confidence,
            follower_estimate: presence.follower_estimate,
            bio: None,
        })
    }
}
