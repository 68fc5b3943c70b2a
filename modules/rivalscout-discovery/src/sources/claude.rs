use ai_client::Claude;
use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use rivalscout_common::Platform;

use super::{AiSuggester, AiSuggestion, CompetitorType, SuggestionContext};

/// Response schema for the competitor suggestion call.
#[derive(Debug, Deserialize, JsonSchema)]
struct SuggestionBatch {
    competitors: Vec<SuggestedCompetitor>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SuggestedCompetitor {
    /// Account handle without the leading @
    handle: String,
    /// Why this account competes with the client
    discovery_reason: String,
    /// 0.0 to 1.0
    relevance_score: f64,
    competitor_type: Option<CompetitorType>,
}

const SYSTEM_PROMPT: &str = r#"You are a social media competitive-intelligence strategist. Given a client brand, you name real accounts on one platform that compete with it for the same audience.

Include a mix of:
- direct competitors: same niche, same kind of offer
- indirect competitors: adjacent niche or overlapping audience
- aspirational accounts: larger accounts in the space the client wants to emulate

Rules:
- Only name accounts you are confident actually exist and are active. Never invent handles.
- Exclude the client's own accounts, fan pages, repost/aggregator pages, and mega-celebrities whose audience is not specific to the niche.
- relevance_score is 0.0-1.0: how directly the account competes for the client's audience.
- discovery_reason is one sentence naming the concrete overlap (products, audience, content format).

Return an empty competitors array if you cannot name any with confidence."#;

pub struct ClaudeSuggester {
    claude: Claude,
}

impl ClaudeSuggester {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }

    fn user_prompt(brand: &str, niche: &str, ctx: &SuggestionContext) -> String {
        let platform = match ctx.platform {
            Platform::Instagram => "Instagram",
            Platform::TikTok => "TikTok",
        };
        let mut prompt = format!("Client brand: {brand}\nPlatform: {platform}\nNiche: {niche}\n");
        if let Some(handle) = &ctx.client_handle {
            prompt.push_str(&format!("Client handle: @{handle}\n"));
        }
        if let Some(description) = &ctx.description {
            prompt.push_str(&format!("Description: {description}\n"));
        }
        if !ctx.keywords.is_empty() {
            prompt.push_str(&format!("Keywords: {}\n", ctx.keywords.join(", ")));
        }
        prompt.push_str(&format!(
            "\nFind {} real {platform} accounts that compete with this client.",
            ctx.count
        ));
        prompt
    }
}

#[async_trait]
impl AiSuggester for ClaudeSuggester {
    async fn suggest(
        &self,
        brand: &str,
        niche: &str,
        context: &SuggestionContext,
    ) -> Result<Vec<AiSuggestion>> {
        let batch: SuggestionBatch = self
            .claude
            .extract(SYSTEM_PROMPT, Self::user_prompt(brand, niche, context))
            .await?;

        let total = batch.competitors.len();
        let suggestions: Vec<AiSuggestion> = batch
            .competitors
            .into_iter()
            .filter(|c| !c.handle.trim().is_empty())
            .take(context.count)
            .map(|c| AiSuggestion {
                handle: c.handle.trim().trim_start_matches('@').to_string(),
                platform: context.platform,
                reasoning: c.discovery_reason,
                relevance_score: c.relevance_score.clamp(0.0, 1.0),
                competitor_type: c.competitor_type,
            })
            .collect();

        if suggestions.is_empty() {
            warn!(brand, platform = %context.platform, "Claude suggested no competitors");
        }
        info!(
            brand,
            platform = %context.platform,
            returned = total,
            kept = suggestions.len(),
            "AI competitor suggestions"
        );
        Ok(suggestions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_prompt_includes_known_context() {
        let ctx = SuggestionContext {
            platform: Platform::TikTok,
            client_handle: Some("crumbco".into()),
            description: None,
            keywords: vec!["sourdough".into(), "wholesale".into()],
            count: 12,
        };
        let prompt = ClaudeSuggester::user_prompt("Crumb & Co", "vegan bakery", &ctx);
        assert!(prompt.contains("Platform: TikTok"));
        assert!(prompt.contains("Client handle: @crumbco"));
        assert!(prompt.contains("Keywords: sourdough, wholesale"));
        assert!(!prompt.contains("Description:"));
        assert!(prompt.ends_with("Find 12 real TikTok accounts that compete with this client."));
    }

    #[test]
    fn suggestion_schema_accepts_missing_type() {
        let batch: SuggestionBatch = serde_json::from_value(serde_json::json!({
            "competitors": [
                {"handle": "@oven.love", "discovery_reason": "same wholesale buyers", "relevance_score": 0.8}
            ]
        }))
        .unwrap();
        assert_eq!(batch.competitors.len(), 1);
        assert!(batch.competitors[0].competitor_type.is_none());
    }
}
