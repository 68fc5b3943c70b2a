use ai_client::Claude;
use anyhow::Result;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;

use super::{SemanticRanker, SemanticRequest, SemanticScore};

/// Response schema for the batched relevance call.
#[derive(Debug, Deserialize, JsonSchema)]
struct RankingResponse {
    scores: Vec<RankedCandidate>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RankedCandidate {
    /// The candidate key exactly as given, e.g. "instagram:handle"
    key: String,
    /// 0.0-1.0: does the account sell or promote the same kind of offer
    offer_overlap: f64,
    /// 0.0-1.0: does it speak to the same audience
    audience_overlap: f64,
    /// 0.0-1.0: is it in the same niche
    niche_semantic_match: f64,
    /// One sentence
    explanation: String,
}

const SYSTEM_PROMPT: &str = r#"You rate how closely social media accounts compete with a client brand.

For every candidate, score three dimensions from 0.0 to 1.0:
- offer_overlap: sells or promotes the same kind of product or service
- audience_overlap: targets the same people
- niche_semantic_match: belongs to the same niche

Judge only from the evidence given for each candidate. Sparse or generic evidence means low scores, not guesses. Return one entry per candidate, using the candidate key exactly as given."#;

pub struct ClaudeSemanticRanker {
    claude: Claude,
}

impl ClaudeSemanticRanker {
    pub fn new(claude: Claude) -> Self {
        Self { claude }
    }

    fn user_prompt(request: &SemanticRequest) -> String {
        let mut prompt = format!(
            "Client brand: {}\nNiche: {}\n\nCandidates:\n",
            request.brand, request.niche
        );
        for c in &request.candidates {
            let evidence = if c.evidence.trim().is_empty() {
                "(no evidence)"
            } else {
                c.evidence.as_str()
            };
            prompt.push_str(&format!("- key: {}\n  evidence: {evidence}\n", c.key));
        }
        prompt
    }
}

#[async_trait]
impl SemanticRanker for ClaudeSemanticRanker {
    async fn rank(&self, request: &SemanticRequest) -> Result<Vec<SemanticScore>> {
        let response: RankingResponse = self
            .claude
            .extract(SYSTEM_PROMPT, Self::user_prompt(request))
            .await?;

        Ok(response
            .scores
            .into_iter()
            .map(|r| SemanticScore {
                key: r.key,
                offer_overlap: r.offer_overlap,
                audience_overlap: r.audience_overlap,
                niche_semantic_match: r.niche_semantic_match,
                explanation: r.explanation,
            })
            .collect())
    }
}
