//! Discovery sources: where candidate mentions come from.
//!
//! Every source runs concurrently and in isolation. A source that errors or
//! exceeds its time budget contributes nothing; the others are unaffected.
//! Within a source, a failed call only loses its own results. The source
//! fails when every one of its calls did.

pub mod claude;
pub mod search;

pub use claude::ClaudeSuggester;
pub use search::{SearchDiscovery, SearchHit, SerperSearcher, WebSearch};

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use rivalscout_common::policy::AggregationPolicy;
use rivalscout_common::{BrandContext, OrchestrateRequest, Platform, SourceKind};
use rivalscout_events::{emit_best_effort, DiagnosticEvent, EventCode, EventSink};

use crate::aggregator::RawMention;
use crate::job_state::{get_typed, put_typed, JobStateStore};
use crate::store::RunStore;

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Similar-account search seeded from a known handle.
#[async_trait]
pub trait AlgorithmicSearch: Send + Sync {
    /// Returns handles or profile URLs.
    async fn search(&self, seed: &str, niche_hint: &str, max_results: usize) -> Result<Vec<String>>;
}

/// Free-text query search scoped to one platform.
#[async_trait]
pub trait DirectSearch: Send + Sync {
    async fn search(&self, query: &str, platform: Platform, max_results: usize) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CompetitorType {
    /// Same niche, same offer.
    Direct,
    /// Adjacent niche or overlapping audience.
    Indirect,
    /// Larger account the client wants to emulate.
    Aspirational,
}

impl std::fmt::Display for CompetitorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompetitorType::Direct => write!(f, "direct"),
            CompetitorType::Indirect => write!(f, "indirect"),
            CompetitorType::Aspirational => write!(f, "aspirational"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiSuggestion {
    pub handle: String,
    pub platform: Platform,
    pub reasoning: String,
    /// 0.0-1.0
    pub relevance_score: f64,
    pub competitor_type: Option<CompetitorType>,
}

/// Brand details handed to an AI suggester for one platform.
#[derive(Debug, Clone)]
pub struct SuggestionContext {
    pub platform: Platform,
    pub client_handle: Option<String>,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub count: usize,
}

#[async_trait]
pub trait AiSuggester: Send + Sync {
    async fn suggest(
        &self,
        brand: &str,
        niche: &str,
        context: &SuggestionContext,
    ) -> Result<Vec<AiSuggestion>>;
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

pub struct CollectContext<'a> {
    pub job_id: Uuid,
    pub run_id: Uuid,
    pub brand: &'a BrandContext,
    pub request: &'a OrchestrateRequest,
    pub policy: &'a AggregationPolicy,
}

/// Mentions from one source plus the calls that failed along the way.
#[derive(Debug, Default)]
pub struct SourceYield {
    pub mentions: Vec<RawMention>,
    pub calls: usize,
    pub failures: Vec<String>,
}

impl SourceYield {
    fn record(&mut self, outcome: Result<Vec<RawMention>>) {
        self.calls += 1;
        match outcome {
            Ok(mentions) => self.mentions.extend(mentions),
            Err(e) => self.failures.push(format!("{e:#}")),
        }
    }

    fn finish(self) -> Result<Self> {
        if self.calls > 0 && self.failures.len() == self.calls {
            anyhow::bail!("all {} calls failed: {}", self.calls, self.failures.join("; "));
        }
        Ok(self)
    }
}

/// What the sources produced, plus which of them succeeded.
#[derive(Debug, Default)]
pub struct SourceReport {
    pub mentions: Vec<RawMention>,
    pub completed: Vec<SourceKind>,
    pub failed: Vec<(SourceKind, String)>,
    /// Failed calls inside sources that still completed.
    pub call_failures: u32,
}

#[derive(Clone, Default)]
pub struct DiscoverySources {
    algorithmic: Option<Arc<dyn AlgorithmicSearch>>,
    direct: Option<Arc<dyn DirectSearch>>,
    ai: Option<Arc<dyn AiSuggester>>,
}

impl DiscoverySources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_algorithmic(mut self, source: Arc<dyn AlgorithmicSearch>) -> Self {
        self.algorithmic = Some(source);
        self
    }

    pub fn with_direct(mut self, source: Arc<dyn DirectSearch>) -> Self {
        self.direct = Some(source);
        self
    }

    pub fn with_ai(mut self, source: Arc<dyn AiSuggester>) -> Self {
        self.ai = Some(source);
        self
    }

    /// Run every requested source concurrently. Never fails as a whole.
    pub async fn collect(
        &self,
        ctx: &CollectContext<'_>,
        store: &dyn RunStore,
        job_state: &dyn JobStateStore,
        events: &dyn EventSink,
    ) -> SourceReport {
        let budget = Duration::from_secs(ctx.policy.source_timeout_secs);

        let mut tasks: Vec<BoxFuture<'_, (SourceKind, Result<SourceYield>)>> = Vec::new();
        for kind in SourceKind::ALL {
            if !ctx.request.wants(kind) {
                continue;
            }
            let work: BoxFuture<'_, Result<SourceYield>> = match kind {
                SourceKind::Algorithmic => self.algorithmic_mentions(ctx).boxed(),
                SourceKind::Direct => self.direct_mentions(ctx).boxed(),
                SourceKind::Ai => self.ai_mentions(ctx, job_state).boxed(),
                SourceKind::Historical => historical_mentions(ctx, store).boxed(),
            };
            tasks.push(run_isolated(kind, work, budget, ctx, events).boxed());
        }

        let mut report = SourceReport::default();
        for (kind, outcome) in join_all(tasks).await {
            match outcome {
                Ok(found) => {
                    report.completed.push(kind);
                    report.call_failures += found.failures.len() as u32;
                    report.mentions.extend(found.mentions);
                }
                Err(e) => report.failed.push((kind, e.to_string())),
            }
        }
        report
    }

    async fn algorithmic_mentions(&self, ctx: &CollectContext<'_>) -> Result<SourceYield> {
        let source = self
            .algorithmic
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("algorithmic search not configured"))?;

        let mut found = SourceYield::default();
        for &platform in &ctx.request.platforms {
            let seed = ctx
                .brand
                .client_handle_for(platform)
                .unwrap_or(ctx.brand.brand_name.as_str());
            let outcome = source
                .search(seed, &ctx.brand.niche, ctx.policy.max_results_per_source)
                .await
                .map(|handles| {
                    let reason = format!("Surfaced by similar-account search for @{seed}");
                    handles
                        .into_iter()
                        .map(|handle| {
                            RawMention::new(handle, SourceKind::Algorithmic, reason.clone())
                                .with_platform(platform)
                        })
                        .collect::<Vec<_>>()
                });
            found.record(outcome.with_context(|| format!("{platform} similar-account search")));
        }
        found.finish()
    }

    async fn direct_mentions(&self, ctx: &CollectContext<'_>) -> Result<SourceYield> {
        let source = self
            .direct
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("direct search not configured"))?;

        let mut found = SourceYield::default();
        for &platform in &ctx.request.platforms {
            for query in direct_queries(ctx.brand, platform) {
                let outcome = source
                    .search(&query, platform, ctx.policy.max_results_per_source)
                    .await
                    .map(|handles| {
                        let reason = format!("Matched search \"{query}\"");
                        handles
                            .into_iter()
                            .map(|handle| {
                                RawMention::new(handle, SourceKind::Direct, reason.clone())
                                    .with_platform(platform)
                            })
                            .collect::<Vec<_>>()
                    });
                found.record(outcome.with_context(|| format!("query \"{query}\"")));
            }
        }
        found.finish()
    }

    /// AI suggestions, cached per `(job, platform)` between runs.
    async fn ai_mentions(
        &self,
        ctx: &CollectContext<'_>,
        job_state: &dyn JobStateStore,
    ) -> Result<SourceYield> {
        let source = self
            .ai
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("AI suggester not configured"))?;
        let ttl = Duration::from_secs(ctx.policy.ai_suggestion_ttl_secs);

        let mut found = SourceYield::default();
        for &platform in &ctx.request.platforms {
            let cache_key = format!("ai_suggestions:{platform}");
            let suggestions: Result<Vec<AiSuggestion>> =
                match get_typed(job_state, ctx.job_id, &cache_key).await {
                    Some(cached) => {
                        info!(job_id = %ctx.job_id, %platform, "Using cached AI suggestions");
                        Ok(cached)
                    }
                    None => {
                        let context = SuggestionContext {
                            platform,
                            client_handle: ctx.brand.client_handle_for(platform).map(str::to_string),
                            description: ctx.brand.description.clone(),
                            keywords: ctx
                                .brand
                                .context_keywords
                                .iter()
                                .chain(&ctx.brand.business_keywords)
                                .cloned()
                                .collect(),
                            count: ctx.policy.max_results_per_source.min(15),
                        };
                        let fresh = source
                            .suggest(&ctx.brand.brand_name, &ctx.brand.niche, &context)
                            .await;
                        if let Ok(fresh) = &fresh {
                            put_typed(job_state, ctx.job_id, &cache_key, fresh, ttl).await;
                        }
                        fresh
                    }
                };

            let outcome = suggestions.map(|suggestions| {
                suggestions
                    .into_iter()
                    .map(|s| {
                        let reason = match s.competitor_type {
                            Some(kind) => format!("AI suggestion ({kind})"),
                            None => "AI suggestion".to_string(),
                        };
                        RawMention::new(s.handle, SourceKind::Ai, reason)
                            .with_platform(s.platform)
                            .with_snippet(s.reasoning)
                            .with_score(s.relevance_score)
                    })
                    .collect::<Vec<_>>()
            });
            found.record(outcome.with_context(|| format!("{platform} suggestions")));
        }
        found.finish()
    }
}

/// Past picks for the same client. The stored discovery reason comes back as
/// provenance only.
async fn historical_mentions(ctx: &CollectContext<'_>, store: &dyn RunStore) -> Result<SourceYield> {
    let Some(client_id) = ctx.brand.client_id else {
        return Ok(SourceYield::default());
    };
    let history = store
        .historical_competitors(client_id, ctx.job_id, ctx.policy.historical_min_relevance)
        .await?;

    let mentions = history
        .into_iter()
        .map(|h| {
            let reason = h
                .discovery_reason
                .unwrap_or_else(|| "Previously confirmed competitor".to_string());
            RawMention::new(h.handle, SourceKind::Historical, reason)
                .with_platform(h.platform)
                .with_score(h.relevance_score / 100.0)
        })
        .collect();
    Ok(SourceYield {
        mentions,
        calls: 1,
        failures: Vec::new(),
    })
}

/// Queries for the direct source, most specific first.
pub fn direct_queries(brand: &BrandContext, platform: Platform) -> Vec<String> {
    let niche = brand.niche.trim();
    let mut queries = vec![
        format!("top {niche} {platform} accounts"),
        format!("{niche} {platform} creators to follow"),
    ];
    if !brand.brand_name.trim().is_empty() {
        queries.push(format!("{} competitors {platform}", brand.brand_name.trim()));
    }
    queries
}

/// Run one source under its time budget, with start/finish events.
async fn run_isolated<'a>(
    kind: SourceKind,
    work: BoxFuture<'a, Result<SourceYield>>,
    budget: Duration,
    ctx: &CollectContext<'_>,
    events: &dyn EventSink,
) -> (SourceKind, Result<SourceYield>) {
    let event = |code: EventCode, message: String| {
        DiagnosticEvent::new(ctx.job_id, code, message)
            .with_run_id(ctx.run_id)
            .with_source(kind.as_str())
    };

    emit_best_effort(events, event(EventCode::SourceStarted, format!("{kind} source started"))).await;
    let started = Instant::now();

    let outcome = match tokio::time::timeout(budget, work).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("timed out after {}s", budget.as_secs())),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match &outcome {
        Ok(found) => {
            let mentions = found.mentions.len();
            let failures = found.failures.len();
            if failures > 0 {
                warn!(
                    run_id = %ctx.run_id,
                    source = %kind,
                    failures,
                    calls = found.calls,
                    first_error = %found.failures[0],
                    "Source completed with failed calls"
                );
            } else {
                info!(run_id = %ctx.run_id, source = %kind, mentions, elapsed_ms, "Source completed");
            }
            let message = match failures {
                0 => format!("{kind} source returned {mentions} mentions"),
                n => format!("{kind} source returned {mentions} mentions ({n} of {} calls failed)", found.calls),
            };
            emit_best_effort(
                events,
                event(EventCode::SourceCompleted, message).with_metrics(json!({
                    "mentions": mentions,
                    "failures": failures,
                    "calls": found.calls,
                    "elapsedMs": elapsed_ms,
                })),
            )
            .await;
        }
        Err(e) => {
            warn!(run_id = %ctx.run_id, source = %kind, error = %e, "Source failed, continuing without it");
            emit_best_effort(
                events,
                event(EventCode::SourceFailed, format!("{kind} source failed: {e}"))
                    .with_metrics(json!({"elapsedMs": elapsed_ms})),
            )
            .await;
        }
    }
    (kind, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_queries_cover_niche_and_brand() {
        let brand = BrandContext {
            brand_name: "Crumb & Co".into(),
            niche: "vegan bakery".into(),
            ..Default::default()
        };
        let queries = direct_queries(&brand, Platform::TikTok);
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0], "top vegan bakery tiktok accounts");
        assert!(queries[2].starts_with("Crumb & Co competitors"));
    }
}
