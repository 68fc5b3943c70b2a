use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use rivalscout_common::Platform;

use super::{AlgorithmicSearch, DirectSearch};
use crate::aggregator::{handles_from_text, normalize_handle};

/// One organic web search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub link: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    pub fn text(&self) -> String {
        format!("{} {} {}", self.link, self.title, self.snippet)
    }
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;
}

// --- Serper (Google Search) ---

pub struct SerperSearcher {
    api_key: String,
    client: reqwest::Client,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, serde::Deserialize)]
struct SerperResult {
    #[serde(default)]
    link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerperSearcher {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            api_key: api_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl WebSearch for SerperSearcher {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        info!(query, max_results, "Serper search");

        let body = serde_json::json!({
            "q": query,
            "num": max_results,
        });

        let resp = self
            .client
            .post("https://google.serper.dev/search")
            .header("X-API-KEY", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Serper API request failed")?
            .error_for_status()
            .context("Serper API returned an error status")?;

        let data: SerperResponse = resp
            .json()
            .await
            .context("Failed to parse Serper response")?;

        let hits: Vec<SearchHit> = data
            .organic
            .into_iter()
            .map(|r| SearchHit {
                link: r.link,
                title: r.title,
                snippet: r.snippet,
            })
            .collect();

        info!(query, count = hits.len(), "Serper search complete");
        Ok(hits)
    }
}

// --- Search-backed discovery ---

/// Finds competitor handles in web search results.
/// Serves as both the algorithmic (seed-based) and the direct (query) source.
pub struct SearchDiscovery {
    web: Arc<dyn WebSearch>,
    results_per_query: usize,
}

impl SearchDiscovery {
    pub fn new(web: Arc<dyn WebSearch>) -> Self {
        Self {
            web,
            results_per_query: 20,
        }
    }

    pub fn with_results_per_query(mut self, n: usize) -> Self {
        self.results_per_query = n;
        self
    }

    fn seed_queries(seed: &str, niche: &str) -> Vec<String> {
        let seed = normalize_handle(seed);
        vec![
            format!("accounts like @{seed}"),
            format!("similar to @{seed}"),
            format!("{niche} influencers like {seed}"),
            format!("{niche} content creators"),
        ]
    }
}

/// Handles in a hit, as profile URLs when the hit itself is a profile page and
/// as bare `@handle`s otherwise (the caller supplies the platform).
fn handles_in_hit(hit: &SearchHit) -> Vec<String> {
    let text = hit.text();
    match Platform::from_url(&hit.link) {
        Some(platform) => handles_from_text(&text, platform)
            .into_iter()
            .map(|h| platform.profile_url(&h))
            .collect(),
        None => handles_from_text(&text, Platform::Instagram)
            .into_iter()
            .map(|h| format!("@{h}"))
            .collect(),
    }
}

fn push_unique(out: &mut Vec<String>, value: String, max: usize) -> bool {
    if out.len() >= max {
        return false;
    }
    if !out.contains(&value) {
        out.push(value);
    }
    true
}

#[async_trait]
impl AlgorithmicSearch for SearchDiscovery {
    async fn search(&self, seed: &str, niche_hint: &str, max_results: usize) -> Result<Vec<String>> {
        let seed_handle = normalize_handle(seed);
        let mut out = Vec::new();

        'queries: for query in Self::seed_queries(seed, niche_hint) {
            let hits = self.web.search(&query, self.results_per_query).await?;
            for hit in &hits {
                for found in handles_in_hit(hit) {
                    if normalize_handle(&found) == seed_handle {
                        continue;
                    }
                    if !push_unique(&mut out, found, max_results) {
                        break 'queries;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DirectSearch for SearchDiscovery {
    async fn search(&self, query: &str, platform: Platform, max_results: usize) -> Result<Vec<String>> {
        let scoped = format!("{query} site:{}", platform.host());
        let hits = self.web.search(&scoped, self.results_per_query).await?;

        let mut out = Vec::new();
        'hits: for hit in &hits {
            for handle in handles_from_text(&hit.text(), platform) {
                if !push_unique(&mut out, handle, max_results) {
                    break 'hits;
                }
            }
        }
        Ok(out)
    }
}
