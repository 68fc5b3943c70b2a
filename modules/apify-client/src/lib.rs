pub mod error;
pub mod types;

pub use error::{ApifyError, Result};
pub use types::{InstagramProfile, InstagramProfileInput, ProfilePost, RunData};

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use types::ApiResponse;

const BASE_URL: &str = "https://api.apify.com/v2";

/// Actor for apify/instagram-profile-scraper (`owner~name` form).
const INSTAGRAM_PROFILE_SCRAPER: &str = "apify~instagram-profile-scraper";

/// Apify caps a single long-poll at 60 seconds.
const MAX_WAIT_PER_POLL_SECS: u64 = 60;

pub struct ApifyClient {
    client: reqwest::Client,
    token: String,
    base_url: String,
}

impl ApifyClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Start an actor run with `input`. Returns immediately with run metadata.
    pub async fn start_run<I: Serialize + ?Sized>(&self, actor_id: &str, input: &I) -> Result<RunData> {
        let url = format!("{}/acts/{}/runs", self.base_url, actor_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(input)
            .send()
            .await?;

        let api_resp: ApiResponse<RunData> = Self::checked(resp).await?.json().await?;
        Ok(api_resp.data)
    }

    /// Poll until a run completes or `max_wait` elapses.
    /// Uses `waitForFinish` long-polling, capped at the remaining budget.
    pub async fn wait_for_run(&self, run_id: &str, max_wait: Duration) -> Result<RunData> {
        let started = Instant::now();
        loop {
            let remaining = max_wait.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Err(ApifyError::Timeout {
                    run_id: run_id.to_string(),
                    waited_secs: max_wait.as_secs(),
                });
            }
            let wait_secs = remaining.as_secs().clamp(1, MAX_WAIT_PER_POLL_SECS);

            let url = format!(
                "{}/actor-runs/{}?waitForFinish={}",
                self.base_url, run_id, wait_secs
            );
            let resp = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;

            let api_resp: ApiResponse<RunData> = Self::checked(resp).await?.json().await?;
            let run = api_resp.data;
            if run.is_succeeded() {
                return Ok(run);
            }
            if run.is_terminal_failure() {
                return Err(ApifyError::RunFailed(run.status));
            }
            tracing::debug!(run_id, status = %run.status, "Run still in progress");
        }
    }

    /// Fetch dataset items from a completed run.
    pub async fn get_dataset_items<T: DeserializeOwned>(&self, dataset_id: &str) -> Result<Vec<T>> {
        let url = format!("{}/datasets/{}/items?format=json", self.base_url, dataset_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let items: Vec<T> = Self::checked(resp).await?.json().await?;
        Ok(items)
    }

    /// Run an actor end-to-end: start, poll within `max_wait`, fetch the dataset.
    pub async fn run_actor<I, T>(&self, actor_id: &str, input: &I, max_wait: Duration) -> Result<Vec<T>>
    where
        I: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let run = self.start_run(actor_id, input).await?;
        tracing::info!(actor_id, run_id = %run.id, "Apify run started, polling for completion");

        let completed = self.wait_for_run(&run.id, max_wait).await?;
        tracing::info!(
            run_id = %completed.id,
            dataset_id = %completed.default_dataset_id,
            "Run completed, fetching results"
        );

        self.get_dataset_items(&completed.default_dataset_id).await
    }

    /// Scrape Instagram profiles (bio, follower count, recent posts).
    pub async fn instagram_profiles(
        &self,
        usernames: &[String],
        posts_per_profile: u32,
        max_wait: Duration,
    ) -> Result<Vec<InstagramProfile>> {
        tracing::info!(count = usernames.len(), "Starting Instagram profile scrape");

        let input = InstagramProfileInput {
            usernames: usernames.to_vec(),
            results_limit: posts_per_profile,
        };
        let profiles: Vec<InstagramProfile> = self
            .run_actor(INSTAGRAM_PROFILE_SCRAPER, &input, max_wait)
            .await?;

        tracing::info!(count = profiles.len(), "Fetched Instagram profiles");
        Ok(profiles)
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApifyError::Api {
            status: status.as_u16(),
            message: body,
        })
    }
}
