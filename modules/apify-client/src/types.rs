use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Wrapper for Apify API responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// Metadata for an actor run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunData {
    pub id: String,
    pub status: String,
    #[serde(rename = "defaultDatasetId")]
    pub default_dataset_id: String,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunData {
    pub fn is_succeeded(&self) -> bool {
        self.status == "SUCCEEDED"
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(self.status.as_str(), "FAILED" | "ABORTED" | "TIMED-OUT")
    }
}

// --- Instagram profile scraper ---

/// Input for the apify/instagram-profile-scraper actor.
#[derive(Debug, Clone, Serialize)]
pub struct InstagramProfileInput {
    pub usernames: Vec<String>,
    #[serde(rename = "resultsLimit")]
    pub results_limit: u32,
}

/// One profile from the instagram-profile-scraper dataset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstagramProfile {
    pub username: String,
    pub full_name: Option<String>,
    pub biography: Option<String>,
    pub followers_count: Option<u64>,
    pub follows_count: Option<u64>,
    pub posts_count: Option<u64>,
    pub private: bool,
    pub verified: bool,
    pub business_category_name: Option<String>,
    pub external_url: Option<String>,
    pub latest_posts: Vec<ProfilePost>,
}

impl InstagramProfile {
    /// Timestamp of the newest post in `latest_posts`.
    pub fn latest_post_at(&self) -> Option<DateTime<Utc>> {
        self.latest_posts.iter().filter_map(|p| p.timestamp).max()
    }

    /// Bio, category and recent captions joined into one lowercase blob.
    pub fn text_blob(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.extend(self.full_name.as_deref());
        parts.extend(self.biography.as_deref());
        parts.extend(self.business_category_name.as_deref());
        parts.extend(self.latest_posts.iter().filter_map(|p| p.caption.as_deref()));
        parts.join(" ").to_lowercase()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfilePost {
    pub caption: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub likes_count: Option<i64>,
    pub comments_count: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_parses_dataset_item() {
        let item = serde_json::json!({
            "username": "oatlybarista",
            "fullName": "Oat Barista Co",
            "biography": "Plant-based barista milk",
            "followersCount": 48200,
            "private": false,
            "latestPosts": [
                {"caption": "Latte art", "timestamp": "2025-01-10T12:00:00.000Z"},
                {"caption": "Cold brew", "timestamp": "2025-01-12T09:30:00.000Z"},
                {"caption": null}
            ],
            "someUnknownField": 1
        });
        let profile: InstagramProfile = serde_json::from_value(item).unwrap();
        assert_eq!(profile.followers_count, Some(48200));
        assert_eq!(
            profile.latest_post_at().unwrap().to_rfc3339(),
            "2025-01-12T09:30:00+00:00"
        );
        let blob = profile.text_blob();
        assert!(blob.contains("plant-based barista"));
        assert!(blob.contains("cold brew"));
    }

    #[test]
    fn run_status_helpers() {
        let run: RunData = serde_json::from_value(serde_json::json!({
            "id": "r1", "status": "TIMED-OUT", "defaultDatasetId": "d1"
        }))
        .unwrap();
        assert!(run.is_terminal_failure());
        assert!(!run.is_succeeded());
    }
}
