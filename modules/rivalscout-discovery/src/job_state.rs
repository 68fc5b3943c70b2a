//! Per-job scratch state that survives between runs, with expiry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

/// Keyed-by-job store with TTL. Values are opaque JSON.
#[async_trait]
pub trait JobStateStore: Send + Sync {
    async fn get(&self, job_id: Uuid, key: &str) -> Option<serde_json::Value>;
    async fn put(&self, job_id: Uuid, key: &str, value: serde_json::Value, ttl: Duration);
    async fn remove(&self, job_id: Uuid, key: &str);
}

/// Typed read. A value that no longer deserializes is treated as absent.
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn JobStateStore,
    job_id: Uuid,
    key: &str,
) -> Option<T> {
    let value = store.get(job_id, key).await?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%job_id, key, error = %e, "Discarding undecodable job state");
            None
        }
    }
}

pub async fn put_typed<T: Serialize>(
    store: &dyn JobStateStore,
    job_id: Uuid,
    key: &str,
    value: &T,
    ttl: Duration,
) {
    match serde_json::to_value(value) {
        Ok(v) => store.put(job_id, key, v, ttl).await,
        Err(e) => warn!(%job_id, key, error = %e, "Failed to encode job state"),
    }
}

// ---------------------------------------------------------------------------
// MemoryJobStateStore
// ---------------------------------------------------------------------------

struct Entry {
    expires_at: Instant,
    value: serde_json::Value,
}

/// Process-local implementation. Expired entries are evicted lazily on read
/// and on every write.
#[derive(Default)]
pub struct MemoryJobStateStore {
    entries: Mutex<HashMap<(Uuid, String), Entry>>,
}

impl MemoryJobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStateStore for MemoryJobStateStore {
    async fn get(&self, job_id: Uuid, key: &str) -> Option<serde_json::Value> {
        let mut entries = self.entries.lock().ok()?;
        let map_key = (job_id, key.to_string());
        let live = entries
            .get(&map_key)
            .map(|entry| (entry.expires_at > Instant::now(), entry.value.clone()));
        match live {
            Some((true, value)) => Some(value),
            Some((false, _)) => {
                entries.remove(&map_key);
                None
            }
            None => None,
        }
    }

    async fn put(&self, job_id: Uuid, key: &str, value: serde_json::Value, ttl: Duration) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            (job_id, key.to_string()),
            Entry {
                expires_at: now + ttl,
                value,
            },
        );
    }

    async fn remove(&self, job_id: Uuid, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&(job_id, key.to_string()));
        }
    }
}
