//! Persistence seam for validated weather data.
//!
//! Only cleaned records pass through this boundary; anything a store hands
//! back can be displayed without re-validation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::model::FetchResult;

/// Case- and whitespace-insensitive lookup key for a place/region pair.
fn cache_key(place: &str, region: &str) -> String {
    format!("{},{}", place.trim().to_lowercase(), region.trim().to_lowercase())
}

#[async_trait]
pub trait WeatherStore: Send + Sync {
    /// Persist one validated acquisition under the given place and region.
    async fn save_validated(
        &self,
        place: &str,
        region: &str,
        result: &FetchResult,
    ) -> anyhow::Result<()>;

    /// A previously saved result no older than `max_age`, if any.
    async fn get_cached(&self, place: &str, region: &str, max_age: Duration)
    -> Option<FetchResult>;
}

/// Process-local store keyed by place/region, with save-time timestamps for
/// freshness checks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, (DateTime<Utc>, FetchResult)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WeatherStore for MemoryStore {
    async fn save_validated(
        &self,
        place: &str,
        region: &str,
        result: &FetchResult,
    ) -> anyhow::Result<()> {
        let key = cache_key(place, region);
        tracing::debug!(key, "storing validated result");
        self.entries.write().await.insert(key, (Utc::now(), result.clone()));
        Ok(())
    }

    async fn get_cached(
        &self,
        place: &str,
        region: &str,
        max_age: Duration,
    ) -> Option<FetchResult> {
        let entries = self.entries.read().await;
        let (stored_at, result) = entries.get(&cache_key(place, region))?;

        let age = Utc::now().signed_duration_since(*stored_at);
        let max_age = chrono::Duration::from_std(max_age).ok()?;
        if age <= max_age { Some(result.clone()) } else { None }
    }
}
