use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::clock::Clock;
use crate::models::{Profile, ProfilePatch};
use crate::services::store::{ProfileQuery, ProfileStore, StoreError};

#[derive(Debug, Clone)]
struct CachedProfile {
    profile: Profile,
    fetched_at: DateTime<Utc>,
}

/// Read-through profile cache in front of any `ProfileStore`.
///
/// Entries go stale `ttl` after they were fetched, measured on the injected
/// clock. Moka's own expiry only bounds memory use. Quota decisions must go
/// through `get_fresh`.
pub struct ProfileCache {
    inner: Arc<dyn ProfileStore>,
    entries: moka::future::Cache<String, CachedProfile>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProfileCache {
    pub fn new(
        inner: Arc<dyn ProfileStore>,
        capacity: u64,
        ttl_secs: u64,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = moka::future::CacheBuilder::new(capacity)
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .build();

        Self {
            inner,
            entries,
            ttl: chrono::Duration::seconds(ttl_secs as i64),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn fetch(&self, id: &str) -> Result<Profile, StoreError> {
        let profile = self.inner.get(id).await?;
        self.entries
            .insert(
                id.to_string(),
                CachedProfile {
                    profile: profile.clone(),
                    fetched_at: self.clock.now(),
                },
            )
            .await;
        Ok(profile)
    }

    pub fn stats(&self) -> CacheStats {
        let hit_count = self.hits.load(Ordering::Relaxed);
        let miss_count = self.misses.load(Ordering::Relaxed);
        let total = hit_count + miss_count;

        CacheStats {
            size: self.entries.entry_count(),
            hit_count,
            miss_count,
            hit_rate: if total == 0 {
                0.0
            } else {
                hit_count as f64 / total as f64
            },
        }
    }
}

#[async_trait]
impl ProfileStore for ProfileCache {
    async fn get(&self, id: &str) -> Result<Profile, StoreError> {
        if let Some(cached) = self.entries.get(id).await {
            if self.clock.now() - cached.fetched_at < self.ttl {
                tracing::trace!("Profile cache hit: {}", id);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(cached.profile);
            }
        }

        tracing::trace!("Profile cache miss: {}", id);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.fetch(id).await
    }

    async fn update(&self, id: &str, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let profile = self.inner.update(id, patch).await?;
        self.entries
            .insert(
                id.to_string(),
                CachedProfile {
                    profile: profile.clone(),
                    fetched_at: self.clock.now(),
                },
            )
            .await;
        Ok(profile)
    }

    async fn query(&self, query: &ProfileQuery) -> Result<Vec<Profile>, StoreError> {
        self.inner.query(query).await
    }

    async fn get_fresh(&self, id: &str) -> Result<Profile, StoreError> {
        self.fetch(id).await
    }

    async fn invalidate(&self, id: &str) {
        self.entries.invalidate(id).await;
        tracing::trace!("Profile cache invalidated: {}", id);
    }
}

/// Cache statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_rate: f64,
}
