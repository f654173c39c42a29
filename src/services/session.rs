use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::services::store::StoreError;

/// Session-scoped set of offers a user skipped in the feed
#[async_trait]
pub trait SkipStore: Send + Sync {
    async fn skip(&self, user_id: &str, offer_id: Uuid) -> Result<(), StoreError>;
    async fn skipped(&self, user_id: &str) -> Result<HashSet<Uuid>, StoreError>;
    async fn reset(&self, user_id: &str) -> Result<(), StoreError>;
}

/// Session key builder
pub struct SessionKey;

impl SessionKey {
    /// Build a key for a user's skipped offers
    pub fn skips(user_id: &str) -> String {
        format!("feed:skips:{}", user_id)
    }
}

/// Skip sets held in process memory; they idle out after `ttl`
pub struct MemorySkipStore {
    sets: moka::future::Cache<String, HashSet<Uuid>>,
}

impl MemorySkipStore {
    pub fn new(ttl_secs: u64) -> Self {
        let sets = moka::future::CacheBuilder::new(100_000)
            .time_to_idle(Duration::from_secs(ttl_secs.max(1)))
            .build();
        Self { sets }
    }
}

#[async_trait]
impl SkipStore for MemorySkipStore {
    async fn skip(&self, user_id: &str, offer_id: Uuid) -> Result<(), StoreError> {
        // Read-modify-write under moka's per-key lock
        self.sets
            .entry(user_id.to_string())
            .and_upsert_with(|existing| {
                let mut set = existing.map(|entry| entry.into_value()).unwrap_or_default();
                set.insert(offer_id);
                std::future::ready(set)
            })
            .await;
        Ok(())
    }

    async fn skipped(&self, user_id: &str) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self.sets.get(user_id).await.unwrap_or_default())
    }

    async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        self.sets.invalidate(user_id).await;
        Ok(())
    }
}

/// Skip sets shared across instances through Redis
pub struct RedisSkipStore {
    // Store ConnectionManager in a Mutex for interior mutability
    redis: Arc<tokio::sync::Mutex<ConnectionManager>>,
    ttl_secs: u64,
}

impl RedisSkipStore {
    pub async fn new(redis_url: &str, ttl_secs: u64) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let redis = ConnectionManager::new(client).await?;

        Ok(Self {
            redis: Arc::new(tokio::sync::Mutex::new(redis)),
            ttl_secs,
        })
    }
}

#[async_trait]
impl SkipStore for RedisSkipStore {
    async fn skip(&self, user_id: &str, offer_id: Uuid) -> Result<(), StoreError> {
        let key = SessionKey::skips(user_id);
        let mut conn = self.redis.lock().await;
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(offer_id.to_string())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs)
            .ignore()
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }

    async fn skipped(&self, user_id: &str) -> Result<HashSet<Uuid>, StoreError> {
        let mut conn = self.redis.lock().await;
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(SessionKey::skips(user_id))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        Ok(members
            .iter()
            .filter_map(|m| match Uuid::parse_str(m) {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!("Ignoring malformed skip entry {} for {}", m, user_id);
                    None
                }
            })
            .collect())
    }

    async fn reset(&self, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.lock().await;
        redis::cmd("DEL")
            .arg(SessionKey::skips(user_id))
            .query_async::<()>(&mut *conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_builder() {
        assert_eq!(SessionKey::skips("user123"), "feed:skips:user123");
    }

    #[tokio::test]
    async fn test_memory_skips_are_per_user() {
        let store = MemorySkipStore::new(60);
        let offer = Uuid::new_v4();

        store.skip("a", offer).await.unwrap();
        store.skip("a", offer).await.unwrap();

        assert_eq!(store.skipped("a").await.unwrap().len(), 1);
        assert!(store.skipped("b").await.unwrap().is_empty());

        store.reset("a").await.unwrap();
        assert!(store.skipped("a").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_skips_are_all_kept() {
        let store = Arc::new(MemorySkipStore::new(60));
        let offers: Vec<Uuid> = (0..32).map(|_| Uuid::new_v4()).collect();

        let handles: Vec<_> = offers
            .iter()
            .map(|&offer| {
                let store = store.clone();
                tokio::spawn(async move { store.skip("a", offer).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let skipped = store.skipped("a").await.unwrap();
        assert_eq!(skipped.len(), offers.len());
        assert!(offers.iter().all(|offer| skipped.contains(offer)));
    }

    #[tokio::test]
    #[ignore = "Requires Redis"]
    async fn test_redis_skip_roundtrip() {
        let store = RedisSkipStore::new("redis://127.0.0.1:6379", 60)
            .await
            .expect("Failed to connect to Redis");
        let user = format!("test-{}", Uuid::new_v4());
        let offer = Uuid::new_v4();

        store.skip(&user, offer).await.unwrap();
        assert!(store.skipped(&user).await.unwrap().contains(&offer));

        store.reset(&user).await.unwrap();
        assert!(store.skipped(&user).await.unwrap().is_empty());
    }
}
