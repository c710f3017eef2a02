//! Shared distributed tier backed by Redis

use super::{CacheEntry, CacheError, CacheTier, TierLevel};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, instrument};
use vod_catalog_core::RedisConfig;

const KEY_PREFIX: &str = "vod-catalog";

/// Redis tier with a managed, auto-reconnecting connection
#[derive(Clone)]
pub struct RedisCacheTier {
    manager: ConnectionManager,
    response_timeout: Duration,
}

impl RedisCacheTier {
    /// Connect and verify the server answers PING
    #[instrument(skip(config), fields(redis_url = %config.url))]
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        info!("Initializing Redis cache tier");

        let client = Client::open(config.url.as_str())
            .map_err(|e| CacheError::unavailable(TierLevel::Distributed, e))?;

        let manager = tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::unavailable(TierLevel::Distributed, "connection timed out"))?
            .map_err(|e| CacheError::unavailable(TierLevel::Distributed, e))?;

        let mut conn = manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| CacheError::unavailable(TierLevel::Distributed, e))?;

        info!("Redis cache tier initialized");

        Ok(Self {
            manager,
            response_timeout: config.response_timeout,
        })
    }

    fn namespaced(key: &str) -> String {
        format!("{}:{}", KEY_PREFIX, key)
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: std::future::Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.response_timeout, op)
            .await
            .map_err(|_| CacheError::unavailable(TierLevel::Distributed, "response timed out"))?
            .map_err(|e| CacheError::unavailable(TierLevel::Distributed, e))
    }
}

#[async_trait]
impl CacheTier for RedisCacheTier {
    fn level(&self) -> TierLevel {
        TierLevel::Distributed
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError> {
        let mut conn = self.manager.clone();
        let key = Self::namespaced(key);

        let raw: Option<String> = self.bounded(conn.get(&key)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, entry: &CacheEntry<Value>) -> Result<(), CacheError> {
        let ttl_secs = expiry_secs(entry.remaining()).ok_or(CacheError::Expired)?;

        let json = serde_json::to_string(entry)?;
        let mut conn = self.manager.clone();
        let key = Self::namespaced(key);

        self.bounded(conn.set_ex::<_, _, ()>(&key, json, ttl_secs))
            .await?;

        debug!(key = %key, ttl = ttl_secs, "Redis tier set");
        Ok(())
    }
}

/// Whole seconds for `SETEX`, rounded up so a live entry is always written
fn expiry_secs(remaining: Duration) -> Option<u64> {
    if remaining.is_zero() {
        return None;
    }
    let secs = remaining.as_secs();
    Some(if remaining.subsec_nanos() > 0 { secs + 1 } else { secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_rounds_up_to_whole_seconds() {
        assert_eq!(expiry_secs(Duration::ZERO), None);
        assert_eq!(expiry_secs(Duration::from_millis(300)), Some(1));
        assert_eq!(expiry_secs(Duration::from_secs(5)), Some(5));
        assert_eq!(expiry_secs(Duration::from_millis(5_001)), Some(6));
    }

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(RedisCacheTier::namespaced("movie:foo"), "vod-catalog:movie:foo");
    }

    #[tokio::test]
    #[ignore] // Requires Redis; run with REDIS_URL set and --ignored
    async fn test_redis_round_trip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let config = RedisConfig {
            url,
            connection_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_millis(500),
        };
        let tier = RedisCacheTier::connect(&config).await.unwrap();

        let entry = CacheEntry::new(Value::from(42), Duration::from_secs(30));
        tier.set("test:round-trip", &entry).await.unwrap();

        let stored = tier.get("test:round-trip").await.unwrap().unwrap();
        assert_eq!(stored.value, Value::from(42));
    }
}
