//! Three-tier read-through cache
//!
//! Tiers are consulted fastest first: in-process memory, then Redis, then
//! Postgres. A hit in a slower tier is copied into every faster tier before it
//! is returned. Writes go to the durable tier first and are awaited, so a
//! value reported as cached survives a crash.
//!
//! An unavailable tier is skipped with a warning; the remaining tiers keep
//! serving.

mod memory;
mod postgres;
mod redis;

pub use self::memory::MemoryCacheTier;
pub use self::postgres::PostgresCacheTier;
pub use self::redis::RedisCacheTier;

use crate::config::CacheTtlConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Cache key prefixes
const PREFIX_MOVIE: &str = "movie";
const PREFIX_EPISODES: &str = "episodes";
const PREFIX_LATEST: &str = "latest";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("{tier} cache tier unavailable: {reason}")]
    Unavailable { tier: TierLevel, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache entry already expired")]
    Expired,
}

impl CacheError {
    pub(crate) fn unavailable(tier: TierLevel, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            tier,
            reason: reason.to_string(),
        }
    }
}

/// Tier position, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierLevel {
    Memory,
    Distributed,
    Durable,
}

impl fmt::Display for TierLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Distributed => "distributed",
            Self::Durable => "durable",
        })
    }
}

/// A value with an absolute expiry instant
///
/// Expired entries are never deleted here, only ignored or superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub value: T,
    pub expires_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self { value, expires_at }
    }

    pub fn is_fresh(&self) -> bool {
        Utc::now() < self.expires_at
    }

    /// Time left before expiry, zero once expired
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

/// One storage medium in the hierarchy
#[async_trait]
pub trait CacheTier: Send + Sync {
    fn level(&self) -> TierLevel;

    /// Stored entry, fresh or not
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError>;

    async fn set(&self, key: &str, entry: &CacheEntry<Value>) -> Result<(), CacheError>;
}

/// Time-to-live for each tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub memory: Duration,
    pub distributed: Duration,
    pub durable: Duration,
}

impl TtlPolicy {
    pub fn ttl_for(&self, level: TierLevel) -> Duration {
        match level {
            TierLevel::Memory => self.memory,
            TierLevel::Distributed => self.distributed,
            TierLevel::Durable => self.durable,
        }
    }
}

impl From<&CacheTtlConfig> for TtlPolicy {
    fn from(config: &CacheTtlConfig) -> Self {
        Self {
            memory: config.memory_ttl,
            distributed: config.distributed_ttl,
            durable: config.durable_ttl,
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from(&CacheTtlConfig::default())
    }
}

/// Result of a cache hit, with the tier that served it
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub value: T,
    pub tier: TierLevel,
}

/// Outcome of a write across tiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheWriteReport {
    pub written: Vec<TierLevel>,
    pub failed: Vec<TierLevel>,
}

impl CacheWriteReport {
    pub fn durable_written(&self) -> bool {
        self.written.contains(&TierLevel::Durable)
    }
}

/// Hit/miss counters
#[derive(Debug, Default)]
struct CacheStats {
    hits: [AtomicU64; 3],
    misses: AtomicU64,
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub distributed_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
}

/// Read-through cache over an ordered set of tiers
#[derive(Clone)]
pub struct TieredCache {
    tiers: Vec<Arc<dyn CacheTier>>,
    policy: TtlPolicy,
    stats: Arc<CacheStats>,
}

impl TieredCache {
    /// Tiers may be given in any order; at most one per level is expected
    pub fn new(mut tiers: Vec<Arc<dyn CacheTier>>, policy: TtlPolicy) -> Self {
        tiers.sort_by_key(|tier| tier.level());
        Self {
            tiers,
            policy,
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    pub fn levels(&self) -> Vec<TierLevel> {
        self.tiers.iter().map(|tier| tier.level()).collect()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let hit = |level: TierLevel| self.stats.hits[level as usize].load(Ordering::Relaxed);
        CacheStatsSnapshot {
            memory_hits: hit(TierLevel::Memory),
            distributed_hits: hit(TierLevel::Distributed),
            durable_hits: hit(TierLevel::Durable),
            misses: self.stats.misses.load(Ordering::Relaxed),
        }
    }

    /// Look a key up top-down, promoting slower-tier hits
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<CacheHit<T>> {
        for (index, tier) in self.tiers.iter().enumerate() {
            let level = tier.level();
            let entry = match tier.get(key).await {
                Ok(Some(entry)) if entry.is_fresh() => entry,
                Ok(Some(_)) => {
                    debug!(tier = %level, "Ignoring expired entry");
                    continue;
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(tier = %level, error = %e, "Cache tier read failed, skipping");
                    continue;
                }
            };

            let value = match serde_json::from_value::<T>(entry.value.clone()) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tier = %level, error = %e, "Cached value has unexpected shape, skipping");
                    continue;
                }
            };

            self.promote(key, &entry, &self.tiers[..index]).await;
            self.stats.hits[level as usize].fetch_add(1, Ordering::Relaxed);
            debug!(tier = %level, "Cache hit");
            return Some(CacheHit { value, tier: level });
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss");
        None
    }

    /// Copy a hit into faster tiers without extending its freshness
    async fn promote(&self, key: &str, entry: &CacheEntry<Value>, faster: &[Arc<dyn CacheTier>]) {
        let remaining = entry.remaining();
        for tier in faster {
            let ttl = self.policy.ttl_for(tier.level()).min(remaining);
            let promoted = CacheEntry::new(entry.value.clone(), ttl);
            if let Err(e) = tier.set(key, &promoted).await {
                warn!(tier = %tier.level(), error = %e, "Cache write-back failed");
            }
        }
    }

    /// Write a value to every tier, durable first
    ///
    /// Tier failures are reported, not returned; only serialization fails
    /// the call.
    #[instrument(skip(self, value, policy), fields(key = %key))]
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        policy: &TtlPolicy,
    ) -> Result<CacheWriteReport, CacheError> {
        let value = serde_json::to_value(value)?;
        let mut report = CacheWriteReport::default();

        for tier in self.tiers.iter().rev() {
            let level = tier.level();
            let entry = CacheEntry::new(value.clone(), policy.ttl_for(level));
            match tier.set(key, &entry).await {
                Ok(()) => report.written.push(level),
                Err(e) => {
                    warn!(tier = %level, error = %e, "Cache tier write failed");
                    report.failed.push(level);
                }
            }
        }

        debug!(written = ?report.written, failed = ?report.failed, "Cache set");
        Ok(report)
    }

    /// Write with the cache's own policy
    pub async fn set_default<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<CacheWriteReport, CacheError> {
        let policy = self.policy;
        self.set(key, value, &policy).await
    }
}

pub fn movie_key(slug: &str) -> String {
    format!("{}:{}", PREFIX_MOVIE, slug)
}

pub fn episodes_key(slug: &str) -> String {
    format!("{}:{}", PREFIX_EPISODES, slug)
}

pub fn latest_key(page: u32, limit: u32) -> String {
    format!("{}:{}:{}", PREFIX_LATEST, page, limit)
}

/// Key for an arbitrary query: `{prefix}:{sha256 of its JSON}`
pub fn query_key<T: Serialize>(prefix: &str, query: &T) -> Result<String, CacheError> {
    let json = serde_json::to_string(query)?;
    let hash = Sha256::digest(json.as_bytes());
    Ok(format!("{}:{}", prefix, hex::encode(hash)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// In-process tier with a configurable level for ordering tests
    struct MapTier {
        level: TierLevel,
        entries: Mutex<HashMap<String, CacheEntry<Value>>>,
        down: bool,
    }

    impl MapTier {
        fn new(level: TierLevel) -> Arc<Self> {
            Arc::new(Self {
                level,
                entries: Mutex::new(HashMap::new()),
                down: false,
            })
        }

        fn unavailable(level: TierLevel) -> Arc<Self> {
            Arc::new(Self {
                level,
                entries: Mutex::new(HashMap::new()),
                down: true,
            })
        }
    }

    #[async_trait]
    impl CacheTier for MapTier {
        fn level(&self) -> TierLevel {
            self.level
        }

        async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError> {
            if self.down {
                return Err(CacheError::unavailable(self.level, "connection refused"));
            }
            Ok(self.entries.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, entry: &CacheEntry<Value>) -> Result<(), CacheError> {
            if self.down {
                return Err(CacheError::unavailable(self.level, "connection refused"));
            }
            self.entries
                .lock()
                .await
                .insert(key.to_string(), entry.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_set_then_get_hits_fastest_tier() {
        let memory = MapTier::new(TierLevel::Memory);
        let durable = MapTier::new(TierLevel::Durable);
        let tiers: Vec<Arc<dyn CacheTier>> = vec![durable, memory];
        let cache = TieredCache::new(tiers, TtlPolicy::default());

        let report = cache.set_default("k", &"v".to_string()).await.unwrap();
        assert_eq!(report.written, vec![TierLevel::Durable, TierLevel::Memory]);
        assert!(report.durable_written());

        let hit: CacheHit<String> = cache.get("k").await.unwrap();
        assert_eq!(hit.tier, TierLevel::Memory);
        assert_eq!(hit.value, "v");
    }

    #[tokio::test]
    async fn test_slow_hit_is_promoted_without_extending_life() {
        let memory = MapTier::new(TierLevel::Memory);
        let durable = MapTier::new(TierLevel::Durable);
        durable
            .set("k", &CacheEntry::new(Value::from(7), Duration::from_secs(30)))
            .await
            .unwrap();

        let tiers: Vec<Arc<dyn CacheTier>> = vec![memory.clone(), durable];
        let cache = TieredCache::new(tiers, TtlPolicy::default());

        let first: CacheHit<i64> = cache.get("k").await.unwrap();
        assert_eq!(first.tier, TierLevel::Durable);

        let promoted = memory.get("k").await.unwrap().unwrap();
        assert!(promoted.remaining() <= Duration::from_secs(30));

        let second: CacheHit<i64> = cache.get("k").await.unwrap();
        assert_eq!(second.tier, TierLevel::Memory);

        let stats = cache.stats();
        assert_eq!(stats.durable_hits, 1);
        assert_eq!(stats.memory_hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_ignored() {
        let memory = MapTier::new(TierLevel::Memory);
        let mut stale = CacheEntry::new(Value::from("old"), Duration::from_secs(60));
        stale.expires_at = Utc::now() - chrono::Duration::seconds(1);
        memory.set("k", &stale).await.unwrap();

        let tiers: Vec<Arc<dyn CacheTier>> = vec![memory];
        let cache = TieredCache::new(tiers, TtlPolicy::default());
        assert!(cache.get::<String>("k").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_unavailable_tier_is_skipped() {
        let memory = MapTier::new(TierLevel::Memory);
        let redis = MapTier::unavailable(TierLevel::Distributed);
        let tiers: Vec<Arc<dyn CacheTier>> = vec![memory, redis];
        let cache = TieredCache::new(tiers, TtlPolicy::default());

        let report = cache.set_default("k", &1u32).await.unwrap();
        assert_eq!(report.failed, vec![TierLevel::Distributed]);
        assert_eq!(report.written, vec![TierLevel::Memory]);

        let hit: CacheHit<u32> = cache.get("k").await.unwrap();
        assert_eq!(hit.tier, TierLevel::Memory);
    }

    #[test]
    fn test_query_key_is_stable() {
        let a = query_key("search", &("love", 1, 20)).unwrap();
        let b = query_key("search", &("love", 1, 20)).unwrap();
        let c = query_key("search", &("love", 2, 20)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("search:"));
        assert_eq!(a.len(), "search:".len() + 64);
    }
}
