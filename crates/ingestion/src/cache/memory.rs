//! In-process tier backed by moka

use super::{CacheEntry, CacheError, CacheTier, TierLevel};
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::time::Duration;

/// Bounded in-process cache
///
/// moka evicts by capacity and by `max_ttl`; per-entry expiry is carried in
/// the entry itself and checked by [`super::TieredCache`].
#[derive(Clone)]
pub struct MemoryCacheTier {
    entries: Cache<String, CacheEntry<Value>>,
}

impl MemoryCacheTier {
    pub fn new(max_capacity: u64, max_ttl: Duration) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(max_ttl)
            .build();
        Self { entries }
    }

    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }
}

#[async_trait]
impl CacheTier for MemoryCacheTier {
    fn level(&self) -> TierLevel {
        TierLevel::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, entry: &CacheEntry<Value>) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), entry.clone()).await;
        Ok(())
    }
}
