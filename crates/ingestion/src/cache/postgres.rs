//! Durable tier stored in the `cache_entries` table

use super::{CacheEntry, CacheError, CacheTier, TierLevel};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;

/// Postgres-backed tier
///
/// Rows are overwritten on every set and never deleted here; expired rows are
/// ignored by the reader until a later write supersedes them.
#[derive(Clone)]
pub struct PostgresCacheTier {
    pool: PgPool,
}

impl PostgresCacheTier {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CacheTier for PostgresCacheTier {
    fn level(&self) -> TierLevel {
        TierLevel::Durable
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<Value>>, CacheError> {
        let row: Option<(Json<Value>, DateTime<Utc>)> =
            sqlx::query_as("SELECT value, expires_at FROM cache_entries WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CacheError::unavailable(TierLevel::Durable, e))?;

        Ok(row.map(|(Json(value), expires_at)| CacheEntry { value, expires_at }))
    }

    async fn set(&self, key: &str, entry: &CacheEntry<Value>) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(Json(&entry.value))
        .bind(entry.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CacheError::unavailable(TierLevel::Durable, e))?;

        Ok(())
    }
}
