//! Ingestion configuration
//!
//! All values come from `CATALOG_*` environment variables. Only the upstream
//! base URL is mandatory; everything else has a working default.

use std::time::Duration;
use url::Url;
use vod_catalog_core::config::{env_value, parse_env_var, ConfigLoader};
use vod_catalog_core::CoreError;

/// Upstream provider settings
///
/// # Environment Variables
///
/// - `CATALOG_UPSTREAM_BASE_URL` (required): Provider base URL
/// - `CATALOG_UPSTREAM_TIMEOUT_MS` (optional): Per-call timeout (default: 10000)
/// - `CATALOG_UPSTREAM_MAX_CONCURRENCY` (optional): Concurrent outbound calls (default: 5)
/// - `CATALOG_UPSTREAM_IMAGE_BASE` (optional): CDN base for relative artwork paths
/// - `CATALOG_UPSTREAM_USER_AGENT` (optional): User agent header
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_concurrency: usize,
    pub image_base: Option<String>,
    pub user_agent: String,
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
            max_concurrency: 5,
            image_base: None,
            user_agent: format!("vod-catalog-ingestion/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConfigLoader for UpstreamConfig {
    fn from_env() -> Result<Self, CoreError> {
        let base_url = env_value(&["CATALOG_UPSTREAM_BASE_URL"]).ok_or_else(|| {
            CoreError::config(
                "CATALOG_UPSTREAM_BASE_URL must be set",
                "CATALOG_UPSTREAM_BASE_URL",
            )
        })?;

        let defaults = UpstreamConfig::new(base_url);
        let timeout_ms = parse_env_var("CATALOG_UPSTREAM_TIMEOUT_MS", 10_000u64)?;
        let max_concurrency =
            parse_env_var("CATALOG_UPSTREAM_MAX_CONCURRENCY", defaults.max_concurrency)?;

        Ok(Self {
            request_timeout: Duration::from_millis(timeout_ms),
            max_concurrency,
            image_base: env_value(&["CATALOG_UPSTREAM_IMAGE_BASE"]),
            user_agent: env_value(&["CATALOG_UPSTREAM_USER_AGENT"])
                .unwrap_or_else(|| defaults.user_agent.clone()),
            ..defaults
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        Url::parse(&self.base_url).map_err(|e| {
            CoreError::config(
                format!("Invalid upstream base URL: {}", e),
                "CATALOG_UPSTREAM_BASE_URL",
            )
        })?;

        if let Some(image_base) = &self.image_base {
            Url::parse(image_base).map_err(|e| {
                CoreError::config(
                    format!("Invalid image base URL: {}", e),
                    "CATALOG_UPSTREAM_IMAGE_BASE",
                )
            })?;
        }

        if self.max_concurrency == 0 {
            return Err(CoreError::config(
                "max_concurrency must be greater than 0",
                "CATALOG_UPSTREAM_MAX_CONCURRENCY",
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(CoreError::config(
                "request timeout must be greater than 0",
                "CATALOG_UPSTREAM_TIMEOUT_MS",
            ));
        }

        Ok(())
    }
}

/// Time-to-live per cache tier
///
/// # Environment Variables
///
/// - `CATALOG_CACHE_MEMORY_TTL_SECS` (default: 300)
/// - `CATALOG_CACHE_DISTRIBUTED_TTL_SECS` (default: 1800)
/// - `CATALOG_CACHE_DURABLE_TTL_SECS` (default: 86400)
/// - `CATALOG_CACHE_MEMORY_CAPACITY` (default: 10000)
#[derive(Debug, Clone)]
pub struct CacheTtlConfig {
    pub memory_ttl: Duration,
    pub distributed_ttl: Duration,
    pub durable_ttl: Duration,
    pub memory_capacity: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            memory_ttl: Duration::from_secs(5 * 60),
            distributed_ttl: Duration::from_secs(30 * 60),
            durable_ttl: Duration::from_secs(24 * 3600),
            memory_capacity: 10_000,
        }
    }
}

impl ConfigLoader for CacheTtlConfig {
    fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            memory_ttl: Duration::from_secs(parse_env_var(
                "CATALOG_CACHE_MEMORY_TTL_SECS",
                defaults.memory_ttl.as_secs(),
            )?),
            distributed_ttl: Duration::from_secs(parse_env_var(
                "CATALOG_CACHE_DISTRIBUTED_TTL_SECS",
                defaults.distributed_ttl.as_secs(),
            )?),
            durable_ttl: Duration::from_secs(parse_env_var(
                "CATALOG_CACHE_DURABLE_TTL_SECS",
                defaults.durable_ttl.as_secs(),
            )?),
            memory_capacity: parse_env_var(
                "CATALOG_CACHE_MEMORY_CAPACITY",
                defaults.memory_capacity,
            )?,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.memory_ttl.is_zero() || self.distributed_ttl.is_zero() || self.durable_ttl.is_zero()
        {
            return Err(CoreError::config(
                "cache TTLs must be greater than 0",
                "CATALOG_CACHE_MEMORY_TTL_SECS",
            ));
        }

        if self.memory_ttl > self.distributed_ttl || self.distributed_ttl > self.durable_ttl {
            return Err(CoreError::config(
                "cache TTLs must not shrink from memory to distributed to durable",
                "CATALOG_CACHE_DISTRIBUTED_TTL_SECS",
            ));
        }

        Ok(())
    }
}

/// Image enrichment settings
///
/// # Environment Variables
///
/// - `CATALOG_ENRICH_BATCH_SIZE` (default: 5)
/// - `CATALOG_ENRICH_BATCH_DEADLINE_MS` (default: 8000)
/// - `CATALOG_PLACEHOLDER_IMAGE` (default: "/images/placeholder.jpg")
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub batch_deadline: Duration,
    pub placeholder_image: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_deadline: Duration::from_secs(8),
            placeholder_image: "/images/placeholder.jpg".to_string(),
        }
    }
}

impl ConfigLoader for EnrichmentConfig {
    fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            batch_size: parse_env_var("CATALOG_ENRICH_BATCH_SIZE", defaults.batch_size)?,
            batch_deadline: Duration::from_millis(parse_env_var(
                "CATALOG_ENRICH_BATCH_DEADLINE_MS",
                defaults.batch_deadline.as_millis() as u64,
            )?),
            placeholder_image: env_value(&["CATALOG_PLACEHOLDER_IMAGE"])
                .unwrap_or(defaults.placeholder_image),
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.batch_size == 0 {
            return Err(CoreError::config(
                "batch_size must be greater than 0",
                "CATALOG_ENRICH_BATCH_SIZE",
            ));
        }
        if self.batch_deadline.is_zero() {
            return Err(CoreError::config(
                "batch deadline must be greater than 0",
                "CATALOG_ENRICH_BATCH_DEADLINE_MS",
            ));
        }
        Ok(())
    }
}

/// Stream analysis settings
///
/// # Environment Variables
///
/// - `CATALOG_PROBE_TIMEOUT_MS` (default: 3000)
/// - `CATALOG_PROBE_ON_SYNC` (default: true)
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub probe_timeout: Duration,
    pub probe_on_sync: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(3),
            probe_on_sync: true,
        }
    }
}

impl ConfigLoader for AnalyzerConfig {
    fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            probe_timeout: Duration::from_millis(parse_env_var(
                "CATALOG_PROBE_TIMEOUT_MS",
                defaults.probe_timeout.as_millis() as u64,
            )?),
            probe_on_sync: parse_env_var("CATALOG_PROBE_ON_SYNC", defaults.probe_on_sync)?,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.probe_timeout.is_zero() {
            return Err(CoreError::config(
                "probe timeout must be greater than 0",
                "CATALOG_PROBE_TIMEOUT_MS",
            ));
        }
        Ok(())
    }
}

/// Recurring episode sync settings
///
/// # Environment Variables
///
/// - `CATALOG_SYNC_ENABLED` (default: true)
/// - `CATALOG_SYNC_INTERVAL_SECS` (default: 21600)
/// - `CATALOG_SYNC_STARTUP_DELAY_SECS` (default: 60)
/// - `CATALOG_SYNC_INTER_MOVIE_DELAY_MS` (default: 2000)
/// - `CATALOG_SYNC_RECENT_COUNT` (default: 20)
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub startup_delay: Duration,
    pub inter_movie_delay: Duration,
    pub recent_count: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(6 * 3600),
            startup_delay: Duration::from_secs(60),
            inter_movie_delay: Duration::from_secs(2),
            recent_count: 20,
        }
    }
}

impl ConfigLoader for SyncConfig {
    fn from_env() -> Result<Self, CoreError> {
        let defaults = Self::default();
        Ok(Self {
            enabled: parse_env_var("CATALOG_SYNC_ENABLED", defaults.enabled)?,
            interval: Duration::from_secs(parse_env_var(
                "CATALOG_SYNC_INTERVAL_SECS",
                defaults.interval.as_secs(),
            )?),
            startup_delay: Duration::from_secs(parse_env_var(
                "CATALOG_SYNC_STARTUP_DELAY_SECS",
                defaults.startup_delay.as_secs(),
            )?),
            inter_movie_delay: Duration::from_millis(parse_env_var(
                "CATALOG_SYNC_INTER_MOVIE_DELAY_MS",
                defaults.inter_movie_delay.as_millis() as u64,
            )?),
            recent_count: parse_env_var("CATALOG_SYNC_RECENT_COUNT", defaults.recent_count)?,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        if self.interval.is_zero() {
            return Err(CoreError::config(
                "sync interval must be greater than 0",
                "CATALOG_SYNC_INTERVAL_SECS",
            ));
        }
        Ok(())
    }
}

/// Complete ingestion configuration
#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub upstream: UpstreamConfig,
    pub cache: CacheTtlConfig,
    pub enrichment: EnrichmentConfig,
    pub analyzer: AnalyzerConfig,
    pub sync: SyncConfig,
}

impl IngestionConfig {
    /// Defaults for everything except the upstream address
    pub fn with_upstream(base_url: impl Into<String>) -> Self {
        Self {
            upstream: UpstreamConfig::new(base_url),
            cache: CacheTtlConfig::default(),
            enrichment: EnrichmentConfig::default(),
            analyzer: AnalyzerConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl ConfigLoader for IngestionConfig {
    fn from_env() -> Result<Self, CoreError> {
        Ok(Self {
            upstream: UpstreamConfig::from_env()?,
            cache: CacheTtlConfig::from_env()?,
            enrichment: EnrichmentConfig::from_env()?,
            analyzer: AnalyzerConfig::from_env()?,
            sync: SyncConfig::from_env()?,
        })
    }

    fn validate(&self) -> Result<(), CoreError> {
        self.upstream.validate()?;
        self.cache.validate()?;
        self.enrichment.validate()?;
        self.analyzer.validate()?;
        self.sync.validate()
    }
}
