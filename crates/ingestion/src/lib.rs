//! VOD Catalog Ingestion
//!
//! Acquires movie/episode metadata and stream URLs from a versioned upstream
//! provider, reconciles its response dialects into one model, caches results
//! across memory, Redis and Postgres tiers, and ranks playback servers.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod models;
pub mod normalizer;
pub mod repository;
pub mod streams;
pub mod sync;
pub mod upstream;

// Re-export main types
pub use cache::{
    CacheEntry, CacheError, CacheHit, CacheStatsSnapshot, CacheTier, CacheWriteReport,
    MemoryCacheTier, PostgresCacheTier, RedisCacheTier, TierLevel, TieredCache, TtlPolicy,
};
pub use catalog::{CatalogComponents, CatalogService};
pub use config::{
    AnalyzerConfig, CacheTtlConfig, EnrichmentConfig, IngestionConfig, SyncConfig, UpstreamConfig,
};
pub use enrichment::{EnrichmentReport, ImageEnricher};
pub use models::{
    EpisodeId, EpisodeRecord, ImageSet, MovieFilter, MoviePage, MovieRecord, Quality,
    ServerCandidate, StreamType, NOT_FOUND_DESCRIPTION,
};
pub use normalizer::{MovieDetail, MovieListing, NormalizationError, ResponseNormalizer};
pub use repository::{CatalogStore, InMemoryCatalogStore, PostgresCatalogStore};
pub use streams::{AssumeReachable, BestStream, HttpProbe, ReachabilityProbe, StreamServerAnalyzer};
pub use sync::{EpisodeSyncOrchestrator, SyncPhase, SyncReport};
pub use upstream::{
    ApiVersion, AttemptFailure, OperationKind, RawPayload, UpstreamAttempt, UpstreamClient,
    UpstreamError, UpstreamOperation,
};

/// Common error type for the ingestion crate
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] vod_catalog_core::CoreError),
}

pub type Result<T> = std::result::Result<T, IngestionError>;
pub type Error = IngestionError;
