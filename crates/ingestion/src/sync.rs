//! Episode sync orchestration
//!
//! Per movie: fetch, normalize, backfill missing artwork, diff every episode
//! against the store by `(movie_slug, episode_number)`, then insert or replace. One failing episode
//! is counted and skipped; it never aborts the rest of the movie.
//!
//! The recurring loop walks the most recently updated movies one at a time
//! with a pause between movies, sleeps the full interval after each cycle,
//! and checks its cancellation token between cycles and between movies.

use crate::cache::{self, TieredCache};
use crate::config::SyncConfig;
use crate::enrichment::ImageEnricher;
use crate::models::{EpisodeRecord, MovieRecord};
use crate::normalizer::{MovieDetail, ResponseNormalizer};
use crate::repository::CatalogStore;
use crate::streams::StreamServerAnalyzer;
use crate::upstream::{UpstreamClient, UpstreamOperation};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use vod_catalog_core::ShutdownHandle;

/// Where the orchestrator currently is in a sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Fetching { slug: String },
    Normalizing,
    Diffing,
    Persisting,
}

/// Aggregate counts for one or more synced movies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.added += other.added;
        self.updated += other.updated;
        self.failed += other.failed;
    }

    fn movie_failed() -> Self {
        Self {
            failed: 1,
            ..Self::default()
        }
    }
}

pub struct EpisodeSyncOrchestrator {
    upstream: UpstreamClient,
    normalizer: ResponseNormalizer,
    store: Arc<dyn CatalogStore>,
    analyzer: Arc<StreamServerAnalyzer>,
    enricher: Arc<ImageEnricher>,
    cache: TieredCache,
    config: SyncConfig,
    phase: watch::Sender<SyncPhase>,
}

impl EpisodeSyncOrchestrator {
    pub fn new(
        upstream: UpstreamClient,
        normalizer: ResponseNormalizer,
        store: Arc<dyn CatalogStore>,
        analyzer: Arc<StreamServerAnalyzer>,
        enricher: Arc<ImageEnricher>,
        cache: TieredCache,
        config: SyncConfig,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Self {
            upstream,
            normalizer,
            store,
            analyzer,
            enricher,
            cache,
            config,
            phase,
        }
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        self.phase.borrow().clone()
    }

    /// Receiver notified on every phase change
    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    /// Sync one movie's episodes and servers
    #[instrument(skip(self))]
    pub async fn sync_movie(&self, slug: &str) -> SyncReport {
        let report = self.sync_movie_inner(slug).await;
        self.enter(SyncPhase::Idle);
        report
    }

    async fn sync_movie_inner(&self, slug: &str) -> SyncReport {
        self.enter(SyncPhase::Fetching {
            slug: slug.to_string(),
        });

        let Some(MovieDetail { mut movie, episodes }) = self.fetch_detail(slug).await else {
            return SyncReport::movie_failed();
        };
        self.enricher.enrich(std::slice::from_mut(&mut movie)).await;

        let movie = match self.store.upsert_movie(&movie).await {
            Ok(stored) => stored,
            Err(e) => {
                error!(slug = %slug, error = %e, "Failed to persist movie, skipping its episodes");
                return SyncReport::movie_failed();
            }
        };

        let mut report = SyncReport::default();
        for episode in episodes {
            match self.sync_episode(episode).await {
                Ok(true) => report.added += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    warn!(slug = %slug, error = %e, "Episode sync failed");
                    report.failed += 1;
                }
            }
        }

        self.refresh_cache(&movie).await;

        info!(
            slug = %slug,
            added = report.added,
            updated = report.updated,
            failed = report.failed,
            "Movie sync complete"
        );
        report
    }

    /// Detail document, with episodes from the dedicated endpoint when the
    /// detail carries none
    async fn fetch_detail(&self, slug: &str) -> Option<MovieDetail> {
        let detail_op = UpstreamOperation::MovieDetail {
            slug: slug.to_string(),
        };
        let payload = match self.upstream.fetch(&detail_op, None).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(slug = %slug, error = %e, "Detail fetch failed");
                return None;
            }
        };

        self.enter(SyncPhase::Normalizing);
        let mut detail = match self.normalizer.normalize_detail(&payload, slug) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(slug = %slug, version = %payload.version, error = %e, "Detail normalization failed");
                return None;
            }
        };

        if detail.episodes.is_empty() {
            let episodes_op = UpstreamOperation::Episodes {
                slug: slug.to_string(),
            };
            match self.upstream.fetch(&episodes_op, None).await {
                Ok(payload) => match self.normalizer.normalize_episodes(&payload, slug) {
                    Ok(episodes) => detail.episodes = episodes,
                    Err(e) => debug!(slug = %slug, error = %e, "Episode list unparseable"),
                },
                Err(e) => debug!(slug = %slug, error = %e, "No episode list available"),
            }
        }

        Some(detail)
    }

    /// Returns true when the episode was new
    async fn sync_episode(&self, mut episode: EpisodeRecord) -> anyhow::Result<bool> {
        self.enter(SyncPhase::Diffing);
        episode.servers = self
            .analyzer
            .rank_candidates(
                std::mem::take(&mut episode.servers),
                self.analyzer.config().probe_on_sync,
            )
            .await;
        let existing = self.store.get_episode(&episode.id()).await?;

        self.enter(SyncPhase::Persisting);
        match existing {
            None => {
                self.store.insert_episode(&episode).await?;
                Ok(true)
            }
            Some(_) => {
                self.store.replace_episode(&episode).await?;
                Ok(false)
            }
        }
    }

    async fn refresh_cache(&self, movie: &MovieRecord) {
        if let Err(e) = self
            .cache
            .set_default(&cache::movie_key(&movie.slug), movie)
            .await
        {
            warn!(slug = %movie.slug, error = %e, "Failed to cache movie");
        }

        match self.store.get_episodes(&movie.slug).await {
            Ok(episodes) => {
                if let Err(e) = self
                    .cache
                    .set_default(&cache::episodes_key(&movie.slug), &episodes)
                    .await
                {
                    warn!(slug = %movie.slug, error = %e, "Failed to cache episodes");
                }
            }
            Err(e) => warn!(slug = %movie.slug, error = %e, "Failed to reload episodes"),
        }
    }

    /// Sync the `count` most recently updated movies sequentially
    ///
    /// Stops early, between movies, when `cancel` fires.
    #[instrument(skip(self, cancel))]
    pub async fn sync_recent_movies(
        &self,
        count: usize,
        cancel: Option<&CancellationToken>,
    ) -> SyncReport {
        let mut report = SyncReport::default();

        let movies = match self.store.recent_movies(count).await {
            Ok(movies) => movies,
            Err(e) => {
                error!(error = %e, "Failed to select recent movies");
                return report;
            }
        };

        let total = movies.len();
        for (index, movie) in movies.iter().enumerate() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!(synced = index, total, "Sync interrupted by shutdown");
                break;
            }

            report.merge(self.sync_movie(&movie.slug).await);

            if index + 1 < total && !self.config.inter_movie_delay.is_zero() {
                match cancel {
                    Some(token) => {
                        tokio::select! {
                            _ = tokio::time::sleep(self.config.inter_movie_delay) => {}
                            _ = token.cancelled() => {}
                        }
                    }
                    None => tokio::time::sleep(self.config.inter_movie_delay).await,
                }
            }
        }

        info!(
            movies = total,
            added = report.added,
            updated = report.updated,
            failed = report.failed,
            "Recent movie sync complete"
        );
        report
    }

    /// Recurring sync loop; runs until the handle is cancelled
    pub async fn run(self: Arc<Self>, handle: ShutdownHandle) {
        if !self.config.enabled {
            info!("Episode sync disabled");
            handle.notify_complete();
            return;
        }

        let token = handle.token();
        info!(
            startup_delay_secs = self.config.startup_delay.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "Episode sync scheduled"
        );

        tokio::select! {
            _ = tokio::time::sleep(self.config.startup_delay) => {}
            _ = token.cancelled() => {
                handle.notify_complete();
                return;
            }
        }

        loop {
            let report = self
                .sync_recent_movies(self.config.recent_count, Some(&token))
                .await;
            debug!(?report, "Sync cycle finished");

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = token.cancelled() => break,
            }
        }

        info!("Episode sync stopped");
        handle.notify_complete();
    }
}
