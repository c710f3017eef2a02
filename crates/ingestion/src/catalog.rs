//! Caller-facing catalog operations
//!
//! Every operation returns a best-effort value: an empty page, the not-found
//! placeholder, an empty episode list or [`BestStream::NoServersAvailable`].
//! Failures are logged here and never propagated to the caller.

use crate::cache::{self, TieredCache, TtlPolicy};
use crate::config::IngestionConfig;
use crate::enrichment::ImageEnricher;
use crate::models::{
    EpisodeId, EpisodeRecord, MovieFilter, MoviePage, MovieRecord, Quality, ServerCandidate,
};
use crate::normalizer::ResponseNormalizer;
use crate::repository::CatalogStore;
use crate::streams::{BestStream, ReachabilityProbe, StreamServerAnalyzer};
use crate::sync::{EpisodeSyncOrchestrator, SyncReport};
use crate::upstream::{UpstreamClient, UpstreamOperation};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use vod_catalog_core::PaginationParams;

/// Collaborators injected into [`CatalogService`]
pub struct CatalogComponents {
    pub upstream: UpstreamClient,
    pub normalizer: ResponseNormalizer,
    pub cache: TieredCache,
    pub store: Arc<dyn CatalogStore>,
    pub probe: Arc<dyn ReachabilityProbe>,
}

pub struct CatalogService {
    upstream: UpstreamClient,
    normalizer: ResponseNormalizer,
    cache: TieredCache,
    ttl: TtlPolicy,
    store: Arc<dyn CatalogStore>,
    enricher: Arc<ImageEnricher>,
    analyzer: Arc<StreamServerAnalyzer>,
    orchestrator: Arc<EpisodeSyncOrchestrator>,
}

impl CatalogService {
    pub fn new(config: &IngestionConfig, components: CatalogComponents) -> Self {
        let CatalogComponents {
            upstream,
            normalizer,
            cache,
            store,
            probe,
        } = components;

        let enricher = Arc::new(ImageEnricher::new(
            upstream.clone(),
            normalizer.clone(),
            config.enrichment.clone(),
        ));
        let analyzer = Arc::new(StreamServerAnalyzer::new(
            Arc::clone(&store),
            probe,
            config.analyzer.clone(),
        ));
        let orchestrator = Arc::new(EpisodeSyncOrchestrator::new(
            upstream.clone(),
            normalizer.clone(),
            Arc::clone(&store),
            Arc::clone(&analyzer),
            Arc::clone(&enricher),
            cache.clone(),
            config.sync.clone(),
        ));

        Self {
            upstream,
            normalizer,
            ttl: TtlPolicy::from(&config.cache),
            cache,
            store,
            enricher,
            analyzer,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> Arc<EpisodeSyncOrchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn cache(&self) -> &TieredCache {
        &self.cache
    }

    /// Newest movies, one page
    #[instrument(skip(self))]
    pub async fn get_latest_movies(&self, page: u32, limit: u32) -> MoviePage {
        let params = PaginationParams::new(page, limit).normalized();
        let operation = UpstreamOperation::LatestMovies {
            page: params.page,
            limit: params.limit,
        };
        self.listing(cache::latest_key(params.page, params.limit), operation, params)
            .await
    }

    /// Keyword search; a blank keyword yields an empty page without a call
    #[instrument(skip(self))]
    pub async fn search(&self, keyword: &str, page: u32, limit: u32) -> MoviePage {
        let params = PaginationParams::new(page, limit).normalized();
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return MoviePage::empty(params.limit);
        }

        let key = match cache::query_key("search", &(keyword, params.page, params.limit)) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to derive search cache key");
                return MoviePage::empty(params.limit);
            }
        };
        let operation = UpstreamOperation::Search {
            keyword: keyword.to_string(),
            page: params.page,
            limit: params.limit,
        };
        self.listing(key, operation, params).await
    }

    /// Listing filtered by kind, genre, country and year
    #[instrument(skip(self))]
    pub async fn filter(&self, filter: &MovieFilter, page: u32, limit: u32) -> MoviePage {
        let params = PaginationParams::new(page, limit).normalized();
        let key = match cache::query_key("filter", &(filter, params.page, params.limit)) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "Failed to derive filter cache key");
                return MoviePage::empty(params.limit);
            }
        };
        let operation = UpstreamOperation::Filter {
            filter: filter.clone(),
            page: params.page,
            limit: params.limit,
        };
        self.listing(key, operation, params).await
    }

    async fn listing(
        &self,
        key: String,
        operation: UpstreamOperation,
        params: PaginationParams,
    ) -> MoviePage {
        if let Some(hit) = self.cache.get::<MoviePage>(&key).await {
            debug!(tier = %hit.tier, "Listing served from cache");
            return self.at_edge(hit.value);
        }

        let payload = match self.upstream.fetch(&operation, None).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Listing unavailable from every upstream version");
                return self.at_edge(MoviePage::empty(params.limit));
            }
        };

        let listing = match self
            .normalizer
            .normalize_listing(&payload, params.page, params.limit)
        {
            Ok(listing) => listing,
            Err(e) => {
                warn!(version = %payload.version, error = %e, "Listing normalization failed");
                return self.at_edge(MoviePage::empty(params.limit));
            }
        };

        let mut items = listing.items;
        self.enricher.enrich(&mut items).await;

        for movie in &items {
            if let Err(e) = self.store.ensure_movie(movie).await {
                warn!(slug = %movie.slug, error = %e, "Failed to record listed movie");
            }
        }

        let page = MoviePage {
            items,
            pagination: listing.pagination,
        };
        if let Err(e) = self.cache.set(&key, &page, &self.ttl).await {
            warn!(error = %e, "Failed to cache listing");
        }
        self.at_edge(page)
    }

    /// Movie detail; never fails, returns the not-found placeholder instead
    #[instrument(skip(self))]
    pub async fn get_movie_detail(&self, slug: &str) -> MovieRecord {
        let slug = slug.trim();
        let key = cache::movie_key(slug);

        if let Some(hit) = self.cache.get::<MovieRecord>(&key).await {
            debug!(tier = %hit.tier, "Movie served from cache");
            return self.movie_at_edge(hit.value);
        }

        match self.fetch_movie(slug).await {
            Some(movie) => {
                if let Err(e) = self.cache.set(&key, &movie, &self.ttl).await {
                    warn!(slug = %slug, error = %e, "Failed to cache movie");
                }
                self.movie_at_edge(movie)
            }
            None => {
                info!(slug = %slug, "Movie not found upstream, returning placeholder");
                self.movie_at_edge(MovieRecord::not_found(slug))
            }
        }
    }

    async fn fetch_movie(&self, slug: &str) -> Option<MovieRecord> {
        if slug.is_empty() {
            return None;
        }

        let operation = UpstreamOperation::MovieDetail {
            slug: slug.to_string(),
        };
        let payload = match self.upstream.fetch(&operation, None).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(slug = %slug, error = %e, "Movie detail unavailable");
                return None;
            }
        };

        let detail = match self.normalizer.normalize_detail(&payload, slug) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(slug = %slug, version = %payload.version, error = %e, "Movie detail normalization failed");
                return None;
            }
        };

        let mut movies = vec![detail.movie];
        self.enricher.enrich(&mut movies).await;
        let movie = movies.pop()?;

        match self.store.upsert_movie(&movie).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                warn!(slug = %slug, error = %e, "Failed to persist movie");
                Some(movie)
            }
        }
    }

    /// Episodes of a movie, syncing them from upstream when none are stored
    ///
    /// A fresh cached list is authoritative even when empty, so a movie
    /// without episodes is not re-fetched until the entry expires.
    #[instrument(skip(self))]
    pub async fn get_episodes(&self, movie_slug: &str) -> Vec<EpisodeRecord> {
        let key = cache::episodes_key(movie_slug);
        if let Some(hit) = self.cache.get::<Vec<EpisodeRecord>>(&key).await {
            debug!(tier = %hit.tier, count = hit.value.len(), "Episodes served from cache");
            return hit.value;
        }

        let stored = self.stored_episodes(movie_slug).await;
        if !stored.is_empty() {
            if let Err(e) = self.cache.set(&key, &stored, &self.ttl).await {
                warn!(slug = %movie_slug, error = %e, "Failed to cache episodes");
            }
            return stored;
        }

        // The sync refreshes the cache itself
        let report = self.orchestrator.sync_movie(movie_slug).await;
        debug!(?report, "Episodes synced on demand");
        self.stored_episodes(movie_slug).await
    }

    async fn stored_episodes(&self, movie_slug: &str) -> Vec<EpisodeRecord> {
        self.store
            .get_episodes(movie_slug)
            .await
            .unwrap_or_else(|e| {
                warn!(slug = %movie_slug, error = %e, "Failed to load episodes");
                Vec::new()
            })
    }

    /// Best server for an episode at the preferred quality
    #[instrument(skip(self), fields(episode = %id))]
    pub async fn get_best_stream(&self, id: &EpisodeId, preferred: Quality) -> BestStream {
        let known = matches!(self.store.get_episode(id).await, Ok(Some(_)));
        if !known {
            self.get_episodes(&id.movie_slug).await;
        }

        self.analyzer
            .best_stream(id, preferred)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Best stream lookup failed");
                BestStream::NoServersAvailable
            })
    }

    /// Re-probe and re-rank an episode's servers
    pub async fn analyze_episode(&self, id: &EpisodeId) -> Vec<ServerCandidate> {
        self.analyzer.analyze(id).await.unwrap_or_else(|e| {
            warn!(episode = %id, error = %e, "Episode analysis failed");
            Vec::new()
        })
    }

    pub async fn sync_episodes(&self, movie_slug: &str) -> SyncReport {
        self.orchestrator.sync_movie(movie_slug).await
    }

    pub async fn sync_recent_movies(&self, count: usize) -> SyncReport {
        self.orchestrator.sync_recent_movies(count, None).await
    }

    /// Count one view; `None` when the movie is not stored
    pub async fn record_view(&self, slug: &str) -> Option<u64> {
        self.store.increment_views(slug).await.unwrap_or_else(|e| {
            warn!(slug = %slug, error = %e, "Failed to record view");
            None
        })
    }

    fn movie_at_edge(&self, movie: MovieRecord) -> MovieRecord {
        movie.with_placeholder_images(self.enricher.placeholder())
    }

    fn at_edge(&self, page: MoviePage) -> MoviePage {
        MoviePage {
            items: self.enricher.apply_placeholders(page.items),
            pagination: page.pagination,
        }
    }
}
