//! Artwork enrichment
//!
//! Movies missing a poster or thumbnail are resolved through the image
//! endpoint in fixed-size batches. Lookups within a batch run concurrently and
//! the batch ends when all of them finish or its deadline passes, whichever
//! comes first. Lookups still in flight at the deadline are dropped.

use crate::config::EnrichmentConfig;
use crate::models::{ImageSet, MovieRecord};
use crate::normalizer::ResponseNormalizer;
use crate::upstream::{UpstreamClient, UpstreamOperation};
use crate::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Counters for one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentReport {
    /// Movies that needed artwork and were looked up
    pub attempted: usize,
    /// Movies that gained at least one image
    pub enriched: usize,
    /// Lookups that failed upstream or in normalization
    pub failed: usize,
    /// Lookups abandoned at a batch deadline
    pub timed_out: usize,
}

pub struct ImageEnricher {
    upstream: UpstreamClient,
    normalizer: ResponseNormalizer,
    config: EnrichmentConfig,
}

impl ImageEnricher {
    pub fn new(
        upstream: UpstreamClient,
        normalizer: ResponseNormalizer,
        config: EnrichmentConfig,
    ) -> Self {
        Self {
            upstream,
            normalizer,
            config,
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.config.placeholder_image
    }

    /// Fill missing artwork in place; present fields are never overwritten
    #[instrument(skip(self, movies), fields(movies = movies.len()))]
    pub async fn enrich(&self, movies: &mut [MovieRecord]) -> EnrichmentReport {
        let mut report = EnrichmentReport::default();

        for batch in movies.chunks_mut(self.config.batch_size.max(1)) {
            let deadline = Instant::now() + self.config.batch_deadline;

            let mut pending: FuturesUnordered<_> = batch
                .iter()
                .enumerate()
                .filter(|(_, movie)| movie.missing_artwork() && !movie.is_placeholder())
                .map(|(index, movie)| {
                    let slug = movie.slug.clone();
                    async move { (index, self.resolve(&slug).await) }
                })
                .collect();
            report.attempted += pending.len();

            loop {
                match timeout_at(deadline, pending.next()).await {
                    Ok(Some((index, Ok(images)))) => {
                        if batch[index].apply_images(&images) {
                            report.enriched += 1;
                        }
                    }
                    Ok(Some((index, Err(e)))) => {
                        debug!(slug = %batch[index].slug, error = %e, "Image lookup failed");
                        report.failed += 1;
                    }
                    Ok(None) => break,
                    Err(_) => {
                        warn!(
                            abandoned = pending.len(),
                            deadline_ms = self.config.batch_deadline.as_millis() as u64,
                            "Enrichment batch deadline elapsed"
                        );
                        report.timed_out += pending.len();
                        break;
                    }
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                enriched = report.enriched,
                failed = report.failed,
                timed_out = report.timed_out,
                "Image enrichment finished"
            );
        }
        report
    }

    async fn resolve(&self, slug: &str) -> Result<ImageSet> {
        let operation = UpstreamOperation::Images {
            slug: slug.to_string(),
        };
        let payload = self.upstream.fetch(&operation, None).await?;
        Ok(self.normalizer.normalize_images(&payload)?)
    }

    /// Substitute the placeholder path for artwork still missing
    pub fn apply_placeholders(&self, movies: Vec<MovieRecord>) -> Vec<MovieRecord> {
        movies
            .into_iter()
            .map(|movie| movie.with_placeholder_images(&self.config.placeholder_image))
            .collect()
    }
}
