//! Stream server analysis
//!
//! Candidates are classified by transport type, given a quality hint, probed
//! and ranked best-first by (type priority, not working). Broken servers are
//! kept; they only rank lower.

mod classify;
mod probe;

pub use classify::{classify, classify_url, infer_quality, rank, select_best};
pub use probe::{AssumeReachable, HttpProbe, ReachabilityProbe};

use crate::config::AnalyzerConfig;
use crate::models::{EpisodeId, Quality, ServerCandidate};
use crate::repository::CatalogStore;
use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Outcome of a best-stream lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "server", rename_all = "snake_case")]
pub enum BestStream {
    Found(ServerCandidate),
    NoServersAvailable,
}

impl BestStream {
    pub fn server(&self) -> Option<&ServerCandidate> {
        match self {
            Self::Found(server) => Some(server),
            Self::NoServersAvailable => None,
        }
    }
}

/// Classifies, probes and ranks episode servers
pub struct StreamServerAnalyzer {
    store: Arc<dyn CatalogStore>,
    probe: Arc<dyn ReachabilityProbe>,
    config: AnalyzerConfig,
}

impl StreamServerAnalyzer {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        probe: Arc<dyn ReachabilityProbe>,
        config: AnalyzerConfig,
    ) -> Self {
        Self {
            store,
            probe,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Classify and rank raw candidates, probing them when asked
    ///
    /// Without a probe the previous `is_working` flag is kept.
    pub async fn rank_candidates(
        &self,
        candidates: Vec<ServerCandidate>,
        probe: bool,
    ) -> Vec<ServerCandidate> {
        let mut classified: Vec<ServerCandidate> = candidates.into_iter().map(classify).collect();

        if probe {
            let results = join_all(
                classified
                    .iter()
                    .map(|candidate| self.probe.is_reachable(&candidate.url)),
            )
            .await;
            for (candidate, working) in classified.iter_mut().zip(results) {
                candidate.is_working = working;
            }
        }

        rank(classified)
    }

    /// Re-probe an episode's servers, persist the new list and return it
    #[instrument(skip(self), fields(episode = %id))]
    pub async fn analyze(&self, id: &EpisodeId) -> Result<Vec<ServerCandidate>> {
        let Some(mut episode) = self.store.get_episode(id).await? else {
            debug!("Episode not stored, nothing to analyze");
            return Ok(Vec::new());
        };

        let servers = self
            .rank_candidates(std::mem::take(&mut episode.servers), true)
            .await;
        episode.servers = servers.clone();
        self.store.replace_episode(&episode).await?;

        info!(
            servers = servers.len(),
            working = servers.iter().filter(|s| s.is_working).count(),
            "Episode servers analyzed"
        );
        Ok(servers)
    }

    /// Best stored server for an episode at the preferred quality
    ///
    /// Among servers of the preferred quality the best-ranked wins; when none
    /// match, the best-ranked server of any quality is returned.
    #[instrument(skip(self), fields(episode = %id, preferred = %preferred))]
    pub async fn best_stream(&self, id: &EpisodeId, preferred: Quality) -> Result<BestStream> {
        let servers = match self.store.get_episode(id).await? {
            Some(episode) => episode.servers,
            None => Vec::new(),
        };

        let ranked = self.rank_candidates(servers, false).await;
        Ok(match select_best(&ranked, preferred) {
            Some(server) => BestStream::Found(server.clone()),
            None => BestStream::NoServersAvailable,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EpisodeRecord, StreamType};
    use crate::repository::InMemoryCatalogStore;
    use async_trait::async_trait;

    /// Reports URLs containing "dead" as unreachable
    struct FakeProbe;

    #[async_trait]
    impl ReachabilityProbe for FakeProbe {
        async fn is_reachable(&self, url: &str) -> bool {
            !url.contains("dead")
        }
    }

    async fn analyzer_with(servers: &[&str]) -> (StreamServerAnalyzer, EpisodeId) {
        let store = Arc::new(InMemoryCatalogStore::new());
        let episode = EpisodeRecord {
            movie_slug: "show".into(),
            episode_number: 1,
            title: "Tập 1".into(),
            url: servers.first().map(|s| s.to_string()).unwrap_or_default(),
            servers: servers
                .iter()
                .map(|url| ServerCandidate::unanalyzed("S", *url))
                .collect(),
        };
        store.insert_episode(&episode).await.unwrap();

        let analyzer = StreamServerAnalyzer::new(
            store,
            Arc::new(FakeProbe),
            AnalyzerConfig::default(),
        );
        (analyzer, episode.id())
    }

    #[tokio::test]
    async fn test_analyze_keeps_broken_servers_below_working() {
        let (analyzer, id) = analyzer_with(&[
            "https://dead.example.com/a.m3u8",
            "https://live.example.com/a.m3u8",
            "https://live.example.com/a.mp4",
        ])
        .await;

        let servers = analyzer.analyze(&id).await.unwrap();
        assert_eq!(servers.len(), 3);
        assert_eq!(servers[0].url, "https://live.example.com/a.m3u8");
        assert_eq!(servers[1].url, "https://dead.example.com/a.m3u8");
        assert!(!servers[1].is_working);
        assert_eq!(servers[2].stream_type, StreamType::DirectFile);
    }

    #[tokio::test]
    async fn test_best_stream_falls_back_across_quality() {
        let (analyzer, id) = analyzer_with(&[
            "https://p.example.com/embed/sd/1",
            "https://s.example.com/1080/index.m3u8",
        ])
        .await;

        let best = analyzer.best_stream(&id, Quality::HD).await.unwrap();
        let server = best.server().unwrap();
        assert_eq!(server.stream_type, StreamType::SegmentedStream);
        assert_eq!(server.quality, Quality::FHD);
    }

    #[tokio::test]
    async fn test_best_stream_without_servers() {
        let (analyzer, _) = analyzer_with(&[]).await;
        let missing = EpisodeId::new("show", 9);
        assert_eq!(
            analyzer.best_stream(&missing, Quality::HD).await.unwrap(),
            BestStream::NoServersAvailable
        );
    }
}
