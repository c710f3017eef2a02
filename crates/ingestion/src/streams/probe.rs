//! Reachability probes

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Existence check for a playback URL
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn is_reachable(&self, url: &str) -> bool;
}

/// HEAD request with a short timeout, falling back to a one-byte GET for
/// servers that reject HEAD
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn status(&self, url: &str) -> Option<StatusCode> {
        let head = self.client.head(url).send().await.ok()?.status();
        if head != StatusCode::METHOD_NOT_ALLOWED && head != StatusCode::NOT_IMPLEMENTED {
            return Some(head);
        }

        let get = self
            .client
            .get(url)
            .header(reqwest::header::RANGE, "bytes=0-0")
            .send()
            .await
            .ok()?;
        Some(get.status())
    }
}

#[async_trait]
impl ReachabilityProbe for HttpProbe {
    async fn is_reachable(&self, url: &str) -> bool {
        let status = self.status(url).await;
        debug!(url = %url, status = ?status.map(|s| s.as_u16()), "Probed stream server");
        status.is_some_and(|s| s.is_success() || s.is_redirection())
    }
}

/// Probe that reports every server as working
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeReachable;

#[async_trait]
impl ReachabilityProbe for AssumeReachable {
    async fn is_reachable(&self, _url: &str) -> bool {
        true
    }
}
