//! Versioned upstream provider client
//!
//! Every logical operation is tried against an ordered list of dialect
//! versions. The first 2xx response with a non-empty body wins; anything else
//! moves on to the next version. There is no retry within a version.
//!
//! Outbound calls share one counting semaphore so the provider never sees
//! more than `max_concurrency` requests from this process at once.

mod operation;

pub use operation::{ApiVersion, OperationKind, UpstreamOperation, DEFAULT_FILTER_KIND};

use crate::config::UpstreamConfig;
use crate::Result;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Why a single version attempt was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("non-success status {0}")]
    Status(u16),

    #[error("empty response body")]
    EmptyBody,

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),
}

/// One rejected version attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAttempt {
    pub version: ApiVersion,
    pub failure: AttemptFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("all {} upstream versions failed for {operation:?}", .attempts.len())]
    Exhausted {
        operation: OperationKind,
        attempts: Vec<UpstreamAttempt>,
    },

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

/// Successful response body as received
#[derive(Debug, Clone)]
pub struct RawPayload {
    pub kind: OperationKind,
    pub version: ApiVersion,
    pub status: u16,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

/// HTTP client for the versioned provider
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    permits: Arc<Semaphore>,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Free outbound slots right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fetch an operation, falling back through `versions` (or the
    /// operation's default order) until one attempt succeeds
    #[instrument(skip(self, versions), fields(kind = ?operation.kind()))]
    pub async fn fetch(
        &self,
        operation: &UpstreamOperation,
        versions: Option<&[ApiVersion]>,
    ) -> std::result::Result<RawPayload, UpstreamError> {
        let versions = versions.unwrap_or_else(|| operation.default_versions());
        if versions.is_empty() {
            return Err(UpstreamError::InvalidRequest(
                "version list must not be empty".to_string(),
            ));
        }

        let mut attempts = Vec::with_capacity(versions.len());

        for &version in versions {
            match self.attempt(operation, version).await {
                Ok((status, body)) => {
                    debug!(%version, status, bytes = body.len(), "Upstream attempt succeeded");
                    return Ok(RawPayload {
                        kind: operation.kind(),
                        version,
                        status,
                        body,
                        fetched_at: Utc::now(),
                    });
                }
                Err(failure) => {
                    warn!(%version, error = %failure, "Upstream attempt failed, trying next version");
                    attempts.push(UpstreamAttempt { version, failure });
                }
            }
        }

        Err(UpstreamError::Exhausted {
            operation: operation.kind(),
            attempts,
        })
    }

    async fn attempt(
        &self,
        operation: &UpstreamOperation,
        version: ApiVersion,
    ) -> std::result::Result<(u16, String), AttemptFailure> {
        let url = format!("{}/{}/{}", self.base_url, version, operation.path());

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        let response = self
            .client
            .get(&url)
            .query(&operation.query())
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_transport)?;
        if body.trim().is_empty() {
            return Err(AttemptFailure::EmptyBody);
        }

        Ok((status.as_u16(), body))
    }
}

fn classify_transport(error: reqwest::Error) -> AttemptFailure {
    if error.is_timeout() {
        AttemptFailure::Timeout
    } else {
        AttemptFailure::Transport(error.to_string())
    }
}
