//! Error types shared by the catalog services

use thiserror::Error;

/// Errors raised by the shared core plumbing
///
/// Configuration errors are fatal: they are reported once at startup and the
/// service refuses to run rather than failing per request.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl CoreError {
    /// Build a configuration error tied to an environment key
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Self::ConfigurationError {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Environment key that caused a configuration error, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ConfigurationError { key, .. } => key.as_deref(),
            Self::DatabaseError(_) => None,
        }
    }
}
