//! # VOD Catalog Core
//!
//! Shared plumbing for the VOD catalog services.
//!
//! ## Modules
//!
//! - `config`: Environment configuration loading and validation
//! - `database`: Shared PostgreSQL connection pool
//! - `error`: Error types shared across services
//! - `observability`: Structured logging initialisation
//! - `pagination`: Page/limit pagination metadata
//! - `shutdown`: Graceful shutdown coordinator

pub mod config;
pub mod database;
pub mod error;
pub mod observability;
pub mod pagination;
pub mod shutdown;

// Re-export commonly used types
pub use config::{
    load_dotenv, parse_env_var, ConfigLoader, DatabaseConfig, RedisConfig, ServiceConfig,
};
pub use database::{DatabasePool, PoolStats};
pub use error::CoreError;
pub use observability::{init_logging, LogConfig, LogFormat, ObservabilityError};
pub use pagination::{Pagination, PaginationParams, DEFAULT_LIMIT, MAX_LIMIT};
pub use shutdown::{ShutdownConfig, ShutdownCoordinator, ShutdownHandle};

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
