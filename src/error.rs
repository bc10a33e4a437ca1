//! Error types for the county statistics service

use thiserror::Error;

/// Result type alias for county statistics operations
pub type Result<T> = std::result::Result<T, StatsError>;

/// Error types that can occur while resolving or warming region statistics
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Sub-fetch for section '{section}' failed: {message}")]
    SubFetchFailed { section: String, message: String },

    #[error("Fetch failed for region {key}: {message}")]
    FetchFailed { key: String, message: String },

    #[error("Failed to read region catalog: {0}")]
    CatalogReadFailed(String),

    #[error("Warming failed for region {key}: {message}")]
    WarmKeyFailed { key: String, message: String },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for StatsError {
    fn from(err: std::io::Error) -> Self {
        StatsError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        StatsError::SerializationError(err.to_string())
    }
}

impl From<redis::RedisError> for StatsError {
    fn from(err: redis::RedisError) -> Self {
        StatsError::CacheUnavailable(err.to_string())
    }
}

impl From<tokio_postgres::Error> for StatsError {
    fn from(err: tokio_postgres::Error) -> Self {
        StatsError::DatabaseError(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for StatsError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        StatsError::DatabaseError(format!("connection pool: {}", err))
    }
}

impl StatsError {
    /// Whether this error came from the cache layer.
    ///
    /// Cache errors never fail a resolve or warm operation: on read they are
    /// treated as a miss, on write they are logged and swallowed.
    pub fn is_cache_error(&self) -> bool {
        matches!(
            self,
            StatsError::CacheUnavailable(_) | StatsError::SerializationError(_)
        )
    }

    /// Convert error to HTTP status code
    ///
    /// - Bad query input: 400
    /// - Backing store failures (fetch, catalog, per-key warm): 502
    /// - Cache backend unreachable: 503
    /// - Everything else: 500
    pub fn to_http_status(&self) -> u16 {
        match self {
            StatsError::InvalidRequest(_) => 400,

            StatsError::SubFetchFailed { .. } => 502,
            StatsError::FetchFailed { .. } => 502,
            StatsError::CatalogReadFailed(_) => 502,
            StatsError::WarmKeyFailed { .. } => 502,
            StatsError::DatabaseError(_) => 502,

            StatsError::CacheUnavailable(_) => 503,

            StatsError::ConfigError(_) => 500,
            StatsError::SerializationError(_) => 500,
            StatsError::IoError(_) => 500,
            StatsError::InternalError(_) => 500,
        }
    }

    /// Create a SubFetchFailed error for a named section
    pub fn sub_fetch(section: impl Into<String>, message: impl Into<String>) -> Self {
        StatsError::SubFetchFailed {
            section: section.into(),
            message: message.into(),
        }
    }

    /// Create a WarmKeyFailed error for a region key
    pub fn warm_key(key: impl Into<String>, message: impl Into<String>) -> Self {
        StatsError::WarmKeyFailed {
            key: key.into(),
            message: message.into(),
        }
    }
}
