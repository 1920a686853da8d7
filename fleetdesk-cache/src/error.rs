//! Error types for the cache layer.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A cached value could not be converted to or from the requested type.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A key or pattern string did not have the `resource:qualifier:tenant` shape.
    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}
