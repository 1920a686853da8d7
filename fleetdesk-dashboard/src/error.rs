//! Error types for dashboard aggregation.

use thiserror::Error;

/// Result type for dashboard operations.
pub type DashboardResult<T> = Result<T, DashboardError>;

/// Errors that can occur while computing dashboard statistics.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// A business data collaborator failed.
    #[error("data source error: {0}")]
    Source(String),

    /// Some sections kept stale figures because their refresh failed.
    #[error("dashboard sections failed to refresh: {0:?}")]
    Partial(Vec<crate::DashboardSection>),

    /// Cache error.
    #[error("cache error: {0}")]
    Cache(#[from] fleetdesk_cache::CacheError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
