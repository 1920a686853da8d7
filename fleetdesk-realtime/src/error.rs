//! Error types for the realtime layer.

use thiserror::Error;

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors that can occur in realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The change feed could not be reached or dropped the channel.
    #[error("feed error: {0}")]
    Feed(String),

    /// A notification did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Type conversion error.
    #[error("type error: {0}")]
    Types(#[from] fleetdesk_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A subscriber failed to handle an event.
    #[error("handler error: {0}")]
    Handler(String),

    /// A rollback command could not be executed.
    #[error("rollback failed: {0}")]
    Rollback(String),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,

    /// The coordinator has not been started or was stopped.
    #[error("coordinator is not running")]
    NotRunning,

    /// The coordinator was started twice.
    #[error("coordinator is already running")]
    AlreadyRunning,
}
