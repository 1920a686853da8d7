//! Core type definitions for the Fleetdesk realtime layer.
//!
//! This crate defines the plain data types shared by the cache, the realtime
//! coordinator and the dashboard aggregator:
//! - Identifiers (tenants, records, subscriptions, optimistic updates)
//! - Resource types and row-level operations
//! - Change events as delivered by the backend change feed
//! - Typed row views for the resources the dashboard tracks
//!
//! Nothing here performs I/O.

mod event;
mod ids;
mod resource;
pub mod rows;

pub use event::{ChangeEvent, ChangePayload, Operation, Record};
pub use ids::{RecordId, SubscriptionId, TenantId, UndoRef, UpdateId};
pub use resource::ResourceType;
pub use rows::ResourceRow;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("unknown change operation: {0}")]
    UnknownOperation(String),
}
