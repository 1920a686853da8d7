//! Realtime change-feed coordination for Fleetdesk.
//!
//! The backend streams row-level changes for a tenant. This crate keeps the
//! client consistent with that stream:
//!
//! - **Connection**: one supervised channel with fixed reconnect backoff and
//!   a periodic health probe ([`ConnectionManager`]).
//! - **Routing**: every change evicts affected cache entries, then reaches
//!   each subscriber of its resource in registration order ([`EventRouter`]).
//! - **Optimistic updates**: speculative local mutations are confirmed by
//!   matching changes, expire silently, or are rolled back on request
//!   ([`OptimisticUpdateLedger`]).
//!
//! [`RealtimeCoordinator`] wires these together around a [`ChangeFeed`]
//! implementation.
//!
//! # Example
//!
//! ```
//! use fleetdesk_realtime::feed::mock::MockFeed;
//! use fleetdesk_realtime::{handler_fn, RealtimeConfig, RealtimeCoordinator};
//! use fleetdesk_types::{ResourceType, TenantId};
//! use std::sync::Arc;
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let feed = Arc::new(MockFeed::new());
//! let coordinator = RealtimeCoordinator::builder(feed, RealtimeConfig::for_tenant(TenantId::new("T1"))).build();
//!
//! coordinator
//!     .subscribe_to_table(ResourceType::Contracts, handler_fn(|event| async move {
//!         println!("contract {:?} changed", event.record_id());
//!         Ok(())
//!     }))
//!     .await;
//!
//! coordinator.start().await.unwrap();
//! assert!(coordinator.connection_health().is_healthy);
//! coordinator.stop().await;
//! # });
//! ```

mod config;
mod connection;
mod coordinator;
mod error;
pub mod feed;
pub mod notify;
mod optimistic;
mod registry;
mod router;

pub use config::RealtimeConfig;
pub use connection::{ConnectionHealth, ConnectionManager, ConnectionStatus};
pub use coordinator::{CoordinatorBuilder, RealtimeCoordinator};
pub use error::{RealtimeError, RealtimeResult};
pub use feed::{ChangeFeed, ChannelSpec, FeedChannel, FeedMessage, RawNotification, TableListener};
pub use notify::{Notice, NoticeLevel, NoticeLog, Notifier, TracingNotifier};
pub use optimistic::{NoopRollback, OptimisticUpdate, OptimisticUpdateLedger, RollbackCommand, RollbackExecutor};
pub use registry::{handler_fn, ChangeHandler, FnHandler, SubscriptionRegistry};
pub use router::{DispatchReport, EventRouter};
