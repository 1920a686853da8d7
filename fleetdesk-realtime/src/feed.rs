//! Change-feed transport abstraction.
//!
//! The backend pushes row-level notifications over a logical channel. This
//! module defines the trait a feed client implements so the connection
//! manager can work with any backend (websocket, replication slot, test
//! double).

use crate::error::RealtimeResult;
use async_trait::async_trait;
use fleetdesk_types::{ChangePayload, Operation, ResourceType, TenantId};
use tokio::sync::mpsc;

/// One raw notification as received from the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNotification {
    /// The table the notification is about.
    pub resource: ResourceType,
    /// The wire payload.
    pub payload: ChangePayload,
}

impl RawNotification {
    pub fn new(resource: ResourceType, payload: ChangePayload) -> Self {
        Self { resource, payload }
    }
}

/// A message delivered on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A row changed.
    Notification(RawNotification),
    /// The channel was closed gracefully by the server.
    Closed,
    /// The channel failed.
    Failed(String),
}

/// A listener registered on the channel: one table, one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableListener {
    pub resource: ResourceType,
    pub operation: Operation,
    /// Server-side row filter, e.g. `company_id=eq.T1`.
    pub filter: Option<String>,
}

/// Everything the feed needs to open a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub name: String,
    pub listeners: Vec<TableListener>,
}

impl ChannelSpec {
    /// Builds a spec with insert, update and delete listeners for every
    /// resource, filtered to `tenant` when one is given.
    pub fn for_resources(
        name: impl Into<String>,
        resources: &[ResourceType],
        tenant: Option<&TenantId>,
        tenant_column: &str,
    ) -> Self {
        let filter = tenant.map(|t| format!("{tenant_column}=eq.{t}"));
        let listeners = resources
            .iter()
            .flat_map(|resource| {
                [Operation::Insert, Operation::Update, Operation::Delete]
                    .into_iter()
                    .map(|operation| TableListener {
                        resource: resource.clone(),
                        operation,
                        filter: filter.clone(),
                    })
            })
            .collect();
        Self {
            name: name.into(),
            listeners,
        }
    }

    /// Resource types with at least one listener, in registration order.
    pub fn resources(&self) -> Vec<ResourceType> {
        let mut out: Vec<ResourceType> = Vec::new();
        for listener in &self.listeners {
            if !out.contains(&listener.resource) {
                out.push(listener.resource.clone());
            }
        }
        out
    }
}

/// The receiving half of an open channel.
#[derive(Debug)]
pub struct FeedChannel {
    messages: mpsc::UnboundedReceiver<FeedMessage>,
}

impl FeedChannel {
    /// Wraps a transport-specific message stream.
    pub fn new(messages: mpsc::UnboundedReceiver<FeedMessage>) -> Self {
        Self { messages }
    }

    /// Receives the next message. `None` means the sender went away.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        self.messages.recv().await
    }
}

/// A change feed that can open channels and answer health probes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens the channel and registers every listener in `spec`. Resolves
    /// once the server acknowledged the subscription.
    async fn open_channel(&self, spec: &ChannelSpec) -> RealtimeResult<FeedChannel>;

    /// Releases the server-side resources of a channel.
    async fn close_channel(&self, name: &str) -> RealtimeResult<()>;

    /// A lightweight round trip used by the health probe.
    async fn ping(&self) -> RealtimeResult<()>;
}

/// An in-memory feed for tests and local development.
pub mod mock {
    use super::*;
    use crate::error::RealtimeError;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct MockState {
        sender: Option<mpsc::UnboundedSender<FeedMessage>>,
        opened: Vec<ChannelSpec>,
        closed: Vec<String>,
        failing_opens: usize,
        ping_latency: Duration,
        ping_failing: bool,
        pings: usize,
    }

    /// A feed whose connection lifecycle is driven by the test.
    #[derive(Debug, Default)]
    pub struct MockFeed {
        state: Mutex<MockState>,
    }

    impl MockFeed {
        /// Creates a new mock feed that accepts every channel.
        pub fn new() -> Self {
            Self::default()
        }

        fn state(&self) -> MutexGuard<'_, MockState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Makes the next `n` open attempts fail.
        pub fn fail_next_opens(&self, n: usize) {
            self.state().failing_opens = n;
        }

        /// Sets the simulated round-trip time of `ping`.
        pub fn set_ping_latency(&self, latency: Duration) {
            self.state().ping_latency = latency;
        }

        /// Makes `ping` fail (or succeed again).
        pub fn set_ping_failing(&self, failing: bool) {
            self.state().ping_failing = failing;
        }

        /// Number of open attempts, successful or not.
        pub fn open_count(&self) -> usize {
            self.state().opened.len()
        }

        /// The spec of the most recent open attempt.
        pub fn last_spec(&self) -> Option<ChannelSpec> {
            self.state().opened.last().cloned()
        }

        /// Names of channels closed through `close_channel`.
        pub fn closed_channels(&self) -> Vec<String> {
            self.state().closed.clone()
        }

        /// Number of completed pings.
        pub fn ping_count(&self) -> usize {
            self.state().pings
        }

        /// Whether a channel is currently open.
        pub fn is_open(&self) -> bool {
            self.state().sender.as_ref().is_some_and(|s| !s.is_closed())
        }

        fn send(&self, message: FeedMessage) -> bool {
            match &self.state().sender {
                Some(sender) => sender.send(message).is_ok(),
                None => false,
            }
        }

        /// Pushes a notification onto the open channel.
        pub fn emit(&self, resource: ResourceType, payload: ChangePayload) -> bool {
            self.send(FeedMessage::Notification(RawNotification::new(resource, payload)))
        }

        /// Closes the open channel gracefully.
        pub fn drop_connection(&self) -> bool {
            let sent = self.send(FeedMessage::Closed);
            self.state().sender = None;
            sent
        }

        /// Fails the open channel.
        pub fn fail_connection(&self, reason: impl Into<String>) -> bool {
            let sent = self.send(FeedMessage::Failed(reason.into()));
            self.state().sender = None;
            sent
        }
    }

    #[async_trait]
    impl ChangeFeed for MockFeed {
        async fn open_channel(&self, spec: &ChannelSpec) -> RealtimeResult<FeedChannel> {
            let mut state = self.state();
            state.opened.push(spec.clone());
            if state.failing_opens > 0 {
                state.failing_opens -= 1;
                return Err(RealtimeError::Feed("connection refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            state.sender = Some(tx);
            Ok(FeedChannel::new(rx))
        }

        async fn close_channel(&self, name: &str) -> RealtimeResult<()> {
            let mut state = self.state();
            state.sender = None;
            state.closed.push(name.to_string());
            Ok(())
        }

        async fn ping(&self) -> RealtimeResult<()> {
            let (latency, failing) = {
                let state = self.state();
                (state.ping_latency, state.ping_failing)
            };
            tokio::time::sleep(latency).await;
            if failing {
                return Err(RealtimeError::Feed("ping failed".into()));
            }
            self.state().pings += 1;
            Ok(())
        }
    }
}
