//! Per-resource subscriber registry.

use crate::error::RealtimeResult;
use async_trait::async_trait;
use fleetdesk_types::{ChangeEvent, ResourceType, SubscriptionId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Reacts to change events for one resource type.
///
/// Handlers run inside the router's serialized dispatch. A handler must not
/// await another dispatch (`RealtimeCoordinator::deliver`, `EventRouter::route`)
/// or a reconnect: both wait for the dispatch in progress and never complete.
/// Spawn such follow-up work onto its own task instead.
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn handle(&self, event: &ChangeEvent) -> RealtimeResult<()>;
}

/// Adapts an async closure into a [`ChangeHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> ChangeHandler for FnHandler<F>
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync,
    Fut: Future<Output = RealtimeResult<()>> + Send + 'static,
{
    async fn handle(&self, event: &ChangeEvent) -> RealtimeResult<()> {
        (self.f)(event.clone()).await
    }
}

/// Wraps `f` as a shareable handler.
///
/// ```
/// use fleetdesk_realtime::handler_fn;
///
/// let handler = handler_fn(|event| async move {
///     println!("{} changed", event.resource);
///     Ok(())
/// });
/// # drop(handler);
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ChangeHandler>
where
    F: Fn(ChangeEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RealtimeResult<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

#[derive(Clone)]
struct Subscription {
    id: SubscriptionId,
    resource: ResourceType,
    handler: Arc<dyn ChangeHandler>,
}

/// Subscribers keyed by token, kept in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry").finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `resource` and returns its token.
    pub async fn subscribe(&self, resource: ResourceType, handler: Arc<dyn ChangeHandler>) -> SubscriptionId {
        let id = SubscriptionId::new();
        debug!(%resource, subscription = %id, "subscribed");
        self.subscriptions.write().await.push(Subscription {
            id,
            resource,
            handler,
        });
        id
    }

    /// Removes the subscription. Unknown or already removed tokens return
    /// `false`.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write().await;
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        let removed = subscriptions.len() < before;
        if removed {
            debug!(subscription = %id, "unsubscribed");
        }
        removed
    }

    /// Handlers for `resource` in registration order.
    pub async fn snapshot(&self, resource: &ResourceType) -> Vec<(SubscriptionId, Arc<dyn ChangeHandler>)> {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| &s.resource == resource)
            .map(|s| (s.id, Arc::clone(&s.handler)))
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    pub async fn count_for(&self, resource: &ResourceType) -> usize {
        self.subscriptions
            .read()
            .await
            .iter()
            .filter(|s| &s.resource == resource)
            .count()
    }

    /// Drops every subscription.
    pub async fn clear(&self) {
        self.subscriptions.write().await.clear();
    }
}
