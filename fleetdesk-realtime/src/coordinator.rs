//! The assembled realtime layer.

use crate::config::RealtimeConfig;
use crate::connection::{ConnectionHealth, ConnectionManager, ConnectionStatus};
use crate::error::RealtimeResult;
use crate::feed::{ChangeFeed, RawNotification};
use crate::notify::{Notifier, TracingNotifier};
use crate::optimistic::{NoopRollback, OptimisticUpdate, OptimisticUpdateLedger, RollbackExecutor};
use crate::registry::{ChangeHandler, SubscriptionRegistry};
use crate::router::{DispatchReport, EventRouter};
use fleetdesk_cache::{CacheStore, InvalidationMapper};
use fleetdesk_types::{ChangeEvent, ResourceType, SubscriptionId, TenantId, UpdateId};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Builder for [`RealtimeCoordinator`].
pub struct CoordinatorBuilder {
    feed: Arc<dyn ChangeFeed>,
    config: RealtimeConfig,
    cache: Option<Arc<CacheStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    executor: Option<Arc<dyn RollbackExecutor>>,
    mapper: Option<InvalidationMapper>,
}

impl CoordinatorBuilder {
    /// Shares an existing cache instead of creating one.
    #[must_use]
    pub fn cache(mut self, cache: Arc<CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn rollback_executor(mut self, executor: Arc<dyn RollbackExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replaces the built-in invalidation rules.
    #[must_use]
    pub fn mapper(mut self, mapper: InvalidationMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn build(self) -> RealtimeCoordinator {
        let cache = self.cache.unwrap_or_default();
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier));
        let executor = self.executor.unwrap_or_else(|| Arc::new(NoopRollback));
        let mapper = self.mapper.unwrap_or_default();

        let registry = Arc::new(SubscriptionRegistry::new());
        let ledger = Arc::new(OptimisticUpdateLedger::new(
            self.config.optimistic_timeout(),
            executor,
            Arc::clone(&notifier),
        ));
        let router = Arc::new(EventRouter::new(
            Arc::clone(&registry),
            Arc::clone(&ledger),
            Arc::clone(&cache),
            mapper,
            self.config.tenant_id.clone(),
        ));
        let connection = ConnectionManager::new(self.feed, Arc::clone(&router), notifier, self.config.clone());

        RealtimeCoordinator {
            config: self.config,
            cache,
            registry,
            ledger,
            router,
            connection,
        }
    }
}

/// Owns every realtime component and exposes the public API.
///
/// Construct one per tenant session with [`RealtimeCoordinator::builder`] and
/// share it behind an `Arc`.
pub struct RealtimeCoordinator {
    config: RealtimeConfig,
    cache: Arc<CacheStore>,
    registry: Arc<SubscriptionRegistry>,
    ledger: Arc<OptimisticUpdateLedger>,
    router: Arc<EventRouter>,
    connection: ConnectionManager,
}

impl std::fmt::Debug for RealtimeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeCoordinator")
            .field("tenant", &self.config.tenant_id)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl RealtimeCoordinator {
    pub fn builder(feed: Arc<dyn ChangeFeed>, config: RealtimeConfig) -> CoordinatorBuilder {
        CoordinatorBuilder {
            feed,
            config,
            cache: None,
            notifier: None,
            executor: None,
            mapper: None,
        }
    }

    /// Opens the feed channel. See [`ConnectionManager::start`].
    pub async fn start(&self) -> RealtimeResult<ConnectionStatus> {
        self.connection.start().await
    }

    /// Closes the channel, cancels every timer, and drops all subscriptions
    /// and pending optimistic updates.
    pub async fn stop(&self) {
        self.connection.stop().await;
        self.registry.clear().await;
        self.ledger.clear().await;
        info!(tenant = ?self.config.tenant_id, "realtime coordinator stopped");
    }

    pub async fn subscribe_to_table(&self, resource: ResourceType, handler: Arc<dyn ChangeHandler>) -> SubscriptionId {
        self.registry.subscribe(resource, handler).await
    }

    pub async fn unsubscribe_from_table(&self, id: SubscriptionId) -> bool {
        self.registry.unsubscribe(id).await
    }

    pub async fn add_optimistic_update(&self, update: OptimisticUpdate) -> UpdateId {
        self.ledger.add(update).await
    }

    pub async fn remove_optimistic_update(&self, id: UpdateId) -> bool {
        self.ledger.remove(id).await
    }

    pub async fn rollback_optimistic_update(&self, id: UpdateId) -> RealtimeResult<bool> {
        self.ledger.rollback(id).await
    }

    pub fn connection_health(&self) -> ConnectionHealth {
        self.connection.connection_health()
    }

    pub async fn reconnect(&self) -> RealtimeResult<ConnectionStatus> {
        self.connection.reconnect().await
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    /// Routes a notification as if it came from the feed.
    pub async fn deliver(&self, notification: RawNotification) -> RealtimeResult<DispatchReport> {
        self.router.route(notification).await
    }

    pub async fn last_event(&self) -> Option<ChangeEvent> {
        self.router.last_event().await
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.config.tenant_id.as_ref()
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn ledger(&self) -> &Arc<OptimisticUpdateLedger> {
        &self.ledger
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }
}
