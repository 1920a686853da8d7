//! Normalizes raw notifications and fans them out.
//!
//! For every event the router, in order:
//!
//! 1. records it as the last seen event,
//! 2. evicts the cache entries the change affects,
//! 3. runs each subscriber of the resource, one after another,
//! 4. lets the optimistic ledger confirm matching updates.
//!
//! Dispatch is serialized: one event is fully processed before the next
//! starts, so subscribers observe events in arrival order.

use crate::error::{RealtimeError, RealtimeResult};
use crate::feed::RawNotification;
use crate::optimistic::OptimisticUpdateLedger;
use crate::registry::SubscriptionRegistry;
use fleetdesk_cache::{CacheStore, InvalidationMapper};
use fleetdesk_types::{ChangeEvent, TenantId, UpdateId};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Cache entries evicted.
    pub evicted: usize,
    /// Handlers that completed successfully.
    pub delivered: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
    /// Optimistic updates confirmed by the event.
    pub confirmed: Vec<UpdateId>,
}

/// Routes change events to the cache, subscribers and the ledger.
pub struct EventRouter {
    registry: Arc<SubscriptionRegistry>,
    ledger: Arc<OptimisticUpdateLedger>,
    cache: Arc<CacheStore>,
    mapper: InvalidationMapper,
    default_tenant: Option<TenantId>,
    last_event: RwLock<Option<ChangeEvent>>,
    dispatched: AtomicU64,
    dispatch_lock: Mutex<()>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("default_tenant", &self.default_tenant)
            .field("dispatched", &self.dispatched)
            .finish_non_exhaustive()
    }
}

impl EventRouter {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        ledger: Arc<OptimisticUpdateLedger>,
        cache: Arc<CacheStore>,
        mapper: InvalidationMapper,
        default_tenant: Option<TenantId>,
    ) -> Self {
        Self {
            registry,
            ledger,
            cache,
            mapper,
            default_tenant,
            last_event: RwLock::new(None),
            dispatched: AtomicU64::new(0),
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Normalizes a raw notification and dispatches it.
    ///
    /// Returns [`RealtimeError::Protocol`] for an unknown event type; nothing
    /// is dispatched in that case.
    pub async fn route(&self, notification: RawNotification) -> RealtimeResult<DispatchReport> {
        let RawNotification { resource, payload } = notification;
        let event_type = payload.event_type.clone();
        let event = ChangeEvent::from_payload(resource.clone(), payload).map_err(|e| {
            warn!(%resource, %event_type, error = %e, "dropping malformed notification");
            RealtimeError::Protocol(format!("{resource}: {e}"))
        })?;
        Ok(self.dispatch(event).await)
    }

    /// Dispatches an already normalized event.
    ///
    /// Waits for any dispatch in progress. See [`ChangeHandler`] for what
    /// handlers may not do while it runs.
    ///
    /// [`ChangeHandler`]: crate::ChangeHandler
    pub async fn dispatch(&self, event: ChangeEvent) -> DispatchReport {
        let _serial = self.dispatch_lock.lock().await;
        let mut report = DispatchReport::default();

        *self.last_event.write().await = Some(event.clone());
        self.dispatched.fetch_add(1, Ordering::Relaxed);

        match event.tenant_id().or_else(|| self.default_tenant.clone()) {
            Some(tenant) => {
                report.evicted = self.mapper.apply(&self.cache, &event.resource, &tenant).await;
            }
            None => {
                warn!(resource = %event.resource, "event has no tenant and none is configured, skipping invalidation");
            }
        }

        for (id, handler) in self.registry.snapshot(&event.resource).await {
            match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(subscription = %id, resource = %event.resource, error = %e, "subscriber failed");
                }
                Err(_) => {
                    report.failed += 1;
                    warn!(subscription = %id, resource = %event.resource, "subscriber panicked");
                }
            }
        }

        report.confirmed = self.ledger.reconcile(&event).await;

        debug!(
            resource = %event.resource,
            operation = %event.operation,
            evicted = report.evicted,
            delivered = report.delivered,
            failed = report.failed,
            confirmed = report.confirmed.len(),
            "dispatched change event"
        );
        report
    }

    /// The most recently dispatched event.
    pub async fn last_event(&self) -> Option<ChangeEvent> {
        self.last_event.read().await.clone()
    }

    /// Number of events dispatched since creation.
    pub fn dispatched_count(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }
}
