//! Ledger of speculative local mutations awaiting server confirmation.
//!
//! Every update is kept until one of three things happens:
//!
//! - a confirming [`ChangeEvent`] arrives (reconciliation),
//! - the caller removes or rolls it back explicitly,
//! - its expiry timer fires. Expiry assumes the mutation was merged and does
//!   **not** run the rollback.
//!
//! Rollback is a [`RollbackCommand`] handed to the caller's
//! [`RollbackExecutor`], so the ledger never holds captured closures.

use crate::error::{RealtimeError, RealtimeResult};
use crate::notify::{Notice, Notifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetdesk_types::{ChangeEvent, Operation, RecordId, ResourceType, UndoRef, UpdateId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What the caller must do to undo an optimistic mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackCommand {
    pub resource: ResourceType,
    pub action: Operation,
    pub record_id: Option<RecordId>,
    pub speculative_data: Value,
    /// Position in the caller's undo log.
    pub undo_ref: UndoRef,
}

/// A speculative mutation shown to the user before the server confirmed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimisticUpdate {
    pub id: UpdateId,
    pub resource: ResourceType,
    pub action: Operation,
    /// Row identity. `None` for inserts whose id is assigned server-side.
    pub record_id: Option<RecordId>,
    pub speculative_data: Value,
    pub undo_ref: UndoRef,
    pub created_at: DateTime<Utc>,
}

impl OptimisticUpdate {
    /// Creates an update with a fresh id.
    #[must_use]
    pub fn new(resource: ResourceType, action: Operation, speculative_data: Value, undo_ref: UndoRef) -> Self {
        Self {
            id: UpdateId::new(),
            resource,
            action,
            record_id: None,
            speculative_data,
            undo_ref,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_record_id(mut self, record_id: impl Into<RecordId>) -> Self {
        self.record_id = Some(record_id.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: UpdateId) -> Self {
        self.id = id;
        self
    }

    /// The command that undoes this update.
    #[must_use]
    pub fn rollback_command(&self) -> RollbackCommand {
        RollbackCommand {
            resource: self.resource.clone(),
            action: self.action,
            record_id: self.record_id.clone(),
            speculative_data: self.speculative_data.clone(),
            undo_ref: self.undo_ref,
        }
    }

    /// Returns true if `event` confirms this update.
    ///
    /// With a record id, the event must concern the same row. Without one,
    /// any event of the same resource and operation qualifies.
    fn is_confirmed_by(&self, event: &ChangeEvent) -> bool {
        if self.resource != event.resource {
            return false;
        }
        match &self.record_id {
            Some(id) => event.record_id().as_ref() == Some(id),
            None => self.action == event.operation,
        }
    }
}

/// Executes rollback commands against the caller's local state.
#[async_trait]
pub trait RollbackExecutor: Send + Sync {
    async fn execute(&self, command: &RollbackCommand) -> RealtimeResult<()>;
}

/// Executor that only logs. Used when the caller registers none.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRollback;

#[async_trait]
impl RollbackExecutor for NoopRollback {
    async fn execute(&self, command: &RollbackCommand) -> RealtimeResult<()> {
        debug!(resource = %command.resource, undo = %command.undo_ref, "no rollback executor registered");
        Ok(())
    }
}

#[derive(Debug)]
struct PendingUpdate {
    update: OptimisticUpdate,
    seq: u64,
    expiry: Option<JoinHandle<()>>,
}

impl Drop for PendingUpdate {
    fn drop(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    pending: HashMap<UpdateId, PendingUpdate>,
    next_seq: u64,
}

/// Tracks optimistic updates and their expiry timers.
pub struct OptimisticUpdateLedger {
    timeout: Duration,
    state: Arc<Mutex<LedgerState>>,
    executor: Arc<dyn RollbackExecutor>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for OptimisticUpdateLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimisticUpdateLedger")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl OptimisticUpdateLedger {
    pub fn new(timeout: Duration, executor: Arc<dyn RollbackExecutor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            timeout,
            state: Arc::new(Mutex::new(LedgerState::default())),
            executor,
            notifier,
        }
    }

    /// Stores `update` and starts its expiry timer.
    ///
    /// A pending update for the same row (or with the same id) is replaced:
    /// its timer is cancelled and its rollback is dropped. Must be called
    /// from within a Tokio runtime.
    pub async fn add(&self, update: OptimisticUpdate) -> UpdateId {
        let id = update.id;
        let mut state = self.state.lock().await;

        if let Some(record_id) = &update.record_id {
            let replaced: Vec<UpdateId> = state
                .pending
                .values()
                .filter(|p| p.update.resource == update.resource && p.update.record_id.as_ref() == Some(record_id))
                .map(|p| p.update.id)
                .collect();
            for old in replaced {
                state.pending.remove(&old);
                debug!(update = %old, replacement = %id, "optimistic update replaced");
            }
        }

        let timer = tokio::spawn(expire_after(Arc::downgrade(&self.state), id, self.timeout));
        let seq = state.next_seq;
        state.next_seq += 1;
        debug!(update = %id, resource = %update.resource, action = %update.action, "optimistic update added");
        state.pending.insert(
            id,
            PendingUpdate {
                update,
                seq,
                expiry: Some(timer),
            },
        );
        id
    }

    /// Drops an update without rolling it back. Returns whether it existed.
    pub async fn remove(&self, id: UpdateId) -> bool {
        let removed = self.state.lock().await.pending.remove(&id).is_some();
        if removed {
            debug!(update = %id, "optimistic update removed");
        }
        removed
    }

    /// Removes the update and runs its rollback exactly once.
    ///
    /// Returns `Ok(false)` if the update is unknown (already confirmed,
    /// expired or rolled back).
    pub async fn rollback(&self, id: UpdateId) -> RealtimeResult<bool> {
        let Some(pending) = self.state.lock().await.pending.remove(&id) else {
            debug!(update = %id, "rollback requested for unknown update");
            return Ok(false);
        };
        let command = pending.update.rollback_command();
        drop(pending);

        match self.executor.execute(&command).await {
            Ok(()) => {
                info!(update = %id, resource = %command.resource, "optimistic update rolled back");
                self.notifier.notify(Notice::warning(
                    "Change reverted",
                    format!("Your change to {} could not be saved and was undone.", command.resource),
                ));
                Ok(true)
            }
            Err(e) => {
                warn!(update = %id, error = %e, "rollback failed");
                self.notifier.notify(Notice::error(
                    "Undo failed",
                    format!("Reverting your change to {} failed: {e}", command.resource),
                ));
                Err(RealtimeError::Rollback(e.to_string()))
            }
        }
    }

    /// Removes every update `event` confirms and returns their ids.
    ///
    /// Updates with a record id are matched by row. Each event confirms at
    /// most one update without a record id, the oldest of its operation.
    pub async fn reconcile(&self, event: &ChangeEvent) -> Vec<UpdateId> {
        let mut state = self.state.lock().await;

        let mut confirmed: Vec<UpdateId> = state
            .pending
            .values()
            .filter(|p| p.update.record_id.is_some() && p.update.is_confirmed_by(event))
            .map(|p| p.update.id)
            .collect();

        let oldest_unidentified = state
            .pending
            .values()
            .filter(|p| p.update.record_id.is_none() && p.update.is_confirmed_by(event))
            .min_by_key(|p| p.seq)
            .map(|p| p.update.id);
        confirmed.extend(oldest_unidentified);

        for id in &confirmed {
            state.pending.remove(id);
            debug!(update = %id, resource = %event.resource, "optimistic update confirmed");
        }
        confirmed
    }

    /// Pending updates, oldest first.
    pub async fn pending(&self) -> Vec<OptimisticUpdate> {
        let state = self.state.lock().await;
        let mut pending: Vec<&PendingUpdate> = state.pending.values().collect();
        pending.sort_by_key(|p| p.seq);
        pending.into_iter().map(|p| p.update.clone()).collect()
    }

    pub async fn get(&self, id: UpdateId) -> Option<OptimisticUpdate> {
        self.state.lock().await.pending.get(&id).map(|p| p.update.clone())
    }

    pub async fn contains(&self, id: UpdateId) -> bool {
        self.state.lock().await.pending.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.pending.is_empty()
    }

    /// Drops every pending update and cancels their timers.
    pub async fn clear(&self) {
        self.state.lock().await.pending.clear();
    }
}

async fn expire_after(state: Weak<Mutex<LedgerState>>, id: UpdateId, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock().await;
    if let Some(mut pending) = state.pending.remove(&id) {
        // Detach instead of aborting: this is the timer's own task.
        pending.expiry.take();
        debug!(update = %id, "optimistic update expired without confirmation");
    }
}
