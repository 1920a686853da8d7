use async_trait::async_trait;
use fleetdesk_realtime::feed::mock::MockFeed;
use fleetdesk_realtime::{
    NoticeLevel, NoticeLog, OptimisticUpdate, OptimisticUpdateLedger, RawNotification, RealtimeConfig,
    RealtimeCoordinator, RealtimeError, RealtimeResult, RollbackCommand, RollbackExecutor,
};
use fleetdesk_types::{ChangeEvent, ChangePayload, Operation, Record, ResourceType, TenantId, UndoRef, UpdateId};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingRollback {
    executed: Mutex<Vec<RollbackCommand>>,
    fail: bool,
}

impl RecordingRollback {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn executed(&self) -> Vec<RollbackCommand> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RollbackExecutor for RecordingRollback {
    async fn execute(&self, command: &RollbackCommand) -> RealtimeResult<()> {
        self.executed.lock().unwrap().push(command.clone());
        if self.fail {
            Err(RealtimeError::Handler("undo log unavailable".into()))
        } else {
            Ok(())
        }
    }
}

fn record(value: serde_json::Value) -> Record {
    value.as_object().cloned().unwrap()
}

fn ledger() -> (Arc<RecordingRollback>, Arc<NoticeLog>, OptimisticUpdateLedger) {
    let executor = Arc::new(RecordingRollback::default());
    let notices = Arc::new(NoticeLog::new());
    let ledger = OptimisticUpdateLedger::new(Duration::from_secs(30), executor.clone(), notices.clone());
    (executor, notices, ledger)
}

fn contract_edit(record_id: &str, undo: u64) -> OptimisticUpdate {
    OptimisticUpdate::new(
        ResourceType::Contracts,
        Operation::Update,
        json!({"id": record_id, "status": "active"}),
        UndoRef(undo),
    )
    .with_record_id(record_id)
}

fn new_contract(undo: u64) -> OptimisticUpdate {
    OptimisticUpdate::new(
        ResourceType::Contracts,
        Operation::Insert,
        json!({"customer_id": 4, "status": "draft"}),
        UndoRef(undo),
    )
}

// ── add / remove ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn add_then_get() {
    let (_executor, _notices, ledger) = ledger();
    let update = contract_edit("c1", 1);
    let id = ledger.add(update.clone()).await;

    assert_eq!(id, update.id);
    assert_eq!(ledger.get(id).await, Some(update));
    assert_eq!(ledger.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn remove_drops_without_rollback() {
    let (executor, notices, ledger) = ledger();
    let id = ledger.add(contract_edit("c1", 1)).await;

    assert!(ledger.remove(id).await);
    assert!(!ledger.remove(id).await);
    assert!(ledger.is_empty().await);
    assert!(executor.executed().is_empty());
    assert!(notices.is_empty());
}

#[tokio::test(start_paused = true)]
async fn pending_is_oldest_first() {
    let (_executor, _notices, ledger) = ledger();
    let a = ledger.add(contract_edit("c1", 1)).await;
    let b = ledger.add(new_contract(2)).await;
    let c = ledger.add(contract_edit("c2", 3)).await;

    let ids: Vec<UpdateId> = ledger.pending().await.into_iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![a, b, c]);
}

#[tokio::test(start_paused = true)]
async fn second_update_for_same_row_replaces_first() {
    let (executor, _notices, ledger) = ledger();
    let first = ledger.add(contract_edit("c1", 1)).await;
    let second = ledger.add(contract_edit("c1", 2)).await;

    assert_eq!(ledger.len().await, 1);
    assert!(!ledger.contains(first).await);
    assert!(ledger.contains(second).await);

    // The replaced update can no longer be rolled back.
    assert_eq!(ledger.rollback(first).await.unwrap(), false);
    assert!(executor.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn updates_for_different_rows_coexist() {
    let (_executor, _notices, ledger) = ledger();
    ledger.add(contract_edit("c1", 1)).await;
    ledger.add(contract_edit("c2", 2)).await;
    ledger
        .add(
            OptimisticUpdate::new(ResourceType::Vehicles, Operation::Update, json!({}), UndoRef(3))
                .with_record_id("c1"),
        )
        .await;

    assert_eq!(ledger.len().await, 3);
}

// ── Expiry ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unconfirmed_update_expires_without_rollback() {
    let (executor, notices, ledger) = ledger();
    let id = ledger.add(contract_edit("c1", 1)).await;

    tokio::time::sleep(Duration::from_millis(29_999)).await;
    assert!(ledger.contains(id).await);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert!(!ledger.contains(id).await);
    assert!(executor.executed().is_empty());
    assert!(notices.is_empty());
}

#[tokio::test(start_paused = true)]
async fn replacement_restarts_the_timer() {
    let (_executor, _notices, ledger) = ledger();
    ledger.add(contract_edit("c1", 1)).await;

    tokio::time::sleep(Duration::from_secs(20)).await;
    let second = ledger.add(contract_edit("c1", 2)).await;

    // The first timer would have fired at 30s.
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(ledger.contains(second).await);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(ledger.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn removed_update_timer_is_cancelled() {
    let (_executor, _notices, ledger) = ledger();
    let update = contract_edit("c1", 1);
    let id = ledger.add(update.clone()).await;
    ledger.remove(id).await;

    // Re-adding with the same id starts a fresh timer; the old one must not
    // remove it early.
    tokio::time::sleep(Duration::from_secs(10)).await;
    ledger.add(update).await;
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert!(ledger.contains(id).await);
}

// ── Rollback ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn rollback_runs_exactly_once() {
    let (executor, notices, ledger) = ledger();
    let update = contract_edit("c1", 7);
    let id = ledger.add(update.clone()).await;

    assert_eq!(ledger.rollback(id).await.unwrap(), true);
    assert_eq!(ledger.rollback(id).await.unwrap(), false);

    assert_eq!(executor.executed(), vec![update.rollback_command()]);
    assert_eq!(executor.executed()[0].undo_ref, UndoRef(7));
    assert!(ledger.is_empty().await);

    let raised = notices.notices();
    assert_eq!(raised.len(), 1);
    assert_eq!(raised[0].level, NoticeLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn rolled_back_update_does_not_expire_later() {
    let (executor, _notices, ledger) = ledger();
    let id = ledger.add(contract_edit("c1", 1)).await;
    ledger.rollback(id).await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(executor.executed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failing_rollback_is_reported_and_still_removed() {
    let executor = Arc::new(RecordingRollback::failing());
    let notices = Arc::new(NoticeLog::new());
    let ledger = OptimisticUpdateLedger::new(Duration::from_secs(30), executor.clone(), notices.clone());
    let id = ledger.add(contract_edit("c1", 1)).await;

    let err = ledger.rollback(id).await.unwrap_err();
    assert!(matches!(err, RealtimeError::Rollback(_)));
    assert!(ledger.is_empty().await);
    assert_eq!(executor.executed().len(), 1);
    assert_eq!(notices.notices()[0].level, NoticeLevel::Error);

    // No second attempt.
    assert_eq!(ledger.rollback(id).await.unwrap(), false);
    assert_eq!(executor.executed().len(), 1);
}

// ── Reconciliation ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn matching_row_event_confirms_update() {
    let (executor, _notices, ledger) = ledger();
    let id = ledger.add(contract_edit("c1", 1)).await;

    let event = ChangeEvent::update(
        ResourceType::Contracts,
        record(json!({"id": "c1", "status": "draft"})),
        record(json!({"id": "c1", "status": "active"})),
    );
    assert_eq!(ledger.reconcile(&event).await, vec![id]);
    assert!(ledger.is_empty().await);
    assert!(executor.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn other_row_or_resource_does_not_confirm() {
    let (_executor, _notices, ledger) = ledger();
    ledger.add(contract_edit("c1", 1)).await;

    let other_row = ChangeEvent::update(
        ResourceType::Contracts,
        record(json!({"id": "c2"})),
        record(json!({"id": "c2", "status": "active"})),
    );
    let other_resource = ChangeEvent::update(
        ResourceType::Vehicles,
        record(json!({"id": "c1"})),
        record(json!({"id": "c1", "status": "rented"})),
    );

    assert!(ledger.reconcile(&other_row).await.is_empty());
    assert!(ledger.reconcile(&other_resource).await.is_empty());
    assert_eq!(ledger.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn delete_of_the_row_confirms_any_action() {
    let (_executor, _notices, ledger) = ledger();
    let id = ledger
        .add(
            OptimisticUpdate::new(ResourceType::Vehicles, Operation::Delete, json!({"id": 9}), UndoRef(1))
                .with_record_id("9"),
        )
        .await;

    let event = ChangeEvent::delete(ResourceType::Vehicles, record(json!({"id": 9})));
    assert_eq!(ledger.reconcile(&event).await, vec![id]);
}

#[tokio::test(start_paused = true)]
async fn insert_without_record_id_is_confirmed_by_insert() {
    let (_executor, _notices, ledger) = ledger();
    let id = ledger.add(new_contract(1)).await;

    let update = ChangeEvent::update(
        ResourceType::Contracts,
        record(json!({"id": "c9"})),
        record(json!({"id": "c9", "status": "active"})),
    );
    assert!(ledger.reconcile(&update).await.is_empty());

    let insert = ChangeEvent::insert(ResourceType::Contracts, record(json!({"id": "c10"})));
    assert_eq!(ledger.reconcile(&insert).await, vec![id]);
}

#[tokio::test(start_paused = true)]
async fn one_insert_confirms_only_the_oldest_unidentified_update() {
    let (_executor, _notices, ledger) = ledger();
    let first = ledger.add(new_contract(1)).await;
    let second = ledger.add(new_contract(2)).await;

    let insert = ChangeEvent::insert(ResourceType::Contracts, record(json!({"id": "c10"})));
    assert_eq!(ledger.reconcile(&insert).await, vec![first]);
    assert_eq!(ledger.reconcile(&insert).await, vec![second]);
    assert!(ledger.is_empty().await);
}

// ── Through the coordinator ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn insert_from_feed_confirms_pending_update() {
    let feed = Arc::new(MockFeed::new());
    let executor = Arc::new(RecordingRollback::default());
    let coordinator = RealtimeCoordinator::builder(feed, RealtimeConfig::for_tenant(TenantId::new("T1")))
        .rollback_executor(executor.clone())
        .build();

    let u1 = UpdateId::new();
    coordinator
        .add_optimistic_update(new_contract(1).with_id(u1))
        .await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    let report = coordinator
        .deliver(RawNotification::new(
            ResourceType::Contracts,
            ChangePayload::insert(record(json!({"id": "c42", "company_id": "T1"}))),
        ))
        .await
        .unwrap();

    assert_eq!(report.confirmed, vec![u1]);
    assert!(coordinator.ledger().get(u1).await.is_none());
    assert!(executor.executed().is_empty());
}

#[tokio::test(start_paused = true)]
async fn coordinator_rollback_and_remove() {
    let feed = Arc::new(MockFeed::new());
    let executor = Arc::new(RecordingRollback::default());
    let coordinator = RealtimeCoordinator::builder(feed, RealtimeConfig::default())
        .rollback_executor(executor.clone())
        .build();

    let a = coordinator.add_optimistic_update(contract_edit("c1", 1)).await;
    let b = coordinator.add_optimistic_update(contract_edit("c2", 2)).await;

    assert!(coordinator.remove_optimistic_update(a).await);
    assert!(coordinator.rollback_optimistic_update(b).await.unwrap());
    assert_eq!(executor.executed().len(), 1);
    assert_eq!(executor.executed()[0].undo_ref, UndoRef(2));
}

#[tokio::test(start_paused = true)]
async fn stop_drops_pending_updates() {
    let feed = Arc::new(MockFeed::new());
    let coordinator = RealtimeCoordinator::builder(feed, RealtimeConfig::default()).build();
    coordinator.start().await.unwrap();
    coordinator.add_optimistic_update(contract_edit("c1", 1)).await;

    coordinator.stop().await;
    assert!(coordinator.ledger().is_empty().await);
}
