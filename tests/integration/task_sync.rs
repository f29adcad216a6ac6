//! Integration tests for task list synchronization.
//!
//! Drives `TaskSynchronizer` against the in-memory store and a gated
//! wrapper to check optimistic insert, rollback, remote-first edit and
//! delete, refresh idempotence and the no-session behaviour.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::similar_names)]

#[path = "../support/gated_store.rs"]
mod gated_store;

use std::sync::Arc;

use gated_store::GatedStore;
use geotask::observe::{ChannelSink, ErrorReport};
use geotask::session::SharedSession;
use geotask::store::memory::InMemoryTaskStore;
use geotask::store::{StoreOp, TaskStore};
use geotask::tasks::{SkipReason, SyncCommand, SyncError, SyncOutcome, TaskSynchronizer};
use geotask_proto::task::{Category, CategoryFilter, SortOption, Task};
use geotask_proto::user::UserId;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

fn alice() -> UserId {
    UserId::new("alice")
}

fn signed_in() -> SharedSession {
    let session = SharedSession::new();
    session.set_user(alice());
    session
}

fn titles(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|t| t.title.clone()).collect()
}

type MemSync = TaskSynchronizer<Arc<InMemoryTaskStore>, SharedSession, ChannelSink>;

fn memory_sync() -> (
    MemSync,
    Arc<InMemoryTaskStore>,
    SharedSession,
    mpsc::Receiver<ErrorReport>,
) {
    let store = Arc::new(InMemoryTaskStore::new());
    let session = signed_in();
    let (sink, reports) = ChannelSink::new(32);
    let sync = TaskSynchronizer::new(Arc::clone(&store), session.clone(), sink);
    (sync, store, session, reports)
}

fn gated_sync() -> (
    TaskSynchronizer<Arc<GatedStore>, SharedSession, ChannelSink>,
    Arc<GatedStore>,
    mpsc::Receiver<ErrorReport>,
) {
    let store = GatedStore::new();
    let (sink, reports) = ChannelSink::new(32);
    let sync = TaskSynchronizer::new(Arc::clone(&store), signed_in(), sink);
    (sync, store, reports)
}

// ===========================================================================
// Optimistic insert
// ===========================================================================

#[tokio::test]
async fn added_task_visible_before_store_confirms() {
    let (sync, store, _reports) = gated_sync();
    let mut held = store.hold(StoreOp::Create);

    let adder = sync.clone();
    let add = tokio::spawn(async move { adder.add("Buy milk", Category::Grocery, 10).await });
    held.entered().await;

    assert_eq!(titles(sync.view().tasks()), ["Buy milk"]);
    assert!(store.inner.is_empty(&alice()).await);

    held.release();
    let id = add.await.unwrap().unwrap().unwrap();
    assert_eq!(store.inner.len(&alice()).await, 1);
    assert_eq!(sync.view().tasks()[0].id, id);
}

#[tokio::test]
async fn failed_add_restores_previous_view() {
    let (sync, store, mut reports) = gated_sync();
    sync.add("Existing", Category::Work, 5).await.unwrap();
    let before = sync.view();

    let mut held = store.hold(StoreOp::Create);
    let adder = sync.clone();
    let add = tokio::spawn(async move { adder.add("Doomed", Category::Food, 1).await });
    held.entered().await;
    assert_eq!(sync.view().len(), 2);

    store.inner.fail_next(StoreOp::Create);
    held.release();

    let err = add.await.unwrap().unwrap_err();
    assert!(matches!(err, SyncError::RemoteWriteFailed { operation: "add", .. }));
    assert_eq!(sync.view().tasks(), before.tasks());

    let report = reports.recv().await.unwrap();
    assert_eq!(report.operation, "add");
    assert!(report.detail.contains("injected"));
}

#[tokio::test]
async fn rollback_after_refresh_leaves_refreshed_view() {
    let (sync, store, _reports) = gated_sync();
    store
        .inner
        .insert(&alice(), &Task::new("Remote".into(), Category::Work, 3, 1))
        .await
        .unwrap();

    let mut held = store.hold(StoreOp::Create);
    let adder = sync.clone();
    let add = tokio::spawn(async move { adder.add("Pending", Category::Work, 1).await });
    held.entered().await;

    // The refresh does not see the pending task and replaces the view.
    assert_eq!(sync.refresh().await.unwrap(), SyncOutcome::Applied);
    assert_eq!(titles(sync.view().tasks()), ["Remote"]);

    store.inner.fail_next(StoreOp::Create);
    held.release();
    assert!(add.await.unwrap().is_err());
    assert_eq!(titles(sync.view().tasks()), ["Remote"]);
}

#[tokio::test]
async fn rollback_removes_only_the_failed_task() {
    let (sync, store, _session, _reports) = memory_sync();
    sync.add("Same title", Category::Work, 1).await.unwrap();

    store.fail_next(StoreOp::Create);
    assert!(sync.add("Same title", Category::Work, 1).await.is_err());

    let view = sync.view();
    assert_eq!(view.len(), 1);
    assert_eq!(store.len(&alice()).await, 1);
    assert_eq!(
        view.tasks()[0].id,
        store.list_ordered_by_deadline(&alice()).await.unwrap()[0].id
    );
}

// ===========================================================================
// Refresh
// ===========================================================================

#[tokio::test]
async fn refresh_is_idempotent() {
    let (sync, _store, _session, _reports) = memory_sync();
    sync.add("Alpha", Category::Shopping, 50).await.unwrap();
    sync.add("Beta", Category::Work, 10).await.unwrap();
    sync.add("Gamma", Category::Food, 20).await.unwrap();

    sync.refresh().await.unwrap();
    let first = sync.view();
    sync.refresh().await.unwrap();
    let second = sync.view();

    assert_eq!(first.tasks(), second.tasks());
    assert_eq!(titles(second.tasks()), ["Beta", "Gamma", "Alpha"]);
}

#[tokio::test]
async fn refresh_applies_filter_and_sort() {
    let (sync, _store, _session, _reports) = memory_sync();
    sync.add("Shopping 5", Category::Shopping, 5).await.unwrap();
    sync.add("Work 10", Category::Work, 10).await.unwrap();
    sync.add("Food 1", Category::Food, 1).await.unwrap();

    sync.set_sort_option(SortOption::ByPriority).await.unwrap();
    assert_eq!(titles(sync.view().tasks()), ["Food 1", "Work 10", "Shopping 5"]);

    sync.set_category_filter(CategoryFilter::Only(Category::Work))
        .await
        .unwrap();
    assert_eq!(titles(sync.view().tasks()), ["Work 10"]);

    sync.set_category_filter(CategoryFilter::from("All"))
        .await
        .unwrap();
    assert_eq!(sync.view().len(), 3);
}

#[tokio::test]
async fn refresh_sees_other_writers() {
    let (sync, store, _session, _reports) = memory_sync();
    store
        .insert(&alice(), &Task::new("From web".into(), Category::Others, 1, 1))
        .await
        .unwrap();
    store
        .insert(&UserId::new("bob"), &Task::new("Not mine".into(), Category::Others, 1, 1))
        .await
        .unwrap();

    sync.refresh().await.unwrap();
    assert_eq!(titles(sync.view().tasks()), ["From web"]);
}

#[tokio::test]
async fn refresh_failure_keeps_view() {
    let (sync, store, _session, mut reports) = memory_sync();
    sync.add("Keep", Category::Work, 1).await.unwrap();
    sync.refresh().await.unwrap();

    store.set_offline(true);
    let err = sync.refresh().await.unwrap_err();
    assert!(matches!(err, SyncError::RemoteReadFailed(_)));
    assert_eq!(titles(sync.view().tasks()), ["Keep"]);
    assert_eq!(reports.recv().await.unwrap().operation, "refresh");
}

// ===========================================================================
// Edit and delete
// ===========================================================================

#[tokio::test]
async fn edit_waits_for_store_then_refreshes() {
    let (sync, store, _reports) = gated_sync();
    let id = sync.add("Old", Category::Others, 10).await.unwrap().unwrap();

    let mut held = store.hold(StoreOp::Update);
    let editor = sync.clone();
    let edit_id = id.clone();
    let edit =
        tokio::spawn(async move { editor.edit(&edit_id, "New", Category::Work, 20).await });
    held.entered().await;

    // Not applied locally while the store has not confirmed.
    assert_eq!(titles(sync.view().tasks()), ["Old"]);

    held.release();
    assert_eq!(edit.await.unwrap().unwrap(), SyncOutcome::Applied);
    let view = sync.view();
    assert_eq!(view.tasks()[0].id, id);
    assert_eq!(view.tasks()[0].title, "New");
    assert_eq!(view.tasks()[0].deadline, 20);
}

#[tokio::test]
async fn edit_keeps_created_at() {
    let (sync, store, _session, _reports) = memory_sync();
    let id = sync.add("Stamp", Category::Others, 10).await.unwrap().unwrap();
    let created_at = sync.view().tasks()[0].created_at;

    sync.edit(&id, "Stamp 2", Category::Food, 11).await.unwrap();
    let stored = store.list_ordered_by_deadline(&alice()).await.unwrap();
    assert_eq!(stored[0].created_at, created_at);
    assert_eq!(stored[0].category, Category::Food);
}

#[tokio::test]
async fn failed_edit_and_delete_leave_view() {
    let (sync, store, _session, mut reports) = memory_sync();
    let id = sync.add("Steady", Category::Work, 1).await.unwrap().unwrap();
    sync.refresh().await.unwrap();
    let before = sync.view();

    store.fail_next(StoreOp::Update);
    assert!(sync.edit(&id, "Changed", Category::Work, 2).await.is_err());
    assert_eq!(sync.view(), before);

    store.fail_next(StoreOp::Delete);
    assert!(sync.delete(&id).await.is_err());
    assert_eq!(sync.view(), before);

    assert_eq!(reports.recv().await.unwrap().operation, "edit");
    assert_eq!(reports.recv().await.unwrap().operation, "delete");
    // Not retried.
    assert_eq!(store.call_count(StoreOp::Update), 1);
    assert_eq!(store.call_count(StoreOp::Delete), 1);
}

#[tokio::test]
async fn delete_then_refresh_drops_task() {
    let (sync, store, _session, _reports) = memory_sync();
    let keep = sync.add("Keep", Category::Work, 1).await.unwrap().unwrap();
    let drop_id = sync.add("Drop", Category::Work, 2).await.unwrap().unwrap();

    assert_eq!(sync.delete(&drop_id).await.unwrap(), SyncOutcome::Applied);
    assert_eq!(sync.view().tasks()[0].id, keep);
    assert_eq!(sync.view().len(), 1);
    assert_eq!(store.call_count(StoreOp::List), 1);
}

#[tokio::test]
async fn delete_missing_task_succeeds() {
    let (sync, _store, _session, _reports) = memory_sync();
    let outcome = sync
        .delete(&geotask_proto::task::TaskId::new())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Applied);
}

// ===========================================================================
// Session
// ===========================================================================

#[tokio::test]
async fn no_session_means_no_store_calls() {
    let (sync, store, session, _reports) = memory_sync();
    session.clear();

    assert_eq!(sync.add("Ghost", Category::Work, 1).await.unwrap(), None);
    let skipped = SyncOutcome::Skipped(SkipReason::NotAuthenticated);
    assert_eq!(
        sync.edit(&geotask_proto::task::TaskId::new(), "x", Category::Work, 1)
            .await
            .unwrap(),
        skipped
    );
    assert_eq!(sync.delete(&geotask_proto::task::TaskId::new()).await.unwrap(), skipped);
    assert_eq!(sync.refresh().await.unwrap(), skipped);

    for op in [StoreOp::Create, StoreOp::Update, StoreOp::Delete, StoreOp::List] {
        assert_eq!(store.call_count(op), 0, "{op} was called");
    }
    assert!(sync.view().is_empty());
}

#[tokio::test]
async fn sign_out_clears_view() {
    let (sync, _store, session, _reports) = memory_sync();
    sync.add("Private", Category::Medicine, 1).await.unwrap();

    session.clear();
    sync.clear();
    assert!(sync.view().is_empty());

    session.set_user(alice());
    sync.refresh().await.unwrap();
    assert_eq!(titles(sync.view().tasks()), ["Private"]);
}

#[tokio::test]
async fn dispatched_commands_reach_the_store() {
    let (sync, store, _session, _reports) = memory_sync();
    let handle = sync.dispatch(SyncCommand::Add {
        title: "Spawned".into(),
        category: Category::Touring,
        deadline: 7,
    });
    assert_eq!(handle.await.unwrap().unwrap(), SyncOutcome::Applied);
    assert_eq!(store.len(&alice()).await, 1);

    let mut rx = sync.subscribe();
    sync.dispatch(SyncCommand::Refresh).await.unwrap().unwrap();
    assert!(rx.has_changed().unwrap());
    assert_eq!(titles(rx.borrow_and_update().tasks()), ["Spawned"]);
}
