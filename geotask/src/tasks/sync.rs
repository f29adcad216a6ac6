//! Task synchronizer: the in-memory view and its reconciliation with the
//! remote store.
//!
//! # Publication
//!
//! The view lives in a [`tokio::sync::watch`] channel, so any number of
//! observers can read it at any time and always see a whole list. Each
//! refresh takes a ticket from a monotonically increasing sequence when it
//! is initiated. A refresh result is published only if its ticket is newer
//! than the one that produced the current view; the check and the swap
//! happen inside a single `send_if_modified` call.
//!
//! # Optimistic insert
//!
//! `add` appends the new task to the view before the store confirms the
//! write and removes that exact task again if the write fails. `edit` and
//! `delete` are not applied locally: they wait for the store and then
//! refresh. A failed edit or delete leaves the view untouched until the
//! next refresh.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use geotask_proto::task::{
    Category, CategoryFilter, MAX_TASK_TITLE_LENGTH, SortOption, Task, TaskId, TaskPatch,
};
use geotask_proto::user::UserId;

use super::policy::apply_view;
use super::{SkipReason, SyncError, SyncOutcome, validate_title};
use crate::now_ms;
use crate::observe::{ErrorReport, ErrorSink};
use crate::session::SessionContext;
use crate::store::TaskStore;

/// Category filter and sort option currently selected for the view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewOptions {
    /// Which categories are shown.
    pub filter: CategoryFilter,
    /// How the shown tasks are ordered.
    pub sort: SortOption,
}

/// Tunables for a [`TaskSynchronizer`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Maximum task title length in characters.
    pub max_title_len: usize,
    /// Selection in effect before the user changes anything.
    pub initial_options: ViewOptions,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_title_len: MAX_TASK_TITLE_LENGTH,
            initial_options: ViewOptions::default(),
        }
    }
}

/// The externally observable, ordered task list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublishedView {
    /// Ticket of the refresh (or clear) that produced this view; 0 before
    /// the first one.
    generation: u64,
    tasks: Arc<[Task]>,
}

impl PublishedView {
    /// The tasks, in display order.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// A cheap shared handle to the tasks.
    #[must_use]
    pub fn shared(&self) -> Arc<[Task]> {
        Arc::clone(&self.tasks)
    }

    /// Sequence number of the refresh that last replaced the whole view.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of tasks in the view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if the view has no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// A refresh that has been initiated: its ticket, the user it fetches for
/// and the selection it will apply.
struct RefreshTicket {
    seq: u64,
    user: UserId,
    options: ViewOptions,
}

struct Inner<S, C, K> {
    store: S,
    session: C,
    sink: K,
    max_title_len: usize,
    options: Mutex<ViewOptions>,
    /// Last ticket handed out; tickets start at 1.
    last_seq: AtomicU64,
    view: watch::Sender<PublishedView>,
}

/// Reconciles the signed-in user's task list with a remote [`TaskStore`].
///
/// The store, the session and the error sink are supplied by the caller.
/// Cloning is cheap and every clone drives the same view.
pub struct TaskSynchronizer<S, C, K> {
    inner: Arc<Inner<S, C, K>>,
}

impl<S, C, K> Clone for TaskSynchronizer<S, C, K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TaskStore, C: SessionContext, K: ErrorSink> TaskSynchronizer<S, C, K> {
    /// Creates a synchronizer with default settings and an empty view.
    pub fn new(store: S, session: C, sink: K) -> Self {
        Self::with_settings(store, session, sink, SyncSettings::default())
    }

    /// Creates a synchronizer with explicit settings and an empty view.
    pub fn with_settings(store: S, session: C, sink: K, settings: SyncSettings) -> Self {
        let (view, _) = watch::channel(PublishedView::default());
        Self {
            inner: Arc::new(Inner {
                store,
                session,
                sink,
                max_title_len: settings.max_title_len,
                options: Mutex::new(settings.initial_options),
                last_seq: AtomicU64::new(0),
                view,
            }),
        }
    }

    /// Snapshot of the current view.
    #[must_use]
    pub fn view(&self) -> PublishedView {
        self.inner.view.borrow().clone()
    }

    /// Subscribe to view changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PublishedView> {
        self.inner.view.subscribe()
    }

    /// The current filter and sort selection.
    #[must_use]
    pub fn options(&self) -> ViewOptions {
        self.inner.options.lock().clone()
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Creates a task and shows it immediately, before the store confirms.
    ///
    /// Returns `Ok(None)` without doing anything if the title is invalid or
    /// nobody is signed in. If the store rejects the write, the task is
    /// removed from the view again and the failure is reported.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteWriteFailed`] if the store write fails.
    pub async fn add(
        &self,
        title: &str,
        category: Category,
        deadline: u64,
    ) -> Result<Option<TaskId>, SyncError> {
        let inner = &self.inner;
        if let Err(e) = validate_title(title, inner.max_title_len) {
            tracing::debug!(error = %e, "add skipped");
            return Ok(None);
        }
        let Some(user) = inner.session.current_user_id() else {
            tracing::debug!("add skipped, no session");
            return Ok(None);
        };

        let task = Task::new(title.to_string(), category, deadline, now_ms());
        inner.view.send_modify(|view| {
            let mut tasks = view.tasks.to_vec();
            tasks.push(task.clone());
            view.tasks = tasks.into();
        });

        match inner.store.create(&user, &task).await {
            Ok(()) => {
                tracing::info!(task_id = %task.id, "task added");
                Ok(Some(task.id))
            }
            Err(e) => {
                let removed = inner.view.send_if_modified(|view| {
                    if !view.tasks.iter().any(|t| t.id == task.id) {
                        return false;
                    }
                    view.tasks = view.tasks.iter().filter(|t| t.id != task.id).cloned().collect();
                    true
                });
                tracing::warn!(task_id = %task.id, removed, "add failed, optimistic insert rolled back");
                inner.sink.report(ErrorReport::new("add", &e));
                Err(SyncError::RemoteWriteFailed {
                    operation: "add",
                    source: e,
                })
            }
        }
    }

    /// Overwrites title, category and deadline of task `id` in the store,
    /// then refreshes.
    ///
    /// The view is not touched locally. On failure it keeps showing the old
    /// values until the next refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteWriteFailed`] if the store update fails.
    pub async fn edit(
        &self,
        id: &TaskId,
        title: &str,
        category: Category,
        deadline: u64,
    ) -> Result<SyncOutcome, SyncError> {
        let inner = &self.inner;
        let Some(user) = inner.session.current_user_id() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        };
        if let Err(e) = validate_title(title, inner.max_title_len) {
            tracing::debug!(task_id = %id, error = %e, "edit skipped");
            return Ok(SyncOutcome::Skipped(SkipReason::InvalidTitle(e)));
        }

        let patch = TaskPatch {
            title: title.to_string(),
            category,
            deadline,
        };
        if let Err(e) = inner.store.update(&user, id, &patch).await {
            tracing::warn!(task_id = %id, error = %e, "edit failed");
            inner.sink.report(ErrorReport::new("edit", &e));
            return Err(SyncError::RemoteWriteFailed {
                operation: "edit",
                source: e,
            });
        }

        tracing::info!(task_id = %id, "task updated");
        self.refresh_after("edit").await;
        Ok(SyncOutcome::Applied)
    }

    /// Deletes task `id` from the store, then refreshes.
    ///
    /// On failure the view keeps showing the task until the next refresh.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteWriteFailed`] if the store delete fails.
    pub async fn delete(&self, id: &TaskId) -> Result<SyncOutcome, SyncError> {
        let inner = &self.inner;
        let Some(user) = inner.session.current_user_id() else {
            return Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated));
        };

        if let Err(e) = inner.store.delete(&user, id).await {
            tracing::warn!(task_id = %id, error = %e, "delete failed");
            inner.sink.report(ErrorReport::new("delete", &e));
            return Err(SyncError::RemoteWriteFailed {
                operation: "delete",
                source: e,
            });
        }

        tracing::info!(task_id = %id, "task deleted");
        self.refresh_after("delete").await;
        Ok(SyncOutcome::Applied)
    }

    /// Re-reads every task from the store and publishes the filtered,
    /// sorted result as the new view.
    ///
    /// Returns [`SkipReason::Superseded`] when a refresh initiated after
    /// this one has already published.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteReadFailed`] if the store read fails; the
    /// previous view is kept.
    pub async fn refresh(&self) -> Result<SyncOutcome, SyncError> {
        match self.inner.begin_refresh(|_| {}) {
            Some(ticket) => self.run_refresh(ticket).await,
            None => Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated)),
        }
    }

    /// Selects a category filter and refreshes.
    ///
    /// The selection is kept even without a session; only the refresh is
    /// skipped.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn set_category_filter(
        &self,
        filter: CategoryFilter,
    ) -> Result<SyncOutcome, SyncError> {
        tracing::debug!(%filter, "category filter selected");
        match self.inner.begin_refresh(|options| options.filter = filter) {
            Some(ticket) => self.run_refresh(ticket).await,
            None => Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated)),
        }
    }

    /// Selects a sort option and refreshes.
    ///
    /// # Errors
    ///
    /// Same as [`refresh`](Self::refresh).
    pub async fn set_sort_option(&self, sort: SortOption) -> Result<SyncOutcome, SyncError> {
        tracing::debug!(%sort, "sort option selected");
        match self.inner.begin_refresh(|options| options.sort = sort) {
            Some(ticket) => self.run_refresh(ticket).await,
            None => Ok(SyncOutcome::Skipped(SkipReason::NotAuthenticated)),
        }
    }

    /// Publishes an empty view, discarding every refresh still in flight.
    ///
    /// Called when the session ends so no task stays visible without one.
    pub fn clear(&self) {
        let seq = self.inner.next_seq();
        self.inner.publish(seq, Vec::new());
        tracing::debug!(generation = seq, "view cleared");
    }

    /// Why [`add`](Self::add) would refuse `title` right now, if it would.
    pub(super) fn add_refusal(&self, title: &str) -> Option<SkipReason> {
        if let Err(e) = validate_title(title, self.inner.max_title_len) {
            return Some(SkipReason::InvalidTitle(e));
        }
        if self.inner.session.current_user_id().is_none() {
            return Some(SkipReason::NotAuthenticated);
        }
        None
    }

    async fn run_refresh(&self, ticket: RefreshTicket) -> Result<SyncOutcome, SyncError> {
        let inner = &self.inner;
        let tasks = match inner.store.list_ordered_by_deadline(&ticket.user).await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!(seq = ticket.seq, error = %e, "refresh failed, keeping previous view");
                inner.sink.report(ErrorReport::new("refresh", &e));
                return Err(SyncError::RemoteReadFailed(e));
            }
        };

        let fetched = tasks.len();
        let view = apply_view(&tasks, &ticket.options.filter, ticket.options.sort);
        let shown = view.len();
        if inner.publish(ticket.seq, view) {
            tracing::debug!(seq = ticket.seq, fetched, shown, "view published");
            Ok(SyncOutcome::Applied)
        } else {
            tracing::debug!(seq = ticket.seq, "refresh superseded, result discarded");
            Ok(SyncOutcome::Skipped(SkipReason::Superseded))
        }
    }

    /// Refresh following a confirmed write. Its failure is already reported
    /// and does not undo the write.
    async fn refresh_after(&self, operation: &'static str) {
        if let Err(e) = self.refresh().await {
            tracing::debug!(operation, error = %e, "refresh after write failed");
        }
    }
}

impl<S, C: SessionContext, K> Inner<S, C, K> {
    fn next_seq(&self) -> u64 {
        self.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Applies `select` to the options and, if a user is signed in, hands
    /// out a ticket. Both happen under the options lock so the ticket order
    /// matches the selection order.
    fn begin_refresh(&self, select: impl FnOnce(&mut ViewOptions)) -> Option<RefreshTicket> {
        let mut options = self.options.lock();
        select(&mut options);
        let user = self.session.current_user_id()?;
        Some(RefreshTicket {
            seq: self.next_seq(),
            user,
            options: options.clone(),
        })
    }

    /// Replaces the whole view if `seq` is newer than the view's generation.
    fn publish(&self, seq: u64, tasks: Vec<Task>) -> bool {
        self.view.send_if_modified(|view| {
            if seq <= view.generation {
                return false;
            }
            view.generation = seq;
            view.tasks = tasks.into();
            true
        })
    }
}
