//! Input events forwarded from the presentation layer.

use geotask_proto::task::{Category, CategoryFilter, SortOption, TaskId};
use tokio::task::JoinHandle;

use super::sync::TaskSynchronizer;
use super::{SkipReason, SyncError, SyncOutcome};
use crate::observe::ErrorSink;
use crate::session::SessionContext;
use crate::store::TaskStore;

/// One user action against the task list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Create a task.
    Add {
        /// Task title.
        title: String,
        /// Task category.
        category: Category,
        /// Deadline in milliseconds since epoch.
        deadline: u64,
    },
    /// Overwrite title, category and deadline of an existing task.
    Edit {
        /// Task to change.
        id: TaskId,
        /// New title.
        title: String,
        /// New category.
        category: Category,
        /// New deadline in milliseconds since epoch.
        deadline: u64,
    },
    /// Delete a task.
    Delete {
        /// Task to delete.
        id: TaskId,
    },
    /// Re-read the list from the store.
    Refresh,
    /// Select a category filter.
    SetCategoryFilter(CategoryFilter),
    /// Select a sort option.
    SetSortOption(SortOption),
    /// Empty the view.
    Clear,
}

impl SyncCommand {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Edit { .. } => "edit",
            Self::Delete { .. } => "delete",
            Self::Refresh => "refresh",
            Self::SetCategoryFilter(_) => "set_category_filter",
            Self::SetSortOption(_) => "set_sort_option",
            Self::Clear => "clear",
        }
    }
}

impl<S: TaskStore, C: SessionContext, K: ErrorSink> TaskSynchronizer<S, C, K> {
    /// Runs a command to completion.
    ///
    /// An `Add` that was refused comes back as `Skipped` with the reason.
    ///
    /// # Errors
    ///
    /// Whatever the underlying operation returns.
    pub async fn execute(&self, command: SyncCommand) -> Result<SyncOutcome, SyncError> {
        match command {
            SyncCommand::Add {
                title,
                category,
                deadline,
            } => Ok(match self.add(&title, category, deadline).await? {
                Some(_) => SyncOutcome::Applied,
                None => SyncOutcome::Skipped(
                    self.add_refusal(&title)
                        .unwrap_or(SkipReason::NotAuthenticated),
                ),
            }),
            SyncCommand::Edit {
                id,
                title,
                category,
                deadline,
            } => self.edit(&id, &title, category, deadline).await,
            SyncCommand::Delete { id } => self.delete(&id).await,
            SyncCommand::Refresh => self.refresh().await,
            SyncCommand::SetCategoryFilter(filter) => self.set_category_filter(filter).await,
            SyncCommand::SetSortOption(sort) => self.set_sort_option(sort).await,
            SyncCommand::Clear => {
                self.clear();
                Ok(SyncOutcome::Applied)
            }
        }
    }
}

impl<S, C, K> TaskSynchronizer<S, C, K>
where
    S: TaskStore + 'static,
    C: SessionContext + 'static,
    K: ErrorSink + 'static,
{
    /// Spawns a command onto the current tokio runtime and returns
    /// immediately.
    ///
    /// Failures are already reported to the error sink, so callers may drop
    /// the handle.
    pub fn dispatch(&self, command: SyncCommand) -> JoinHandle<Result<SyncOutcome, SyncError>> {
        let sync = self.clone();
        tokio::spawn(async move {
            let name = command.name();
            let result = sync.execute(command).await;
            tracing::trace!(command = name, ok = result.is_ok(), "command finished");
            result
        })
    }
}
