//! Per-user task list synchronization.
//!
//! Keeps an in-memory, observable view of the signed-in user's tasks in step
//! with the remote [`TaskStore`](crate::store::TaskStore): optimistic insert
//! with rollback for new tasks, remote-first edit and delete followed by a
//! full refresh, and sequence-guarded publication so a slow refresh never
//! overwrites a newer one.

pub mod command;
pub mod policy;
pub mod sync;

pub use command::SyncCommand;
pub use policy::apply_view;
pub use sync::{PublishedView, SyncSettings, TaskSynchronizer, ViewOptions};

use thiserror::Error;

use crate::store::StoreError;

/// Reasons a title is refused before anything is sent to the store.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TitleError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    Empty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {max} characters)")]
    TooLong {
        /// Maximum allowed length in characters.
        max: usize,
    },
}

/// Checks a title against the non-empty and maximum-length rules.
///
/// Length is counted in characters, not bytes. Whitespace-only titles are
/// non-empty.
///
/// # Errors
///
/// Returns [`TitleError::Empty`] or [`TitleError::TooLong`].
pub fn validate_title(title: &str, max_len: usize) -> Result<(), TitleError> {
    if title.is_empty() {
        return Err(TitleError::Empty);
    }
    if title.chars().count() > max_len {
        return Err(TitleError::TooLong { max: max_len });
    }
    Ok(())
}

/// Failures of remote operations issued by the synchronizer.
///
/// Every error returned here has already been handed to the error sink.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A create, update or delete was rejected or never reached the store.
    #[error("remote {operation} failed: {source}")]
    RemoteWriteFailed {
        /// Which operation failed (`"add"`, `"edit"` or `"delete"`).
        operation: &'static str,
        /// The store's error.
        #[source]
        source: StoreError,
    },
    /// Fetching the task list failed; the previous view was kept.
    #[error("remote read failed: {0}")]
    RemoteReadFailed(#[source] StoreError),
}

/// Why an operation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No user is signed in.
    NotAuthenticated,
    /// The title failed validation.
    InvalidTitle(TitleError),
    /// A refresh initiated later had already published its result.
    Superseded,
}

/// Result of a synchronizer operation that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The operation took effect.
    Applied,
    /// The operation was a no-op.
    Skipped(SkipReason),
}

impl SyncOutcome {
    /// Returns true if the operation took effect.
    #[must_use]
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}
