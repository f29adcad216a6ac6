//! Remote task store abstraction.
//!
//! Defines the [`TaskStore`] trait that every backing document database must
//! satisfy. All operations are keyed under a per-user namespace; no user can
//! see or touch another user's tasks.
//!
//! Implementations:
//! - [`memory::InMemoryTaskStore`]: in-process document store with fault
//!   injection, for tests and demos
//! - [`file::JsonFileStore`]: single JSON file on disk, used by the CLI

pub mod file;
pub mod memory;

use std::fmt;

use geotask_proto::codec::CodecError;
use geotask_proto::task::{Task, TaskId, TaskPatch};
use geotask_proto::user::UserId;

/// Errors reported by a task store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (network down, service outage).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A write was rejected by the store.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// A read was rejected by the store.
    #[error("read failed: {0}")]
    ReadFailed(String),

    /// The addressed document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A stored document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Underlying file I/O failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file is not valid JSON.
    #[error("malformed store file: {0}")]
    Json(#[from] serde_json::Error),
}

/// The four operations a task store exposes, used for fault injection and
/// call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Create,
    Update,
    Delete,
    List,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Async document store holding every user's tasks.
///
/// Writes are last-write-wins: the store keeps whatever arrived last for a
/// given document.
pub trait TaskStore: Send + Sync {
    /// Write `task` under `user`, keyed by its id. Overwrites an existing
    /// document with the same id.
    fn create(
        &self,
        user: &UserId,
        task: &Task,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite the mutable fields of the task `id`.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update(
        &self,
        user: &UserId,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Delete the task `id`. Deleting a missing document succeeds.
    fn delete(
        &self,
        user: &UserId,
        id: &TaskId,
    ) -> impl std::future::Future<Output = Result<(), StoreError>> + Send;

    /// Every task of `user`, ordered by ascending deadline.
    fn list_ordered_by_deadline(
        &self,
        user: &UserId,
    ) -> impl std::future::Future<Output = Result<Vec<Task>, StoreError>> + Send;
}

impl<T: TaskStore> TaskStore for std::sync::Arc<T> {
    async fn create(&self, user: &UserId, task: &Task) -> Result<(), StoreError> {
        (**self).create(user, task).await
    }

    async fn update(&self, user: &UserId, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        (**self).update(user, id, patch).await
    }

    async fn delete(&self, user: &UserId, id: &TaskId) -> Result<(), StoreError> {
        (**self).delete(user, id).await
    }

    async fn list_ordered_by_deadline(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        (**self).list_ordered_by_deadline(user).await
    }
}

/// Sorts tasks the way the store returns them: deadline first, then id so
/// equal deadlines have a deterministic order.
pub(crate) fn order_by_deadline(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| a.deadline.cmp(&b.deadline).then_with(|| a.id.cmp(&b.id)));
}
