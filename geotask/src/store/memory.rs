//! In-process document store.
//!
//! Holds postcard-encoded task documents in per-user maps, mirroring how a
//! hosted document database keeps `users/{uid}/todos/{id}`. Supports fault
//! injection so callers can exercise their failure paths.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::RwLock;

use geotask_proto::codec;
use geotask_proto::task::{Task, TaskId, TaskPatch};
use geotask_proto::user::UserId;

use super::{StoreError, StoreOp, TaskStore, order_by_deadline};

type UserDocuments = HashMap<TaskId, Vec<u8>>;

/// In-memory [`TaskStore`] with per-user namespaces.
///
/// Thread-safe via [`RwLock`]. Failures can be injected per operation with
/// [`fail_next`](Self::fail_next) or globally with
/// [`set_offline`](Self::set_offline).
#[derive(Default)]
pub struct InMemoryTaskStore {
    documents: RwLock<HashMap<UserId, UserDocuments>>,
    injected: Mutex<VecDeque<StoreOp>>,
    offline: AtomicBool,
    calls: Mutex<HashMap<StoreOp, usize>>,
}

impl InMemoryTaskStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call of `op` fail with [`StoreError::Unavailable`].
    ///
    /// Multiple injections queue up and are consumed in order.
    pub fn fail_next(&self, op: StoreOp) {
        self.injected.lock().push_back(op);
    }

    /// While offline every operation fails with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of times `op` has been called, including failed calls.
    #[must_use]
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Seeds a task directly, bypassing fault injection and accounting.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if the task cannot be encoded.
    pub async fn insert(&self, user: &UserId, task: &Task) -> Result<(), StoreError> {
        let bytes = codec::encode(task)?;
        self.documents
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .insert(task.id.clone(), bytes);
        Ok(())
    }

    /// Number of documents stored for `user`.
    pub async fn len(&self, user: &UserId) -> usize {
        self.documents.read().await.get(user).map_or(0, HashMap::len)
    }

    /// Returns true if `user` has no stored documents.
    pub async fn is_empty(&self, user: &UserId) -> bool {
        self.len(user).await == 0
    }

    /// Records the call and returns the injected failure, if any.
    fn begin(&self, op: StoreOp) -> Result<(), StoreError> {
        *self.calls.lock().entry(op).or_default() += 1;

        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{op}: store offline")));
        }

        let mut injected = self.injected.lock();
        if let Some(pos) = injected.iter().position(|o| *o == op) {
            injected.remove(pos);
            drop(injected);
            tracing::debug!(%op, "injected store failure");
            return Err(StoreError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn create(&self, user: &UserId, task: &Task) -> Result<(), StoreError> {
        self.begin(StoreOp::Create)?;
        self.insert(user, task).await
    }

    async fn update(&self, user: &UserId, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        self.begin(StoreOp::Update)?;
        let mut documents = self.documents.write().await;
        let bytes = documents
            .get_mut(user)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut task: Task = codec::decode(bytes)?;
        task.apply(patch);
        *bytes = codec::encode(&task)?;
        drop(documents);
        Ok(())
    }

    async fn delete(&self, user: &UserId, id: &TaskId) -> Result<(), StoreError> {
        self.begin(StoreOp::Delete)?;
        if let Some(docs) = self.documents.write().await.get_mut(user) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn list_ordered_by_deadline(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        self.begin(StoreOp::List)?;
        let documents = self.documents.read().await;
        let mut tasks = documents
            .get(user)
            .map(|docs| {
                docs.values()
                    .map(|bytes| codec::decode::<Task>(bytes))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        drop(documents);

        order_by_deadline(&mut tasks);
        Ok(tasks)
    }
}
