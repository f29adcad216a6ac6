//! JSON file-backed task store.
//!
//! Keeps every user's tasks in one JSON document on disk:
//!
//! ```json
//! { "users": { "<uid>": [ { "id": "...", "title": "...", ... } ] } }
//! ```
//!
//! Each write rewrites the file through a temporary sibling and a rename so
//! readers never observe a half-written file. A missing file is an empty
//! store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use geotask_proto::task::{Task, TaskId, TaskPatch};
use geotask_proto::user::UserId;

use super::{StoreError, TaskStore, order_by_deadline};

/// On-disk layout of the store file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    users: BTreeMap<String, Vec<Task>>,
}

/// [`TaskStore`] persisted to a single JSON file.
///
/// Operations are serialized through an async mutex; each one reads the
/// file, applies its change and writes it back.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Opens (lazily) the store at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<StoreFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(StoreFile::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreFile::default()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save(&self, file: &StoreFile) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        let bytes = serde_json::to_vec_pretty(file)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl TaskStore for JsonFileStore {
    async fn create(&self, user: &UserId, task: &Task) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let tasks = file.users.entry(user.as_str().to_string()).or_default();
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => existing.clone_from(task),
            None => tasks.push(task.clone()),
        }
        self.save(&file).await?;
        tracing::debug!(user = %user, task_id = %task.id, "task written to file store");
        Ok(())
    }

    async fn update(&self, user: &UserId, id: &TaskId, patch: &TaskPatch) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let task = file
            .users
            .get_mut(user.as_str())
            .and_then(|tasks| tasks.iter_mut().find(|t| t.id == *id))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        task.apply(patch);
        self.save(&file).await
    }

    async fn delete(&self, user: &UserId, id: &TaskId) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        let Some(tasks) = file.users.get_mut(user.as_str()) else {
            return Ok(());
        };
        let before = tasks.len();
        tasks.retain(|t| t.id != *id);
        if tasks.len() == before {
            return Ok(());
        }
        self.save(&file).await
    }

    async fn list_ordered_by_deadline(&self, user: &UserId) -> Result<Vec<Task>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut tasks = self
            .load()
            .await?
            .users
            .remove(user.as_str())
            .unwrap_or_default();
        order_by_deadline(&mut tasks);
        Ok(tasks)
    }
}
