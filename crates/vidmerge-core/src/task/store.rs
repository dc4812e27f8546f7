use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::pipeline::progress::COMPLETE;
use crate::types::{SearchResults, SearchTask, TaskId, TaskStatus};

/// Process-wide task registry.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so many readers can poll task state
/// concurrently while the execution routine and its progress consumer write.
/// The expiry sweep goes through the same lock, so it never interleaves with
/// a read of the task it removes.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<TaskId, SearchTask>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, task: SearchTask) {
        self.inner.write().await.insert(task.id.clone(), task);
    }

    /// Snapshot of a task.
    pub async fn get(&self, id: &TaskId) -> Option<SearchTask> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Move a pending task to processing with fresh progress and errors.
    ///
    /// Returns `false` if the task is gone or was not pending.
    pub async fn begin(&self, id: &TaskId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(task) if task.status == TaskStatus::Pending => {
                task.status = TaskStatus::Processing;
                task.progress = 0;
                task.errors.clear();
                true
            }
            _ => false,
        }
    }

    /// Raise progress of a processing task; lower values are ignored.
    ///
    /// Returns whether the task is still processing.
    pub async fn set_progress(&self, id: &TaskId, progress: u8) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(task) if task.status == TaskStatus::Processing => {
                task.progress = task.progress.max(progress.min(COMPLETE));
                true
            }
            _ => false,
        }
    }

    /// Append a platform warning to a processing task.
    ///
    /// Returns whether the task is still processing.
    pub async fn push_error(&self, id: &TaskId, message: String) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(task) if task.status == TaskStatus::Processing => {
                task.errors.push(message);
                true
            }
            _ => false,
        }
    }

    /// Store results and mark the task completed at 100%.
    pub async fn complete(&self, id: &TaskId, results: SearchResults) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.results = Some(results);
                task.progress = COMPLETE;
                task.status = TaskStatus::Completed;
                true
            }
            _ => false,
        }
    }

    /// Mark the task failed with a caller-safe message.
    pub async fn fail(&self, id: &TaskId, message: impl Into<String>) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(id) {
            Some(task) if !task.status.is_terminal() => {
                task.status = TaskStatus::Failed;
                task.error = Some(message.into());
                true
            }
            _ => false,
        }
    }

    /// Drop every task older than `retention`, whatever its status.
    pub async fn sweep_expired(&self, retention: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(retention) {
            Ok(d) => Utc::now() - d,
            Err(_) => return 0,
        };
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, task| task.created_at > cutoff);
        before - guard.len()
    }
}

/// Periodically remove expired tasks until the returned handle is aborted.
pub fn spawn_sweeper(store: TaskStore, interval: Duration, retention: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired(retention).await;
            if removed > 0 {
                info!(removed, "expired tasks swept");
            } else {
                debug!("sweep found no expired tasks");
            }
        }
    })
}
