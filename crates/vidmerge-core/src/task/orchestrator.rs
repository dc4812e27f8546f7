use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{CoreError, TaskExecutionError};
use crate::merge::MergeEngine;
use crate::pipeline::{AbortOnDrop, FetchPipeline};
use crate::pipeline::progress::{ProgressAggregator, ProgressEvent, ProgressUpdate};
use crate::task::store::TaskStore;
use crate::types::{SearchParams, SearchResults, SearchTask, TaskId};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Searches allowed to execute at once; the rest wait as `pending`.
    pub max_concurrent_tasks: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 8,
        }
    }
}

/// Join handles of in-flight executions, keyed by task id.
struct ExecutionHandles {
    handles: Mutex<HashMap<TaskId, JoinHandle<()>>>,
}

impl std::fmt::Debug for ExecutionHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handles.lock().map(|h| h.len()).unwrap_or(0);
        write!(f, "ExecutionHandles({count} handles)")
    }
}

impl ExecutionHandles {
    fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Track `handle`, dropping entries whose execution already finished.
    fn insert(&self, id: TaskId, handle: JoinHandle<()>) {
        if let Ok(mut map) = self.handles.lock() {
            map.retain(|_, h| !h.is_finished());
            map.insert(id, handle);
        }
    }

    fn take(&self, id: &TaskId) -> Option<JoinHandle<()>> {
        self.handles.lock().ok()?.remove(id)
    }

    /// Abort a still-running execution; finished ones only get released.
    fn abort(&self, id: &TaskId) -> bool {
        match self.take(id) {
            Some(h) if !h.is_finished() => {
                h.abort();
                true
            }
            _ => false,
        }
    }
}

/// Owns the search task lifecycle: `pending → processing → completed | failed`.
///
/// Every submitted search runs as its own tokio task, gated by a semaphore
/// so at most `max_concurrent_tasks` execute at once. Tasks share nothing
/// except the [`TaskStore`].
#[derive(Clone, Debug)]
pub struct Orchestrator {
    store: TaskStore,
    pipeline: Arc<FetchPipeline>,
    engine: Arc<MergeEngine>,
    permits: Arc<Semaphore>,
    handles: Arc<ExecutionHandles>,
}

impl Orchestrator {
    pub fn new(
        store: TaskStore,
        pipeline: FetchPipeline,
        engine: MergeEngine,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            pipeline: Arc::new(pipeline),
            engine: Arc::new(engine),
            permits: Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1))),
            handles: Arc::new(ExecutionHandles::new()),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// Create a pending task and schedule it; returns without waiting.
    pub async fn submit(&self, params: SearchParams) -> TaskId {
        let now = Utc::now();
        let id = TaskId::generate(now);
        self.store
            .insert(SearchTask::new(id.clone(), &params, now))
            .await;

        info!(
            task_id = %id,
            keyword = %params.keyword,
            platforms = ?params.platforms,
            image_merge = params.image_merge,
            "search task submitted"
        );

        let this = self.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move { this.execute(task_id, params).await });
        self.handles.insert(id.clone(), handle);
        id
    }

    /// Snapshot of a task.
    pub async fn get(&self, id: &TaskId) -> Result<SearchTask, CoreError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| CoreError::NotFound {
                task_id: id.clone(),
            })
    }

    /// Wait for a task's execution to finish.
    ///
    /// Returns `false` if no execution is tracked for `id` (already joined,
    /// pruned after finishing, or never submitted).
    pub async fn join(&self, id: &TaskId) -> bool {
        match self.handles.take(id) {
            Some(handle) => {
                if let Err(e) = handle.await {
                    warn!(task_id = %id, error = %e, "execution handle failed");
                }
                true
            }
            None => false,
        }
    }

    /// Abort a running execution. Not exposed over HTTP.
    pub async fn abort(&self, id: &TaskId) -> bool {
        let aborted = self.handles.abort(id);
        if aborted {
            self.store.fail(id, "search cancelled").await;
            info!(task_id = %id, "search task aborted");
        }
        aborted
    }

    async fn execute(&self, id: TaskId, params: SearchParams) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                self.store.fail(&id, "execution pool closed").await;
                return;
            }
        };

        if !self.store.begin(&id).await {
            warn!(task_id = %id, "task vanished or already started; skipping");
            return;
        }

        match AssertUnwindSafe(self.run(&id, &params)).catch_unwind().await {
            Ok(Ok(results)) => {
                let groups = results.merged.len();
                self.store.complete(&id, results).await;
                info!(task_id = %id, groups, "search task completed");
            }
            Ok(Err(e)) => {
                error!(task_id = %id, error = %e, "search task failed");
                self.store.fail(&id, e.to_string()).await;
            }
            Err(_) => {
                error!(task_id = %id, "search task panicked");
                self.store
                    .fail(&id, "internal error while processing the search")
                    .await;
            }
        }
    }

    async fn run(
        &self,
        id: &TaskId,
        params: &SearchParams,
    ) -> Result<SearchResults, TaskExecutionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(
            ProgressAggregator::new(id.clone(), &params.platforms).run(self.store.clone(), rx),
        );
        let mut guard = AbortOnDrop::default();
        guard.track(&consumer);

        let outcome = self
            .pipeline
            .run(id, &params.keyword, &params.platforms, &tx)
            .await;
        info!(
            task_id = %id,
            records = outcome.records.len(),
            failures = outcome.failures.len(),
            "fetch phase finished"
        );

        let _ = tx.send(ProgressUpdate {
            task_id: id.clone(),
            event: ProgressEvent::MergeStarted,
        });
        let merged = self
            .engine
            .merge(outcome.records.clone(), params.image_merge)
            .await;

        let _ = tx.send(ProgressUpdate {
            task_id: id.clone(),
            event: ProgressEvent::Finished,
        });
        drop(tx);
        consumer
            .await
            .map_err(|e| TaskExecutionError::ProgressConsumer(e.to_string()))?;
        drop(guard);

        Ok(SearchResults {
            merged,
            raw: outcome.records,
        })
    }
}
