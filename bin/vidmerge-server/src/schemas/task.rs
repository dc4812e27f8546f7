use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use vidmerge_core::{SearchResults, SearchTask};

/// Snapshot of a search task as returned by `GET /task/{task_id}`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: String,
    pub keyword: String,
    pub platforms: Vec<String>,
    pub image_merge: bool,
    /// `pending`, `processing`, `completed` or `failed`.
    pub status: String,
    /// Overall progress, 0 to 100.
    pub progress: u8,
    /// One entry per platform whose search failed.
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Present once the task completed: `{merged, raw}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub results: Option<SearchResults>,
    /// Present once the task failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<SearchTask> for TaskResponse {
    fn from(task: SearchTask) -> Self {
        Self {
            id: task.id.to_string(),
            keyword: task.keyword,
            platforms: task.platforms.iter().map(|p| p.to_string()).collect(),
            image_merge: task.image_merge,
            status: task.status.to_string(),
            progress: task.progress,
            errors: task.errors,
            created_at: task.created_at,
            results: task.results,
            error: task.error,
        }
    }
}
