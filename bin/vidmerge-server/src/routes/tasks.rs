//! Task polling.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;
use vidmerge_core::TaskId;

use crate::error::ServerError;
use crate::schemas::task::TaskResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_task), components(schemas(TaskResponse)))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/task/{task_id}", get(get_task))
}

#[utoipa::path(
    get,
    path = "/task/{task_id}",
    tag = "tasks",
    params(
        ("task_id" = String, Path, description = "ID returned by POST /search")
    ),
    responses(
        (status = 200, description = "Task snapshot", body = TaskResponse),
        (status = 404, description = "Task not found or expired"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskResponse>, ServerError> {
    let task = state.orchestrator.get(&TaskId::from(task_id)).await?;
    Ok(Json(task.into()))
}
