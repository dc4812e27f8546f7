//! Search submission.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;
use vidmerge_core::SearchParams;

use crate::error::ServerError;
use crate::schemas::search::{SearchAccepted, SearchRequest};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(submit_search), components(schemas(SearchRequest, SearchAccepted)))]
pub struct SearchApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/search", post(submit_search))
}

/// Start a search task.
///
/// The request is validated before a task exists: an empty keyword or an
/// unknown platform is rejected with 400 and nothing is stored.
#[utoipa::path(
    post,
    path = "/search",
    tag = "search",
    request_body = SearchRequest,
    responses(
        (status = 202, description = "Task accepted", body = SearchAccepted),
        (status = 400, description = "Empty keyword or unsupported platform"),
    )
)]
pub async fn submit_search(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SearchAccepted>), ServerError> {
    let Json(req) = body.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let platforms = req.platforms.unwrap_or_default();
    let params = SearchParams::new(&req.keyword, &platforms, req.image_merge)?;

    let task_id = state.orchestrator.submit(params).await;
    info!(task_id = %task_id, "search accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SearchAccepted {
            task_id: task_id.to_string(),
            message: "search task started".to_owned(),
        }),
    ))
}
