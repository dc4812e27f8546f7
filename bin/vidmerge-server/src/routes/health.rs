//! Liveness endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::schemas::health::HealthResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(HealthResponse)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// Report liveness together with how many search tasks are in memory.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tracked_tasks: state.orchestrator.store().len().await,
        demo_mode: state.config.demo_mode,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::testing::demo_state;

    #[tokio::test]
    async fn counts_tasks_in_the_store() {
        let state = demo_state();
        let Json(before) = get_health(State(Arc::clone(&state))).await;
        assert_eq!(before.status, "ok");
        assert_eq!(before.tracked_tasks, 0);

        let params = vidmerge_core::SearchParams::new("python", &["bilibili"], false).unwrap();
        let id = state.orchestrator.submit(params).await;
        state.orchestrator.join(&id).await;

        let Json(after) = get_health(State(state)).await;
        assert_eq!(after.tracked_tasks, 1);
    }
}
