use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;
use vidmerge_core::Platform;

use crate::schemas::search::PlatformsResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_platforms), components(schemas(PlatformsResponse)))]
pub struct PlatformsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/platforms", get(get_platforms))
}

/// Supported platform names, in canonical order.
#[utoipa::path(
    get,
    path = "/platforms",
    tag = "search",
    responses(
        (status = 200, description = "Supported platforms", body = PlatformsResponse)
    )
)]
pub async fn get_platforms() -> Json<PlatformsResponse> {
    Json(PlatformsResponse {
        platforms: Platform::ALL.iter().map(|p| p.to_string()).collect(),
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn lists_supported_platforms() {
        let Json(body) = get_platforms().await;
        assert_eq!(body.platforms, vec!["bilibili", "youtube"]);
    }
}
