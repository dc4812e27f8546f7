//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - middleware layers (CORS, per-request trace id)
//! - search submission, task polling and platform listing
//! - health route and, unless disabled, the OpenAPI document
//! - a 404 fallback that answers API-looking requests with JSON

pub mod doc;
mod health;
mod platforms;
mod search;
mod tasks;

use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::json;

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(search::router())
        .merge(tasks::router())
        .merge(platforms::router());

    if state.config.enable_openapi {
        let api_doc = doc::get_docs();
        app = app.route(
            "/api-docs/openapi.json",
            get(move || {
                let api_doc = api_doc.clone();
                async move { Json(api_doc) }
            }),
        );
    }

    app.fallback(not_found)
        .layer(cors::cors_layer(&state.config))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

fn is_api_request(path: &str, headers: &HeaderMap) -> bool {
    path.starts_with("/task/")
        || path.starts_with("/api/")
        || path.starts_with("/platforms")
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("application/json"))
}

async fn not_found(uri: Uri, headers: HeaderMap) -> Response {
    if is_api_request(uri.path(), &headers) {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "resource not found" })),
        )
            .into_response()
    } else {
        (StatusCode::NOT_FOUND, "Not Found").into_response()
    }
}
