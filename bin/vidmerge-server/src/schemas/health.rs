use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Tasks currently held by the store, any status.
    pub tracked_tasks: usize,
    /// `true` when searches are served from the fixed demo catalogue.
    pub demo_mode: bool,
}
