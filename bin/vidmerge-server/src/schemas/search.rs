use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Search keyword; surrounding whitespace is ignored.
    #[serde(default)]
    pub keyword: String,
    /// Platforms to search; empty or absent means `["bilibili"]`.
    #[serde(default)]
    pub platforms: Option<Vec<String>>,
    /// Also merge records whose thumbnails look alike.
    #[serde(default)]
    pub image_merge: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SearchAccepted {
    pub task_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlatformsResponse {
    pub platforms: Vec<String>,
}
