use utoipa::OpenApi;

use crate::routes::{health, platforms, search, tasks};

#[derive(OpenApi)]
#[openapi(info(
    title = "vidmerge-server",
    description = "Cross-platform video search with duplicate merging",
    version = "0.1.0"
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(search::SearchApi::openapi());
    root.merge(tasks::TasksApi::openapi());
    root.merge(platforms::PlatformsApi::openapi());
    root
}
