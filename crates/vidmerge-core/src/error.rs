use std::time::Duration;

use thiserror::Error;

use crate::types::TaskId;

/// Errors surfaced to callers of the engine.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The request was malformed; no task was created.
    #[error("{0}")]
    Validation(String),

    /// The referenced task does not exist (or has been swept).
    #[error("task not found: {task_id}")]
    NotFound { task_id: TaskId },
}

/// A single platform's fetch failed. Recovered by the fetch pipeline.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The platform answered with an application-level error code.
    #[error("api error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("no provider registered")]
    Unregistered,

    #[error("provider task aborted: {0}")]
    Aborted(String),
}

/// Thumbnail download or decode failed. Recovered by the merge engine.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("thumbnail fetch failed: {0}")]
    Fetch(String),

    #[error("thumbnail decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(e: reqwest::Error) -> Self {
        ExtractionError::Fetch(e.to_string())
    }
}

impl From<image::ImageError> for ExtractionError {
    fn from(e: image::ImageError) -> Self {
        ExtractionError::Decode(e.to_string())
    }
}

/// Fatal for one task only: the task ends up `failed`.
#[derive(Debug, Error)]
pub enum TaskExecutionError {
    #[error("progress consumer stopped unexpectedly: {0}")]
    ProgressConsumer(String),
}
