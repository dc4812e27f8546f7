//! Cross-platform search aggregation engine.
//!
//! A search task fans out to one [`Provider`] per requested platform, folds
//! their progress into a single percentage, then merges records that point at
//! the same underlying video into [`MergedGroup`]s ranked by total views.

mod error;
mod types;

pub mod merge;
pub mod pipeline;
pub mod provider;
pub mod similarity;
pub mod task;
pub mod vision;

pub use error::{CoreError, ExtractionError, ProviderError, TaskExecutionError};
pub use merge::{MergeConfig, MergeEngine};
pub use pipeline::progress::{ProgressEvent, ProgressSink, ProgressUpdate};
pub use pipeline::{FetchOutcome, FetchPipeline, PlatformFailure};
pub use provider::{Provider, ProviderRegistry};
pub use task::orchestrator::{Orchestrator, OrchestratorConfig};
pub use task::store::{TaskStore, spawn_sweeper};
pub use types::{
    MergedGroup, Platform, PlatformEntry, SearchParams, SearchResults, SearchTask, TaskId,
    TaskStatus, VideoRecord, format_views,
};
pub use vision::{FeatureExtractor, ThumbnailExtractor};
