//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use vidmerge_core::Orchestrator;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Owns the task store and runs submitted searches.
    pub orchestrator: Orchestrator,
}

#[cfg(test)]
pub mod testing {
    use std::sync::Arc;

    use vidmerge_core::{
        FetchPipeline, MergeEngine, Orchestrator, Platform, ProviderRegistry, TaskStore,
    };
    use vidmerge_providers::DemoProvider;

    use super::AppState;
    use crate::config::Config;

    /// State backed by the demo catalogue.
    pub fn demo_state() -> Arc<AppState> {
        let config = Config::default();
        let registry = Platform::ALL
            .into_iter()
            .fold(ProviderRegistry::new(), |r, p| r.with(Arc::new(DemoProvider::new(p))));
        let orchestrator = Orchestrator::new(
            TaskStore::new(),
            FetchPipeline::new(registry),
            MergeEngine::new(config.merge_config()),
            config.orchestrator_config(),
        );
        Arc::new(AppState {
            config: Arc::new(config),
            orchestrator,
        })
    }
}
