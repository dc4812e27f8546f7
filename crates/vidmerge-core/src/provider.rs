use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::pipeline::progress::ProgressSink;
use crate::types::{Platform, VideoRecord};

/// Translates a keyword into candidate records for one platform.
///
/// Implementations own their paging, rate limiting and detail enrichment.
/// They should return records sorted by descending view count, report
/// non-decreasing percentages through `progress`, and prefer partial results
/// over failing when only some items could be enriched.
#[async_trait]
pub trait Provider: Send + Sync {
    fn platform(&self) -> Platform;

    async fn fetch(
        &self,
        keyword: &str,
        progress: ProgressSink,
    ) -> Result<Vec<VideoRecord>, ProviderError>;
}

/// One provider per platform.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<Platform, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut platforms: Vec<_> = self.providers.keys().collect();
        platforms.sort();
        write!(f, "ProviderRegistry({platforms:?})")
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for its platform.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.platform(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn Provider>> {
        self.providers.get(&platform).cloned()
    }
}
