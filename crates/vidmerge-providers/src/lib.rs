//! Platform adapters implementing [`vidmerge_core::Provider`].

pub mod bilibili;
pub mod client;
pub mod demo;
pub mod youtube;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};
use vidmerge_core::{Platform, ProviderRegistry};

pub use bilibili::BilibiliProvider;
pub use client::build_client;
pub use demo::DemoProvider;
pub use youtube::YoutubeProvider;

/// Most records any adapter returns for one search.
pub const MAX_RESULTS: usize = 30;

/// Adapter settings, filled from server configuration.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    pub youtube_api_key: Option<String>,
    /// Pause between bilibili detail lookups.
    pub detail_delay: Duration,
    /// Serve the fixed demo catalogue instead of the live platforms.
    pub demo_mode: bool,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            detail_delay: Duration::from_millis(200),
            demo_mode: false,
        }
    }
}

/// One provider for every supported platform.
pub fn build_registry(config: &ProvidersConfig, client: Client) -> ProviderRegistry {
    if config.demo_mode {
        info!("demo mode enabled; serving the fixed catalogue");
        return Platform::ALL
            .into_iter()
            .fold(ProviderRegistry::new(), |registry, platform| {
                registry.with(Arc::new(DemoProvider::new(platform)))
            });
    }

    if config.youtube_api_key.is_none() {
        warn!("no YouTube API key configured; youtube searches will report an error");
    }
    ProviderRegistry::new()
        .with(Arc::new(
            BilibiliProvider::new(client.clone()).with_detail_delay(config.detail_delay),
        ))
        .with(Arc::new(YoutubeProvider::new(
            client,
            config.youtube_api_key.clone(),
        )))
}

#[cfg(test)]
mod test {
    use vidmerge_core::Provider;

    use super::*;

    #[test]
    fn registry_covers_every_platform() {
        for demo_mode in [false, true] {
            let config = ProvidersConfig {
                demo_mode,
                ..ProvidersConfig::default()
            };
            let registry = build_registry(&config, Client::new());
            for platform in Platform::ALL {
                let provider = registry.get(platform).unwrap();
                assert_eq!(provider.platform(), platform);
            }
        }
    }
}
