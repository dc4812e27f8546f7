//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use vidmerge_core::{MergeConfig, OrchestratorConfig};
use vidmerge_providers::ProvidersConfig;

/// Runtime configuration for vidmerge-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_openapi: bool,

    pub youtube_api_key: Option<String>,

    /// Proxy for every outbound request.
    pub http_proxy: Option<String>,

    /// Serve the fixed demo catalogue instead of live platforms.
    pub demo_mode: bool,

    /// Searches executing at once; later ones wait as `pending`.
    pub max_concurrent_tasks: usize,

    /// Tasks older than this are deleted regardless of status.
    pub task_retention: Duration,

    pub sweep_interval: Duration,

    /// Per-platform fetch limit; `None` waits for the provider.
    pub fetch_timeout: Option<Duration>,

    /// Pause between bilibili detail lookups.
    pub detail_delay: Duration,

    pub title_threshold: f64,
    pub image_threshold: f64,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = MergeConfig::default();
        Self {
            bind_address: env_or(&lookup, "VIDMERGE_BIND", "0.0.0.0:5000"),
            log_level: non_empty(&lookup, "VIDMERGE_LOG")
                .or_else(|| non_empty(&lookup, "RUST_LOG"))
                .unwrap_or_else(|| "info".to_owned()),
            log_json: parse_bool(&lookup, "VIDMERGE_LOG_JSON", false),
            cors_allowed_origins: non_empty(&lookup, "VIDMERGE_CORS_ORIGINS"),
            enable_openapi: parse_bool(&lookup, "VIDMERGE_ENABLE_OPENAPI", true),
            youtube_api_key: non_empty(&lookup, "VIDMERGE_YOUTUBE_API_KEY"),
            http_proxy: non_empty(&lookup, "VIDMERGE_HTTP_PROXY"),
            demo_mode: parse_bool(&lookup, "VIDMERGE_DEMO_MODE", false),
            max_concurrent_tasks: parse_env(&lookup, "VIDMERGE_MAX_CONCURRENT_TASKS", 8usize).max(1),
            task_retention: Duration::from_secs(parse_env(&lookup, "VIDMERGE_TASK_RETENTION_SECS", 1800)),
            sweep_interval: Duration::from_secs(
                parse_env(&lookup, "VIDMERGE_SWEEP_INTERVAL_SECS", 60u64).max(1),
            ),
            fetch_timeout: lookup("VIDMERGE_FETCH_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            detail_delay: Duration::from_millis(parse_env(&lookup, "VIDMERGE_DETAIL_DELAY_MS", 200)),
            title_threshold: parse_env(&lookup, "VIDMERGE_TITLE_THRESHOLD", defaults.title_threshold),
            image_threshold: parse_env(&lookup, "VIDMERGE_IMAGE_THRESHOLD", defaults.image_threshold),
        }
    }

    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            title_threshold: self.title_threshold,
            image_threshold: self.image_threshold,
            ..MergeConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrent_tasks: self.max_concurrent_tasks,
        }
    }

    pub fn providers_config(&self) -> ProvidersConfig {
        ProvidersConfig {
            youtube_api_key: self.youtube_api_key.clone(),
            detail_delay: self.detail_delay,
            demo_mode: self.demo_mode,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_owned())
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_address, "0.0.0.0:5000");
        assert_eq!(cfg.max_concurrent_tasks, 8);
        assert_eq!(cfg.task_retention, Duration::from_secs(1800));
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.detail_delay, Duration::from_millis(200));
        assert_eq!(cfg.fetch_timeout, None);
        assert!(cfg.enable_openapi);
        assert!(!cfg.demo_mode);
        assert!(cfg.youtube_api_key.is_none());
        assert_eq!(cfg.title_threshold, 0.80);
        assert_eq!(cfg.image_threshold, 0.95);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = from_pairs(&[
            ("VIDMERGE_BIND", "127.0.0.1:8080"),
            ("VIDMERGE_DEMO_MODE", "TRUE"),
            ("VIDMERGE_MAX_CONCURRENT_TASKS", "2"),
            ("VIDMERGE_FETCH_TIMEOUT_SECS", "15"),
            ("VIDMERGE_YOUTUBE_API_KEY", "abc"),
            ("VIDMERGE_TITLE_THRESHOLD", "0.7"),
        ]);
        assert_eq!(cfg.bind_address, "127.0.0.1:8080");
        assert!(cfg.demo_mode);
        assert_eq!(cfg.orchestrator_config().max_concurrent_tasks, 2);
        assert_eq!(cfg.fetch_timeout, Some(Duration::from_secs(15)));
        assert_eq!(cfg.providers_config().youtube_api_key.as_deref(), Some("abc"));
        assert_eq!(cfg.merge_config().title_threshold, 0.7);
        assert_eq!(cfg.merge_config().output_cap, 30);
    }

    #[test]
    fn invalid_values_fall_back() {
        let cfg = from_pairs(&[
            ("VIDMERGE_MAX_CONCURRENT_TASKS", "0"),
            ("VIDMERGE_FETCH_TIMEOUT_SECS", "soon"),
            ("VIDMERGE_TASK_RETENTION_SECS", "-1"),
            ("VIDMERGE_YOUTUBE_API_KEY", "  "),
        ]);
        assert_eq!(cfg.max_concurrent_tasks, 1);
        assert_eq!(cfg.fetch_timeout, None);
        assert_eq!(cfg.task_retention, Duration::from_secs(1800));
        assert!(cfg.youtube_api_key.is_none());
    }
}
