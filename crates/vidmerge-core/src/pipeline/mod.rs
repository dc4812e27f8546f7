//! Concurrent multi-platform fetch.
//!
//! Every requested platform runs in its own tokio task. A failing, timing
//! out or panicking provider is contained: it becomes one error entry on the
//! task and contributes no records, while its siblings carry on.

pub mod progress;

use std::fmt;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::provider::ProviderRegistry;
use crate::types::{Platform, TaskId, VideoRecord};
use progress::{ProgressEvent, ProgressSink, ProgressTx, ProgressUpdate};

/// Maximum records kept per platform.
pub const PER_PLATFORM_CAP: usize = 30;

/// A platform whose fetch did not produce results.
#[derive(Debug, Clone, PartialEq)]
pub struct PlatformFailure {
    pub platform: Platform,
    pub reason: String,
}

impl fmt::Display for PlatformFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} search failed: {}", self.platform, self.reason)
    }
}

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successful platforms' records, in request order.
    pub records: Vec<VideoRecord>,
    pub failures: Vec<PlatformFailure>,
}

#[derive(Debug, Clone)]
pub struct FetchPipeline {
    providers: ProviderRegistry,
    per_platform_cap: usize,
    fetch_timeout: Option<Duration>,
}

impl FetchPipeline {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers,
            per_platform_cap: PER_PLATFORM_CAP,
            fetch_timeout: None,
        }
    }

    /// Abort a single platform fetch after `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Fetch `keyword` from every platform in `platforms` concurrently.
    ///
    /// Progress and failures are pushed into `events` as they happen.
    pub async fn run(
        &self,
        task_id: &TaskId,
        keyword: &str,
        platforms: &[Platform],
        events: &ProgressTx,
    ) -> FetchOutcome {
        let mut guard = AbortOnDrop::default();
        let mut handles = Vec::with_capacity(platforms.len());
        for &platform in platforms {
            let provider = self.providers.get(platform);
            let sink = ProgressSink::new(events.clone(), task_id.clone(), platform);
            let keyword = keyword.to_owned();
            let timeout = self.fetch_timeout;
            let handle = tokio::spawn(async move {
                let Some(provider) = provider else {
                    return Err(ProviderError::Unregistered);
                };
                let fetch = provider.fetch(&keyword, sink);
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, fetch)
                        .await
                        .map_err(|_| ProviderError::Timeout(limit))?,
                    None => fetch.await,
                }
            });
            guard.track(&handle);
            handles.push(async move { (platform, handle.await) });
        }

        let mut outcome = FetchOutcome::default();
        for (platform, joined) in join_all(handles).await {
            let result = joined.unwrap_or_else(|e| Err(ProviderError::Aborted(e.to_string())));
            match result {
                Ok(mut records) => {
                    let fetched = records.len();
                    records.retain(|r| r.platform == platform);
                    records.truncate(self.per_platform_cap);
                    info!(
                        task_id = %task_id,
                        %platform,
                        fetched,
                        kept = records.len(),
                        "platform search finished"
                    );
                    send(events, task_id, ProgressEvent::Fetch { platform, percent: 100 });
                    outcome.records.extend(records);
                }
                Err(e) => {
                    let failure = PlatformFailure {
                        platform,
                        reason: e.to_string(),
                    };
                    warn!(task_id = %task_id, %platform, error = %e, "platform search failed");
                    send(
                        events,
                        task_id,
                        ProgressEvent::ProviderFailed {
                            platform,
                            message: failure.to_string(),
                        },
                    );
                    outcome.failures.push(failure);
                }
            }
        }
        outcome
    }
}

/// Aborts every tracked task when dropped.
///
/// Spawned children otherwise outlive a cancelled parent future.
#[derive(Debug, Default)]
pub(crate) struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    pub(crate) fn track<T>(&mut self, handle: &JoinHandle<T>) {
        self.0.push(handle.abort_handle());
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

fn send(events: &ProgressTx, task_id: &TaskId, event: ProgressEvent) {
    let _ = events.send(ProgressUpdate {
        task_id: task_id.clone(),
        event,
    });
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tracing_test::traced_test;

    use super::*;
    use crate::provider::Provider;

    struct Fixed {
        platform: Platform,
        count: usize,
    }

    #[async_trait]
    impl Provider for Fixed {
        fn platform(&self) -> Platform {
            self.platform
        }

        async fn fetch(
            &self,
            _keyword: &str,
            progress: ProgressSink,
        ) -> Result<Vec<VideoRecord>, ProviderError> {
            progress.report(50);
            Ok((0..self.count)
                .map(|i| {
                    let views = (self.count - i) as u64 * 10;
                    VideoRecord::new(self.platform, format!("video {i}"), format!("u{i}"), i.to_string(), views)
                })
                .collect())
        }
    }

    struct Failing;

    #[async_trait]
    impl Provider for Failing {
        fn platform(&self) -> Platform {
            Platform::Youtube
        }

        async fn fetch(&self, _: &str, _: ProgressSink) -> Result<Vec<VideoRecord>, ProviderError> {
            Err(ProviderError::Api {
                code: 403,
                message: "quota exceeded".into(),
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl Provider for Panicking {
        fn platform(&self) -> Platform {
            Platform::Youtube
        }

        async fn fetch(&self, _: &str, _: ProgressSink) -> Result<Vec<VideoRecord>, ProviderError> {
            panic!("provider bug");
        }
    }

    struct Slow;

    #[async_trait]
    impl Provider for Slow {
        fn platform(&self) -> Platform {
            Platform::Youtube
        }

        async fn fetch(&self, _: &str, _: ProgressSink) -> Result<Vec<VideoRecord>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ProgressUpdate>) -> Vec<ProgressEvent> {
        std::iter::from_fn(|| rx.try_recv().ok()).map(|u| u.event).collect()
    }

    #[tokio::test]
    async fn caps_each_platform_without_reordering() {
        let registry = ProviderRegistry::new().with(Arc::new(Fixed {
            platform: Platform::Bilibili,
            count: 45,
        }));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = FetchPipeline::new(registry)
            .run(&TaskId::from("t"), "kw", &[Platform::Bilibili], &tx)
            .await;

        assert_eq!(outcome.records.len(), PER_PLATFORM_CAP);
        assert_eq!(outcome.records[0].title, "video 0");
        assert_eq!(outcome.records[29].title, "video 29");
        assert!(outcome.failures.is_empty());

        let events = drain(&mut rx);
        assert!(events.contains(&ProgressEvent::Fetch {
            platform: Platform::Bilibili,
            percent: 100
        }));
    }

    #[tokio::test]
    #[traced_test]
    async fn failure_is_contained_to_its_platform() {
        let registry = ProviderRegistry::new()
            .with(Arc::new(Fixed {
                platform: Platform::Bilibili,
                count: 3,
            }))
            .with(Arc::new(Failing));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = FetchPipeline::new(registry)
            .run(
                &TaskId::from("t"),
                "kw",
                &[Platform::Bilibili, Platform::Youtube],
                &tx,
            )
            .await;

        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].to_string(),
            "youtube search failed: api error 403: quota exceeded"
        );
        let failures = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, ProgressEvent::ProviderFailed { .. }))
            .count();
        assert_eq!(failures, 1);
        assert!(logs_contain("platform search failed"));
    }

    #[tokio::test]
    async fn panic_becomes_failure() {
        let registry = ProviderRegistry::new().with(Arc::new(Panicking));
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = FetchPipeline::new(registry)
            .run(&TaskId::from("t"), "kw", &[Platform::Youtube], &tx)
            .await;
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.failures.len(), 1);
    }

    #[tokio::test]
    async fn missing_provider_becomes_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = FetchPipeline::new(ProviderRegistry::new())
            .run(&TaskId::from("t"), "kw", &[Platform::Bilibili], &tx)
            .await;
        assert_eq!(
            outcome.failures[0].to_string(),
            "bilibili search failed: no provider registered"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_failure() {
        let registry = ProviderRegistry::new().with(Arc::new(Slow));
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = FetchPipeline::new(registry)
            .with_fetch_timeout(Some(Duration::from_secs(5)))
            .run(&TaskId::from("t"), "kw", &[Platform::Youtube], &tx)
            .await;
        assert!(outcome.records.is_empty());
        assert!(outcome.failures[0].reason.contains("timed out"));
    }
}
