//! Per-task progress aggregation.
//!
//! Fetch operations and the orchestrator push [`ProgressUpdate`]s into one
//! unbounded channel per task. A single [`ProgressAggregator`] drains it and
//! is the only writer of the task's `progress` and `errors` while the task is
//! processing, so concurrent providers never race on those fields.
//!
//! The overall scale is split into bands: the fetch phase owns `[0, 90)`,
//! divided evenly across the requested platforms; merge start pins 90 and
//! completion (written by the store) pins 100.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::task::store::TaskStore;
use crate::types::{Platform, TaskId};

/// Share of the overall scale owned by the fetch phase.
pub const FETCH_SPAN: f64 = 90.0;
/// Overall progress once merging starts.
pub const MERGE_START: u8 = 90;
/// Overall progress of a completed task.
pub const COMPLETE: u8 = 100;

pub type ProgressTx = mpsc::UnboundedSender<ProgressUpdate>;
pub type ProgressRx = mpsc::UnboundedReceiver<ProgressUpdate>;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub task_id: TaskId,
    pub event: ProgressEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A platform fetch reports its own completion percentage.
    Fetch { platform: Platform, percent: u8 },
    /// A platform fetch failed; `message` is recorded verbatim.
    ProviderFailed { platform: Platform, message: String },
    MergeStarted,
    /// Terminal sentinel: the consumer stops after this.
    Finished,
}

/// Handed to a provider so it can report progress for its own platform.
///
/// Values above 100 are clamped and values lower than the last report are
/// dropped, so a misbehaving provider cannot move its band backwards.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: Option<ProgressTx>,
    task_id: TaskId,
    platform: Platform,
    last: Arc<AtomicU8>,
}

impl ProgressSink {
    pub fn new(tx: ProgressTx, task_id: TaskId, platform: Platform) -> Self {
        Self {
            tx: Some(tx),
            task_id,
            platform,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    /// A sink that discards everything.
    pub fn noop(platform: Platform) -> Self {
        Self {
            tx: None,
            task_id: TaskId::from("noop"),
            platform,
            last: Arc::new(AtomicU8::new(0)),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        let previous = self.last.fetch_max(percent, Ordering::Relaxed);
        if percent < previous {
            return;
        }
        if let Some(tx) = &self.tx {
            // The consumer may already be gone once the task left processing.
            let _ = tx.send(ProgressUpdate {
                task_id: self.task_id.clone(),
                event: ProgressEvent::Fetch {
                    platform: self.platform,
                    percent,
                },
            });
        }
    }

    /// Report a fraction `done / total` scaled into `[from, to]`.
    pub fn report_fraction(&self, from: u8, to: u8, done: usize, total: usize) {
        if total == 0 {
            self.report(to);
            return;
        }
        let span = to.saturating_sub(from) as usize;
        let step = (span * done.min(total)) / total;
        self.report(from.saturating_add(step as u8));
    }
}

/// Folds per-source percentages into one monotonic overall percentage.
#[derive(Debug)]
pub struct ProgressAggregator {
    task_id: TaskId,
    /// Width of each platform's band.
    bands: HashMap<Platform, f64>,
    latest: HashMap<Platform, u8>,
    current: u8,
    merging: bool,
}

impl ProgressAggregator {
    pub fn new(task_id: TaskId, platforms: &[Platform]) -> Self {
        let width = if platforms.is_empty() {
            0.0
        } else {
            FETCH_SPAN / platforms.len() as f64
        };
        Self {
            task_id,
            bands: platforms.iter().map(|p| (*p, width)).collect(),
            latest: HashMap::new(),
            current: 0,
            merging: false,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Apply one event; returns the new overall value if it moved forward.
    pub fn apply(&mut self, event: &ProgressEvent) -> Option<u8> {
        let candidate = match event {
            ProgressEvent::Fetch { platform, percent } => {
                if !self.bands.contains_key(platform) {
                    warn!(task_id = %self.task_id, %platform, "progress from unrequested platform");
                    return None;
                }
                let slot = self.latest.entry(*platform).or_insert(0);
                *slot = (*slot).max((*percent).min(100));
                self.fetch_total()
            }
            ProgressEvent::MergeStarted => {
                self.merging = true;
                MERGE_START
            }
            ProgressEvent::ProviderFailed { .. } | ProgressEvent::Finished => return None,
        };
        let candidate = if self.merging {
            candidate.max(MERGE_START)
        } else {
            candidate
        };
        if candidate > self.current {
            self.current = candidate.min(COMPLETE);
            Some(self.current)
        } else {
            None
        }
    }

    fn fetch_total(&self) -> u8 {
        let sum: f64 = self
            .latest
            .iter()
            .map(|(platform, pct)| self.bands[platform] * (*pct as f64) / 100.0)
            .sum();
        sum.floor().clamp(0.0, COMPLETE as f64) as u8
    }

    /// Drain `rx` into `store` until the sentinel arrives, the channel
    /// closes, or the task is no longer processing.
    pub async fn run(mut self, store: TaskStore, mut rx: ProgressRx) {
        while let Some(update) = rx.recv().await {
            if update.task_id != self.task_id {
                warn!(
                    task_id = %self.task_id,
                    foreign = %update.task_id,
                    "ignoring progress for another task"
                );
                continue;
            }

            let still_processing = match &update.event {
                ProgressEvent::Finished => break,
                ProgressEvent::ProviderFailed { message, .. } => {
                    store.push_error(&self.task_id, message.clone()).await
                }
                event => match self.apply(event) {
                    Some(overall) => {
                        debug!(task_id = %self.task_id, progress = overall, "progress");
                        store.set_progress(&self.task_id, overall).await
                    }
                    None => true,
                },
            };

            if !still_processing {
                debug!(task_id = %self.task_id, "task left processing; progress consumer stopping");
                break;
            }
        }
    }
}
