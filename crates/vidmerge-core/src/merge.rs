//! Cross-platform duplicate merging.
//!
//! Records are partitioned per platform and ranked by views. The first
//! platform in canonical order is the anchor; every other platform is folded
//! in one at a time. Each anchor group, highest views first, takes the first
//! unconsumed candidate whose normalised title or thumbnail is close enough.
//! Matching is greedy: there is no backtracking and no global optimum.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::pipeline::PER_PLATFORM_CAP;
use crate::similarity::{cosine, jaccard, normalize_title};
use crate::types::{MergedGroup, Platform, VideoRecord};
use crate::vision::FeatureExtractor;

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Titles match when Jaccard similarity is strictly above this.
    pub title_threshold: f64,
    /// Thumbnails match when cosine similarity is strictly above this.
    pub image_threshold: f64,
    pub per_platform_cap: usize,
    pub output_cap: usize,
    /// Concurrent thumbnail downloads while preparing vectors.
    pub extract_concurrency: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            title_threshold: 0.80,
            image_threshold: 0.95,
            per_platform_cap: PER_PLATFORM_CAP,
            output_cap: 30,
            extract_concurrency: 8,
        }
    }
}

/// Stateless merge engine; holds only configuration and the extractor.
#[derive(Clone)]
pub struct MergeEngine {
    config: MergeConfig,
    extractor: Option<Arc<dyn FeatureExtractor>>,
}

impl std::fmt::Debug for MergeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeEngine")
            .field("config", &self.config)
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

impl MergeEngine {
    pub fn new(config: MergeConfig) -> Self {
        Self {
            config,
            extractor: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Merge `records` into ranked groups.
    ///
    /// With `image_merge`, missing thumbnail vectors are extracted first.
    /// Records whose extraction fails fall back to title-only matching.
    pub async fn merge(&self, records: Vec<VideoRecord>, image_merge: bool) -> Vec<MergedGroup> {
        let mut partitions = partition(records, self.config.per_platform_cap);
        if image_merge {
            self.attach_vectors(&mut partitions).await;
        }
        match_partitions(partitions, image_merge, &self.config)
    }

    async fn attach_vectors(&self, partitions: &mut BTreeMap<Platform, Vec<VideoRecord>>) {
        let Some(extractor) = self.extractor.as_deref() else {
            warn!("image merge requested without a feature extractor; matching on titles only");
            return;
        };

        let jobs: Vec<(Platform, usize, String)> = partitions
            .iter()
            .flat_map(|(platform, records)| {
                records.iter().enumerate().filter_map(move |(idx, r)| {
                    match (&r.thumbnail_vector, &r.thumbnail_url) {
                        (None, Some(url)) => Some((*platform, idx, url.clone())),
                        _ => None,
                    }
                })
            })
            .collect();
        if jobs.is_empty() {
            return;
        }
        debug!(count = jobs.len(), "extracting thumbnail vectors");

        let results: Vec<_> = stream::iter(jobs)
            .map(|(platform, idx, url)| async move {
                let result = extractor.extract(&url).await;
                (platform, idx, url, result)
            })
            .buffer_unordered(self.config.extract_concurrency.max(1))
            .collect()
            .await;

        for (platform, idx, url, result) in results {
            match result {
                Ok(vector) => {
                    if let Some(record) = partitions.get_mut(&platform).and_then(|r| r.get_mut(idx)) {
                        record.thumbnail_vector = Some(vector);
                    }
                }
                Err(e) => warn!(%platform, url = %url, error = %e, "thumbnail vector unavailable"),
            }
        }
    }
}

/// Split by platform, rank each list by descending views and cap it.
///
/// The sort is stable so equal view counts keep provider order.
pub fn partition(records: Vec<VideoRecord>, cap: usize) -> BTreeMap<Platform, Vec<VideoRecord>> {
    let mut partitions: BTreeMap<Platform, Vec<VideoRecord>> = BTreeMap::new();
    for record in records {
        partitions.entry(record.platform).or_default().push(record);
    }
    for list in partitions.values_mut() {
        list.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        list.truncate(cap);
    }
    partitions
}

/// Merge using whatever vectors the records already carry.
pub fn merge_records(
    records: Vec<VideoRecord>,
    image_merge: bool,
    config: &MergeConfig,
) -> Vec<MergedGroup> {
    match_partitions(partition(records, config.per_platform_cap), image_merge, config)
}

struct Entry {
    normalized: String,
    record: VideoRecord,
}

impl Entry {
    fn new(record: VideoRecord) -> Self {
        Self {
            normalized: normalize_title(&record.title),
            record,
        }
    }
}

fn match_partitions(
    partitions: BTreeMap<Platform, Vec<VideoRecord>>,
    image_merge: bool,
    config: &MergeConfig,
) -> Vec<MergedGroup> {
    let mut platforms = partitions.into_iter();
    let Some((anchor_platform, anchors)) = platforms.next() else {
        return Vec::new();
    };

    // Each group keeps the record that founded it for later comparisons.
    let mut groups: Vec<(MergedGroup, Entry)> = anchors
        .into_iter()
        .map(|r| (MergedGroup::singleton(&r), Entry::new(r)))
        .collect();

    let mut merged_pairs = 0usize;
    for (platform, records) in platforms {
        let candidates: Vec<Entry> = records.into_iter().map(Entry::new).collect();
        let mut consumed = vec![false; candidates.len()];

        for (group, founder) in groups.iter_mut() {
            let hit = candidates.iter().enumerate().find_map(|(idx, candidate)| {
                if consumed[idx] {
                    return None;
                }
                match_reason(founder, candidate, image_merge, config).map(|reason| (idx, reason))
            });
            if let Some((idx, reason)) = hit {
                consumed[idx] = true;
                group.absorb(&candidates[idx].record);
                merged_pairs += 1;
                debug!(
                    anchor = %anchor_platform,
                    candidate = %platform,
                    reason,
                    title = %founder.record.title,
                    "merged records"
                );
            }
        }

        for (idx, candidate) in candidates.into_iter().enumerate() {
            if !consumed[idx] {
                groups.push((MergedGroup::singleton(&candidate.record), candidate));
            }
        }
    }

    let mut merged: Vec<MergedGroup> = groups.into_iter().map(|(g, _)| g).collect();
    merged.sort_by(|a, b| b.total_views.cmp(&a.total_views));
    merged.truncate(config.output_cap);
    info!(groups = merged.len(), merged_pairs, image_merge, "merge finished");
    merged
}

fn match_reason(
    anchor: &Entry,
    candidate: &Entry,
    image_merge: bool,
    config: &MergeConfig,
) -> Option<&'static str> {
    if jaccard(&anchor.normalized, &candidate.normalized) > config.title_threshold {
        return Some("title");
    }
    if !image_merge {
        return None;
    }
    match (&anchor.record.thumbnail_vector, &candidate.record.thumbnail_vector) {
        (Some(a), Some(b)) if cosine(a, b) > config.image_threshold => Some("thumbnail"),
        _ => None,
    }
}
