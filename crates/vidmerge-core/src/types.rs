use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;

/// A content platform with its own item namespace.
///
/// Declaration order is the canonical order: the first platform present in a
/// merge acts as the anchor.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Platform {
    Bilibili,
    Youtube,
}

impl Platform {
    /// Every supported platform in canonical order.
    pub const ALL: [Platform; 2] = [Platform::Bilibili, Platform::Youtube];

    /// Platform used when a request names none.
    pub const DEFAULT: Platform = Platform::Bilibili;
}

/// One candidate video returned by one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub platform: Platform,
    pub title: String,
    pub url: String,
    pub item_id: String,
    pub view_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Derived feature vector; only populated when visual matching is on.
    #[serde(skip)]
    pub thumbnail_vector: Option<Vec<f32>>,
}

impl VideoRecord {
    pub fn new(
        platform: Platform,
        title: impl Into<String>,
        url: impl Into<String>,
        item_id: impl Into<String>,
        view_count: u64,
    ) -> Self {
        Self {
            platform,
            title: title.into(),
            url: url.into(),
            item_id: item_id.into(),
            view_count,
            thumbnail_url: None,
            thumbnail_vector: None,
        }
    }

    pub fn with_thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(url.into());
        self
    }
}

/// One platform's contribution to a [`MergedGroup`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformEntry {
    pub url: String,
    pub views: u64,
    pub formatted_views: String,
}

impl PlatformEntry {
    fn from_record(record: &VideoRecord) -> Self {
        Self {
            url: record.url.clone(),
            views: record.view_count,
            formatted_views: format_views(record.view_count),
        }
    }
}

/// One output row: the same video as seen on one or more platforms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedGroup {
    pub title: String,
    pub primary_platform: Platform,
    pub primary_url: String,
    pub total_views: u64,
    pub formatted_total: String,
    pub members: BTreeMap<Platform, PlatformEntry>,
}

impl MergedGroup {
    /// A group holding a single record.
    pub fn singleton(record: &VideoRecord) -> Self {
        let mut members = BTreeMap::new();
        members.insert(record.platform, PlatformEntry::from_record(record));
        Self {
            title: record.title.clone(),
            primary_platform: record.platform,
            primary_url: record.url.clone(),
            total_views: record.view_count,
            formatted_total: format_views(record.view_count),
            members,
        }
    }

    /// Folds `record` into the group.
    ///
    /// The primary platform moves to `record` only when it strictly beats the
    /// current primary member's view count. The title never changes.
    pub fn absorb(&mut self, record: &VideoRecord) {
        let primary_views = self
            .members
            .get(&self.primary_platform)
            .map(|m| m.views)
            .unwrap_or(0);
        if record.view_count > primary_views {
            self.primary_platform = record.platform;
            self.primary_url = record.url.clone();
        }
        if let Some(previous) = self
            .members
            .insert(record.platform, PlatformEntry::from_record(record))
        {
            self.total_views -= previous.views;
        }
        self.total_views += record.view_count;
        self.formatted_total = format_views(self.total_views);
    }
}

/// Everything a completed task hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub merged: Vec<MergedGroup>,
    pub raw: Vec<VideoRecord>,
}

/// Task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

static TASK_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque task identifier, `task_<unix-millis>_<sequence>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let seq = TASK_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("task_{}_{seq}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchParams {
    pub keyword: String,
    pub platforms: Vec<Platform>,
    pub image_merge: bool,
}

impl SearchParams {
    /// Validate raw request fields.
    ///
    /// The keyword is trimmed and must be non-empty. Every platform name must
    /// be supported; an empty list falls back to [`Platform::DEFAULT`].
    /// Duplicate names collapse onto their first occurrence.
    pub fn new<S: AsRef<str>>(
        keyword: &str,
        platforms: &[S],
        image_merge: bool,
    ) -> Result<Self, CoreError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(CoreError::Validation("keyword must not be empty".into()));
        }

        let mut parsed = Vec::with_capacity(platforms.len());
        let mut unsupported = Vec::new();
        for name in platforms {
            match Platform::from_str(name.as_ref()) {
                Ok(p) if !parsed.contains(&p) => parsed.push(p),
                Ok(_) => {}
                Err(_) => unsupported.push(name.as_ref().to_owned()),
            }
        }
        if !unsupported.is_empty() {
            return Err(CoreError::Validation(format!(
                "unsupported platforms: {}",
                unsupported.join(", ")
            )));
        }
        if parsed.is_empty() {
            parsed.push(Platform::DEFAULT);
        }

        Ok(Self {
            keyword: keyword.to_owned(),
            platforms: parsed,
            image_merge,
        })
    }
}

/// Snapshot of one search task as held by the [`TaskStore`].
///
/// [`TaskStore`]: crate::task::store::TaskStore
#[derive(Debug, Clone, Serialize)]
pub struct SearchTask {
    pub id: TaskId,
    pub keyword: String,
    pub platforms: Vec<Platform>,
    pub image_merge: bool,
    pub status: TaskStatus,
    pub progress: u8,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SearchResults>,
    /// Failure message; set only when `status == Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SearchTask {
    pub fn new(id: TaskId, params: &SearchParams, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            keyword: params.keyword.clone(),
            platforms: params.platforms.clone(),
            image_merge: params.image_merge,
            status: TaskStatus::Pending,
            progress: 0,
            errors: Vec::new(),
            results: None,
            error: None,
            created_at,
        }
    }
}

/// Human-friendly view count: `12.3万` from ten thousand up.
pub fn format_views(views: u64) -> String {
    if views >= 10_000 {
        format!("{:.1}万", views as f64 / 10_000.0)
    } else {
        views.to_string()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_round_trips_through_strings() {
        assert_eq!(Platform::from_str("bilibili").unwrap(), Platform::Bilibili);
        assert_eq!(Platform::Youtube.to_string(), "youtube");
        assert!(Platform::from_str("tiktok").is_err());
        assert_eq!(
            serde_json::to_string(&Platform::Youtube).unwrap(),
            "\"youtube\""
        );
    }

    #[test]
    fn params_default_to_bilibili() {
        let params = SearchParams::new("python", &[] as &[&str], false).unwrap();
        assert_eq!(params.platforms, vec![Platform::Bilibili]);
    }

    #[test]
    fn params_reject_empty_keyword() {
        let err = SearchParams::new("   ", &["bilibili"], false).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn params_reject_unsupported_platform() {
        let err = SearchParams::new("python", &["youtube", "tiktok"], false).unwrap_err();
        match err {
            CoreError::Validation(msg) => assert!(msg.contains("tiktok")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn params_trim_and_dedupe() {
        let params =
            SearchParams::new("  rust  ", &["youtube", "bilibili", "youtube"], true).unwrap();
        assert_eq!(params.keyword, "rust");
        assert_eq!(params.platforms, vec![Platform::Youtube, Platform::Bilibili]);
        assert!(params.image_merge);
    }

    #[test]
    fn absorb_keeps_totals_consistent() {
        let a = VideoRecord::new(Platform::Bilibili, "A", "https://b/1", "1", 100);
        let b = VideoRecord::new(Platform::Youtube, "B", "https://y/1", "1", 200);
        let mut group = MergedGroup::singleton(&a);
        group.absorb(&b);

        assert_eq!(group.total_views, 300);
        assert_eq!(group.title, "A");
        assert_eq!(group.primary_platform, Platform::Youtube);
        assert_eq!(group.primary_url, "https://y/1");
        let sum: u64 = group.members.values().map(|m| m.views).sum();
        assert_eq!(sum, group.total_views);
    }

    #[test]
    fn absorb_keeps_anchor_primary_on_tie() {
        let a = VideoRecord::new(Platform::Bilibili, "A", "https://b/1", "1", 100);
        let b = VideoRecord::new(Platform::Youtube, "B", "https://y/1", "1", 100);
        let mut group = MergedGroup::singleton(&a);
        group.absorb(&b);
        assert_eq!(group.primary_platform, Platform::Bilibili);
    }

    #[test]
    fn view_formatting() {
        assert_eq!(format_views(9_999), "9999");
        assert_eq!(format_views(10_000), "1.0万");
        assert_eq!(format_views(38_598_854), "3859.9万");
    }

    #[test]
    fn task_ids_are_unique() {
        let now = Utc::now();
        let a = TaskId::generate(now);
        let b = TaskId::generate(now);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("task_"));
    }
}
