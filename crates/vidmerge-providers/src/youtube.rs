//! YouTube Data API v3 adapter.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use vidmerge_core::{Platform, Provider, ProviderError, ProgressSink, VideoRecord};

use crate::MAX_RESULTS;
use crate::client::{endpoint, parse_count};

const SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const VIDEOS_URL: &str = "https://www.googleapis.com/youtube/v3/videos";
const PAGE_SIZE: &str = "30";
const FETCH_DONE: u8 = 90;
const MAX_PAGES: usize = 2;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchItem {
    id: SearchItemId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchItemId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideosResponse {
    #[serde(default)]
    items: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    id: String,
    #[serde(default)]
    snippet: Snippet,
    #[serde(default)]
    statistics: Statistics,
}

#[derive(Debug, Default, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    view_count: serde_json::Value,
}

/// Google API error body: `{"error": {"code": 403, "message": "..."}}`.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct YoutubeProvider {
    client: Client,
    api_key: Option<String>,
}

impl YoutubeProvider {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

/// The two Data API calls a search needs.
#[async_trait]
trait VideoApi: Send + Sync {
    async fn search_page(
        &self,
        keyword: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse, ProviderError>;

    async fn videos(&self, ids: &[String]) -> Result<VideosResponse, ProviderError>;
}

struct DataApi<'a> {
    client: &'a Client,
    key: &'a str,
}

impl DataApi<'_> {
    /// GET `url` and decode JSON, mapping Google error bodies to
    /// [`ProviderError::Api`]. Request URLs carry the API key, so it is
    /// stripped from transport errors.
    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ProviderError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.without_url()))?;

        let status = resp.status();
        if !status.is_success() {
            let body: ErrorBody = resp.json().await.unwrap_or_default();
            let message = if body.error.message.is_empty() {
                status.canonical_reason().unwrap_or("request rejected").to_owned()
            } else {
                body.error.message
            };
            return Err(ProviderError::Api {
                code: i64::from(status.as_u16()),
                message,
            });
        }

        resp.json()
            .await
            .map_err(|e| ProviderError::Request(e.without_url()))
    }
}

#[async_trait]
impl VideoApi for DataApi<'_> {
    async fn search_page(
        &self,
        keyword: &str,
        page_token: Option<&str>,
    ) -> Result<SearchResponse, ProviderError> {
        let mut params = vec![
            ("part", "snippet"),
            ("q", keyword),
            ("type", "video"),
            ("maxResults", PAGE_SIZE),
            ("order", "viewCount"),
            ("key", self.key),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }
        self.get_json(endpoint(SEARCH_URL, &params)?).await
    }

    async fn videos(&self, ids: &[String]) -> Result<VideosResponse, ProviderError> {
        let ids = ids.join(",");
        let params = [("part", "snippet,statistics"), ("id", ids.as_str()), ("key", self.key)];
        self.get_json(endpoint(VIDEOS_URL, &params)?).await
    }
}

#[async_trait]
impl Provider for YoutubeProvider {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    async fn fetch(
        &self,
        keyword: &str,
        progress: ProgressSink,
    ) -> Result<Vec<VideoRecord>, ProviderError> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(ProviderError::NotConfigured("YouTube API key is not set".into()));
        };
        let api = DataApi {
            client: &self.client,
            key,
        };
        let records = collect_pages(&api, keyword, MAX_PAGES, &progress).await?;
        info!(count = records.len(), "youtube search finished");
        Ok(records)
    }
}

/// Walk up to `max_pages` result pages. A failure on the first page fails
/// the search; later failures keep what was already collected.
async fn collect_pages(
    api: &dyn VideoApi,
    keyword: &str,
    max_pages: usize,
    progress: &ProgressSink,
) -> Result<Vec<VideoRecord>, ProviderError> {
    progress.report(0);
    let steps = max_pages * 2;
    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut page_token: Option<String> = None;

    for page in 0..max_pages {
        let search = match api.search_page(keyword, page_token.as_deref()).await {
            Ok(search) => search,
            Err(e) if page == 0 => return Err(e),
            Err(e) => {
                warn!(page = page + 1, error = %e, "youtube search page failed; keeping earlier pages");
                break;
            }
        };
        progress.report_fraction(0, FETCH_DONE, page * 2 + 1, steps);

        let ids = video_ids(&search);
        debug!(page = page + 1, found = ids.len(), "youtube search page");
        if ids.is_empty() {
            break;
        }

        let details = match api.videos(&ids).await {
            Ok(details) => details,
            Err(e) if page == 0 => return Err(e),
            Err(e) => {
                warn!(page = page + 1, error = %e, "youtube video lookup failed; keeping earlier pages");
                break;
            }
        };
        for video in details.items {
            if records.len() >= MAX_RESULTS {
                break;
            }
            if seen.insert(video.id.clone()) {
                records.push(record_from_video(video));
            }
        }
        progress.report_fraction(0, FETCH_DONE, page * 2 + 2, steps);

        page_token = search.next_page_token;
        if page_token.is_none() || records.len() >= MAX_RESULTS {
            break;
        }
    }

    records.sort_by(|a, b| b.view_count.cmp(&a.view_count));
    records.truncate(MAX_RESULTS);
    progress.report(FETCH_DONE);
    Ok(records)
}

fn video_ids(search: &SearchResponse) -> Vec<String> {
    search
        .items
        .iter()
        .filter_map(|item| item.id.video_id.clone())
        .filter(|id| !id.is_empty())
        .collect()
}

fn record_from_video(video: Video) -> VideoRecord {
    let thumbnail = video
        .snippet
        .thumbnails
        .high
        .map(|t| t.url)
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video.id));
    VideoRecord::new(
        Platform::Youtube,
        video.snippet.title,
        format!("https://www.youtube.com/watch?v={}", video.id),
        video.id.clone(),
        parse_count(&video.statistics.view_count),
    )
    .with_thumbnail(thumbnail)
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use super::*;

    /// Serves canned pages keyed by page token; unknown tokens fail.
    struct FakeApi {
        pages: HashMap<Option<String>, SearchResponse>,
        failing_lookup: Option<String>,
    }

    fn page(ids: &[&str], next: Option<&str>) -> SearchResponse {
        SearchResponse {
            items: ids
                .iter()
                .map(|id| SearchItem {
                    id: SearchItemId {
                        video_id: Some((*id).to_owned()),
                    },
                })
                .collect(),
            next_page_token: next.map(str::to_owned),
        }
    }

    #[async_trait]
    impl VideoApi for FakeApi {
        async fn search_page(
            &self,
            _keyword: &str,
            page_token: Option<&str>,
        ) -> Result<SearchResponse, ProviderError> {
            self.pages
                .get(&page_token.map(str::to_owned))
                .cloned()
                .ok_or(ProviderError::Api {
                    code: 500,
                    message: "backend error".into(),
                })
        }

        async fn videos(&self, ids: &[String]) -> Result<VideosResponse, ProviderError> {
            if self.failing_lookup.as_ref().is_some_and(|bad| ids.contains(bad)) {
                return Err(ProviderError::Api {
                    code: 403,
                    message: "quotaExceeded".into(),
                });
            }
            Ok(VideosResponse {
                items: ids
                    .iter()
                    .enumerate()
                    .map(|(i, id)| Video {
                        id: id.clone(),
                        snippet: Snippet {
                            title: format!("video {id}"),
                            thumbnails: Thumbnails::default(),
                        },
                        statistics: Statistics {
                            view_count: serde_json::json!(100 - i as u64),
                        },
                    })
                    .collect(),
            })
        }
    }

    #[tokio::test]
    async fn failed_second_lookup_keeps_first_page() {
        let api = FakeApi {
            pages: HashMap::from([
                (None, page(&["a1", "a2"], Some("next"))),
                (Some("next".into()), page(&["b1"], None)),
            ]),
            failing_lookup: Some("b1".into()),
        };
        let records = collect_pages(&api, "python", 2, &ProgressSink::noop(Platform::Youtube))
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.item_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[tokio::test]
    async fn failed_second_search_keeps_first_page() {
        let api = FakeApi {
            pages: HashMap::from([(None, page(&["a1"], Some("gone")))]),
            failing_lookup: None,
        };
        let records = collect_pages(&api, "python", 2, &ProgressSink::noop(Platform::Youtube))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn failed_first_page_fails_the_search() {
        let api = FakeApi {
            pages: HashMap::from([(None, page(&["a1"], None))]),
            failing_lookup: Some("a1".into()),
        };
        let err = collect_pages(&api, "python", 2, &ProgressSink::noop(Platform::Youtube))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api { code: 403, .. }));
    }

    #[test]
    fn search_ids_skip_non_videos() {
        let body = r#"{
            "nextPageToken": "CAUQAA",
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "rfscVS0vtbw"}},
                {"id": {"kind": "youtube#channel", "channelId": "UC123"}},
                {"id": {"kind": "youtube#video", "videoId": "Z1Yd7upQsXY"}}
            ]
        }"#;
        let search: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(search.next_page_token.as_deref(), Some("CAUQAA"));
        assert_eq!(video_ids(&search), vec!["rfscVS0vtbw", "Z1Yd7upQsXY"]);
    }

    #[test]
    fn video_details_become_records() {
        let body = r#"{
            "items": [
                {
                    "id": "rfscVS0vtbw",
                    "snippet": {
                        "title": "Learn Python - Full Course for Beginners",
                        "thumbnails": {"high": {"url": "https://i.ytimg.com/vi/rfscVS0vtbw/hq.jpg"}}
                    },
                    "statistics": {"viewCount": "48123456"}
                },
                {
                    "id": "noStats123",
                    "snippet": {"title": "No statistics"}
                }
            ]
        }"#;
        let videos: VideosResponse = serde_json::from_str(body).unwrap();
        let records: Vec<_> = videos.items.into_iter().map(record_from_video).collect();

        assert_eq!(records[0].url, "https://www.youtube.com/watch?v=rfscVS0vtbw");
        assert_eq!(records[0].view_count, 48_123_456);
        assert_eq!(
            records[0].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/rfscVS0vtbw/hq.jpg")
        );

        assert_eq!(records[1].view_count, 0);
        assert_eq!(
            records[1].thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/noStats123/hqdefault.jpg")
        );
    }

    #[test]
    fn error_body_message_is_read() {
        let body = r#"{"error": {"code": 403, "message": "quotaExceeded", "errors": []}}"#;
        let parsed: ErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "quotaExceeded");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let provider = YoutubeProvider::new(Client::new(), Some("   ".into()));
        let err = provider
            .fetch("python", ProgressSink::noop(Platform::Youtube))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
