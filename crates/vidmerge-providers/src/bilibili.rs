//! bilibili search adapter.
//!
//! Search pages come from the web search API ordered by play count. Each hit
//! is then looked up through the view API, which carries the authoritative
//! title, cover and play count; lookups are spaced out to stay under the
//! site's rate limiting.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::REFERER;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};
use vidmerge_core::similarity::strip_markup;
use vidmerge_core::{Platform, Provider, ProviderError, ProgressSink, VideoRecord};

use crate::client::{endpoint, parse_count};
use crate::MAX_RESULTS;

const HOME_URL: &str = "https://www.bilibili.com/";
const SEARCH_URL: &str = "https://api.bilibili.com/x/web-interface/search/type";
const VIEW_URL: &str = "https://api.bilibili.com/x/web-interface/view";

/// Progress reached once every search page is in; enrichment fills the rest.
const SEARCH_DONE: u8 = 70;
const ENRICH_DONE: u8 = 90;
const SEARCH_PAGES: u32 = 3;
/// Hits gathered for enrichment; only the top [`MAX_RESULTS`] by enriched
/// play count are returned.
const CANDIDATES: usize = 60;

/// Standard bilibili response wrapper: `{code, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<T, ProviderError> {
        if self.code != 0 {
            return Err(ProviderError::Api {
                code: self.code,
                message: self.message,
            });
        }
        self.data
            .ok_or_else(|| ProviderError::Decode("response has no data field".into()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchPage {
    #[serde(default)]
    result: Vec<SearchHit>,
    #[serde(default, rename = "numPages")]
    num_pages: u32,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    bvid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    play: Value,
    #[serde(default)]
    pic: String,
}

#[derive(Debug, Deserialize)]
struct ViewData {
    #[serde(default)]
    title: String,
    #[serde(default)]
    pic: String,
    #[serde(default)]
    stat: ViewStat,
}

#[derive(Debug, Default, Deserialize)]
struct ViewStat {
    #[serde(default)]
    view: Value,
}

#[derive(Debug, Clone)]
pub struct BilibiliProvider {
    client: Client,
    detail_delay: Duration,
}

impl BilibiliProvider {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            detail_delay: Duration::from_millis(200),
        }
    }

    /// Pause between two view lookups.
    pub fn with_detail_delay(mut self, delay: Duration) -> Self {
        self.detail_delay = delay;
        self
    }

    /// The API answers `-412` without the session cookies the home page sets.
    async fn warm_up(&self) {
        match self.client.get(HOME_URL).send().await {
            Ok(resp) => debug!(status = %resp.status(), "bilibili cookies primed"),
            Err(e) => warn!(error = %e, "bilibili warm-up request failed"),
        }
    }

    async fn get_api<T: DeserializeOwned>(
        &self,
        base: &str,
        params: &[(&str, &str)],
        referer: &str,
    ) -> Result<T, ProviderError> {
        let envelope: Envelope<T> = self
            .client
            .get(endpoint(base, params)?)
            .header(REFERER, referer)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        envelope.into_data()
    }

    async fn search_page(&self, keyword: &str, page: u32) -> Result<SearchPage, ProviderError> {
        let page = page.to_string();
        self.get_api(
            SEARCH_URL,
            &[
                ("search_type", "video"),
                ("keyword", keyword),
                ("order", "click"),
                ("page", &page),
            ],
            HOME_URL,
        )
        .await
    }

    async fn view(&self, bvid: &str) -> Result<ViewData, ProviderError> {
        let referer = video_url(bvid);
        self.get_api(VIEW_URL, &[("bvid", bvid)], &referer).await
    }

    async fn search(
        &self,
        keyword: &str,
        progress: &ProgressSink,
    ) -> Result<Vec<VideoRecord>, ProviderError> {
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=SEARCH_PAGES {
            let hits = match self.search_page(keyword, page).await {
                Ok(hits) => hits,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "bilibili search page failed; keeping earlier pages");
                    break;
                }
            };
            let last_page = hits.num_pages != 0 && page >= hits.num_pages;
            let empty = hits.result.is_empty();

            absorb_hits(&mut records, &mut seen, hits.result);
            progress.report_fraction(0, SEARCH_DONE, page as usize, SEARCH_PAGES as usize);

            if empty || last_page || records.len() >= CANDIDATES {
                break;
            }
        }
        progress.report(SEARCH_DONE);
        Ok(records)
    }

    async fn enrich(&self, records: &mut [VideoRecord], progress: &ProgressSink) {
        let total = records.len();
        let mut enriched = 0usize;
        for (idx, record) in records.iter_mut().enumerate() {
            if idx > 0 && !self.detail_delay.is_zero() {
                tokio::time::sleep(self.detail_delay).await;
            }
            match self.view(&record.item_id).await {
                Ok(view) => {
                    apply_view(record, view);
                    enriched += 1;
                }
                Err(e) => debug!(bvid = %record.item_id, error = %e, "view lookup failed; keeping search data"),
            }
            progress.report_fraction(SEARCH_DONE, ENRICH_DONE, idx + 1, total);
        }
        info!(total, enriched, "bilibili enrichment finished");
    }
}

#[async_trait]
impl Provider for BilibiliProvider {
    fn platform(&self) -> Platform {
        Platform::Bilibili
    }

    async fn fetch(
        &self,
        keyword: &str,
        progress: ProgressSink,
    ) -> Result<Vec<VideoRecord>, ProviderError> {
        progress.report(0);
        self.warm_up().await;

        let mut records = self.search(keyword, &progress).await?;
        self.enrich(&mut records, &progress).await;

        rank(&mut records);
        progress.report(ENRICH_DONE);
        Ok(records)
    }
}

/// Append unseen hits until [`CANDIDATES`] records are held.
fn absorb_hits(records: &mut Vec<VideoRecord>, seen: &mut HashSet<String>, hits: Vec<SearchHit>) {
    for hit in hits {
        if records.len() >= CANDIDATES {
            break;
        }
        match record_from_hit(hit) {
            Some(record) if seen.insert(record.item_id.clone()) => records.push(record),
            _ => {}
        }
    }
}

/// Most played first, capped at [`MAX_RESULTS`].
fn rank(records: &mut Vec<VideoRecord>) {
    records.sort_by(|a, b| b.view_count.cmp(&a.view_count));
    records.truncate(MAX_RESULTS);
}

fn video_url(bvid: &str) -> String {
    format!("https://www.bilibili.com/video/{bvid}/")
}

/// Cover links come back protocol-relative (`//i0.hdslb.com/...`).
fn absolute_pic(pic: &str) -> Option<String> {
    let pic = pic.trim();
    if pic.is_empty() {
        None
    } else if let Some(rest) = pic.strip_prefix("//") {
        Some(format!("https://{rest}"))
    } else if pic.starts_with("http://") {
        Some(pic.replacen("http://", "https://", 1))
    } else {
        Some(pic.to_owned())
    }
}

/// Search titles wrap the matched keyword in `<em class="keyword">` and
/// carry HTML entities.
fn clean_title(raw: &str) -> String {
    strip_markup(raw)
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_owned()
}

fn record_from_hit(hit: SearchHit) -> Option<VideoRecord> {
    let bvid = hit.bvid.trim();
    if bvid.is_empty() {
        return None;
    }
    let title = match clean_title(&hit.title) {
        t if t.is_empty() => format!("bilibili video {bvid}"),
        t => t,
    };
    let mut record = VideoRecord::new(
        Platform::Bilibili,
        title,
        video_url(bvid),
        bvid,
        parse_count(&hit.play),
    );
    record.thumbnail_url = absolute_pic(&hit.pic);
    Some(record)
}

/// Detail data wins where it is present; missing fields keep search data.
fn apply_view(record: &mut VideoRecord, view: ViewData) {
    let views = parse_count(&view.stat.view);
    if views > 0 {
        record.view_count = views;
    }
    let title = clean_title(&view.title);
    if !title.is_empty() {
        record.title = title;
    }
    if let Some(pic) = absolute_pic(&view.pic) {
        record.thumbnail_url = Some(pic);
    }
}
