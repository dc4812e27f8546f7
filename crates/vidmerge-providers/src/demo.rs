//! Fixed catalogue served when demo mode is switched on.
//!
//! Lets the service be exercised without network access or API keys. It is
//! never used as a fallback for a failing live provider.

use async_trait::async_trait;
use vidmerge_core::{Platform, Provider, ProviderError, ProgressSink, VideoRecord};

/// `(item id, title, views)` per platform.
const BILIBILI: &[(&str, &str, u64)] = &[
    ("BV12J41137hu", "Python入门教程 - 零基础到精通", 8_690_000),
    ("BV1c4411e77t", "Python爬虫教程", 7_630_000),
    ("BV1ex411x7Em", "Python数据分析实战", 5_230_000),
    ("BV1qW4y1a7fU", "Python Tutorial for Beginners", 1_250_000),
];

const YOUTUBE: &[(&str, &str, u64)] = &[
    ("rfscVS0vtbw", "Python Tutorial for Beginners", 38_598_854),
    ("Z1Yd7upQsXY", "Learn Python - Full Course for Beginners", 34_973_308),
    ("kqtD5dpn9C8", "Python for Beginners - Learn Python in 1 Hour", 22_899_826),
];

#[derive(Debug, Clone, Copy)]
pub struct DemoProvider {
    platform: Platform,
}

impl DemoProvider {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn catalogue(&self) -> Vec<VideoRecord> {
        let entries = match self.platform {
            Platform::Bilibili => BILIBILI,
            Platform::Youtube => YOUTUBE,
        };
        entries
            .iter()
            .map(|&(id, title, views)| {
                let (url, thumb) = match self.platform {
                    Platform::Bilibili => (
                        format!("https://www.bilibili.com/video/{id}/"),
                        format!("https://picsum.photos/seed/{id}/320/180"),
                    ),
                    Platform::Youtube => (
                        format!("https://www.youtube.com/watch?v={id}"),
                        format!("https://i.ytimg.com/vi/{id}/hqdefault.jpg"),
                    ),
                };
                VideoRecord::new(self.platform, title, url, id, views).with_thumbnail(thumb)
            })
            .collect()
    }
}

#[async_trait]
impl Provider for DemoProvider {
    fn platform(&self) -> Platform {
        self.platform
    }

    async fn fetch(
        &self,
        _keyword: &str,
        progress: ProgressSink,
    ) -> Result<Vec<VideoRecord>, ProviderError> {
        let mut records = self.catalogue();
        records.sort_by(|a, b| b.view_count.cmp(&a.view_count));
        progress.report(100);
        Ok(records)
    }
}
