//! Thumbnail feature vectors for visual matching.
//!
//! A thumbnail is decoded to RGB, stripped of letterbox/pillarbox bars,
//! scaled to [`VECTOR_SIDE`]² and flattened plane by plane into an
//! L2-normalised vector of [`VECTOR_LEN`] floats.

use std::time::Duration;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbImage;
use reqwest::Client;
use tracing::debug;

use crate::error::ExtractionError;

/// Side length of the square the thumbnail is scaled to.
pub const VECTOR_SIDE: u32 = 32;
/// Length of every feature vector.
pub const VECTOR_LEN: usize = (VECTOR_SIDE * VECTOR_SIDE * 3) as usize;

/// A pixel is dark when its brightest channel is at or below this value.
const DARK_LEVEL: u8 = 10;
/// A row/column is a border when at least this fraction of it is dark.
const BORDER_RATIO: f64 = 0.95;
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Cropping is skipped if it would leave less than this on either axis.
const MIN_CROP_SIDE: u32 = 8;

/// Turns a thumbnail URL into a feature vector.
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, thumbnail_url: &str) -> Result<Vec<f32>, ExtractionError>;
}

/// Downloads thumbnails over HTTP and vectorises them on the blocking pool.
#[derive(Debug, Clone)]
pub struct ThumbnailExtractor {
    client: Client,
}

impl ThumbnailExtractor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeatureExtractor for ThumbnailExtractor {
    async fn extract(&self, thumbnail_url: &str) -> Result<Vec<f32>, ExtractionError> {
        let url = absolute_url(thumbnail_url);
        let bytes = self
            .client
            .get(&url)
            .timeout(DOWNLOAD_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        debug!(url = %url, size = bytes.len(), "thumbnail downloaded");

        tokio::task::spawn_blocking(move || vectorize_bytes(&bytes))
            .await
            .map_err(|e| ExtractionError::Decode(format!("decoder task failed: {e}")))?
    }
}

/// Bilibili hands out protocol-relative image links.
fn absolute_url(url: &str) -> String {
    match url.strip_prefix("//") {
        Some(rest) => format!("https://{rest}"),
        None => url.to_owned(),
    }
}

/// Decode an encoded image and compute its feature vector.
pub fn vectorize_bytes(bytes: &[u8]) -> Result<Vec<f32>, ExtractionError> {
    let rgb = image::load_from_memory(bytes)?.to_rgb8();
    Ok(feature_vector(&rgb))
}

/// Feature vector of an already decoded image.
pub fn feature_vector(image: &RgbImage) -> Vec<f32> {
    let cropped;
    let source = match content_bounds(image) {
        Some((x, y, w, h)) if (w, h) != image.dimensions() => {
            cropped = imageops::crop_imm(image, x, y, w, h).to_image();
            &cropped
        }
        _ => image,
    };

    let scaled = downscale(source);

    let plane = (VECTOR_SIDE * VECTOR_SIDE) as usize;
    let mut vector = vec![0.0f32; VECTOR_LEN];
    for (i, pixel) in scaled.pixels().enumerate() {
        for channel in 0..3 {
            vector[channel * plane + i] = pixel[channel] as f32;
        }
    }

    let norm = vector.iter().map(|v| (*v as f64) * (*v as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v = (*v as f64 / norm) as f32;
        }
    }
    vector
}

/// Bicubic resample to the fixed vector grid.
fn downscale(image: &RgbImage) -> RgbImage {
    imageops::resize(image, VECTOR_SIDE, VECTOR_SIDE, FilterType::CatmullRom)
}

/// Bounds `(x, y, width, height)` of the image once dark borders are trimmed.
///
/// Returns `None` when the trimmed region would be smaller than
/// [`MIN_CROP_SIDE`] on either axis, in which case the full image is used.
pub fn content_bounds(image: &RgbImage) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return None;
    }

    let mut row_dark = vec![0u32; h as usize];
    let mut col_dark = vec![0u32; w as usize];
    for (x, y, pixel) in image.enumerate_pixels() {
        let brightness = pixel.0.iter().copied().max().unwrap_or(0);
        if brightness <= DARK_LEVEL {
            row_dark[y as usize] += 1;
            col_dark[x as usize] += 1;
        }
    }
    let row_is_border = |y: u32| row_dark[y as usize] as f64 / w as f64 >= BORDER_RATIO;
    let col_is_border = |x: u32| col_dark[x as usize] as f64 / h as f64 >= BORDER_RATIO;

    let mut top = 0;
    while top < h && row_is_border(top) {
        top += 1;
    }
    let mut bottom = h - 1;
    while bottom > top && row_is_border(bottom) {
        bottom -= 1;
    }
    let mut left = 0;
    while left < w && col_is_border(left) {
        left += 1;
    }
    let mut right = w - 1;
    while right > left && col_is_border(right) {
        right -= 1;
    }

    if top >= bottom || left >= right {
        return None;
    }
    let (crop_w, crop_h) = (right - left + 1, bottom - top + 1);
    if crop_w < MIN_CROP_SIDE || crop_h < MIN_CROP_SIDE {
        return None;
    }
    Some((left, top, crop_w, crop_h))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::similarity::cosine;
    use image::Rgb;

    fn letterboxed(w: u32, h: u32, bar: u32, fill: Rgb<u8>) -> RgbImage {
        RgbImage::from_fn(w, h, |_, y| {
            if y < bar || y >= h - bar {
                Rgb([0, 0, 0])
            } else {
                fill
            }
        })
    }

    #[test]
    fn bounds_trim_letterbox_bars() {
        let img = letterboxed(64, 48, 6, Rgb([200, 120, 40]));
        assert_eq!(content_bounds(&img), Some((0, 6, 64, 36)));
    }

    #[test]
    fn bounds_trim_pillarbox_bars() {
        let img = RgbImage::from_fn(60, 40, |x, _| {
            if x < 10 || x >= 50 {
                Rgb([5, 5, 5])
            } else {
                Rgb([90, 90, 90])
            }
        });
        assert_eq!(content_bounds(&img), Some((10, 0, 40, 40)));
    }

    #[test]
    fn bounds_skip_tiny_content() {
        let img = letterboxed(64, 20, 7, Rgb([255, 255, 255]));
        assert_eq!(content_bounds(&img), None);
    }

    #[test]
    fn bounds_skip_all_dark_image() {
        let img = RgbImage::from_pixel(32, 32, Rgb([0, 0, 0]));
        assert_eq!(content_bounds(&img), None);
    }

    #[test]
    fn vector_is_normalized() {
        let img = RgbImage::from_fn(50, 40, |x, y| Rgb([x as u8 * 4, y as u8 * 5, 128]));
        let v = feature_vector(&img);
        assert_eq!(v.len(), VECTOR_LEN);
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn downscale_is_bicubic() {
        // Two flat halves; a cubic kernel rings past the brighter level at
        // the edge where a linear one never leaves [100, 200].
        let img = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 { Rgb([100, 100, 100]) } else { Rgb([200, 200, 200]) }
        });
        let scaled = downscale(&img);
        assert_eq!(scaled.dimensions(), (VECTOR_SIDE, VECTOR_SIDE));
        let brightest = scaled.pixels().map(|p| p[0]).max().unwrap_or(0);
        let darkest = scaled.pixels().map(|p| p[0]).min().unwrap_or(255);
        assert!(brightest > 200, "brightest = {brightest}");
        assert!(darkest < 100, "darkest = {darkest}");
    }

    #[test]
    fn black_image_stays_zero() {
        let img = RgbImage::from_pixel(16, 16, Rgb([0, 0, 0]));
        let v = feature_vector(&img);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn letterboxed_copy_matches_original() {
        let content = RgbImage::from_fn(64, 36, |x, y| Rgb([x as u8 * 3, y as u8 * 6, 80]));
        let mut boxed = RgbImage::from_pixel(64, 48, Rgb([0, 0, 0]));
        imageops::replace(&mut boxed, &content, 0, 6);

        let a = feature_vector(&content);
        let b = feature_vector(&boxed);
        assert!(cosine(&a, &b) > 0.99);
    }

    #[test]
    fn decode_garbage_is_decode_error() {
        let err = vectorize_bytes(b"not an image").unwrap_err();
        assert!(matches!(err, ExtractionError::Decode(_)));
    }

    #[test]
    fn protocol_relative_urls_become_https() {
        assert_eq!(
            absolute_url("//i0.hdslb.com/bfs/archive/a.jpg"),
            "https://i0.hdslb.com/bfs/archive/a.jpg"
        );
        assert_eq!(absolute_url("https://x/y.jpg"), "https://x/y.jpg");
    }
}
