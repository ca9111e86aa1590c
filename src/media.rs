//! Media pipeline: covers and comic pages are downloaded, validated as
//! decodable images, and re-encoded to JPEG before anything references
//! them. A broken download never becomes a persisted path.
//!
//! The repair pass is the inverse direction: walk every media reference
//! the platform holds and synthesize a labeled placeholder for any file
//! that has gone missing from disk, so readers see "page 4 missing"
//! instead of a broken image.

use crate::error::Error;
use crate::models::{format_chapter_number, MediaRef};
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use log::{info, warn};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// Anything smaller is an error page or tracking pixel, not content.
const MIN_IMAGE_BYTES: usize = 1000;
const JPEG_QUALITY: u8 = 80;

pub struct MediaPipeline<'a> {
    http: &'a reqwest::Client,
    media_dir: PathBuf,
    timeout: Duration,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub checked: usize,
    pub repaired: usize,
}

impl<'a> MediaPipeline<'a> {
    pub fn new(http: &'a reqwest::Client, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            http,
            media_dir: media_dir.into(),
            timeout: DOWNLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Relative path a series cover is stored under.
    pub fn cover_rel_path(slug: &str) -> String {
        format!("covers/{}-cover.jpg", slug)
    }

    /// Relative path a comic page is stored under. `page` is 1-based.
    pub fn page_rel_path(slug: &str, chapter_number: f64, page: usize) -> String {
        let num = format_chapter_number(chapter_number);
        format!(
            "images/{slug}/chapter-{num}/{slug}-chapter-{num}-page-{page}.jpg",
            slug = slug,
            num = num,
            page = page,
        )
    }

    /// Download, validate, and store a series cover. Returns the stored
    /// relative path.
    pub async fn store_cover(&self, slug: &str, url: &str) -> Result<String, Error> {
        let rel = Self::cover_rel_path(slug);
        self.acquire(url, &rel).await?;
        Ok(rel)
    }

    /// Download, validate, and store one comic page.
    pub async fn store_page(
        &self,
        slug: &str,
        chapter_number: f64,
        page: usize,
        url: &str,
    ) -> Result<String, Error> {
        let rel = Self::page_rel_path(slug, chapter_number, page);
        self.acquire(url, &rel).await?;
        Ok(rel)
    }

    async fn acquire(&self, url: &str, rel_path: &str) -> Result<(), Error> {
        let response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(Error::Media(format!(
                "download of {} failed with status {}",
                url,
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.len() < MIN_IMAGE_BYTES {
            return Err(Error::Media(format!(
                "{} too small to be an image ({} bytes)",
                url,
                bytes.len()
            )));
        }

        // Decode proves the payload really is an image; re-encode
        // normalizes format and strips whatever the source embedded.
        let decoded = image::load_from_memory(&bytes)?;
        let jpeg = encode_jpeg(&decoded)?;

        let dest = self.media_dir.join(rel_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&dest, jpeg).await?;
        info!("stored {} ({}x{})", rel_path, decoded.width(), decoded.height());
        Ok(())
    }

    /// Check every known media reference against the filesystem and write
    /// a labeled placeholder for each missing file.
    pub async fn repair(&self, refs: &[MediaRef]) -> Result<RepairReport, Error> {
        let mut report = RepairReport::default();
        for media in refs {
            report.checked += 1;
            let dest = self.media_dir.join(media.path.trim_start_matches('/'));
            if dest.exists() {
                continue;
            }
            warn!("missing media file {}, writing placeholder", media.path);
            let placeholder = placeholder_image(media.width, media.height, &media.label);
            let jpeg = encode_jpeg(&DynamicImage::ImageRgb8(placeholder))?;
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, jpeg).await?;
            report.repaired += 1;
        }
        if report.repaired > 0 {
            info!(
                "media repair: {} of {} references restored",
                report.repaired, report.checked
            );
        }
        Ok(report)
    }
}

fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, Error> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(out.into_inner())
}

const BACKGROUND: Rgb<u8> = Rgb([40, 44, 52]);
const FOREGROUND: Rgb<u8> = Rgb([200, 200, 200]);

/// Solid card with the label rendered centered in a scaled 5x7 pixel font.
/// No font assets involved, so this works wherever the binary runs.
pub fn placeholder_image(width: u32, height: u32, label: &str) -> RgbImage {
    let width = width.max(16);
    let height = height.max(16);
    let mut img = ImageBuffer::from_pixel(width, height, BACKGROUND);

    let text: Vec<char> = label.to_uppercase().chars().collect();
    if text.is_empty() {
        return img;
    }

    // Advance is glyph width plus one column of spacing.
    let advance = GLYPH_WIDTH + 1;
    let natural_width = text.len() as u32 * advance;
    let scale = (width / (natural_width + 4)).clamp(1, 6);
    let text_w = natural_width * scale;
    let text_h = GLYPH_HEIGHT * scale;
    let origin_x = width.saturating_sub(text_w) / 2;
    let origin_y = height.saturating_sub(text_h) / 2;

    for (i, c) in text.iter().enumerate() {
        let rows = glyph(*c);
        let glyph_x = origin_x + i as u32 * advance * scale;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        let x = glyph_x + col * scale + dx;
                        let y = origin_y + row as u32 * scale + dy;
                        if x < width && y < height {
                            img.put_pixel(x, y, FOREGROUND);
                        }
                    }
                }
            }
        }
    }
    img
}

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b11011, 0b10001],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '-' => [0b00000, 0b00000, 0b00000, 0b01110, 0b00000, 0b00000, 0b00000],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00100],
        ' ' => [0; 7],
        _ => [0b11111; 7],
    }
}
