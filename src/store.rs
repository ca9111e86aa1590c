//! Persistence seam: everything the pipeline needs from the reading
//! platform's content API, behind one trait so ingestion logic can run
//! against an in-memory double in tests.
//!
//! Failure classes matter more than endpoints here. A 4xx (other than the
//! duplicate-chapter 409) is a permanent rejection of that item; a 5xx or
//! transport failure means the platform is down and the item retries on
//! the next scheduled pass.

use crate::error::StoreError;
use crate::models::{Chapter, ChapterContent, MediaRef, Series, SeriesKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct NewSeries {
    pub title: String,
    pub slug: String,
    pub kind: SeriesKind,
    pub source_url: String,
    pub cover_image: Option<String>,
    pub status: String,
    pub published: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewChapter {
    pub series_id: i64,
    pub chapter_number: f64,
    pub title: String,
    #[serde(flatten)]
    pub content: ChapterContent,
}

/// Result of a chapter insert. `Conflict` is the concurrent-duplicate
/// case: the chapter appeared between the existence check and the write.
#[derive(Debug)]
pub enum ChapterWrite {
    Created(Chapter),
    Conflict,
}

pub trait ContentStore {
    async fn find_series_by_source_url(&self, url: &str) -> Result<Option<Series>, StoreError>;
    async fn find_series_by_slug(&self, slug: &str) -> Result<Option<Series>, StoreError>;
    async fn create_series(&self, series: &NewSeries) -> Result<Series, StoreError>;
    async fn update_series_cover(&self, series_id: i64, cover: &str) -> Result<(), StoreError>;
    async fn chapter_exists(&self, series_id: i64, number: f64) -> Result<bool, StoreError>;
    async fn create_chapter(&self, chapter: &NewChapter) -> Result<ChapterWrite, StoreError>;
    async fn latest_chapter_number(&self, series_id: i64) -> Result<Option<f64>, StoreError>;
    /// Every media reference the platform knows about, for the repair pass.
    async fn media_refs(&self) -> Result<Vec<MediaRef>, StoreError>;
}

pub struct ApiStore {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct LatestChapter {
    chapter_number: f64,
}

impl ApiStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET where a 404 is an expected "not found" rather than an error.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify(status, response.text().await.unwrap_or_default()));
        }
        let value = response.json().await.map_err(transport)?;
        Ok(Some(value))
    }
}

impl ContentStore for ApiStore {
    async fn find_series_by_source_url(&self, url: &str) -> Result<Option<Series>, StoreError> {
        let encoded = urlencoding::encode(url);
        self.get_optional(&format!("/api/series/by-source?url={}", encoded))
            .await
    }

    async fn find_series_by_slug(&self, slug: &str) -> Result<Option<Series>, StoreError> {
        self.get_optional(&format!("/api/series/by-slug/{}", slug))
            .await
    }

    async fn create_series(&self, series: &NewSeries) -> Result<Series, StoreError> {
        let response = self
            .client
            .post(self.url("/api/series"))
            .json(series)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify(status, response.text().await.unwrap_or_default()));
        }
        response.json().await.map_err(transport)
    }

    async fn update_series_cover(&self, series_id: i64, cover: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .patch(self.url(&format!("/api/series/{}/cover", series_id)))
            .json(&serde_json::json!({ "cover_image": cover }))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify(status, response.text().await.unwrap_or_default()));
        }
        Ok(())
    }

    async fn chapter_exists(&self, series_id: i64, number: f64) -> Result<bool, StoreError> {
        let found: Option<serde_json::Value> = self
            .get_optional(&format!("/api/series/{}/chapters/{}", series_id, number))
            .await?;
        Ok(found.is_some())
    }

    async fn create_chapter(&self, chapter: &NewChapter) -> Result<ChapterWrite, StoreError> {
        let response = self
            .client
            .post(self.url(&format!("/api/series/{}/chapters", chapter.series_id)))
            .json(chapter)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.as_u16() == 409 {
            return Ok(ChapterWrite::Conflict);
        }
        if !status.is_success() {
            return Err(classify(status, response.text().await.unwrap_or_default()));
        }
        let created = response.json().await.map_err(transport)?;
        Ok(ChapterWrite::Created(created))
    }

    async fn latest_chapter_number(&self, series_id: i64) -> Result<Option<f64>, StoreError> {
        let latest: Option<LatestChapter> = self
            .get_optional(&format!("/api/series/{}/chapters/latest", series_id))
            .await?;
        Ok(latest.map(|l| l.chapter_number))
    }

    async fn media_refs(&self) -> Result<Vec<MediaRef>, StoreError> {
        let refs: Option<Vec<MediaRef>> = self.get_optional("/api/media/refs").await?;
        Ok(refs.unwrap_or_default())
    }
}

fn transport(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn classify(status: reqwest::StatusCode, body: String) -> StoreError {
    if status.is_client_error() {
        StoreError::Rejected {
            status: status.as_u16(),
            message: truncate(&body, 200),
        }
    } else {
        StoreError::Unavailable(format!("status {}", status))
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}
