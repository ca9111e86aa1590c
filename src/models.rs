use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of content a series carries. Novels publish translated body
/// text, comics publish ordered page images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Novel,
    Comic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub title: String,
    /// Unique, URL-safe. Derived from the title on creation and
    /// disambiguated with a random suffix on collision.
    pub slug: String,
    pub kind: SeriesKind,
    pub source_url: String,
    pub cover_image: Option<String>,
    pub status: String,
    pub published: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    pub series_id: i64,
    /// Rational chapter number; fractional values denote sub-chapters
    /// (e.g. 12.5). (series_id, chapter_number) is the idempotency key.
    pub chapter_number: f64,
    pub title: String,
    #[serde(flatten)]
    pub content: ChapterContent,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "content_kind")]
pub enum ChapterContent {
    Text { body: String },
    Pages { images: Vec<String> },
}

/// A chapter discovered on a series index page. Transient: produced by the
/// resolver, consumed immediately by the ingestion existence check.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRef {
    pub number: f64,
    pub url: String,
}

/// A persisted media reference, used by the repair pass to detect files
/// that have gone missing from disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub label: String,
}

/// Canonical string form of a chapter number: integral numbers render
/// without a fraction ("12"), sub-chapters keep it ("12.5"). Used both as
/// a map key and in media paths.
pub fn format_chapter_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Derive a URL-safe slug from a title: lowercase alphanumeric runs joined
/// by single hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_hyphen = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_hyphen = false;
        } else if !last_hyphen {
            slug.push('-');
            last_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
