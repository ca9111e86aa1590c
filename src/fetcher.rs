//! Fetch orchestrator: lightweight HTTP first, headless browser on demand.
//!
//! Policy per URL: try a known per-site content API if one applies
//! (fastest, most reliable), then the lightweight client, and escalate to
//! the browser exactly once when the response looks blocked or hollow.
//! `Blocked` and `NotFound` are terminal for the item: callers report
//! them upward instead of retrying.

use crate::browser_client::BrowserFetch;
use crate::error::{BrowserError, Error};
use crate::http_client::{LightClient, LightResponse};
use crate::resolver;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

/// Prioritized content containers for chapter body text. First non-empty
/// match wins. The browser-only `.m-read .txt` shape goes in front since
/// it is the most specific.
const TEXT_SELECTORS: &[&str] = &[
    ".m-read .txt",
    ".chapter-text",
    ".txt",
    "#chapter-container",
    ".entry-content",
    ".cha-content",
    ".reading-content",
    ".chapter-content",
    "#chapter-content",
    "#chr-content",
    ".text-left",
    "article",
];

/// Reader containers holding comic page images.
const IMAGE_SELECTORS: &[&str] = &["#readerarea img", ".reading-content img", ".entry-content img"];

/// Tags whose text is never chapter content: scripts, styling, embedded
/// navigation links, ad iframes.
const NOISE_TAGS: &[&str] = &["script", "style", "a", "iframe", "button", "input", "noscript"];

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub body: String,
}

#[derive(Debug, PartialEq)]
pub enum FetchOutcome {
    Content(ExtractedContent),
    /// Anti-bot wall the browser could not get past. Terminal; surfaced
    /// for operator visibility.
    Blocked,
    /// HTTP 404, the chapter genuinely does not exist. Never escalated.
    NotFound,
}

#[derive(Debug, PartialEq)]
pub enum PageImages {
    Images(Vec<String>),
    Blocked,
    NotFound,
}

#[derive(Debug)]
pub enum HtmlOutcome {
    Html(String),
    Blocked,
    NotFound,
}

pub struct Fetcher<'a, B: BrowserFetch> {
    http: &'a LightClient,
    browser: &'a B,
    min_body_len: usize,
}

enum Triage {
    Usable(String),
    Escalate,
    NotFound,
}

impl<'a, B: BrowserFetch> Fetcher<'a, B> {
    pub fn new(http: &'a LightClient, browser: &'a B, min_body_len: usize) -> Self {
        Self {
            http,
            browser,
            min_body_len,
        }
    }

    /// Load a series index page for the resolver. Same triage and
    /// escalation rules as chapter fetches; the browser waits for any
    /// known chapter-list container.
    pub async fn fetch_index(&self, url: &str) -> Result<HtmlOutcome, Error> {
        match self.light_triage(url).await? {
            Triage::NotFound => return Ok(HtmlOutcome::NotFound),
            Triage::Usable(body) => return Ok(HtmlOutcome::Html(body)),
            Triage::Escalate => {}
        }
        // Visit the site root first so the WAF sees a plausible navigation
        // pattern before the protected index page.
        if let Some(origin) = origin_of(url) {
            let _ = self.browser.warm_up(&origin);
        }
        match self
            .browser
            .fetch_html_when(url, &index_wait_selector(), index_expand_selector(url))
        {
            Ok(html) => Ok(HtmlOutcome::Html(html)),
            Err(BrowserError::Timeout(_)) => Ok(HtmlOutcome::Blocked),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and extract a text chapter.
    pub async fn fetch_chapter_text(&self, url: &str) -> Result<FetchOutcome, Error> {
        // Per-site API shortcut: tried first when the URL matches.
        if let Some(api_url) = chapter_api_url(url) {
            log::debug!("trying chapter API: {}", api_url);
            if let Ok((status, value)) = self.http.get_json(&api_url).await {
                if status.is_success() {
                    if let Some(fragment) = value.get("content").and_then(|v| v.as_str()) {
                        let body = text_from_fragment(fragment);
                        if body.len() >= self.min_body_len {
                            log::info!("content via chapter API ({} chars)", body.len());
                            return Ok(FetchOutcome::Content(ExtractedContent {
                                title: None,
                                body,
                            }));
                        }
                    }
                }
            }
            // Shortcut failed; fall back to HTML scraping.
        }

        match self.light_triage(url).await? {
            Triage::NotFound => return Ok(FetchOutcome::NotFound),
            Triage::Usable(body) => {
                if let Some(content) = extract_text_content(&body, self.min_body_len) {
                    log::info!("content via lightweight fetch ({} chars)", content.body.len());
                    return Ok(FetchOutcome::Content(content));
                }
                // 200 but hollow: placeholder page, escalate.
                log::debug!("body too short from lightweight fetch, escalating: {}", url);
            }
            Triage::Escalate => {}
        }

        match self.browser.fetch_html_when(url, &text_wait_selector(), None) {
            Ok(html) => match extract_text_content(&html, self.min_body_len) {
                Some(content) => {
                    log::info!("content via browser fetch ({} chars)", content.body.len());
                    Ok(FetchOutcome::Content(content))
                }
                None => Ok(FetchOutcome::Blocked),
            },
            Err(BrowserError::Timeout(_)) => Ok(FetchOutcome::Blocked),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch and extract the ordered page-image URLs of a comic chapter.
    pub async fn fetch_chapter_images(&self, url: &str) -> Result<PageImages, Error> {
        match self.light_triage(url).await? {
            Triage::NotFound => return Ok(PageImages::NotFound),
            Triage::Usable(body) => {
                let images = extract_page_images(&body);
                if !images.is_empty() {
                    return Ok(PageImages::Images(images));
                }
                log::debug!("no reader images in lightweight fetch, escalating: {}", url);
            }
            Triage::Escalate => {}
        }

        match self.browser.fetch_html_when(url, &image_wait_selector(), None) {
            Ok(html) => {
                let images = extract_page_images(&html);
                if images.is_empty() {
                    Ok(PageImages::Blocked)
                } else {
                    Ok(PageImages::Images(images))
                }
            }
            Err(BrowserError::Timeout(_)) => Ok(PageImages::Blocked),
            Err(e) => Err(e.into()),
        }
    }

    /// Lightweight fetch plus response triage. 404 is terminal; 403, any
    /// 5xx, and other oddities escalate to the browser.
    async fn light_triage(&self, url: &str) -> Result<Triage, Error> {
        let LightResponse { status, body } = self.http.get(url).await?;
        if status.as_u16() == 404 {
            log::warn!("not found (404): {}", url);
            return Ok(Triage::NotFound);
        }
        if status.is_success() {
            return Ok(Triage::Usable(body));
        }
        log::warn!("lightweight fetch blocked ({}) for {}, escalating", status, url);
        Ok(Triage::Escalate)
    }
}

/// Known per-site chapter-content API patterns. Currently Novelight, whose
/// reader loads chapters through an AJAX endpoint keyed by chapter id.
pub fn chapter_api_url(chapter_url: &str) -> Option<String> {
    if !chapter_url.contains("novelight.net") {
        return None;
    }
    let re = Regex::new(r"chapter[/-](\d+)").unwrap();
    let id = re.captures(chapter_url)?.get(1)?.as_str();
    let origin = origin_of(chapter_url)?;
    Some(format!("{}/book/ajax/read-chapter/{}", origin, id))
}

/// Index pages that hide most of the chapter list behind an expander
/// button the browser has to click. Currently Novelight, whose listing
/// shows only the most recent chapters until expanded.
pub fn index_expand_selector(url: &str) -> Option<&'static str> {
    url.contains("novelight.net").then_some("#show-all-chapters")
}

fn origin_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{}://{}", parsed.scheme(), host))
}

fn text_wait_selector() -> String {
    TEXT_SELECTORS.join(", ")
}

fn image_wait_selector() -> String {
    IMAGE_SELECTORS.join(", ")
}

fn index_wait_selector() -> String {
    resolver::STRATEGIES
        .iter()
        .map(|s| s.container)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extract title and body text from chapter HTML. Returns `None` when no
/// container matches or the best match is shorter than `min_len` (a
/// "loading..." placeholder rather than real content).
pub fn extract_text_content(html: &str, min_len: usize) -> Option<ExtractedContent> {
    let document = Html::parse_document(html);

    let title = ["h1", "h2", "h3.title"]
        .iter()
        .filter_map(|sel| {
            let selector = Selector::parse(sel).ok()?;
            let el = document.select(&selector).next()?;
            let text = el.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .next();

    for sel in TEXT_SELECTORS {
        let selector = Selector::parse(sel).unwrap();
        if let Some(container) = document.select(&selector).next() {
            let body = visible_text(&container);
            if body.len() >= min_len {
                return Some(ExtractedContent { title, body });
            }
        }
    }
    None
}

/// Text extraction from an HTML fragment (chapter API responses).
pub fn text_from_fragment(fragment: &str) -> String {
    let doc = Html::parse_fragment(fragment);
    match doc.select(&Selector::parse("html").unwrap()).next() {
        Some(root) => visible_text(&root),
        None => String::new(),
    }
}

/// Collect the text of a container, skipping anything nested inside noise
/// tags, paragraphs separated by blank lines.
fn visible_text(root: &ElementRef) -> String {
    let mut out = String::new();
    for node in root.descendants() {
        if let Some(text) = node.value().as_text() {
            let mut noisy = false;
            let mut current = node.parent();
            while let Some(parent) = current {
                if parent.id() == root.id() {
                    break;
                }
                if let Some(el) = parent.value().as_element() {
                    if NOISE_TAGS.contains(&el.name()) {
                        noisy = true;
                        break;
                    }
                }
                current = parent.parent();
            }
            if !noisy {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    if !out.is_empty() {
                        out.push_str("\n\n");
                    }
                    out.push_str(trimmed);
                }
            }
        }
    }
    out
}

/// Ordered page-image URLs from reader containers; `src` preferred,
/// lazy-loading `data-src` as fallback, absolute HTTP only.
pub fn extract_page_images(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut out = Vec::new();
    for sel in IMAGE_SELECTORS {
        let selector = Selector::parse(sel).unwrap();
        for img in document.select(&selector) {
            let src = img
                .value()
                .attr("src")
                .filter(|s| s.starts_with("http"))
                .or_else(|| img.value().attr("data-src").filter(|s| s.starts_with("http")));
            if let Some(src) = src {
                if !out.contains(&src.to_string()) {
                    out.push(src.to_string());
                }
            }
        }
        if !out.is_empty() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubBrowser {
        html: Option<String>,
        calls: AtomicUsize,
        expands: std::sync::Mutex<Vec<Option<String>>>,
    }

    impl StubBrowser {
        fn with_html(html: &str) -> Self {
            Self {
                html: Some(html.to_string()),
                calls: AtomicUsize::new(0),
                expands: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn timing_out() -> Self {
            Self {
                html: None,
                calls: AtomicUsize::new(0),
                expands: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn expands(&self) -> Vec<Option<String>> {
            self.expands.lock().unwrap().clone()
        }
    }

    impl BrowserFetch for StubBrowser {
        fn fetch_html_when(
            &self,
            _url: &str,
            selector: &str,
            expand: Option<&str>,
        ) -> Result<String, BrowserError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.expands
                .lock()
                .unwrap()
                .push(expand.map(str::to_string));
            match &self.html {
                Some(html) => Ok(html.clone()),
                None => Err(BrowserError::Timeout(selector.to_string())),
            }
        }

        fn warm_up(&self, _origin: &str) -> Result<(), BrowserError> {
            Ok(())
        }
    }

    fn chapter_page(body: &str) -> String {
        format!(
            "<html><body><h1>Chapter 3: The Door</h1><div class=\"chapter-content\"><p>{}</p></div></body></html>",
            body
        )
    }

    fn long_body() -> String {
        "The corridor stretched on, lit by nothing but the lantern in her hand. ".repeat(5)
    }

    #[tokio::test]
    async fn not_found_is_terminal_without_escalation() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ch/99")
            .with_status(404)
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::with_html(&chapter_page(&long_body()));
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_text(&format!("{}/ch/99", server.url()))
            .await
            .unwrap();
        assert_eq!(out, FetchOutcome::NotFound);
        assert_eq!(browser.calls(), 0);
    }

    #[tokio::test]
    async fn blocked_status_escalates_exactly_once() {
        let mut server = mockito::Server::new_async().await;
        let light = server
            .mock("GET", "/ch/1")
            .with_status(503)
            .with_body("checking your browser")
            .expect(1)
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::with_html(&chapter_page(&long_body()));
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_text(&format!("{}/ch/1", server.url()))
            .await
            .unwrap();
        match out {
            FetchOutcome::Content(content) => {
                assert!(content.body.contains("corridor"));
                assert_eq!(content.title.as_deref(), Some("Chapter 3: The Door"));
            }
            other => panic!("expected content, got {:?}", other),
        }
        assert_eq!(browser.calls(), 1);
        light.assert_async().await;
    }

    #[tokio::test]
    async fn short_body_on_200_escalates() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ch/2")
            .with_status(200)
            .with_body(chapter_page("Loading..."))
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::with_html(&chapter_page(&long_body()));
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_text(&format!("{}/ch/2", server.url()))
            .await
            .unwrap();
        assert!(matches!(out, FetchOutcome::Content(_)));
        assert_eq!(browser.calls(), 1);
    }

    #[tokio::test]
    async fn good_200_never_touches_the_browser() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ch/3")
            .with_status(200)
            .with_body(chapter_page(&long_body()))
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::timing_out();
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_text(&format!("{}/ch/3", server.url()))
            .await
            .unwrap();
        assert!(matches!(out, FetchOutcome::Content(_)));
        assert_eq!(browser.calls(), 0);
    }

    #[tokio::test]
    async fn browser_timeout_reports_blocked() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ch/4")
            .with_status(403)
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::timing_out();
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_text(&format!("{}/ch/4", server.url()))
            .await
            .unwrap();
        assert_eq!(out, FetchOutcome::Blocked);
        assert_eq!(browser.calls(), 1);
    }

    #[tokio::test]
    async fn image_chapter_extraction() {
        let page = r#"<html><body><div id="readerarea">
            <img src="https://cdn.example.com/p1.webp">
            <img data-src="https://cdn.example.com/p2.webp">
            <img src="/relative/p3.webp">
        </div></body></html>"#;
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ch/5")
            .with_status(200)
            .with_body(page)
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::timing_out();
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_chapter_images(&format!("{}/ch/5", server.url()))
            .await
            .unwrap();
        assert_eq!(
            out,
            PageImages::Images(vec![
                "https://cdn.example.com/p1.webp".to_string(),
                "https://cdn.example.com/p2.webp".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn index_escalation_passes_the_expander_through() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/series/x")
            .with_status(503)
            .create_async()
            .await;

        let http = LightClient::new(Duration::from_secs(5)).unwrap();
        let browser = StubBrowser::with_html(
            r#"<html><body><ul><li class="wp-manga-chapter">
            <a href="https://a.example/ch-1">Chapter 1</a></li></ul></body></html>"#,
        );
        let fetcher = Fetcher::new(&http, &browser, 100);

        let out = fetcher
            .fetch_index(&format!("{}/series/x", server.url()))
            .await
            .unwrap();
        assert!(matches!(out, HtmlOutcome::Html(_)));
        // non-Novelight host, so no expander click is requested
        assert_eq!(browser.expands(), vec![None]);
    }

    #[test]
    fn collapsed_listing_sites_get_an_expander() {
        assert_eq!(
            index_expand_selector("https://novelight.net/book/some-novel"),
            Some("#show-all-chapters")
        );
        assert_eq!(index_expand_selector("https://a.example/series/x"), None);
    }

    #[test]
    fn chapter_api_url_matches_known_site_only() {
        assert_eq!(
            chapter_api_url("https://novelight.net/book/some-novel/chapter/4821"),
            Some("https://novelight.net/book/ajax/read-chapter/4821".to_string())
        );
        assert_eq!(
            chapter_api_url("https://novelight.net/book/some-novel/chapter-77"),
            Some("https://novelight.net/book/ajax/read-chapter/77".to_string())
        );
        assert_eq!(chapter_api_url("https://example.com/chapter/4821"), None);
    }

    #[test]
    fn fragment_text_strips_markup() {
        let body = text_from_fragment("<p>First line.</p><script>evil()</script><p>Second line.</p>");
        assert_eq!(body, "First line.\n\nSecond line.");
    }

    #[test]
    fn noise_tags_are_stripped_from_content() {
        let html = format!(
            "<html><body><div class=\"entry-content\"><p>{}</p><a href=\"#\">Next Chapter</a><script>track()</script></div></body></html>",
            long_body()
        );
        let content = extract_text_content(&html, 100).unwrap();
        assert!(!content.body.contains("Next Chapter"));
        assert!(!content.body.contains("track()"));
    }
}
