//! The scheduler loop: periodic passes over the source list, one browser
//! session per pass, per-series failure isolation.
//!
//! Nothing in a pass retries in place. Blocked and missing items are
//! logged, counted, and picked up again on the next pass, which keeps the
//! loop simple and the politeness budget predictable.

use crate::browser_client::{BrowserClient, BrowserConfig, BrowserFetch};
use crate::config::{read_source_list, Config};
use crate::error::Error;
use crate::fetcher::{FetchOutcome, Fetcher, HtmlOutcome, PageImages};
use crate::http_client::LightClient;
use crate::ingest::{self, scrape_series_page, IngestOutcome};
use crate::media::MediaPipeline;
use crate::metrics::PassMetrics;
use crate::models::{format_chapter_number, ChapterContent, ChapterRef, Series, SeriesKind};
use crate::resolver;
use crate::store::ContentStore;
use crate::translator::{TranslateOutcome, TranslationClient};
use log::{error, info, warn};
use std::path::Path;
use std::time::Duration;

/// Upper bound on sequential probes against a URL template in one pass.
const MAX_TEMPLATE_PROBES: usize = 50;

/// One line of the source list, parsed. A `comic` or `novel` prefix picks
/// the content kind (novel when absent); a `{num}` placeholder marks a
/// sequential-numbering template instead of an index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub kind: SeriesKind,
    pub target: SourceTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTarget {
    Index(String),
    Template(String),
}

pub fn classify_source(line: &str) -> SourceEntry {
    let (kind, rest) = match line.split_once(char::is_whitespace) {
        Some((prefix, rest)) if prefix.eq_ignore_ascii_case("comic") => {
            (SeriesKind::Comic, rest.trim())
        }
        Some((prefix, rest)) if prefix.eq_ignore_ascii_case("novel") => {
            (SeriesKind::Novel, rest.trim())
        }
        _ => (SeriesKind::Novel, line),
    };
    let target = if rest.contains("{num}") {
        SourceTarget::Template(rest.to_string())
    } else {
        SourceTarget::Index(rest.to_string())
    };
    SourceEntry { kind, target }
}

/// Series title for a template source, derived from the URL path since no
/// index page exists: last path segment, placeholder removed, words
/// capitalized.
pub fn series_title_from_template(template: &str) -> String {
    let path = template.split(['?', '#']).next().unwrap_or(template);
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .find(|s| !s.is_empty() && *s != "{num}")
        .unwrap_or("untitled");
    let cleaned = segment
        .replace("{num}", "")
        .replace(['-', '_'], " ")
        .trim()
        .to_string();
    let mut title = String::with_capacity(cleaned.len());
    for word in cleaned.split_whitespace() {
        if !title.is_empty() {
            title.push(' ');
        }
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            title.extend(first.to_uppercase());
            title.push_str(chars.as_str());
        }
    }
    if title.is_empty() {
        "Untitled Series".to_string()
    } else {
        title
    }
}

pub struct Crawler<S: ContentStore> {
    config: Config,
    store: S,
    translator: TranslationClient,
    http: LightClient,
}

impl<S: ContentStore> Crawler<S> {
    pub fn new(config: Config, store: S, translator: TranslationClient) -> Result<Self, Error> {
        let http = LightClient::new(Duration::from_secs(config.fetch.timeout_secs))?;
        Ok(Self {
            config,
            store,
            translator,
            http,
        })
    }

    /// Run passes forever. Each pass gets a fresh browser session which is
    /// closed before the inter-pass sleep, whatever happened inside.
    pub async fn run(&self) {
        let mut pass: u64 = 0;
        loop {
            pass += 1;
            info!("starting pass {}", pass);

            match BrowserClient::launch(self.browser_config()) {
                Ok(browser) => {
                    let metrics = run_pass(
                        &self.config,
                        &self.store,
                        &self.translator,
                        &self.http,
                        &browser,
                        pass,
                    )
                    .await;
                    browser.close();
                    metrics.log_summary(pass);
                }
                Err(e) => {
                    error!("browser launch failed, backing off: {}", e);
                    tokio::time::sleep(Duration::from_secs(self.config.crawl.error_backoff_secs))
                        .await;
                    continue;
                }
            }

            tokio::time::sleep(Duration::from_secs(self.config.crawl.pass_interval_secs)).await;
        }
    }

    fn browser_config(&self) -> BrowserConfig {
        BrowserConfig {
            headless: self.config.fetch.browser_headless,
            disable_images: self.config.fetch.browser_disable_images,
            wait_timeout: Duration::from_secs(self.config.fetch.browser_timeout_secs),
            ..BrowserConfig::default()
        }
    }
}

/// One full pass over the source list. Never fails: every per-series error
/// is logged and counted, and the pass moves on.
pub async fn run_pass<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    translator: &TranslationClient,
    http: &LightClient,
    browser: &B,
    pass: u64,
) -> PassMetrics {
    let mut metrics = PassMetrics::default();

    // Fresh read each pass so operators can edit the list live.
    let sources = match read_source_list(&config.source_list) {
        Ok(sources) => sources,
        Err(e) => {
            error!("cannot read source list {}: {}", config.source_list, e);
            return metrics;
        }
    };
    info!("pass {}: {} sources", pass, sources.len());

    let pipeline = MediaPipeline::new(http.inner(), &config.media_dir);
    let fetcher = Fetcher::new(http, browser, config.fetch.min_body_len);

    for line in &sources {
        let entry = classify_source(line);
        metrics.series_visited += 1;

        let result = match &entry.target {
            SourceTarget::Index(url) => {
                process_index_source(
                    config, store, translator, &fetcher, &pipeline, url, entry.kind, &mut metrics,
                )
                .await
            }
            SourceTarget::Template(template) => {
                process_template_source(
                    config, store, translator, &fetcher, &pipeline, template, entry.kind,
                    &mut metrics,
                )
                .await
            }
        };
        if let Err(e) = result {
            metrics.series_failed += 1;
            error!("source {} failed: {}", line, e);
        }

        tokio::time::sleep(Duration::from_secs(config.crawl.series_pause_secs)).await;
    }

    // Media repair runs at pass end against everything the platform
    // references, not just what this pass touched.
    match store.media_refs().await {
        Ok(refs) => {
            if let Err(e) = pipeline.repair(&refs).await {
                error!("media repair failed: {}", e);
            }
        }
        Err(e) => warn!("could not list media references for repair: {}", e),
    }

    metrics
}

async fn process_index_source<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    translator: &TranslationClient,
    fetcher: &Fetcher<'_, B>,
    pipeline: &MediaPipeline<'_>,
    url: &str,
    kind: SeriesKind,
    metrics: &mut PassMetrics,
) -> Result<(), Error> {
    let html = match fetcher.fetch_index(url).await? {
        HtmlOutcome::Html(html) => html,
        HtmlOutcome::Blocked => {
            warn!("index blocked: {}", url);
            metrics.fetches_blocked += 1;
            return Ok(());
        }
        HtmlOutcome::NotFound => {
            warn!("index gone (404): {}", url);
            return Ok(());
        }
    };

    let series = ingest::get_or_create_series(store, url, &html, kind).await?;
    ensure_cover(config, store, pipeline, &series, &html).await;

    let mut chapters = match resolver::resolve(&html) {
        Some(resolution) if !resolution.chapters.is_empty() => resolution.chapters,
        _ => {
            warn!("site structure unrecognized for {}", url);
            metrics.unrecognized_structures += 1;
            return Ok(());
        }
    };

    // Strictly ascending so a mid-pass failure never leaves a gap below
    // the latest stored chapter.
    chapters.sort_by(|a, b| a.number.total_cmp(&b.number));
    chapters.dedup_by(|a, b| a.number == b.number);

    for chapter in &chapters {
        if !ingest::chapter_needed(store, series.id, chapter.number).await? {
            metrics.chapters_skipped += 1;
            continue;
        }
        process_chapter(config, store, translator, fetcher, pipeline, &series, chapter, metrics)
            .await?;
    }
    Ok(())
}

async fn process_template_source<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    translator: &TranslationClient,
    fetcher: &Fetcher<'_, B>,
    pipeline: &MediaPipeline<'_>,
    template: &str,
    kind: SeriesKind,
    metrics: &mut PassMetrics,
) -> Result<(), Error> {
    let title = series_title_from_template(template);
    let series = ingest::get_or_create_named(store, template, &title, kind).await?;

    let mut next = match store.latest_chapter_number(series.id).await? {
        Some(latest) => latest.floor() as i64 + 1,
        None => 1,
    };

    for _ in 0..MAX_TEMPLATE_PROBES {
        let url = template.replace("{num}", &next.to_string());
        let chapter = ChapterRef {
            number: next as f64,
            url,
        };
        let before_created = metrics.chapters_created;
        let before_blocked = metrics.fetches_blocked;
        process_chapter(config, store, translator, fetcher, pipeline, &series, &chapter, metrics)
            .await?;
        if metrics.chapters_created == before_created {
            // 404 (end of the series so far) or blocked; either way the
            // probe sequence stops here until the next pass.
            if metrics.fetches_blocked > before_blocked {
                warn!("template probing for {} stopped: blocked", series.slug);
            }
            break;
        }
        next += 1;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn process_chapter<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    translator: &TranslationClient,
    fetcher: &Fetcher<'_, B>,
    pipeline: &MediaPipeline<'_>,
    series: &Series,
    chapter: &ChapterRef,
    metrics: &mut PassMetrics,
) -> Result<(), Error> {
    match series.kind {
        SeriesKind::Novel => {
            process_text_chapter(config, store, translator, fetcher, series, chapter, metrics)
                .await
        }
        SeriesKind::Comic => {
            process_image_chapter(config, store, fetcher, pipeline, series, chapter, metrics).await
        }
    }
}

async fn process_text_chapter<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    translator: &TranslationClient,
    fetcher: &Fetcher<'_, B>,
    series: &Series,
    chapter: &ChapterRef,
    metrics: &mut PassMetrics,
) -> Result<(), Error> {
    let content = match fetcher.fetch_chapter_text(&chapter.url).await? {
        FetchOutcome::Content(content) => content,
        FetchOutcome::Blocked => {
            warn!("{} chapter {} blocked", series.slug, chapter.number);
            metrics.fetches_blocked += 1;
            return Ok(());
        }
        FetchOutcome::NotFound => {
            warn!("{} chapter {} not found", series.slug, chapter.number);
            return Ok(());
        }
    };

    let raw_title = content
        .title
        .unwrap_or_else(|| format!("Chapter {}", format_chapter_number(chapter.number)));

    let (title, body) = match translator
        .translate(&raw_title, &content.body, &series.title)
        .await
    {
        TranslateOutcome::Translated { title, body } => (title, body),
        TranslateOutcome::Original => {
            metrics.translations_fallen_back += 1;
            (raw_title, content.body)
        }
    };

    match ingest::ingest_chapter(
        store,
        series,
        chapter.number,
        &title,
        ChapterContent::Text { body },
    )
    .await?
    {
        IngestOutcome::Created => {
            metrics.chapters_created += 1;
            // Quota pacing between translation requests.
            tokio::time::sleep(Duration::from_secs(config.translation.request_pause_secs)).await;
        }
        IngestOutcome::Skipped => metrics.chapters_skipped += 1,
    }
    Ok(())
}

async fn process_image_chapter<S: ContentStore, B: BrowserFetch>(
    config: &Config,
    store: &S,
    fetcher: &Fetcher<'_, B>,
    pipeline: &MediaPipeline<'_>,
    series: &Series,
    chapter: &ChapterRef,
    metrics: &mut PassMetrics,
) -> Result<(), Error> {
    let urls = match fetcher.fetch_chapter_images(&chapter.url).await? {
        PageImages::Images(urls) => urls,
        PageImages::Blocked => {
            warn!("{} chapter {} blocked", series.slug, chapter.number);
            metrics.fetches_blocked += 1;
            return Ok(());
        }
        PageImages::NotFound => {
            warn!("{} chapter {} not found", series.slug, chapter.number);
            return Ok(());
        }
    };

    let mut stored = Vec::new();
    for (i, url) in urls.iter().enumerate() {
        match pipeline.store_page(&series.slug, chapter.number, i + 1, url).await {
            Ok(rel) => stored.push(rel),
            Err(e) => warn!(
                "{} chapter {} page {} dropped: {}",
                series.slug,
                chapter.number,
                i + 1,
                e
            ),
        }
    }
    if stored.is_empty() {
        warn!(
            "{} chapter {}: no page survived download, skipping ingest",
            series.slug, chapter.number
        );
        return Ok(());
    }

    let title = format!("Chapter {}", format_chapter_number(chapter.number));
    match ingest::ingest_chapter(
        store,
        series,
        chapter.number,
        &title,
        ChapterContent::Pages { images: stored },
    )
    .await?
    {
        IngestOutcome::Created => {
            metrics.chapters_created += 1;
            tokio::time::sleep(Duration::from_secs(config.crawl.series_pause_secs)).await;
        }
        IngestOutcome::Skipped => metrics.chapters_skipped += 1,
    }
    Ok(())
}

/// Make sure the series has a cover on disk: download one when none is
/// recorded, re-download when the recorded file has gone missing.
async fn ensure_cover<S: ContentStore>(
    config: &Config,
    store: &S,
    pipeline: &MediaPipeline<'_>,
    series: &Series,
    index_html: &str,
) {
    let needs_cover = match &series.cover_image {
        None => true,
        Some(rel) => !Path::new(&config.media_dir).join(rel.trim_start_matches('/')).exists(),
    };
    if !needs_cover {
        return;
    }
    let Some(cover_url) = scrape_series_page(index_html).cover_url else {
        return;
    };
    match pipeline.store_cover(&series.slug, &cover_url).await {
        Ok(rel) => {
            if let Err(e) = store.update_series_cover(series.id, &rel).await {
                warn!("cover update for {} failed: {}", series.slug, e);
            }
        }
        Err(e) => warn!("cover download for {} failed: {}", series.slug, e),
    }
}
