use crate::error::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Newline-delimited list of series URLs, re-read on every pass so
    /// operators can edit it without restarting the process.
    #[serde(default = "default_source_list")]
    pub source_list: String,

    /// Root of the media tree: {media_dir}/covers/..., {media_dir}/images/...
    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_base")]
    pub base_url: String,

    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Pause between chapter translations. The free quota tier is limited
    /// per minute, so this defaults to a full minute.
    #[serde(default = "default_translate_pause")]
    pub request_pause_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Sleep between full passes over the source list.
    #[serde(default = "default_pass_interval")]
    pub pass_interval_secs: u64,

    /// Politeness pause between series within a pass.
    #[serde(default = "default_series_pause")]
    pub series_pause_secs: u64,

    /// Backoff after a loop-level failure before the next pass.
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    /// Timeout for lightweight HTTP requests in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// How long the browser waits for a known content selector to appear.
    #[serde(default = "default_browser_timeout")]
    pub browser_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub browser_headless: bool,

    /// Skip image loading in the browser (faster page loads).
    #[serde(default = "default_true")]
    pub browser_disable_images: bool,

    /// Bodies shorter than this are treated as placeholder pages
    /// ("loading...") and trigger browser escalation.
    #[serde(default = "default_min_body_len")]
    pub min_body_len: usize,
}

fn default_source_list() -> String {
    "sources.txt".to_string()
}
fn default_media_dir() -> String {
    "media".to_string()
}
fn default_api_base() -> String {
    "http://127.0.0.1:8000".to_string()
}
fn default_api_timeout() -> u64 {
    15
}
fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}
fn default_target_language() -> String {
    "Turkish".to_string()
}
fn default_translate_pause() -> u64 {
    60
}
fn default_pass_interval() -> u64 {
    1800
}
fn default_series_pause() -> u64 {
    5
}
fn default_error_backoff() -> u64 {
    30
}
fn default_http_timeout() -> u64 {
    30
}
fn default_browser_timeout() -> u64 {
    20
}
fn default_min_body_len() -> usize {
    100
}
fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_api_timeout(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            target_language: default_target_language(),
            request_pause_secs: default_translate_pause(),
        }
    }
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            pass_interval_secs: default_pass_interval(),
            series_pause_secs: default_series_pause(),
            error_backoff_secs: default_error_backoff(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            browser_timeout_secs: default_browser_timeout(),
            browser_headless: true,
            browser_disable_images: true,
            min_body_len: default_min_body_len(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_list: default_source_list(),
            media_dir: default_media_dir(),
            api: ApiConfig::default(),
            translation: TranslationConfig::default(),
            crawl: CrawlConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let path = Path::new("config.toml");
        if path.exists() {
            if let Ok(content) = fs::read_to_string(path) {
                match toml::from_str::<Config>(&content) {
                    Ok(cfg) => return cfg,
                    Err(e) => log::warn!("config.toml invalid, using defaults: {}", e),
                }
            }
        }
        Self::default()
    }
}

/// Collect the ordered translation credential pool from the environment:
/// TRANSLATE_API_KEY, TRANSLATE_API_KEY_2, TRANSLATE_API_KEY_3, ...
/// Stops at the first gap after the base key.
pub fn credentials_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    if let Ok(k) = std::env::var("TRANSLATE_API_KEY") {
        if !k.is_empty() {
            keys.push(k);
        }
    }
    for i in 2.. {
        match std::env::var(format!("TRANSLATE_API_KEY_{}", i)) {
            Ok(k) if !k.is_empty() => keys.push(k),
            _ => break,
        }
    }
    keys
}

/// Read and filter the source list: one URL (or URL template with a {num}
/// placeholder) per line, blank lines and `#` comments ignored.
pub fn read_source_list(path: &str) -> Result<Vec<String>, Error> {
    let content = fs::read_to_string(path)?;
    Ok(parse_source_list(&content))
}

pub fn parse_source_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}
