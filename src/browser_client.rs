//! Headless fetch mode: a real browser session for sites that gate content
//! behind script execution or interactive anti-bot checks.
//!
//! One session per crawler pass, acquired at pass start and released with
//! an explicit `close()` at pass end. Cookies and challenge clearances
//! accumulate across pages within a pass, which is what gets us through
//! the stricter WAFs.

use crate::error::BrowserError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// How long to wait for a known content selector before giving up.
    pub wait_timeout: Duration,
    pub disable_images: bool,
    pub user_agent: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            wait_timeout: Duration::from_secs(20),
            disable_images: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
        }
    }
}

/// Seam between the fetch orchestrator and the real browser, so escalation
/// logic can be exercised against a stub session.
pub trait BrowserFetch {
    /// Navigate to `url`, wait until `selector` appears (bounded by the
    /// session timeout), and return the rendered HTML. A timeout means the
    /// page never produced recognizable content; the caller treats that
    /// as blocked. When `expand` is given and matches an element, it is
    /// clicked before the HTML is collected (show-all-chapters buttons).
    fn fetch_html_when(
        &self,
        url: &str,
        selector: &str,
        expand: Option<&str>,
    ) -> Result<String, BrowserError>;

    /// Visit a site's root page before a protected inner page, letting the
    /// WAF set its cookies against a plausible navigation pattern.
    fn warm_up(&self, origin: &str) -> Result<(), BrowserError>;
}

pub struct BrowserClient {
    browser: Browser,
    config: BrowserConfig,
}

impl BrowserClient {
    pub fn launch(config: BrowserConfig) -> Result<Self, BrowserError> {
        use std::ffi::OsStr;

        let images_arg = if config.disable_images {
            Some("--blink-settings=imagesEnabled=false".to_string())
        } else {
            None
        };
        let user_agent_arg = format!("--user-agent={}", config.user_agent);

        let mut args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-setuid-sandbox"),
        ];
        if let Some(ref img) = images_arg {
            args.push(OsStr::new(img));
        }
        args.push(OsStr::new(&user_agent_arg));

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .args(args)
            .build()
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| BrowserError::Session(e.to_string()))?;

        Ok(Self { browser, config })
    }

    fn open_tab(&self, url: &str) -> Result<Arc<Tab>, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        // Hide the automation tells before any site script runs.
        let stealth = r#"
            Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
            Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
            Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
        "#;
        tab.evaluate(stealth, false)
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        tab.navigate_to(url)
            .map_err(|e| BrowserError::Session(e.to_string()))?
            .wait_until_navigated()
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        Ok(tab)
    }

    /// Release the session. Dropping would eventually kill the process
    /// anyway, but pass teardown calls this explicitly so cleanup is not
    /// tied to drop order.
    pub fn close(self) {
        log::debug!("browser session closed");
        drop(self.browser);
    }
}

impl BrowserFetch for BrowserClient {
    fn fetch_html_when(
        &self,
        url: &str,
        selector: &str,
        expand: Option<&str>,
    ) -> Result<String, BrowserError> {
        log::info!("browser fetch: {}", url);
        let tab = self.open_tab(url)?;

        if tab
            .wait_for_element_with_custom_timeout(selector, self.config.wait_timeout)
            .is_err()
        {
            let _ = tab.close(true);
            return Err(BrowserError::Timeout(selector.to_string()));
        }

        if let Some(button) = expand {
            if let Ok(element) = tab.find_element(button) {
                log::debug!("expanding collapsed listing via {}", button);
                if element.click().is_ok() {
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }

        // Brief settle for late-running scripts that rewrite the content.
        std::thread::sleep(Duration::from_millis(500));

        let html = tab
            .get_content()
            .map_err(|e| BrowserError::Session(e.to_string()))?;
        let _ = tab.close(true);
        Ok(html)
    }

    fn warm_up(&self, origin: &str) -> Result<(), BrowserError> {
        use rand::Rng;
        log::debug!("warming up session at {}", origin);
        let tab = self.open_tab(origin)?;
        // Linger like a human would before clicking through.
        let pause = rand::thread_rng().gen_range(2000..5000);
        std::thread::sleep(Duration::from_millis(pause));
        let _ = tab.close(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert!(config.disable_images);
        assert_eq!(config.wait_timeout, Duration::from_secs(20));
    }

    #[test]
    #[ignore] // requires a local Chrome/Chromium install
    fn launch_and_fetch() {
        let client = BrowserClient::launch(BrowserConfig::default()).unwrap();
        let html = client
            .fetch_html_when("https://example.com", "body", None)
            .unwrap();
        assert!(html.contains("Example Domain"));
        client.close();
    }
}
