//! Lightweight fetch mode: a plain HTTP client dressed up as a browser.
//!
//! Fast and stateless, no script execution. Blocking responses are not
//! retried here; the fetch orchestrator escalates them to the headless
//! browser instead, and transport failures surface to the scheduler which
//! retries on the next pass.

use reqwest::{Client, ClientBuilder, StatusCode};
use std::time::Duration;

/// User agents rotated per request to avoid trivial fingerprinting.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

/// Status and body of a lightweight fetch. Status triage is the
/// orchestrator's job; this type just carries both up.
#[derive(Debug)]
pub struct LightResponse {
    pub status: StatusCode,
    pub body: String,
}

pub struct LightClient {
    client: Client,
}

impl LightClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".parse().unwrap());
        headers.insert("Accept-Language", "en-US,en;q=0.9".parse().unwrap());
        headers.insert("DNT", "1".parse().unwrap());
        headers.insert("Upgrade-Insecure-Requests", "1".parse().unwrap());
        headers.insert("Sec-Fetch-Dest", "document".parse().unwrap());
        headers.insert("Sec-Fetch-Mode", "navigate".parse().unwrap());
        headers.insert("Sec-Fetch-Site", "none".parse().unwrap());

        let client = ClientBuilder::new()
            .timeout(timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .referer(false)
            .default_headers(headers)
            .build()?;

        Ok(Self { client })
    }

    fn random_user_agent() -> &'static str {
        use rand::Rng;
        let index = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        USER_AGENTS[index]
    }

    /// Single attempt, no retry loop. Returns the status and body even for
    /// error statuses so the caller can triage (404 vs 403/503 vs 200).
    pub async fn get(&self, url: &str) -> Result<LightResponse, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", Self::random_user_agent())
            .header("Referer", "https://www.google.com/")
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        Ok(LightResponse { status, body })
    }

    /// GET expecting a JSON payload; used by per-site chapter-content API
    /// shortcuts.
    pub async fn get_json(&self, url: &str) -> Result<(StatusCode, serde_json::Value), reqwest::Error> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", Self::random_user_agent())
            .header("X-Requested-With", "XMLHttpRequest")
            .send()
            .await?;
        let status = response.status();
        let value = response.json().await.unwrap_or(serde_json::Value::Null);
        Ok((status, value))
    }

    /// The underlying client, shared with the media pipeline for image
    /// downloads (keeps the cookie jar and headers consistent).
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds() {
        assert!(LightClient::new(Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn user_agent_pool() {
        let ua = LightClient::random_user_agent();
        assert!(USER_AGENTS.contains(&ua));
    }

    #[tokio::test]
    async fn get_returns_status_without_erroring() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/blocked")
            .with_status(503)
            .with_body("checking your browser")
            .create_async()
            .await;

        let client = LightClient::new(Duration::from_secs(5)).unwrap();
        let resp = client.get(&format!("{}/blocked", server.url())).await.unwrap();
        assert_eq!(resp.status.as_u16(), 503);
        assert!(resp.body.contains("checking"));
    }
}
