use thiserror::Error;

/// Top-level pipeline error. Component seams return explicit outcome enums
/// (`FetchOutcome`, `IngestOutcome`, `TranslateOutcome`) for expected
/// conditions; this type carries the genuinely exceptional ones.
#[derive(Debug, Error)]
pub enum Error {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),

    #[error("content store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("media rejected: {0}")]
    Media(String),
}

/// Headless browser failures. `Timeout` is the "no known content selector
/// appeared" case and maps to a blocked fetch rather than a hard error.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("timed out waiting for selector {0}")]
    Timeout(String),

    #[error("browser session error: {0}")]
    Session(String),
}

/// Content-store failure classes, mirroring how the pipeline must react:
/// a 4xx is a permanent rejection (log and skip the item), a 5xx or
/// transport failure is retryable on the next scheduled pass.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rejected by content API (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("content API unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::Rejected { .. })
    }
}
