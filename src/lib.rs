//! serialbot: content acquisition for a serial-fiction reading platform.
//!
//! A scheduled crawler walks a list of series sources, resolves each
//! site's chapter-list structure, fetches new chapters (plain HTTP first,
//! headless browser when blocked), optionally machine-translates novel
//! text, and hands everything to the platform's content API exactly once
//! per chapter. A media pipeline keeps covers and comic pages valid on
//! disk, and a view-rate limiter backs the platform's view counting.

pub mod browser_client;
pub mod config;
pub mod crawler;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod ingest;
pub mod media;
pub mod metrics;
pub mod models;
pub mod resolver;
pub mod store;
pub mod translator;
pub mod view_limiter;

pub use error::Error;
