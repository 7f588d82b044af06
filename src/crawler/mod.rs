//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - URL admission (allowlist and deduplication)
//! - HTTP fetching behind the [`Fetcher`] capability
//! - Streaming link extraction from HTML
//! - Slot-limited scheduling with cooperative cancellation
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod guard;
mod parser;
mod scheduler;

pub use coordinator::{Crawler, CrawlerBuilder, FetchedHandler};
pub use fetcher::{build_http_client, Fetcher, HttpFetcher, Request, Response};
pub use guard::AdmissionGuard;
pub use parser::{extract_refs, Extractor, ExtractorOptions, HtmlExtractor};
pub use scheduler::{PendingWork, Slot, SlotAcquire, SlotPool, WorkUnit};

pub use crate::url::Fingerprint;
