//! Sitecrawl: a concurrent, domain-bounded web crawler
//!
//! This crate fetches HTML pages starting from a seed URL, extracts and
//! normalizes their links, deduplicates them, and schedules in-domain links
//! for fetching under a fixed concurrency budget with cooperative
//! cancellation.

pub mod config;
pub mod crawler;
pub mod output;
pub mod url;

use thiserror::Error;

/// Main error type for Sitecrawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("A crawler must be built inside a Tokio runtime")]
    NoRuntime,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),
}

/// Reasons a discovered URL is refused before it is scheduled
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("empty URL")]
    EmptyUrl,

    #[error("could not parse URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        source: ::url::ParseError,
    },

    #[error("domain '{domain}' not allowed")]
    DomainNotAllowed { domain: String },

    #[error("url '{url}' already crawled")]
    AlreadyCrawled { url: String },

    #[error("crawl session is closed")]
    SessionClosed,
}

impl AdmissionError {
    /// Returns true for rejections that are routine during a crawl
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::DomainNotAllowed { .. } | Self::AlreadyCrawled { .. })
    }
}

/// Why a link could not be resolved into a fetchable URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkRejection {
    #[error("could not parse reference: {0}")]
    Unparseable(String),

    #[error("scheme {0} not supported")]
    UnsupportedScheme(String),

    #[error("reference has wrong format: {0}")]
    Malformed(String),
}

/// Errors produced by a fetch capability
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("url: {url}, status: {status}")]
    Status { url: String, status: u16 },

    #[error("fetch of {url} cancelled")]
    Cancelled { url: String },

    #[error("fetch of {url} failed: {message}")]
    Other { url: String, message: String },
}

/// Result type alias for crawl operations
pub type CrawlResult<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Crawler, CrawlerBuilder, Request, Response};
pub use output::{CrawlStats, InMemoryStats, StatsSnapshot};
pub use crate::url::{resolve, Link};
