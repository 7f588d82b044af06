//! Admission of URLs into the crawl
//!
//! Every `run`/`visit` passes through [`AdmissionGuard::admit`], which checks
//! the URL and marks it as seen in one step. The seen-set lives behind a
//! single mutex, so for any given URL exactly one caller is ever admitted.

use crate::output::CrawlStats;
use crate::url::{domain_allowed, hostname, Fingerprint};
use crate::AdmissionError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

pub struct AdmissionGuard {
    /// Exact hostnames that may be crawled (empty allows all)
    allowed_domains: Vec<String>,
    /// Fingerprints of every admitted URL
    seen: Mutex<HashSet<Fingerprint>>,
    stats: Arc<dyn CrawlStats>,
}

impl AdmissionGuard {
    pub fn new(allowed_domains: Vec<String>, stats: Arc<dyn CrawlStats>) -> Self {
        Self {
            allowed_domains,
            seen: Mutex::new(HashSet::new()),
            stats,
        }
    }

    /// Decides whether `raw_url` gets fetched
    ///
    /// Checks run in order: empty input, absolute-URL parse, domain
    /// allowlist, then deduplication. The total-discovered counter is bumped
    /// for every call; the unique counter only when the URL is admitted.
    ///
    /// Deduplication keys on the literal string, so callers should pass
    /// resolved URLs to get canonical deduplication.
    pub fn admit(&self, raw_url: &str) -> Result<Url, AdmissionError> {
        self.stats.add_total_discovered();

        if raw_url.is_empty() {
            return Err(AdmissionError::EmptyUrl);
        }

        let url = Url::parse(raw_url).map_err(|source| AdmissionError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;

        if !self.allowed_domains.is_empty() {
            let host = hostname(&url).unwrap_or_default();
            if !domain_allowed(&self.allowed_domains, host) {
                return Err(AdmissionError::DomainNotAllowed {
                    domain: host.to_string(),
                });
            }
        }

        let fingerprint = Fingerprint::of(raw_url);
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if !seen.insert(fingerprint) {
            return Err(AdmissionError::AlreadyCrawled {
                url: raw_url.to_string(),
            });
        }
        self.stats.add_unique_discovered();

        Ok(url)
    }

    /// Number of distinct URLs admitted so far
    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }
}
