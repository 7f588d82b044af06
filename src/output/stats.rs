//! Crawl statistics
//!
//! Counters are updated from many worker tasks at once, so every operation
//! is a single atomic access. Reading several counters is not a consistent
//! snapshot, but the crawler bumps them in the order total, unique, fetched,
//! and [`CrawlStats::snapshot`] reads them in reverse, so a snapshot always
//! satisfies `total >= unique >= fetched`.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters collected during a crawl
///
/// Implementations must be safe to update from arbitrary worker tasks.
/// A custom implementation can be plugged in with
/// [`CrawlerBuilder::statistics`](crate::crawler::CrawlerBuilder::statistics).
pub trait CrawlStats: Send + Sync {
    /// Records one page handled by a fetch callback
    fn add_page(&self);
    fn pages_count(&self) -> u64;

    /// Records one `run`/`visit` call, whatever its outcome
    fn add_total_discovered(&self);
    fn total_discovered(&self) -> u64;

    /// Records one URL admitted for the first time
    fn add_unique_discovered(&self);
    fn unique_discovered(&self) -> u64;

    /// Records one successful HTML fetch handed to callbacks
    fn add_total_fetched(&self);
    fn total_fetched(&self) -> u64;

    /// Reads every counter once
    fn snapshot(&self) -> StatsSnapshot {
        let total_fetched = self.total_fetched();
        let unique_discovered = self.unique_discovered();
        let total_discovered = self.total_discovered();
        StatsSnapshot {
            pages: self.pages_count(),
            total_discovered,
            unique_discovered,
            total_fetched,
        }
    }
}

/// Lock-free in-memory counters
#[derive(Debug, Default)]
pub struct InMemoryStats {
    pages: AtomicU64,
    total_discovered: AtomicU64,
    unique_discovered: AtomicU64,
    total_fetched: AtomicU64,
}

impl InMemoryStats {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CrawlStats for InMemoryStats {
    fn add_page(&self) {
        self.pages.fetch_add(1, Ordering::SeqCst);
    }

    fn pages_count(&self) -> u64 {
        self.pages.load(Ordering::SeqCst)
    }

    fn add_total_discovered(&self) {
        self.total_discovered.fetch_add(1, Ordering::SeqCst);
    }

    fn total_discovered(&self) -> u64 {
        self.total_discovered.load(Ordering::SeqCst)
    }

    fn add_unique_discovered(&self) {
        self.unique_discovered.fetch_add(1, Ordering::SeqCst);
    }

    fn unique_discovered(&self) -> u64 {
        self.unique_discovered.load(Ordering::SeqCst)
    }

    fn add_total_fetched(&self) {
        self.total_fetched.fetch_add(1, Ordering::SeqCst);
    }

    fn total_fetched(&self) -> u64 {
        self.total_fetched.load(Ordering::SeqCst)
    }
}

/// Point-in-time copy of the crawl counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Pages handled by fetch callbacks
    pub pages: u64,

    /// Every `run`/`visit` call, including rejected and duplicate URLs
    pub total_discovered: u64,

    /// Distinct URLs admitted for fetching
    pub unique_discovered: u64,

    /// Successful HTML fetches that reached the callbacks
    pub total_fetched: u64,
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total: {}, Uniq: {}, Fetched: {}",
            self.total_discovered, self.unique_discovered, self.total_fetched
        )
    }
}

/// Prints the end-of-crawl summary to stdout
pub fn print_statistics(stats: &StatsSnapshot) {
    println!("{}", stats);
    if stats.pages > 0 {
        println!("Pages handled: {}", stats.pages);
    }
}
