//! Output module for crawl statistics
//!
//! This module handles:
//! - Concurrency-safe crawl counters
//! - Read-only snapshots of those counters
//! - Printing the end-of-crawl summary

pub mod stats;

pub use stats::{print_statistics, CrawlStats, InMemoryStats, StatsSnapshot};
