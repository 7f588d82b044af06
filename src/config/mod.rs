//! Configuration module for Sitecrawl
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Every key has a default, so an empty file is a valid configuration.
//!
//! # Example
//!
//! ```no_run
//! use sitecrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sitecrawl.toml")).unwrap();
//! println!("Crawler will run {} fetches at once", config.crawler.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, CrawlerConfig, HttpConfig};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::{validate, validate_allowed_domain, MAX_CONCURRENCY};
