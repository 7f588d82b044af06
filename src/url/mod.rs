//! URL handling module for Sitecrawl
//!
//! This module provides the link model, reference resolution and
//! normalization, hostname extraction with exact allowlist matching, and
//! URL fingerprints used for deduplication.

mod domain;
mod fingerprint;
mod link;
mod resolve;

// Re-export main types and functions
pub use domain::{domain_allowed, hostname};
pub use fingerprint::Fingerprint;
pub use link::{Link, LinkState};
pub use resolve::{normalize, parse_seed, resolve};

/// Returns true for the schemes the crawler can fetch
pub fn is_fetchable_scheme(scheme: &str) -> bool {
    scheme == "http" || scheme == "https"
}
