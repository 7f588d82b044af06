use sha2::{Digest, Sha256};
use std::fmt;

/// 128-bit digest of a URL string, used as the dedup key
///
/// Computed over the exact bytes of the input: equal strings always give
/// equal fingerprints, and no normalization happens here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprints a URL string (first 16 bytes of its SHA-256)
    pub fn of(url: &str) -> Self {
        let digest = Sha256::digest(url.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}
