use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Reads, parses and validates a TOML configuration file
///
/// # Example
///
/// ```no_run
/// use sitecrawl::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("sitecrawl.toml")).unwrap();
/// println!("Concurrency: {}", config.crawler.concurrency);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    parse_config(&fs::read_to_string(path)?)
}

/// Parses and validates configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex-encoded SHA-256 of a configuration file
///
/// Logged at startup so runs can be matched to the exact configuration used.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(content_hash(&fs::read_to_string(path)?))
}

/// Loads a configuration together with the hash of the text it came from
///
/// The file is read once, so the hash always describes what was parsed.
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, content_hash(&content)))
}

fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}
