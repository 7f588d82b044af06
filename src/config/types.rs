use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Sitecrawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of fetches in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Exact hostnames the crawler may visit (empty allows every host)
    #[serde(rename = "allowed-domains", default)]
    pub allowed_domains: Vec<String>,

    /// Also extract links from img, script, link, iframe and other resource tags
    #[serde(rename = "resource-tags", default = "default_resource_tags")]
    pub resource_tags: bool,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds
    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Maximum redirects followed per request
    #[serde(rename = "max-redirects", default = "default_max_redirects")]
    pub max_redirects: usize,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            allowed_domains: Vec::new(),
            resource_tags: default_resource_tags(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_redirects: default_max_redirects(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}

fn default_resource_tags() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_max_redirects() -> usize {
    10
}

fn default_user_agent() -> String {
    format!("sitecrawl/{}", env!("CARGO_PKG_VERSION"))
}
