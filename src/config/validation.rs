use crate::config::types::{Config, CrawlerConfig, HttpConfig};
use crate::ConfigError;

/// Upper bound on the concurrency setting
pub const MAX_CONCURRENCY: usize = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_http_config(&config.http)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY, config.concurrency
        )));
    }

    for domain in &config.allowed_domains {
        validate_allowed_domain(domain)?;
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout-secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.connect_timeout_secs < 1 || config.connect_timeout_secs > config.timeout_secs {
        return Err(ConfigError::Validation(format!(
            "connect-timeout-secs must be between 1 and timeout-secs ({}), got {}",
            config.timeout_secs, config.connect_timeout_secs
        )));
    }

    if config.max_redirects > 20 {
        return Err(ConfigError::Validation(format!(
            "max-redirects must be at most 20, got {}",
            config.max_redirects
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    // Must be usable as a header value
    if !config
        .user_agent
        .chars()
        .all(|c| c == ' ' || c.is_ascii_graphic())
    {
        return Err(ConfigError::Validation(format!(
            "user-agent must be printable ASCII, got '{}'",
            config.user_agent
        )));
    }

    Ok(())
}

/// Validates one allowlist entry
///
/// Entries are compared verbatim against URL hostnames, so they must look
/// exactly like one: lowercase, no scheme, no path, no wildcard.
pub fn validate_allowed_domain(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidDomain(
            "Domain cannot be empty".to_string(),
        ));
    }

    if domain.contains('*') {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' uses a wildcard; allowed domains match hostnames exactly",
            domain
        )));
    }

    if domain.contains("://") || domain.contains('/') {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' must be a bare hostname without scheme or path",
            domain
        )));
    }

    if domain.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' must be lowercase",
            domain
        )));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | ':'))
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidDomain(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_allowed_domain() {
        assert!(validate_allowed_domain("example.com").is_ok());
        assert!(validate_allowed_domain("sub.example.com").is_ok());
        assert!(validate_allowed_domain("localhost").is_ok());
        assert!(validate_allowed_domain("127.0.0.1").is_ok());
        assert!(validate_allowed_domain("::1").is_ok());

        assert!(validate_allowed_domain("").is_err());
        assert!(validate_allowed_domain("*.example.com").is_err());
        assert!(validate_allowed_domain("https://example.com").is_err());
        assert!(validate_allowed_domain("example.com/path").is_err());
        assert!(validate_allowed_domain("Example.com").is_err());
        assert!(validate_allowed_domain(".example.com").is_err());
        assert!(validate_allowed_domain("example.com.").is_err());
        assert!(validate_allowed_domain("example..com").is_err());
        assert!(validate_allowed_domain("exa mple.com").is_err());
    }

    #[test]
    fn test_validate_concurrency_bounds() {
        let mut config = Config::default();
        assert!(validate(&config).is_ok());

        config.crawler.concurrency = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.crawler.concurrency = MAX_CONCURRENCY + 1;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));

        config.crawler.concurrency = MAX_CONCURRENCY;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_timeouts() {
        let mut config = Config::default();

        config.http.timeout_secs = 0;
        assert!(validate(&config).is_err());

        config.http.timeout_secs = 5;
        config.http.connect_timeout_secs = 10;
        assert!(validate(&config).is_err());

        config.http.connect_timeout_secs = 5;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_user_agent() {
        let mut config = Config::default();

        config.http.user_agent = "   ".to_string();
        assert!(validate(&config).is_err());

        config.http.user_agent = "bot\n".to_string();
        assert!(validate(&config).is_err());

        config.http.user_agent = "my-bot/2.0 (+https://example.com)".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_validate_redirects() {
        let mut config = Config::default();
        config.http.max_redirects = 21;
        assert!(validate(&config).is_err());
    }
}
