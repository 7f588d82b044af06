use url::Url;

/// Extracts the hostname from a URL
///
/// IPv6 hosts are returned without their surrounding brackets. The host is
/// returned as the URL parser stores it (domain names are already
/// lowercased by parsing).
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sitecrawl::url::hostname;
///
/// let url = Url::parse("https://EXAMPLE.com:8080/path").unwrap();
/// assert_eq!(hostname(&url), Some("example.com"));
///
/// let url = Url::parse("http://[::1]:3000/").unwrap();
/// assert_eq!(hostname(&url), Some("::1"));
/// ```
pub fn hostname(url: &Url) -> Option<&str> {
    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']'))
}

/// Checks a hostname against an allowlist of exact hostnames
///
/// Matching is exact and case-sensitive: no suffix or wildcard matching, so
/// `example.com` does not admit `blog.example.com`. An empty allowlist
/// admits nothing; callers treat "no allowlist" separately.
pub fn domain_allowed(allowed: &[String], host: &str) -> bool {
    allowed.iter().any(|domain| domain == host)
}
