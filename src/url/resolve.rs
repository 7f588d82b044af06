use crate::url::is_fetchable_scheme;
use crate::LinkRejection;
use std::borrow::Cow;
use url::Url;

/// Resolves a raw reference against the page it was found on
///
/// # Resolution Steps
///
/// 1. Strip the fragment from the reference (fragments never name a
///    distinct fetchable resource)
/// 2. Resolve the rest against `source` using RFC 3986 rules. An empty
///    `source` marks a seed: the reference must be absolute, and a missing
///    scheme defaults to `http://`
/// 3. Reject anything that is not `http` or `https` after resolution
/// 4. Normalize the result (see [`normalize`])
///
/// # Arguments
///
/// * `source` - Canonical URL of the page the reference was found on
/// * `raw_ref` - The reference exactly as it appeared in the page
///
/// # Returns
///
/// * `Ok(Url)` - Canonical absolute URL
/// * `Err(LinkRejection)` - Why the reference cannot be fetched
///
/// # Examples
///
/// ```
/// use sitecrawl::url::resolve;
///
/// let url = resolve("http://x.com/aaa/bbb/", "../a.html").unwrap();
/// assert_eq!(url.as_str(), "http://x.com/aaa/a.html");
///
/// let url = resolve("https://www.x.com/news/", "//www.x.com/").unwrap();
/// assert_eq!(url.as_str(), "https://www.x.com/");
/// ```
pub fn resolve(source: &str, raw_ref: &str) -> Result<Url, LinkRejection> {
    let reference = strip_fragment(raw_ref);

    let joined = if source.is_empty() {
        Url::parse(&with_default_scheme(reference))
    } else {
        let base = Url::parse(source).map_err(|e| {
            LinkRejection::Unparseable(format!("source '{}': {}", source, e))
        })?;
        base.join(reference)
    }
    .map_err(|e| LinkRejection::Unparseable(e.to_string()))?;

    if !is_fetchable_scheme(joined.scheme()) {
        return Err(LinkRejection::UnsupportedScheme(joined.scheme().to_string()));
    }

    normalize(joined)
}

/// Parses a seed URL typed by a user
///
/// Equivalent to resolving against an empty source: surrounding whitespace
/// is ignored and a missing scheme defaults to `http://`.
///
/// ```
/// use sitecrawl::url::parse_seed;
///
/// assert_eq!(parse_seed("Example.com").unwrap().as_str(), "http://example.com/");
/// ```
pub fn parse_seed(raw: &str) -> Result<Url, LinkRejection> {
    resolve("", raw.trim())
}

/// Brings an absolute http(s) URL into canonical form
///
/// # Normalization Steps
///
/// 1. Drop the fragment
/// 2. Canonicalize percent-escapes in path and query: escapes of unreserved
///    characters (`A-Z a-z 0-9 - . _ ~`) are decoded, all others uppercased
/// 3. Collapse runs of `/` in the path
/// 4. Sort the raw `&`-separated query segments stably by key, give bare
///    keys an `=`, drop empty segments and an empty query
/// 5. Trim trailing `#` and space artifacts and re-parse the result
///
/// Query segments are never decoded, so bytes that are not UTF-8 and
/// separators other than `&` come through unchanged. Lowercasing of scheme
/// and host, default port removal and dot-segment removal are done by the
/// URL parser.
///
/// ```
/// use sitecrawl::url::resolve;
///
/// let url = resolve("http://x.com/", "/a%7eb?q=%ff&a").unwrap();
/// assert_eq!(url.as_str(), "http://x.com/a~b?a=&q=%FF");
/// ```
pub fn normalize(mut url: Url) -> Result<Url, LinkRejection> {
    url.set_fragment(None);

    let path = collapse_slashes(&canonicalize_escapes(url.path()));
    if path != url.path() {
        url.set_path(&path);
    }

    if let Some(query) = url.query() {
        let query = sort_query(&canonicalize_escapes(query));
        url.set_query(if query.is_empty() { None } else { Some(&query) });
    }

    let serialized = url.as_str().trim_end_matches(|c| c == '#' || c == ' ');
    Url::parse(serialized).map_err(|e| LinkRejection::Malformed(e.to_string()))
}

/// Decodes escapes of unreserved characters and uppercases the rest
fn canonicalize_escapes(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let is_escape = bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if !is_escape {
            i += 1;
            continue;
        }

        out.push_str(&input[copied..i]);
        let digits = &input[i + 1..i + 3];
        match u8::from_str_radix(digits, 16) {
            Ok(byte) if is_unreserved(byte) => out.push(char::from(byte)),
            _ => {
                out.push('%');
                out.push_str(&digits.to_ascii_uppercase());
            }
        }
        i += 3;
        copied = i;
    }

    out.push_str(&input[copied..]);
    Cow::Owned(out)
}

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Stable sort of raw query segments by their (still encoded) key
fn sort_query(query: &str) -> String {
    let mut segments: Vec<(&str, &str)> = query
        .split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.split_once('=').unwrap_or((segment, "")))
        .collect();

    // repeated keys keep their relative order
    segments.sort_by(|a, b| a.0.cmp(b.0));

    segments
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

fn strip_fragment(reference: &str) -> &str {
    reference
        .split_once('#')
        .map_or(reference, |(before, _)| before)
}

fn with_default_scheme(reference: &str) -> String {
    if let Some(rest) = reference.strip_prefix("//") {
        format!("http://{}", rest)
    } else if reference.contains("://") || has_scheme(reference) {
        // mailto:, javascript: and friends are kept so they can be rejected by scheme
        reference.to_string()
    } else {
        format!("http://{}", reference)
    }
}

fn has_scheme(reference: &str) -> bool {
    match reference.split_once(':') {
        Some((scheme, rest)) => {
            let mut chars = scheme.chars();
            chars.next().is_some_and(|c| c.is_ascii_alphabetic())
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                // host:port is not a scheme
                && !rest.chars().next().is_some_and(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;

    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    collapsed
}
