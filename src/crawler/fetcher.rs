//! HTTP fetch capability
//!
//! The crawler core only knows the [`Fetcher`] trait: given a request and
//! the session's cancellation token, produce a [`Response`] or a
//! [`FetchError`]. [`HttpFetcher`] is the reqwest-backed implementation used
//! by default. Timeouts, redirects and TLS are its concern, not the core's.

use crate::config::HttpConfig;
use crate::FetchError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, Method, StatusCode};
use std::borrow::Cow;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Largest body buffer pre-allocated from a Content-Length header
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// Descriptor of one fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: Url,
}

impl Request {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }
}

/// Snapshot of a completed fetch
///
/// Read-only once built; callbacks all see the same value.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header value (empty when absent)
    pub content_type: String,
    /// Body length in bytes
    pub content_length: usize,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        Self {
            status,
            content_type,
            content_length: body.len(),
            headers,
            body,
        }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// True when the Content-Type announces HTML
    pub fn is_html(&self) -> bool {
        self.content_type.to_ascii_lowercase().contains("text/html")
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// A capability that performs fetches for the crawler
///
/// Implementations decide how to honor `cancel`: the crawler itself never
/// interrupts a fetch, it only skips callbacks when the session was
/// cancelled in the meantime.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response, FetchError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The HTTP configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sitecrawl::config::HttpConfig;
/// use sitecrawl::crawler::build_http_client;
///
/// let client = build_http_client(&HttpConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    let redirect = if config.max_redirects == 0 {
        Policy::none()
    } else {
        Policy::limited(config.max_redirects)
    };

    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .redirect(redirect)
        .gzip(true)
        .brotli(true)
        .build()
}

/// reqwest-backed [`Fetcher`]
///
/// A fetch is raced against the cancellation token, so shutdown does not
/// wait for slow servers; otherwise it is bounded by the client timeout.
/// Bodies of non-2xx responses are not downloaded.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::with_client(build_http_client(config)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url.as_str();

        let mut response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        let headers = response.headers().clone();

        if !status.is_success() {
            return Ok(Response::new(status, headers, Vec::new()));
        }

        let mut body = Vec::with_capacity(content_length_hint(&headers));
        while let Some(chunk) = response.chunk().await.map_err(|e| classify_error(url, e))? {
            body.extend_from_slice(&chunk);
        }

        Ok(Response::new(status, headers, body))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        request: &Request,
        cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        tokio::select! {
            result = self.execute(request) => result,
            _ = cancel.cancelled() => Err(FetchError::Cancelled {
                url: request.url.to_string(),
            }),
        }
    }
}

/// Buffer size hint from the Content-Length header (0 when missing or bogus)
fn content_length_hint(headers: &HeaderMap) -> usize {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .map_or(0, |len| len.min(MAX_PREALLOCATION))
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http {
            url: url.to_string(),
            source: error,
        }
    }
}
