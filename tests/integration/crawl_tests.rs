//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end. Concurrency and cancellation are
//! checked with instrumented fetchers instead of a real server.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use sitecrawl::config::HttpConfig;
use sitecrawl::crawler::{Fetcher, HttpFetcher};
use sitecrawl::{AdmissionError, Crawler, FetchError, Request, Response};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html_page(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.into(), "text/html")
}

fn html_response(body: &str) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    Response::new(StatusCode::OK, headers, body.as_bytes().to_vec())
}

fn server_host(server: &MockServer) -> String {
    Url::parse(&server.uri())
        .expect("Failed to parse base URL")
        .host_str()
        .expect("Failed to extract host")
        .to_string()
}

/// Follows every resolved link and records each visited page
fn record_and_follow(crawler: &Crawler) -> Arc<Mutex<Vec<String>>> {
    let visited = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&visited);

    crawler.on_fetched(move |crawler, request, response| {
        record.lock().unwrap().push(request.url.path().to_string());
        for link in crawler.extractor().extract_links(&request.url, response) {
            if let Some(url) = link.resolved_url() {
                let _ = crawler.visit(url.as_str());
            }
        }
    });

    visited
}

async fn wait_for(crawler: &Crawler) {
    tokio::time::timeout(Duration::from_secs(10), crawler.wait())
        .await
        .expect("crawl did not finish in time");
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_full_crawl_single_domain() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(format!(
            r#"<html><head><link rel="stylesheet" href="/style.css"></head><body>
            <a href="{}/page1">Page 1</a>
            <a href="/page2">Page 2</a>
            <a href="http://elsewhere.invalid/x">Elsewhere</a>
            <a href="mailto:someone@example.com">Mail</a>
            </body></html>"#,
            base_url
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page1"))
        .respond_with(html_page(
            r#"<a href="/">home</a><a href="page2#section">again</a>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/page2"))
        .respond_with(html_page(r#"<p>Content 2</p><img src="/logo.png">"#))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/style.css"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("a {}", "text/css"))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/logo.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .concurrency(3)
        .allowed_domains([server_host(&mock_server)])
        .build()
        .expect("Failed to build crawler");
    let visited = record_and_follow(&crawler);

    crawler.run(&format!("{}/", base_url)).unwrap();
    wait_for(&crawler).await;

    let mut pages = visited.lock().unwrap().clone();
    pages.sort();
    assert_eq!(pages, vec!["/", "/page1", "/page2"]);

    let stats = crawler.stats();
    assert_eq!(stats.unique_discovered, 5);
    assert_eq!(stats.total_fetched, 3);
    assert!(stats.total_discovered >= stats.unique_discovered);
}

#[tokio::test]
async fn test_error_statuses_are_not_processed() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(
            r#"<a href="/missing">gone</a><a href="/broken">broken</a>"#,
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500).set_body_raw("<a href=\"/secret\">s</a>", "text/html"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .allowed_domains([server_host(&mock_server)])
        .build()
        .unwrap();
    let visited = record_and_follow(&crawler);

    crawler.run(&format!("{}/", mock_server.uri())).unwrap();
    wait_for(&crawler).await;

    assert_eq!(*visited.lock().unwrap(), vec!["/"]);
    let stats = crawler.stats();
    assert_eq!(stats.unique_discovered, 3);
    assert_eq!(stats.total_fetched, 1);
}

#[tokio::test]
async fn test_allowlist_limits_crawl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html_page(r#"<a href="/next">next</a>"#))
        .expect(0)
        .mount(&mock_server)
        .await;

    let crawler = Crawler::builder()
        .allowed_domains(["example.invalid"])
        .build()
        .unwrap();

    let result = crawler.run(&format!("{}/", mock_server.uri()));
    assert!(matches!(
        result,
        Err(AdmissionError::DomainNotAllowed { .. })
    ));

    wait_for(&crawler).await;
    assert_eq!(crawler.stats().total_discovered, 1);
    assert_eq!(crawler.stats().unique_discovered, 0);
}

#[tokio::test]
async fn test_http_fetcher_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html_page("late").set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let config = HttpConfig {
        timeout_secs: 1,
        connect_timeout_secs: 1,
        ..HttpConfig::default()
    };
    let fetcher = HttpFetcher::new(&config).unwrap();
    let request = Request::get(Url::parse(&format!("{}/slow", mock_server.uri())).unwrap());

    let result = fetcher.fetch(&request, &CancellationToken::new()).await;
    assert!(matches!(result, Err(FetchError::Timeout { .. })));
}

#[tokio::test]
async fn test_http_fetcher_observes_cancellation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(html_page("late").set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
    let request = Request::get(Url::parse(&format!("{}/slow", mock_server.uri())).unwrap());
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(Duration::from_secs(2), fetcher.fetch(&request, &cancel))
        .await
        .expect("fetch ignored cancellation");
    assert!(matches!(result, Err(FetchError::Cancelled { .. })));
}

#[tokio::test]
async fn test_http_fetcher_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(html_page("<p>hello</p>").insert_header("x-served-by", "mock"))
        .mount(&mock_server)
        .await;

    let fetcher = HttpFetcher::new(&HttpConfig::default()).unwrap();
    let cancel = CancellationToken::new();

    let request = Request::get(Url::parse(&format!("{}/page", mock_server.uri())).unwrap());
    let response = fetcher.fetch(&request, &cancel).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.is_html());
    assert_eq!(response.text(), "<p>hello</p>");
    assert_eq!(response.content_length, 12);
    assert_eq!(response.headers.get("x-served-by").unwrap(), "mock");

    let request = Request::get(Url::parse(&format!("{}/nothing-here", mock_server.uri())).unwrap());
    let response = fetcher.fetch(&request, &cancel).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.body.is_empty());
}

/// Records how many fetches overlap
#[derive(Default)]
struct CountingFetcher {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicUsize,
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(50)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(html_response("<p>leaf</p>"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_limit() {
    let fetcher = Arc::new(CountingFetcher::default());
    let crawler = Crawler::builder()
        .concurrency(3)
        .fetcher(fetcher.clone())
        .build()
        .unwrap();

    for i in 0..20 {
        crawler
            .visit(&format!("http://pool.test/{}", i))
            .unwrap();
    }
    wait_for(&crawler).await;

    let peak = fetcher.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {}", peak);
    assert!(peak > 1, "fetches never overlapped");
    assert_eq!(fetcher.completed.load(Ordering::SeqCst), 20);
    assert_eq!(crawler.stats().total_fetched, 20);
}

/// Blocks every fetch until the gate opens; ignores cancellation
struct GatedFetcher {
    started: AtomicUsize,
    gate: Semaphore,
}

impl GatedFetcher {
    fn new() -> Self {
        Self {
            started: AtomicUsize::new(0),
            gate: Semaphore::new(0),
        }
    }

    fn open(&self) {
        self.gate.add_permits(1000);
    }
}

#[async_trait]
impl Fetcher for GatedFetcher {
    async fn fetch(
        &self,
        _request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _permit = self.gate.acquire().await;
        Ok(html_response("<p>done</p>"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancellation_stops_queued_work() {
    let fetcher = Arc::new(GatedFetcher::new());
    let crawler = Crawler::builder()
        .concurrency(2)
        .fetcher(fetcher.clone())
        .build()
        .unwrap();

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    crawler.on_fetched(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    for i in 0..10 {
        crawler
            .visit(&format!("http://gated.test/{}", i))
            .unwrap();
    }

    wait_until(|| fetcher.started.load(Ordering::SeqCst) == 2).await;
    crawler.cancel();
    fetcher.open();

    wait_for(&crawler).await;

    // in-flight fetches completed, queued ones never started
    assert_eq!(fetcher.started.load(Ordering::SeqCst), 2);
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);

    let stats = crawler.stats();
    assert_eq!(stats.unique_discovered, 10);
    assert_eq!(stats.total_fetched, 0);
}

/// Binary-tree site: page n links to 2n, 2n+1 and back to n/2
struct TreeSite {
    last: u64,
}

#[async_trait]
impl Fetcher for TreeSite {
    async fn fetch(
        &self,
        request: &Request,
        _cancel: &CancellationToken,
    ) -> Result<Response, FetchError> {
        let n: u64 = request.url.path().trim_start_matches('/').parse().map_err(|_| {
            FetchError::Other {
                url: request.url.to_string(),
                message: "not a tree page".to_string(),
            }
        })?;

        tokio::task::yield_now().await;

        let mut body = String::new();
        for child in [2 * n, 2 * n + 1, n / 2] {
            if child >= 1 && child <= self.last {
                body.push_str(&format!(r#"<a href="/{}">{}</a>"#, child, child));
            }
        }
        Ok(html_response(&body))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stats_stay_ordered_during_crawl() {
    let crawler = Crawler::builder()
        .concurrency(8)
        .allowed_domains(["tree.test"])
        .fetcher(Arc::new(TreeSite { last: 199 }))
        .build()
        .unwrap();
    record_and_follow(&crawler);

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let crawler = crawler.clone();
        let done = Arc::clone(&done);
        tokio::spawn(async move {
            let mut samples = 0;
            while !done.load(Ordering::SeqCst) {
                let stats = crawler.stats();
                assert!(stats.total_discovered >= stats.unique_discovered, "{}", stats);
                assert!(stats.unique_discovered >= stats.total_fetched, "{}", stats);
                samples += 1;
                tokio::task::yield_now().await;
            }
            samples
        })
    };

    crawler.run("http://tree.test/1").unwrap();
    wait_for(&crawler).await;
    done.store(true, Ordering::SeqCst);

    let samples = sampler.await.expect("stats sampler failed");
    assert!(samples > 0);

    let stats = crawler.stats();
    assert_eq!(stats.unique_discovered, 199);
    assert_eq!(stats.total_fetched, 199);
    assert!(stats.total_discovered > 199);
}

#[tokio::test]
async fn test_visit_after_wait_returns_session_closed() {
    let crawler = Crawler::builder()
        .fetcher(Arc::new(TreeSite { last: 1 }))
        .build()
        .unwrap();

    crawler.run("http://tree.test/1").unwrap();
    wait_for(&crawler).await;
    assert_eq!(crawler.stats().total_fetched, 1);

    assert!(matches!(
        crawler.visit("http://tree.test/2"),
        Err(AdmissionError::SessionClosed)
    ));
}
