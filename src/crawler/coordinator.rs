//! Crawl coordinator
//!
//! A [`Crawler`] is one crawl session. URLs enter through [`Crawler::run`]
//! and [`Crawler::visit`], pass the admission guard and go onto an
//! unbounded queue. A single dispatch task takes jobs off the queue in
//! order, waits for a free slot and spawns a worker per job:
//!
//! ```text
//! visit ──► guard ──► queue ──► dispatch (slot) ──► worker ──► callbacks
//!                                                      │
//!                                 visit ◄──────────────┘
//! ```
//!
//! Callbacks usually call `visit` for the links they find, which is how the
//! crawl spreads. [`Crawler::wait`] resolves once every admitted job has
//! finished and no callback is running.

use crate::config::{Config, HttpConfig};
use crate::crawler::fetcher::{Fetcher, HttpFetcher, Request, Response};
use crate::crawler::guard::AdmissionGuard;
use crate::crawler::parser::{Extractor, ExtractorOptions, HtmlExtractor};
use crate::crawler::scheduler::{PendingWork, Slot, SlotAcquire, SlotPool, WorkUnit};
use crate::output::{CrawlStats, InMemoryStats, StatsSnapshot};
use crate::{AdmissionError, ConfigError, CrawlError, FetchError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Callback invoked for every successfully fetched HTML page
///
/// The crawler is passed in rather than captured, so handlers can call
/// [`Crawler::visit`] without keeping the session alive forever.
pub type FetchedHandler = dyn Fn(&Crawler, &Request, &Response) + Send + Sync;

type HandlerList = Arc<Vec<Arc<FetchedHandler>>>;

/// An admitted URL waiting to be fetched
struct Job {
    request: Request,
    _unit: WorkUnit,
}

struct Inner {
    fetcher: Arc<dyn Fetcher>,
    extractor: Arc<dyn Extractor>,
    guard: AdmissionGuard,
    stats: Arc<dyn CrawlStats>,
    /// Replaced wholesale on registration; workers run a snapshot
    handlers: Mutex<HandlerList>,
    cancel: CancellationToken,
    pending: Arc<PendingWork>,
    closed: AtomicBool,
    queue: mpsc::UnboundedSender<Job>,
    concurrency: usize,
}

/// Handle to a crawl session
///
/// Cheap to clone; all clones drive the same session.
///
/// # Example
///
/// ```no_run
/// use sitecrawl::Crawler;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let crawler = Crawler::builder().concurrency(4).build()?;
///
/// crawler.on_fetched(|crawler, request, response| {
///     let links = crawler.extractor().extract_links(&request.url, response);
///     for url in links.iter().filter_map(|link| link.resolved_url()) {
///         let _ = crawler.visit(url.as_str());
///     }
/// });
///
/// crawler.run("https://example.com/")?;
/// crawler.wait().await;
/// println!("{}", crawler.stats());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Crawler {
    inner: Arc<Inner>,
}

/// Builder for [`Crawler`]
pub struct CrawlerBuilder {
    concurrency: usize,
    allowed_domains: Vec<String>,
    http: HttpConfig,
    extractor_options: ExtractorOptions,
    fetcher: Option<Arc<dyn Fetcher>>,
    extractor: Option<Arc<dyn Extractor>>,
    stats: Option<Arc<dyn CrawlStats>>,
    cancel: Option<CancellationToken>,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerBuilder {
    pub fn new() -> Self {
        let defaults = Config::default();
        Self {
            concurrency: defaults.crawler.concurrency,
            allowed_domains: Vec::new(),
            http: defaults.http,
            extractor_options: ExtractorOptions::default(),
            fetcher: None,
            extractor: None,
            stats: None,
            cancel: None,
        }
    }

    /// Builder preloaded from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .concurrency(config.crawler.concurrency)
            .allowed_domains(config.crawler.allowed_domains.iter().cloned())
            .http_config(config.http.clone())
            .extractor_options(ExtractorOptions {
                resource_tags: config.crawler.resource_tags,
            })
    }

    /// Maximum number of fetches in flight
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Adds hostnames to the allowlist (empty allowlist allows everything)
    pub fn allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains
            .extend(domains.into_iter().map(Into::into));
        self
    }

    /// HTTP settings for the default fetcher (ignored with a custom fetcher)
    pub fn http_config(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Options for the default extractor (ignored with a custom extractor)
    pub fn extractor_options(mut self, options: ExtractorOptions) -> Self {
        self.extractor_options = options;
        self
    }

    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn statistics(mut self, stats: Arc<dyn CrawlStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Ties the session to an external cancellation token
    pub fn cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Creates the session and starts its dispatch task
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Crawler, CrawlError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation("concurrency must be at least 1".to_string()).into());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CrawlError::NoRuntime)?;

        let fetcher: Arc<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(&self.http)?),
        };
        let extractor: Arc<dyn Extractor> = match self.extractor {
            Some(extractor) => extractor,
            None => Arc::new(HtmlExtractor::new(self.extractor_options)),
        };
        let stats: Arc<dyn CrawlStats> = self
            .stats
            .unwrap_or_else(|| Arc::new(InMemoryStats::new()));
        let cancel = self.cancel.unwrap_or_default();

        let (queue, jobs) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            fetcher,
            extractor,
            guard: AdmissionGuard::new(self.allowed_domains, Arc::clone(&stats)),
            stats,
            handlers: Mutex::new(Arc::new(Vec::new())),
            cancel: cancel.clone(),
            pending: Arc::new(PendingWork::new()),
            closed: AtomicBool::new(false),
            queue,
            concurrency: self.concurrency,
        });

        runtime.spawn(dispatch(
            Arc::downgrade(&inner),
            jobs,
            SlotPool::new(self.concurrency),
            cancel,
        ));

        Ok(Crawler { inner })
    }
}

impl Crawler {
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::new()
    }

    /// Starts the crawl from `seed`
    pub fn run(&self, seed: &str) -> Result<(), AdmissionError> {
        info!(
            seed,
            concurrency = self.inner.concurrency,
            allowed_domains = ?self.inner.guard.allowed_domains(),
            "Starting crawl"
        );
        self.visit(seed)
    }

    /// Submits a URL for fetching
    ///
    /// Returns immediately: the fetch happens later on a worker. Fails when
    /// the URL is not admitted or the session has finished.
    pub fn visit(&self, raw_url: &str) -> Result<(), AdmissionError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(AdmissionError::SessionClosed);
        }

        let url = self.inner.guard.admit(raw_url).map_err(|e| {
            if e.is_expected() {
                trace!("Not crawling: {}", e);
            } else {
                debug!("Not crawling: {}", e);
            }
            e
        })?;
        let job = Job {
            request: Request::get(url),
            _unit: self.inner.pending.start(),
        };

        trace!(url = %job.request.url, "Queued");
        self.inner
            .queue
            .send(job)
            .map_err(|_| AdmissionError::SessionClosed)
    }

    /// Registers a callback for fetched HTML pages
    ///
    /// Callbacks run in registration order on the worker that fetched the
    /// page. One registered while the crawl runs applies to fetches that
    /// finish after registration.
    pub fn on_fetched<F>(&self, handler: F)
    where
        F: Fn(&Crawler, &Request, &Response) + Send + Sync + 'static,
    {
        let mut handlers = self
            .inner
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut updated = Vec::clone(&handlers);
        updated.push(Arc::new(handler));
        *handlers = Arc::new(updated);
    }

    /// Resolves once all admitted work is done, then closes the session
    pub async fn wait(&self) {
        self.inner.pending.wait_idle().await;
        self.inner.closed.store(true, Ordering::SeqCst);

        if self.is_cancelled() {
            info!(stats = %self.stats(), "Crawl cancelled");
        } else {
            info!(stats = %self.stats(), "Crawl complete");
        }
    }

    /// Stops the session: queued jobs are abandoned, nothing new starts
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Current counter values
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub fn statistics(&self) -> &Arc<dyn CrawlStats> {
        &self.inner.stats
    }

    /// The session's link extractor, for use inside callbacks
    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.inner.extractor
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    /// Admitted jobs not finished yet
    pub fn pending(&self) -> usize {
        self.inner.pending.count()
    }

    fn handlers(&self) -> HandlerList {
        Arc::clone(
            &self
                .inner
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Fetches one job and hands the result to the callbacks
    async fn work(self, job: Job, slot: Slot) {
        let inner = &self.inner;
        let url = job.request.url.as_str();
        debug!(url, "Fetching");

        let response = match inner.fetcher.fetch(&job.request, &inner.cancel).await {
            Ok(response) => response,
            Err(FetchError::Cancelled { .. }) => {
                debug!(url, "Fetch cancelled");
                slot.finish(&inner.cancel);
                return;
            }
            Err(e) => {
                warn!("{}", e);
                slot.finish(&inner.cancel);
                return;
            }
        };

        if !response.is_success() {
            warn!(
                "{}",
                FetchError::Status {
                    url: url.to_string(),
                    status: response.status.as_u16(),
                }
            );
            slot.finish(&inner.cancel);
            return;
        }

        if !response.is_html() {
            debug!(url, content_type = %response.content_type, "Skipping non-HTML response");
            slot.finish(&inner.cancel);
            return;
        }

        if inner.cancel.is_cancelled() {
            debug!(url, "Crawl cancelled, skipping callbacks");
            slot.retire();
            return;
        }

        inner.stats.add_total_fetched();

        for handler in self.handlers().iter() {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                handler(&self, &job.request, &response)
            }));
            if outcome.is_err() {
                warn!(url, "Fetch callback panicked");
            }
        }

        slot.finish(&inner.cancel);
    }
}

/// Moves queued jobs onto workers, one slot each
///
/// Holds the session weakly: it stops once every [`Crawler`] handle and
/// worker is gone.
async fn dispatch(
    session: Weak<Inner>,
    mut jobs: mpsc::UnboundedReceiver<Job>,
    slots: SlotPool,
    cancel: CancellationToken,
) {
    while let Some(job) = jobs.recv().await {
        let slot = match slots.acquire(&cancel).await {
            SlotAcquire::Acquired(slot) => {
                debug!(url = %job.request.url, free = slots.available(), "Slot acquired");
                slot
            }
            SlotAcquire::Cancelled => {
                trace!(url = %job.request.url, "Crawl cancelled, dropping queued job");
                continue;
            }
        };

        let Some(inner) = session.upgrade() else {
            break;
        };
        tokio::spawn(Crawler { inner }.work(job, slot));
    }

    debug!("Dispatcher stopped");
}
