//! Sitecrawl main entry point
//!
//! This is the command-line interface for the Sitecrawl web crawler.

use anyhow::{anyhow, Context};
use clap::Parser;
use sitecrawl::config::{load_config_with_hash, validate, Config};
use sitecrawl::output::print_statistics;
use sitecrawl::url::{hostname, parse_seed};
use sitecrawl::{Crawler, CrawlerBuilder, Request, Response};
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Sitecrawl: a concurrent, domain-bounded web crawler
///
/// Starting from SEED, Sitecrawl fetches HTML pages, prints every link it
/// discovers and follows the ones that stay on the allowed domains.
#[derive(Parser, Debug)]
#[command(name = "sitecrawl")]
#[command(version)]
#[command(about = "A concurrent, domain-bounded web crawler", long_about = None)]
struct Cli {
    /// URL to start from (http:// is assumed when no scheme is given)
    #[arg(value_name = "SEED")]
    seed: String,

    /// Path to TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum number of fetches in flight
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Additional hostname to crawl besides the seed's (repeatable)
    #[arg(long = "allow", value_name = "DOMAIN")]
    allow: Vec<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Only follow <a href> links, ignore img, script, link and other resources
    #[arg(long)]
    anchors_only: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let seed = parse_seed(&cli.seed).map_err(|e| anyhow!("invalid seed '{}': {}", cli.seed, e))?;
    let config = build_config(&cli, hostname(&seed))?;

    let crawler = CrawlerBuilder::from_config(&config)
        .build()
        .context("failed to start crawler")?;
    crawler.on_fetched(report_and_follow);

    let cancel = crawler.cancellation_token();
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::info!("Interrupt received, stopping crawl");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });

    crawler.run(seed.as_str())?;
    crawler.wait().await;

    print_statistics(&crawler.stats());

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sitecrawl=info,warn"),
            1 => EnvFilter::new("sitecrawl=debug,info"),
            2 => EnvFilter::new("sitecrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Merges the config file (if any) with command-line overrides
///
/// The seed's hostname is always allowed.
fn build_config(cli: &Cli, seed_host: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    if let Some(concurrency) = cli.concurrency {
        config.crawler.concurrency = concurrency;
    }
    if let Some(timeout) = cli.timeout {
        config.http.timeout_secs = timeout;
        config.http.connect_timeout_secs = config.http.connect_timeout_secs.min(timeout);
    }
    if cli.anchors_only {
        config.crawler.resource_tags = false;
    }

    let domains = &mut config.crawler.allowed_domains;
    domains.extend(seed_host.map(str::to_string));
    domains.extend(cli.allow.iter().cloned());
    domains.sort();
    domains.dedup();

    validate(&config)?;
    Ok(config)
}

/// Prints the page and its links, then submits the links for crawling
fn report_and_follow(crawler: &Crawler, request: &Request, response: &Response) {
    let links = crawler.extractor().extract_links(&request.url, response);

    {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "page visited: {}", request.url);
        for link in &links {
            match link.resolved_url() {
                Some(url) => {
                    let _ = writeln!(out, "discovered on page: {}", url);
                }
                None => {
                    if let Some(reason) = link.rejection() {
                        tracing::debug!(link = link.raw_ref(), "Skipping link: {}", reason);
                    }
                }
            }
        }
    }

    crawler.statistics().add_page();

    // rejections are logged by the crawler
    for url in links.iter().filter_map(|link| link.resolved_url()) {
        let _ = crawler.visit(url.as_str());
    }
}
