//! pcc-harvest main entry point
//!
//! This is the command-line interface for the procurement notice harvester.

use anyhow::{bail, Context};
use chrono::{Local, NaiveDate};
use clap::{Parser, ValueEnum};
use pcc_harvest::config::{load_config_with_hash, validate, Config};
use pcc_harvest::crawler::{
    crawl_dates, crawl_details, crawl_search, fetch_info, full_history_range, FetchClient,
    SearchKind,
};
use pcc_harvest::output::{load_statistics, print_api_info, print_statistics, print_summary};
use pcc_harvest::state::{DateKey, DateRange};
use pcc_harvest::storage::OutputLayout;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// What a run does
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Full history, from the archive's earliest date through its latest
    All,
    /// The last N days, into its own subdirectory
    Recent,
    /// An explicit --start/--end range, into its own subdirectory
    Range,
    /// Per-tender details for every notice in the full-history list
    Details,
    /// Archive metadata and local statistics
    Info,
    /// Keyword search over titles or company names
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SearchBy {
    Title,
    Company,
}

impl From<SearchBy> for SearchKind {
    fn from(by: SearchBy) -> Self {
        match by {
            SearchBy::Title => SearchKind::Title,
            SearchBy::Company => SearchKind::Company,
        }
    }
}

/// pcc-harvest: resumable bulk downloader for the procurement notice API
///
/// Every run appends to JSON-lines files and checkpoints completed work, so
/// an interrupted run picks up where it stopped when started again.
#[derive(Parser, Debug)]
#[command(name = "pcc-harvest")]
#[command(version)]
#[command(about = "Resumable bulk downloader for the procurement notice API", long_about = None)]
struct Cli {
    /// Crawl mode
    #[arg(long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Days to fetch in recent mode
    #[arg(long)]
    days: Option<u32>,

    /// First date of the range (YYYYMMDD)
    #[arg(long, value_parser = parse_date_arg, required_if_eq("mode", "range"))]
    start: Option<NaiveDate>,

    /// Last date of the range (YYYYMMDD)
    #[arg(long, value_parser = parse_date_arg, required_if_eq("mode", "range"))]
    end: Option<NaiveDate>,

    /// Search query
    #[arg(long, required_if_eq("mode", "search"))]
    query: Option<String>,

    /// Field the search query matches
    #[arg(long, value_enum, default_value_t = SearchBy::Title)]
    by: SearchBy,

    /// Maximum search result pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Delay between requests in seconds
    #[arg(long, value_name = "SECONDS")]
    delay: Option<f64>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Retry units abandoned after repeated failures
    #[arg(long)]
    retry_abandoned: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    DateKey::parse(s)
        .map(|key| key.date())
        .map_err(|e| format!("expected YYYYMMDD: {}", e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = load_effective_config(&cli)?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let client = FetchClient::new(&config.api, &config.crawler)
        .context("failed to build HTTP client")?;
    let layout = OutputLayout::new(&config.output.directory);

    match cli.mode {
        Mode::All => handle_all(&config, &client, &layout, cli.retry_abandoned, cancel).await,
        Mode::Recent => {
            let range = DateRange::recent(today(), config.crawler.recent_days)
                .context("recent window reaches outside the calendar")?;
            let scoped = layout.scoped("recent", &range.label());
            handle_range(&config, &client, &scoped, range, cli.retry_abandoned, cancel).await
        }
        Mode::Range => {
            let (start, end) = match (cli.start, cli.end) {
                (Some(start), Some(end)) => (start, end),
                _ => bail!("--mode range requires --start and --end"),
            };
            if start > end {
                bail!("--start {} is after --end {}", start, end);
            }
            let range = DateRange::new(start, end);
            let scoped = layout.scoped("range", &range.label());
            handle_range(&config, &client, &scoped, range, cli.retry_abandoned, cancel).await
        }
        Mode::Details => {
            let summary = crawl_details(&config, &client, &layout, cli.retry_abandoned, cancel)
                .await
                .context("detail crawl failed")?;
            print_summary(&summary);
            Ok(())
        }
        Mode::Info => handle_info(&client, &layout).await,
        Mode::Search => {
            let query = match cli.query.as_deref().map(str::trim) {
                Some(query) if !query.is_empty() => query.to_string(),
                _ => bail!("--mode search requires a non-empty --query"),
            };
            let max_pages = cli.max_pages.unwrap_or(config.crawler.search_max_pages).max(1);
            let summary = crawl_search(&client, &layout, cli.by.into(), &query, max_pages, cancel)
                .await
                .context("search failed")?;
            print_summary(&summary);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("pcc_harvest=info,warn"),
            1 => EnvFilter::new("pcc_harvest=debug,info"),
            2 => EnvFilter::new("pcc_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the config file (or defaults) and applies command-line overrides
fn load_effective_config(cli: &Cli) -> anyhow::Result<Config> {
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

    if let Some(secs) = cli.delay {
        if !secs.is_finite() || secs < 0.0 {
            bail!("--delay must be a non-negative number of seconds");
        }
        config.crawler.request_delay = (secs * 1000.0).round() as u64;
    }

    if let Some(days) = cli.days {
        config.crawler.recent_days = days;
    }

    if let Some(dir) = &cli.output {
        config.output.directory = dir.to_string_lossy().into_owned();
    }

    validate(&config).context("invalid configuration")?;
    tracing::debug!("Effective configuration: {:?}", config);

    Ok(config)
}

/// Cancels `cancel` on Ctrl-C; the current unit still finishes
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing the current unit and saving progress");
            cancel.cancel();
        }
    });
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Handles --mode all: the full archive history into the root layout
async fn handle_all(
    config: &Config,
    client: &FetchClient,
    layout: &OutputLayout,
    retry_abandoned: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let range = full_history_range(client, today()).await;
    handle_range(config, client, layout, range, retry_abandoned, cancel).await
}

async fn handle_range(
    config: &Config,
    client: &FetchClient,
    layout: &OutputLayout,
    range: DateRange,
    retry_abandoned: bool,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!("Output directory: {}", layout.root().display());

    let summary = crawl_dates(config, client, layout, range, retry_abandoned, cancel)
        .await
        .context("list crawl failed")?;
    print_summary(&summary);

    Ok(())
}

/// Handles --mode info: upstream metadata plus local statistics
///
/// A failed metadata request is reported but does not fail the command.
async fn handle_info(client: &FetchClient, layout: &OutputLayout) -> anyhow::Result<()> {
    match fetch_info(client).await {
        Ok(info) => print_api_info(&info),
        Err(e) => tracing::error!("Failed to fetch archive metadata: {}", e),
    }

    println!("Output directory: {}\n", layout.root().display());
    let stats = load_statistics(layout).context("failed to read local archive")?;
    print_statistics(&stats);

    Ok(())
}
