//! Crawler module for walking the upstream API
//!
//! This module contains the core crawling logic, including:
//! - The rate-limited fetch client
//! - Record extraction and provenance stamping
//! - The date-keyed list pass and the identifier-keyed detail pass
//! - Keyword search pagination
//! - Archive metadata lookup
//!
//! Every pass is a single sequential worker: one request in flight, one
//! writer to its checkpoint and record file.

mod detail;
mod fetcher;
pub mod info;
mod list;
mod records;
mod search;

pub use detail::{discover_work, DetailCrawler, WorkSet};
pub use fetcher::{
    build_http_client, Endpoint, FailureKind, FetchClient, FetchError, RetryPolicy,
};
pub use info::{fetch_info, parse_api_date, ApiInfo};
pub use list::ListCrawler;
pub use records::{
    detail_key, extract_records, fetched_key, list_by_date, stamp_detail_key, stamp_source_date,
    tender_detail, Record, DETAIL_KEY_FIELD, SOURCE_DATE_FIELD,
};
pub use search::{search, search_page, SearchKind};

use crate::config::{Config, CrawlerConfig};
use crate::output::RunSummary;
use crate::state::{DateRange, UnitState};
use crate::storage::{CheckpointStore, OutputLayout, RecordSink, RunLock};
use crate::HarvestError;
use chrono::NaiveDate;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Runs the list pass over `range` into `layout`
///
/// This is the main entry point for a date crawl. It will:
/// 1. Create the output directory and take the run lock
/// 2. Load the list checkpoint and open the record file
/// 3. Fetch every date in the range not already checkpointed
/// 4. Flush records and checkpoint, on completion or cancellation
pub async fn crawl_dates(
    config: &Config,
    client: &FetchClient,
    layout: &OutputLayout,
    range: DateRange,
    retry_abandoned: bool,
    cancel: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    layout.prepare()?;
    let _lock = RunLock::acquire(layout.root())?;

    let mut crawler = ListCrawler::open(client.clone(), layout, config.crawler.clone(), cancel)?;
    if retry_abandoned {
        let cleared = crawler.retry_abandoned();
        tracing::info!("Re-enabled {} abandoned dates", cleared);
    }

    crawler.run(range).await
}

/// Runs the detail pass for every identifier pair found in `layout`'s list records
pub async fn crawl_details(
    config: &Config,
    client: &FetchClient,
    layout: &OutputLayout,
    retry_abandoned: bool,
    cancel: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    layout.prepare()?;
    let _lock = RunLock::acquire(layout.root())?;

    let mut crawler =
        DetailCrawler::open(client.clone(), layout, config.crawler.clone(), cancel)?;
    if retry_abandoned {
        let cleared = crawler.retry_abandoned();
        tracing::info!("Re-enabled {} abandoned identifier pairs", cleared);
    }

    crawler.run(&layout.list_records()).await
}

/// Runs a keyword search, writing every page into its own record file
///
/// The file is rewritten on every run, so it holds one result set.
pub async fn crawl_search(
    client: &FetchClient,
    layout: &OutputLayout,
    kind: SearchKind,
    query: &str,
    max_pages: u32,
    cancel: CancellationToken,
) -> Result<RunSummary, HarvestError> {
    layout.prepare()?;
    let _lock = RunLock::acquire(layout.root())?;

    let mut sink = RecordSink::create(layout.search_records(query))?;
    search(client, kind, query, max_pages, &mut sink, &cancel).await
}

/// Resolves the full-history range from the metadata endpoint
///
/// Falls back to the archive epoch through `today` when the metadata
/// request fails.
pub async fn full_history_range(client: &FetchClient, today: NaiveDate) -> DateRange {
    match fetch_info(client).await {
        Ok(info) => {
            tracing::info!(
                "Archive covers {} ({} notices)",
                info.date_range(today),
                info.total_notices
            );
            info.date_range(today)
        }
        Err(e) => {
            let range = DateRange::new(info::archive_epoch(), today);
            tracing::warn!("Could not fetch archive metadata ({}); using {}", e, range);
            range
        }
    }
}

/// Moves a unit along the state machine
pub(crate) fn advance(from: UnitState, to: UnitState) -> UnitState {
    debug_assert!(
        from.can_transition_to(to),
        "invalid unit transition: {} -> {}",
        from,
        to
    );
    to
}

/// Records a failed unit and decides whether it is abandoned
pub(crate) fn settle_failure(
    checkpoint: &mut CheckpointStore,
    key: &str,
    abandon_after: Option<u32>,
) -> UnitState {
    let failures = checkpoint.record_failure(key);
    match abandon_after {
        Some(limit) if failures >= limit => {
            checkpoint.abandon(key);
            UnitState::FailedTerminal
        }
        _ => UnitState::FailedTransient,
    }
}

/// How long to wait before the next unit after a failure of `kind`
pub(crate) fn failure_pause(kind: FailureKind, config: &CrawlerConfig) -> Duration {
    match kind {
        FailureKind::RateLimited => config.rate_limit_cooldown(),
        FailureKind::Timeout | FailureKind::Transport | FailureKind::Decode => {
            config.failure_pause()
        }
    }
}

/// Sleeps between units, returning early on cancellation
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) {
    if duration.is_zero() {
        return;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}
