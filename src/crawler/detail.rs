//! Identifier-keyed detail pass
//!
//! The list pass output is scanned once for `(unit_id, job_number)` pairs.
//! Each pair not yet fetched is requested from `tender` and the full document
//! appended to the detail record file.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::{FailureKind, FetchClient};
use crate::crawler::records::{detail_key, fetched_key, stamp_detail_key, tender_detail};
use crate::crawler::{advance, pause, settle_failure};
use crate::output::{Pass, RunSummary};
use crate::state::{DetailKey, Progress, RunTally, UnitState};
use crate::storage::{scan_records, CheckpointStore, OutputLayout, RecordSink, StorageResult};
use crate::{ConfigError, HarvestError};
use std::collections::HashSet;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Progress is logged every this many handled pairs
const PROGRESS_EVERY: usize = 100;

/// Result of scanning the list output for detail work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSet {
    /// Pairs to fetch, in discovery order
    pub eligible: Vec<DetailKey>,
    /// Records carrying both identifiers
    pub discovered: u64,
    /// Pairs already fetched, checkpointed, or repeated in the scan
    pub skipped_duplicates: u64,
}

/// Scans `list_records` for identifier pairs that still need a detail fetch
///
/// A pair is skipped if it is settled in `checkpoint`, already present in
/// `detail_records`, or repeats a pair seen earlier in the scan. Repeats are
/// compared as whole pairs, so two pairs sharing a checkpoint key are both
/// fetched within one scan.
pub fn discover_work(
    list_records: &Path,
    detail_records: &Path,
    checkpoint: &CheckpointStore,
) -> StorageResult<WorkSet> {
    let mut fetched = HashSet::new();
    if detail_records.exists() {
        scan_records(detail_records, |record| {
            if let Some(key) = fetched_key(&record) {
                fetched.insert(key);
            }
        })?;
    }

    let mut seen = HashSet::new();
    let mut work = WorkSet::default();

    scan_records(list_records, |record| {
        let pair = match detail_key(&record) {
            Some(pair) => pair,
            None => return,
        };
        work.discovered += 1;

        let key = pair.key();
        let state = if checkpoint.is_settled(&key)
            || fetched.contains(&key)
            || !seen.insert(pair.clone())
        {
            advance(UnitState::Discovered, UnitState::SkippedDuplicate)
        } else {
            advance(UnitState::Discovered, UnitState::Pending)
        };

        match state {
            UnitState::Pending => work.eligible.push(pair),
            _ => work.skipped_duplicates += 1,
        }
    })?;

    Ok(work)
}

/// Sequential crawler over `tender`
pub struct DetailCrawler {
    client: FetchClient,
    checkpoint: CheckpointStore,
    sink: RecordSink,
    config: CrawlerConfig,
    cancel: CancellationToken,
}

impl DetailCrawler {
    pub fn new(
        client: FetchClient,
        checkpoint: CheckpointStore,
        sink: RecordSink,
        config: CrawlerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            checkpoint,
            sink,
            config,
            cancel,
        }
    }

    /// Opens the detail checkpoint and record file of `layout`
    pub fn open(
        client: FetchClient,
        layout: &OutputLayout,
        config: CrawlerConfig,
        cancel: CancellationToken,
    ) -> StorageResult<Self> {
        let checkpoint = CheckpointStore::load(layout.detail_checkpoint())?;
        let sink = RecordSink::open(layout.detail_records())?;
        Ok(Self::new(client, checkpoint, sink, config, cancel))
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Makes abandoned pairs eligible again
    pub fn retry_abandoned(&mut self) -> usize {
        self.checkpoint.clear_abandoned()
    }

    /// Fetches details for every eligible pair found in `list_records`
    pub async fn run(&mut self, list_records: &Path) -> Result<RunSummary, HarvestError> {
        if !list_records.exists() {
            return Err(ConfigError::MissingInput(list_records.to_path_buf()).into());
        }

        let work = discover_work(list_records, self.sink.path(), &self.checkpoint)?;
        tracing::info!(
            "Found {} identifier pairs: {} to fetch, {} already done or repeated",
            work.discovered,
            work.eligible.len(),
            work.skipped_duplicates
        );

        let mut progress = Progress::new(work.eligible.len());
        let mut tally = RunTally {
            skipped: work.skipped_duplicates,
            ..RunTally::default()
        };

        let walked = self.walk(&work.eligible, &mut progress, &mut tally).await;
        let finished = self.finish();
        let interrupted = walked?;
        finished?;

        let mut summary = RunSummary::new(
            Pass::Detail,
            work.eligible.len(),
            self.sink.path().to_path_buf(),
        );
        summary.tally = tally;
        summary.interrupted = interrupted;
        summary.elapsed = progress.elapsed();
        summary.checkpoint_path = Some(self.checkpoint.path().to_path_buf());
        summary.checkpointed_units = self.checkpoint.len();
        summary.checkpointed_records = self.checkpoint.records_fetched();
        Ok(summary)
    }

    /// Returns true if the walk stopped on cancellation
    async fn walk(
        &mut self,
        eligible: &[DetailKey],
        progress: &mut Progress,
        tally: &mut RunTally,
    ) -> StorageResult<bool> {
        let batch = self.config.detail_batch_size.max(1);
        let mut since_flush = 0;

        for pair in eligible {
            if self.cancel.is_cancelled() {
                tracing::info!("Stopping before {} on cancellation", pair);
                return Ok(true);
            }

            let state = self.crawl_pair(pair).await?;
            tally.record(state, u64::from(state == UnitState::Checkpointed));
            progress.advance();

            if state == UnitState::Checkpointed {
                since_flush += 1;
                if since_flush >= batch {
                    self.sink.flush()?;
                    self.checkpoint.flush()?;
                    since_flush = 0;
                }
            }

            if progress.processed() % PROGRESS_EVERY == 0 {
                tracing::info!(
                    "[{:5.1}%] {}/{} | fetched: {} | failed: {} | {:.1}/s",
                    progress.percent(),
                    progress.processed(),
                    progress.total(),
                    tally.completed,
                    tally.failed + tally.abandoned,
                    progress.rate()
                );
            }
        }

        Ok(false)
    }

    async fn crawl_pair(&mut self, pair: &DetailKey) -> StorageResult<UnitState> {
        let state = advance(UnitState::Pending, UnitState::Fetching);
        let key = pair.key();

        let failure = match tender_detail(&self.client, pair).await {
            Ok(Some(mut document)) => {
                stamp_detail_key(&mut document, pair);
                self.sink.append(&document)?;
                let state = advance(state, UnitState::Fetched);

                self.checkpoint.mark_complete(&key, 1);
                tracing::debug!("{}: fetched", key);
                return Ok(advance(state, UnitState::Checkpointed));
            }
            Ok(None) => {
                tracing::warn!("{}: empty detail document", key);
                None
            }
            Err(e) => {
                tracing::warn!("{}: {} ({})", key, e.kind(), e);
                Some(e.kind())
            }
        };

        let state = advance(
            state,
            settle_failure(&mut self.checkpoint, &key, self.config.abandon_after()),
        );
        if state == UnitState::FailedTerminal {
            tracing::warn!("{}: abandoned", key);
        }

        if failure == Some(FailureKind::RateLimited) {
            pause(self.config.rate_limit_cooldown(), &self.cancel).await;
        }

        Ok(state)
    }

    /// Flushes the sink, then the checkpoint
    ///
    /// Completions are marked before their records are synced, so the
    /// checkpoint is only written once the sink flush has succeeded.
    fn finish(&mut self) -> StorageResult<()> {
        self.sink.flush()?;
        self.checkpoint.flush()
    }
}
