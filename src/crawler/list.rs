//! Date-keyed list pass
//!
//! Walks a closed date range in ascending order, writing every notice listed
//! under each date to the record file and recording the date in the
//! checkpoint once its records are durable.

use crate::config::CrawlerConfig;
use crate::crawler::fetcher::FetchClient;
use crate::crawler::records::{list_by_date, stamp_source_date};
use crate::crawler::{advance, failure_pause, pause, settle_failure};
use crate::output::{Pass, RunSummary};
use crate::state::{DateKey, DateRange, Progress, RunTally, UnitState};
use crate::storage::{CheckpointStore, OutputLayout, RecordSink, StorageResult};
use crate::HarvestError;
use tokio_util::sync::CancellationToken;

/// Sequential crawler over `listbydate`
pub struct ListCrawler {
    client: FetchClient,
    checkpoint: CheckpointStore,
    sink: RecordSink,
    config: CrawlerConfig,
    cancel: CancellationToken,
}

impl ListCrawler {
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

    /// Opens the list checkpoint and record file of `layout`
    pub fn open(
        client: FetchClient,
        layout: &OutputLayout,
        config: CrawlerConfig,
        cancel: CancellationToken,
    ) -> StorageResult<Self> {
        let checkpoint = CheckpointStore::load(layout.list_checkpoint())?;
        let sink = RecordSink::open(layout.list_records())?;
        Ok(Self::new(client, checkpoint, sink, config, cancel))
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Makes abandoned dates eligible again
    pub fn retry_abandoned(&mut self) -> usize {
        self.checkpoint.clear_abandoned()
    }

    /// Crawls every unsettled date in `range`
    ///
    /// Per-date fetch failures are logged and left for a later run. Only a
    /// storage failure ends the run early with an error; the checkpoint is
    /// still flushed on the way out.
    pub async fn run(&mut self, range: DateRange) -> Result<RunSummary, HarvestError> {
        let mut progress = Progress::new(range.len());
        let mut tally = RunTally::default();

        tracing::info!(
            "Crawling {} ({} days, {} already in checkpoint)",
            range,
            range.len(),
            self.checkpoint.len()
        );

        let walked = self.walk(range, &mut progress, &mut tally).await;
        let finished = self.finish();
        let interrupted = walked?;
        finished?;

        let mut summary = RunSummary::new(Pass::List, range.len(), self.sink.path().to_path_buf());
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
        range: DateRange,
        progress: &mut Progress,
        tally: &mut RunTally,
    ) -> StorageResult<bool> {
        let interval = self.config.checkpoint_interval.max(1);
        let mut since_flush = 0;

        for date in range.iter() {
            if self.cancel.is_cancelled() {
                tracing::info!("Stopping before {} on cancellation", date);
                return Ok(true);
            }

            let key = date.to_string();
            if self.checkpoint.is_settled(&key) {
                tracing::trace!("{} already settled", key);
                tally.skipped += 1;
                progress.advance();
                continue;
            }

            let (state, records) = self.crawl_date(&date, &key, progress, tally).await?;
            tally.record(state, records);
            progress.advance();

            since_flush += 1;
            if since_flush >= interval {
                self.checkpoint.flush()?;
                since_flush = 0;
            }
        }

        Ok(false)
    }

    async fn crawl_date(
        &mut self,
        date: &DateKey,
        key: &str,
        progress: &Progress,
        tally: &RunTally,
    ) -> StorageResult<(UnitState, u64)> {
        let state = advance(UnitState::Pending, UnitState::Fetching);

        match list_by_date(&self.client, date).await {
            Ok(mut records) => {
                let count = records.len() as u64;
                for record in records.iter_mut() {
                    stamp_source_date(record, date);
                }
                for record in &records {
                    self.sink.append(record)?;
                }
                self.sink.flush()?;
                let state = advance(state, UnitState::Fetched);

                self.checkpoint.mark_complete(key, count);
                let state = advance(state, UnitState::Checkpointed);

                tracing::info!(
                    "[{:5.1}%] {}: {:4} records | total: {}",
                    progress.percent(),
                    key,
                    count,
                    tally.records + count
                );
                Ok((state, count))
            }
            Err(e) => {
                let kind = e.kind();
                let state = advance(
                    state,
                    settle_failure(&mut self.checkpoint, key, self.config.abandon_after()),
                );

                tracing::warn!(
                    "[{:5.1}%] {}: {} ({}){}",
                    progress.percent(),
                    key,
                    kind,
                    e,
                    if state == UnitState::FailedTerminal {
                        ", abandoned"
                    } else {
                        ""
                    }
                );

                pause(failure_pause(kind, &self.config), &self.cancel).await;
                Ok((state, 0))
            }
        }
    }

    /// Flushes the sink, then the checkpoint
    ///
    /// Both are attempted even if the first fails.
    fn finish(&mut self) -> StorageResult<()> {
        let sink = self.sink.flush();
        if let Err(e) = &sink {
            tracing::error!("Failed to flush {}: {}", self.sink.path().display(), e);
        }
        self.checkpoint.flush()?;
        sink
    }
}
