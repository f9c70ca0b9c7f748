//! Run-scoped progress and tallies
//!
//! Nothing here is persisted. A crawler owns one `Progress` and one
//! `RunTally` for the duration of a run and hands the tally back in its
//! summary.

use crate::state::UnitState;
use std::time::{Duration, Instant};

/// Completed/total view used for progress lines
#[derive(Debug, Clone)]
pub struct Progress {
    total: usize,
    processed: usize,
    started: Instant,
}

impl Progress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            started: Instant::now(),
        }
    }

    /// Counts one more unit as handled, whatever its outcome
    pub fn advance(&mut self) {
        self.processed += 1;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Share of units handled before the current one, in percent
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.processed as f64 / self.total as f64) * 100.0
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Units per second since the run started
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Outcome counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Units fetched and checkpointed this run
    pub completed: u64,
    /// Units already settled before this run started
    pub skipped: u64,
    /// Units that failed and remain pending
    pub failed: u64,
    /// Units abandoned this run
    pub abandoned: u64,
    /// Records written this run
    pub records: u64,
}

impl RunTally {
    /// Folds a unit's final state into the tally
    pub fn record(&mut self, state: UnitState, records: u64) {
        match state {
            UnitState::Checkpointed => {
                self.completed += 1;
                self.records += records;
            }
            UnitState::FailedTransient => self.failed += 1,
            UnitState::FailedTerminal => self.abandoned += 1,
            UnitState::SkippedDuplicate => self.skipped += 1,
            _ => {}
        }
    }
}
