//! End-of-run summary
//!
//! Every crawl pass hands back a `RunSummary`; the binary prints it once the
//! pass has flushed its files.

use crate::state::RunTally;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which crawl produced a summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    List,
    Detail,
    Search,
}

impl Pass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail => "detail",
            Self::Search => "search",
        }
    }

    /// Noun for the pass's unit of work
    fn unit_label(&self) -> &'static str {
        match self {
            Self::List => "dates",
            Self::Detail => "tenders",
            Self::Search => "pages",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one crawl pass
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub pass: Pass,

    /// Units the pass set out to handle (range length, eligible pairs, page cap)
    pub planned: usize,

    /// Per-outcome counts for this run
    pub tally: RunTally,

    /// True if the run stopped on cancellation before handling every unit
    pub interrupted: bool,

    pub elapsed: Duration,

    /// Record file the pass appended to
    pub records_path: PathBuf,

    /// Checkpoint the pass maintained, if any
    pub checkpoint_path: Option<PathBuf>,

    /// Completed keys in the checkpoint after the run
    pub checkpointed_units: usize,

    /// Cumulative record counter in the checkpoint after the run
    pub checkpointed_records: u64,
}

impl RunSummary {
    pub fn new(pass: Pass, planned: usize, records_path: PathBuf) -> Self {
        Self {
            pass,
            planned,
            tally: RunTally::default(),
            interrupted: false,
            elapsed: Duration::ZERO,
            records_path,
            checkpoint_path: None,
            checkpointed_units: 0,
            checkpointed_records: 0,
        }
    }
}

/// Formats a run summary for the terminal
pub fn format_summary(summary: &RunSummary) -> String {
    let units = summary.pass.unit_label();
    let mut out = String::new();

    let status = if summary.interrupted {
        "interrupted"
    } else {
        "complete"
    };
    out.push_str(&format!(
        "=== {} pass {} ===\n",
        capitalize(summary.pass.as_str()),
        status
    ));

    out.push_str(&format!("  Planned {}: {}\n", units, summary.planned));
    out.push_str(&format!("  Completed: {}\n", summary.tally.completed));
    out.push_str(&format!("  Skipped: {}\n", summary.tally.skipped));
    out.push_str(&format!("  Failed (will retry): {}\n", summary.tally.failed));
    if summary.tally.abandoned > 0 {
        out.push_str(&format!("  Abandoned: {}\n", summary.tally.abandoned));
    }
    out.push_str(&format!("  Records written: {}\n", summary.tally.records));
    out.push_str(&format!(
        "  Elapsed: {:.1} minutes\n",
        summary.elapsed.as_secs_f64() / 60.0
    ));

    if summary.checkpoint_path.is_some() {
        out.push_str(&format!(
            "  Archive total: {} {}, {} records\n",
            summary.checkpointed_units, units, summary.checkpointed_records
        ));
    }

    out.push_str(&format!("  Output: {}\n", summary.records_path.display()));
    if let Some(checkpoint) = &summary.checkpoint_path {
        out.push_str(&format!("  Checkpoint: {}\n", checkpoint.display()));
    }

    if summary.interrupted {
        out.push_str("\nRun the same command again to resume.\n");
    } else if summary.tally.failed > 0 {
        out.push_str(&format!(
            "\n{} {} failed and will be retried on the next run.\n",
            summary.tally.failed, units
        ));
    }

    out
}

/// Prints a run summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!();
    print!("{}", format_summary(summary));
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
