//! Output module for run summaries and archive reports
//!
//! This module handles:
//! - Summarizing a finished crawl pass
//! - Reporting what the local archive holds
//! - Displaying the upstream archive metadata

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_api_info, print_statistics, ArchiveStatistics};
pub use summary::{format_summary, print_summary, Pass, RunSummary};
