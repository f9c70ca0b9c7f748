//! Archive statistics from the files on disk
//!
//! This module reads the checkpoints and record files of an output directory
//! without touching the network.

use crate::crawler::ApiInfo;
use crate::storage::{CheckpointStore, OutputLayout, StorageResult};
use std::path::Path;

/// Local archive summary
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArchiveStatistics {
    /// Dates recorded in the list checkpoint
    pub list_dates: usize,

    /// Cumulative list record counter
    pub list_records: u64,

    /// Dates given up on after repeated failures
    pub abandoned_dates: usize,

    /// Last list checkpoint flush, as written
    pub last_update: Option<String>,

    pub list_file_bytes: u64,

    /// Identifier pairs recorded in the detail checkpoint
    pub detail_count: usize,

    pub abandoned_details: usize,

    pub detail_file_bytes: u64,
}

/// Loads statistics from an output directory
///
/// Missing files count as empty.
pub fn load_statistics(layout: &OutputLayout) -> StorageResult<ArchiveStatistics> {
    let list = CheckpointStore::load(layout.list_checkpoint())?;
    let details = CheckpointStore::load(layout.detail_checkpoint())?;

    Ok(ArchiveStatistics {
        list_dates: list.len(),
        list_records: list.records_fetched(),
        abandoned_dates: list.abandoned_count(),
        last_update: list.last_update().map(str::to_string),
        list_file_bytes: file_size(&layout.list_records()),
        detail_count: details.len(),
        abandoned_details: details.abandoned_count(),
        detail_file_bytes: file_size(&layout.detail_records()),
    })
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

/// Prints local statistics to stdout
pub fn print_statistics(stats: &ArchiveStatistics) {
    println!("=== Local Archive ===\n");

    println!("List pass:");
    println!("  Dates downloaded: {}", stats.list_dates);
    println!("  Records: {}", stats.list_records);
    if stats.abandoned_dates > 0 {
        println!("  Abandoned dates: {}", stats.abandoned_dates);
    }
    println!("  File size: {:.2} MB", megabytes(stats.list_file_bytes));
    if let Some(last) = &stats.last_update {
        println!("  Last update: {}", last);
    }
    println!();

    println!("Detail pass:");
    println!("  Tenders downloaded: {}", stats.detail_count);
    if stats.abandoned_details > 0 {
        println!("  Abandoned tenders: {}", stats.abandoned_details);
    }
    println!("  File size: {:.2} MB", megabytes(stats.detail_file_bytes));
}

/// Prints the upstream archive metadata to stdout
pub fn print_api_info(info: &ApiInfo) {
    println!("=== API Archive ===\n");

    match info.earliest {
        Some(date) => println!("  Earliest notice: {}", date),
        None => println!("  Earliest notice: unknown"),
    }
    match info.latest {
        Some(date) => println!("  Latest notice: {}", date),
        None => println!("  Latest notice: unknown"),
    }
    println!("  Total notices: {}", info.total_notices);

    if let (Some(earliest), Some(latest)) = (info.earliest, info.latest) {
        let days = (latest - earliest).num_days() + 1;
        println!("  Days covered: {}", days);
    }
    println!();
}
