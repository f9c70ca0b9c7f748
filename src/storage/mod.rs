//! Storage module for persisting crawl output
//!
//! This module handles everything the crawler writes to disk:
//! - Append-only JSON-lines record files (`RecordSink`)
//! - Checkpoint files of completed unit keys and counters (`CheckpointStore`)
//! - The output directory layout (`OutputLayout`)
//! - The single-writer lock (`RunLock`)

mod checkpoint;
mod layout;
mod lock;
mod sink;

pub use checkpoint::CheckpointStore;
pub use layout::OutputLayout;
pub use lock::{RunLock, LOCK_FILE_NAME};
pub use sink::{scan_records, RecordSink, ScanReport};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint {}: {message}", .path.display())]
    Corrupt { path: PathBuf, message: String },

    #[error("Output directory is locked by another run ({}); remove the file if no crawl is running", .path.display())]
    Locked { path: PathBuf },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Attaches the offending path to an IO error
pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}
