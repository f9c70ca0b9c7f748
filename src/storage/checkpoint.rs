//! Checkpoint store
//!
//! A checkpoint is a JSON document holding the set of completed unit keys
//! and a few running counters. The whole document is rewritten on every
//! flush (temporary file, then rename), so a crash during a flush leaves the
//! previous snapshot in place.

use crate::storage::{io_error, StorageError, StorageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk checkpoint document
///
/// The aliases accept progress files written by the earlier downloader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(default, alias = "downloaded_dates", alias = "downloaded_ids")]
    completed_keys: BTreeSet<String>,

    #[serde(default, alias = "total_tenders", alias = "total_count")]
    records_fetched: u64,

    #[serde(default)]
    last_update: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    failures: BTreeMap<String, u32>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    abandoned_keys: BTreeSet<String>,
}

/// Durable set of completed units plus counters
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    data: CheckpointFile,
    dirty: bool,
}

impl CheckpointStore {
    /// Loads the checkpoint at `path`
    ///
    /// A missing file is a fresh start. A file that exists but cannot be
    /// parsed is reported as corrupt rather than silently discarded.
    pub fn load(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        let data = match fs::read_to_string(&path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
                    path: path.clone(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CheckpointFile::default(),
            Err(e) => return Err(io_error(&path)(e)),
        };

        tracing::debug!(
            "Loaded checkpoint {} with {} completed keys",
            path.display(),
            data.completed_keys.len()
        );

        Ok(Self {
            path,
            data,
            dirty: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the unit completed in this or an earlier run
    pub fn contains(&self, key: &str) -> bool {
        self.data.completed_keys.contains(key)
    }

    pub fn is_abandoned(&self, key: &str) -> bool {
        self.data.abandoned_keys.contains(key)
    }

    /// Returns true if the unit must not be fetched again
    pub fn is_settled(&self, key: &str) -> bool {
        self.contains(key) || self.is_abandoned(key)
    }

    /// Records a completed unit in memory
    ///
    /// The record delta is only counted the first time a key completes.
    /// Returns false if the key was already complete.
    pub fn mark_complete(&mut self, key: &str, records: u64) -> bool {
        let inserted = self.data.completed_keys.insert(key.to_string());
        if inserted {
            self.data.records_fetched += records;
            self.data.failures.remove(key);
            self.data.abandoned_keys.remove(key);
            self.dirty = true;
        }
        inserted
    }

    /// Increments the failure counter for a unit and returns the new count
    pub fn record_failure(&mut self, key: &str) -> u32 {
        let count = self.data.failures.entry(key.to_string()).or_insert(0);
        *count += 1;
        self.dirty = true;
        *count
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.data.failures.get(key).copied().unwrap_or(0)
    }

    /// Stops scheduling a unit in later runs
    pub fn abandon(&mut self, key: &str) {
        if self.data.abandoned_keys.insert(key.to_string()) {
            self.dirty = true;
        }
    }

    /// Makes every abandoned unit eligible again; returns how many were cleared
    pub fn clear_abandoned(&mut self) -> usize {
        let cleared = self.data.abandoned_keys.len();
        if cleared > 0 {
            self.data.abandoned_keys.clear();
            self.data.failures.clear();
            self.dirty = true;
        }
        cleared
    }

    pub fn completed_keys(&self) -> &BTreeSet<String> {
        &self.data.completed_keys
    }

    pub fn len(&self) -> usize {
        self.data.completed_keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.completed_keys.is_empty()
    }

    pub fn abandoned_count(&self) -> usize {
        self.data.abandoned_keys.len()
    }

    pub fn records_fetched(&self) -> u64 {
        self.data.records_fetched
    }

    pub fn last_update(&self) -> Option<&str> {
        self.data.last_update.as_deref()
    }

    /// Returns true if there are changes since the last flush
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes the full snapshot to disk
    pub fn flush(&mut self) -> StorageResult<()> {
        self.data.last_update = Some(Utc::now().to_rfc3339());
        let json = serde_json::to_vec_pretty(&self.data)?;

        let tmp_path = temp_path(&self.path);
        {
            let mut file = File::create(&tmp_path).map_err(io_error(&tmp_path))?;
            file.write_all(&json).map_err(io_error(&tmp_path))?;
            file.sync_all().map_err(io_error(&tmp_path))?;
        }
        fs::rename(&tmp_path, &self.path).map_err(io_error(&self.path))?;

        self.dirty = false;
        tracing::debug!(
            "Flushed checkpoint {} ({} completed keys)",
            self.path.display(),
            self.data.completed_keys.len()
        );
        Ok(())
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
