//! File naming under the output directory

use crate::ConfigError;
use std::path::{Path, PathBuf};

const LIST_RECORDS: &str = "all_tenders.jsonl";
const LIST_CHECKPOINT: &str = "download_progress.json";
const DETAIL_RECORDS: &str = "tender_details.jsonl";
const DETAIL_CHECKPOINT: &str = "details_progress.json";

/// Paths of every file a run reads or writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the output directory
    ///
    /// Failure here is a setup error and aborts the run.
    pub fn prepare(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.root).map_err(|source| ConfigError::OutputDir {
            path: self.root.clone(),
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A nested layout for a bounded run, e.g. `recent/20260101_20260107`
    pub fn scoped(&self, scope: &str, label: &str) -> OutputLayout {
        OutputLayout::new(self.root.join(scope).join(label))
    }

    pub fn list_records(&self) -> PathBuf {
        self.root.join(LIST_RECORDS)
    }

    pub fn list_checkpoint(&self) -> PathBuf {
        self.root.join(LIST_CHECKPOINT)
    }

    pub fn detail_records(&self) -> PathBuf {
        self.root.join(DETAIL_RECORDS)
    }

    pub fn detail_checkpoint(&self) -> PathBuf {
        self.root.join(DETAIL_CHECKPOINT)
    }

    pub fn search_records(&self, query: &str) -> PathBuf {
        self.root.join(format!("search_{}.jsonl", sanitize_query(query)))
    }
}

/// Makes a search query safe to embed in a file name
fn sanitize_query(query: &str) -> String {
    query
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}
