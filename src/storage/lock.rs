//! Single-writer lock for an output directory

use crate::storage::{io_error, StorageError, StorageResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const LOCK_FILE_NAME: &str = ".pcc-harvest.lock";

/// Held for the lifetime of a run; removes the lock file on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Claims `dir` for this process
    ///
    /// Fails with `StorageError::Locked` if another run holds the directory,
    /// or if a previous run was killed without releasing it.
    pub fn acquire(dir: &Path) -> StorageResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::Locked { path });
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        writeln!(file, "{}", std::process::id()).map_err(io_error(&path))?;
        tracing::debug!("Acquired run lock {}", path.display());

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}
