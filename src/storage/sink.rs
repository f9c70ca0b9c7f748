//! Append-only JSON-lines record sink

use crate::crawler::Record;
use crate::storage::{io_error, StorageResult};
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only writer, one compact JSON document per line
///
/// Records are buffered until `flush`, which also syncs the file so the
/// flushed records survive a crash.
#[derive(Debug)]
pub struct RecordSink {
    path: PathBuf,
    writer: BufWriter<File>,
    appended: u64,
}

impl RecordSink {
    /// Opens (or creates) the record file in append mode
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_error(&path))?;

        if terminate_partial_line(&mut file).map_err(io_error(&path))? {
            tracing::warn!(
                "{} ended in a partial record; continuing on a new line",
                path.display()
            );
        }

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    /// Creates the record file, discarding any previous contents
    ///
    /// For outputs that hold exactly one result set and have no checkpoint.
    pub fn create(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(io_error(&path))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            appended: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffers one record
    pub fn append<T: Serialize + ?Sized>(&mut self, record: &T) -> StorageResult<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n").map_err(io_error(&self.path))?;
        self.appended += 1;
        Ok(())
    }

    /// Forces buffered records to disk
    pub fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush().map_err(io_error(&self.path))?;
        self.writer
            .get_ref()
            .sync_data()
            .map_err(io_error(&self.path))?;
        Ok(())
    }

    /// Records appended through this handle
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

/// Writes a newline if the file does not end with one
fn terminate_partial_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;

    if last[0] == b'\n' {
        return Ok(false);
    }

    // Append mode always writes at the end, regardless of the read position
    file.write_all(b"\n")?;
    Ok(true)
}

/// Line counts from a `scan_records` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub records: u64,
    pub malformed: u64,
}

/// Reads a JSON-lines file, handing every object line to `f`
///
/// Blank lines are ignored; lines that are not a JSON object (including a
/// record cut short by a crash) are counted and skipped.
pub fn scan_records<F>(path: &Path, mut f: F) -> StorageResult<ScanReport>
where
    F: FnMut(Record),
{
    let file = File::open(path).map_err(io_error(path))?;
    let mut reader = BufReader::new(file);
    let mut report = ScanReport::default();
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(io_error(path))?;
        if read == 0 {
            break;
        }

        if line.iter().all(|b| b.is_ascii_whitespace()) {
            continue;
        }

        match serde_json::from_slice::<Value>(&line) {
            Ok(Value::Object(record)) => {
                report.records += 1;
                f(record);
            }
            _ => report.malformed += 1,
        }
    }

    if report.malformed > 0 {
        tracing::warn!(
            "Skipped {} malformed lines in {}",
            report.malformed,
            path.display()
        );
    }

    Ok(report)
}
