//! Durable store of undelivered shift events.
//!
//! The store is a single insertion-ordered log file. Records have no key:
//! identity is positional, so only this process may write the file.
//!
//! # File Layout
//!
//! ```text
//! <path>        # one record per line, see `record`
//! <path>.tmp    # transient, only present while `replace` runs
//! ```
//!
//! # Crash Safety
//!
//! - `append` fsyncs after every record and truncates back on a failed write
//! - `replace` writes the new record set to a temp file, fsyncs it, renames it
//!   over the log and fsyncs the directory, so a crash leaves either the old
//!   or the new contents
//! - Malformed lines (torn writes, manual edits) are dropped on load and
//!   purged by `cleanup`, which runs once at startup

pub mod durable;
pub mod record;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

pub use record::{MalformedRecord, StoredEvent};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error on the backing medium.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The event cannot be represented in the record format.
    #[error("event cannot be stored: {0}")]
    InvalidRecord(#[from] MalformedRecord),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of reading the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Well-formed records, in file order.
    pub events: Vec<StoredEvent>,

    /// Number of non-blank lines that were dropped.
    pub malformed: usize,
}

/// Outcome of the startup maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub kept: usize,
    pub dropped: usize,
}

/// The event store, backed by one file.
#[derive(Debug, Clone)]
pub struct EventStore {
    path: PathBuf,
}

impl EventStore {
    /// Creates a store handle. The file is created lazily on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EventStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably appends one event.
    ///
    /// A failure here means the event is lost: there is no further fallback.
    pub fn append(&self, event: &StoredEvent) -> Result<()> {
        let line = event.to_line()?;
        durable::append_line(&self.path, &line)?;
        debug!(event = %event, "Appended event to store");
        Ok(())
    }

    /// Reads every well-formed record, dropping malformed lines.
    pub fn load_all(&self) -> Result<Vec<StoredEvent>> {
        Ok(self.load_with_report()?.events)
    }

    /// Like [`load_all`](Self::load_all), but also counts dropped lines.
    pub fn load_with_report(&self) -> Result<LoadReport> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(LoadReport::default()),
            Err(e) => return Err(e.into()),
        };

        let mut report = LoadReport::default();
        for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if raw.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let parsed = std::str::from_utf8(raw)
                .map_err(|_| MalformedRecord::NotUtf8)
                .and_then(StoredEvent::parse_line);
            match parsed {
                Ok(event) => report.events.push(event),
                Err(reason) => {
                    report.malformed += 1;
                    debug!(line = index + 1, %reason, "Dropping malformed record");
                }
            }
        }

        if report.malformed > 0 {
            warn!(
                path = %self.path.display(),
                malformed = report.malformed,
                kept = report.events.len(),
                "Store contains malformed records"
            );
        }

        Ok(report)
    }

    /// Atomically rewrites the store to hold exactly `events`, in order.
    pub fn replace(&self, events: &[StoredEvent]) -> Result<()> {
        let mut contents = String::new();
        for event in events {
            contents.push_str(&event.to_line()?);
        }

        durable::write_atomic(&self.path, contents.as_bytes())?;
        debug!(count = events.len(), "Replaced store contents");
        Ok(())
    }

    /// Number of records currently stored.
    ///
    /// Counts non-blank lines without parsing them. After `cleanup` every
    /// line this process writes is well-formed, so the count is exact.
    pub fn count(&self) -> Result<usize> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(bytes
                .split(|b| *b == b'\n')
                .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
                .count()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Startup maintenance: rewrites the store with only its valid records
    /// and removes a temp file left behind by an interrupted `replace`.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        let tmp = durable::temp_path(&self.path);
        match std::fs::remove_file(&tmp) {
            Ok(()) => info!(path = %tmp.display(), "Removed stale temp file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let report = self.load_with_report()?;
        self.replace(&report.events)?;

        let summary = CleanupReport {
            kept: report.events.len(),
            dropped: report.malformed,
        };
        info!(kept = summary.kept, dropped = summary.dropped, "Store cleanup complete");
        Ok(summary)
    }
}
