//! Append-only CSV presence log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use voxwatch_core::{EventSink, NormalizedEvent, TrackerEvent};

use crate::error::StorageResult;
use crate::record::{CSV_HEADER, LogRecord, split_records};

/// Default log file name inside the data directory.
pub const DEFAULT_FILE_NAME: &str = "voice-log.csv";

/// Presence log stored as a CSV file.
///
/// Appends are serialized through an internal lock so concurrent sinks
/// never interleave partial rows.
#[derive(Debug)]
pub struct CsvLogStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLogStore {
    /// Open (or create) `dir/file_name`, writing the header to new files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be created.
    pub fn open(dir: impl AsRef<Path>, file_name: &str) -> StorageResult<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(file_name);

        if !path.exists() {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(file, "{CSV_HEADER}")?;
            debug!(path = %path.display(), "Created presence log");
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append(&self, event: &NormalizedEvent) -> StorageResult<()> {
        self.append_record(&LogRecord::from_event(event))
    }

    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append_record(&self, record: &LogRecord) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", record.to_csv_row())?;
        Ok(())
    }

    /// Read every record. Malformed rows are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load(&self) -> StorageResult<Vec<LogRecord>> {
        self.load_between(None, None)
    }

    /// Read records with `start_ms <= timestamp <= end_ms`. Either bound may
    /// be open.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn load_between(
        &self,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> StorageResult<Vec<LogRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line, row) in split_records(&content).into_iter().skip(1) {
            let row = row.trim();
            if row.is_empty() {
                continue;
            }
            let Some(record) = LogRecord::parse_csv_row(row) else {
                warn!(line, "Skipping malformed log row");
                continue;
            };
            if start_ms.is_some_and(|start| record.timestamp < start)
                || end_ms.is_some_and(|end| record.timestamp > end)
            {
                continue;
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// [`EventSink`] that queues presence rows for a [`CsvLogStore`].
///
/// `deliver` only enqueues. A single writer on the blocking pool appends
/// rows in delivery order and exits once the sink is dropped.
#[derive(Debug)]
pub struct CsvLogSink {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl CsvLogSink {
    /// Start the writer for `store`. Must be called within a Tokio runtime.
    ///
    /// The returned handle completes after the last queued row is written.
    #[must_use]
    pub fn spawn(store: Arc<CsvLogStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogRecord>();
        let writer = tokio::task::spawn_blocking(move || {
            while let Some(record) = rx.blocking_recv() {
                if let Err(e) = store.append_record(&record) {
                    warn!(path = %store.path().display(), error = %e, "Failed to append presence log");
                }
            }
            debug!(path = %store.path().display(), "Presence log writer stopped");
        });
        (Self { tx }, writer)
    }
}

impl EventSink for CsvLogSink {
    fn deliver(&self, event: &TrackerEvent) {
        let TrackerEvent::Presence(presence) = event else {
            return;
        };
        if self.tx.send(LogRecord::from_event(presence)).is_err() {
            warn!("Presence log writer is gone, dropping event");
        }
    }
}
