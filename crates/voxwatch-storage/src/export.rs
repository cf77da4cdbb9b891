//! JSON and CSV export of presence records.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::record::{CSV_HEADER, LogRecord};

/// Output format for [`write_export`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON array.
    #[default]
    Json,
    /// CSV with the log file's header.
    Csv,
}

impl ExportFormat {
    /// Conventional file extension.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(StorageError::UnknownFormat(other.to_owned())),
        }
    }
}

/// Render records as a pretty JSON array.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(records: &[LogRecord]) -> StorageResult<String> {
    Ok(serde_json::to_string_pretty(records)?)
}

/// Render records as CSV. `date` and `time` are recomputed from each
/// record's timestamp.
#[must_use]
pub fn to_csv(records: &[LogRecord]) -> String {
    let mut out = String::from(CSV_HEADER);
    for record in records {
        out.push('\n');
        out.push_str(&record.to_export_row());
    }
    out
}

/// Write `records` to `path` in `format`.
///
/// # Errors
///
/// Returns an error if rendering or writing fails.
pub fn write_export(
    path: impl AsRef<Path>,
    format: ExportFormat,
    records: &[LogRecord],
) -> StorageResult<()> {
    let path = path.as_ref();
    let body = match format {
        ExportFormat::Json => to_json(records)?,
        ExportFormat::Csv => to_csv(records),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    info!(path = %path.display(), %format, count = records.len(), "Exported presence records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use voxwatch_core::NormalizedEvent;

    use super::*;

    fn records() -> Vec<LogRecord> {
        vec![
            LogRecord::from_event(&NormalizedEvent::join("G", "alice", "General", "100", 1_000)),
            LogRecord::from_event(&NormalizedEvent::leave(
                "G", "alice", "General", "100", 61_000, 60_000,
            )),
        ]
    }

    #[test]
    fn json_uses_camel_case_fields() {
        let json = to_json(&records()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["eventType"], "join");
        assert_eq!(value[0]["stayDurationMs"], serde_json::Value::Null);
        assert_eq!(value[1]["stayDurationMs"], 60_000);
        assert_eq!(value[1]["channelId"], "100");
    }

    #[test]
    fn csv_has_header_and_rows() {
        let csv = to_csv(&records());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[2].ends_with(",leave,G,alice,General,100,60000"));
        assert_eq!(LogRecord::parse_csv_row(lines[1]).unwrap(), records()[0]);
    }

    #[test]
    fn write_export_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("voice.json");
        write_export(&path, ExportFormat::Json, &records()).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with('['));
    }

    #[test]
    fn format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
