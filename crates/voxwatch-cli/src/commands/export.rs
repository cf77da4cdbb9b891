//! Export command - write presence records to JSON or CSV.

use std::path::Path;

use anyhow::Context;
use chrono::Local;
use voxwatch_config::Config;
use voxwatch_storage::{ExportFormat, Period, write_export};

use super::stats::open_store;
use crate::theme::Theme;

/// Export the records of `period` to `out`.
pub(crate) fn export_records(
    cfg: &Config,
    format: ExportFormat,
    out: &Path,
    period: Period,
) -> anyhow::Result<()> {
    let store = open_store(cfg)?;
    let start_ms = period
        .start(Local::now())
        .map(|start| start.timestamp_millis());
    let records = store
        .load_between(start_ms, None)
        .context("failed to read presence log")?;

    write_export(out, format, &records)
        .with_context(|| format!("failed to write {}", out.display()))?;

    println!(
        "{}",
        Theme::success(&format!(
            "Exported {} record(s) ({period}) to {}",
            records.len(),
            out.display()
        ))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use voxwatch_core::NormalizedEvent;
    use voxwatch_storage::{CSV_HEADER, CsvLogStore};

    use super::*;

    #[test]
    fn exports_all_records_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.storage.data_dir = Some(dir.path().join("data"));

        let store = CsvLogStore::open(dir.path().join("data"), &cfg.storage.file_name).unwrap();
        store
            .append(&NormalizedEvent::join("G", "alice", "General", "100", 1_000))
            .unwrap();

        let out = dir.path().join("out").join("export.csv");
        export_records(&cfg, ExportFormat::Csv, &out, Period::All).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some(CSV_HEADER));
        assert!(lines.next().unwrap().contains(",join,G,alice,General,100,"));
    }

    #[test]
    fn period_filters_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = Config::default();
        cfg.storage.data_dir = Some(dir.path().to_path_buf());

        let store = CsvLogStore::open(dir.path(), &cfg.storage.file_name).unwrap();
        store
            .append(&NormalizedEvent::join("G", "old", "c", "1", 1_000))
            .unwrap();
        store
            .append(&NormalizedEvent::join(
                "G",
                "new",
                "c",
                "1",
                chrono::Utc::now().timestamp_millis(),
            ))
            .unwrap();

        let out = dir.path().join("today.json");
        export_records(&cfg, ExportFormat::Json, &out, Period::Today).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let users: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["userName"].as_str().unwrap())
            .collect();
        assert_eq!(users, vec!["new"]);
    }
}
