//! Log rows and their CSV encoding.

use std::borrow::Cow;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use voxwatch_core::{NormalizedEvent, PresenceKind};

/// Header line of every log file and CSV export.
pub const CSV_HEADER: &str =
    "timestamp,date,time,eventType,guildName,userName,channelName,channelId,stayDurationMs";

const COLUMNS: usize = 9;

/// One persisted presence event.
///
/// `date` is the UTC calendar date while `time` is the local wall-clock
/// time of `timestamp`; existing log files depend on this mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// `YYYY-MM-DD` (UTC).
    pub date: String,
    /// `HH:MM:SS` (local).
    pub time: String,
    /// Join or leave.
    pub event_type: PresenceKind,
    /// Guild display name.
    pub guild_name: String,
    /// User display name.
    pub user_name: String,
    /// Channel display name.
    pub channel_name: String,
    /// Channel snowflake.
    pub channel_id: String,
    /// Stay duration for leaves; absent when unknown or zero.
    pub stay_duration_ms: Option<u64>,
}

impl LogRecord {
    /// Build a record from a presence event.
    #[must_use]
    pub fn from_event(event: &NormalizedEvent) -> Self {
        let (date, time) = date_time_columns(event.timestamp_ms);
        Self {
            timestamp: event.timestamp_ms,
            date,
            time,
            event_type: event.kind,
            guild_name: event.guild_name.clone(),
            user_name: event.user_name.clone(),
            channel_name: event.channel_name.clone(),
            channel_id: event.channel_id.clone(),
            stay_duration_ms: event.stay_duration_ms.filter(|ms| *ms > 0),
        }
    }

    /// Encode as one CSV line (no trailing newline).
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        let stay = self
            .stay_duration_ms
            .filter(|ms| *ms > 0)
            .map(|ms| ms.to_string())
            .unwrap_or_default();
        [
            Cow::Owned(self.timestamp.to_string()),
            Cow::Borrowed(self.date.as_str()),
            Cow::Borrowed(self.time.as_str()),
            Cow::Borrowed(self.event_type.as_str()),
            escape_field(&self.guild_name),
            escape_field(&self.user_name),
            escape_field(&self.channel_name),
            escape_field(&self.channel_id),
            Cow::Owned(stay),
        ]
        .join(",")
    }

    /// Same row with `date` and `time` recomputed from `timestamp`.
    #[must_use]
    pub fn to_export_row(&self) -> String {
        let (date, time) = date_time_columns(self.timestamp);
        Self {
            date,
            time,
            ..self.clone()
        }
        .to_csv_row()
    }

    /// Parse one CSV line. Returns `None` for malformed rows.
    #[must_use]
    pub fn parse_csv_row(line: &str) -> Option<Self> {
        let fields = split_row(line);
        if fields.len() < COLUMNS {
            return None;
        }
        let mut fields = fields.into_iter();
        let mut next = || fields.next().unwrap_or_default();

        let timestamp = next().trim().parse().ok()?;
        let date = next();
        let time = next();
        let event_type = next().trim().parse().ok()?;
        let guild_name = next();
        let user_name = next();
        let channel_name = next();
        let channel_id = next();
        let stay = next();
        let stay_duration_ms = match stay.trim() {
            "" => None,
            raw => Some(raw.parse().ok()?).filter(|ms| *ms > 0),
        };

        Some(Self {
            timestamp,
            date,
            time,
            event_type,
            guild_name,
            user_name,
            channel_name,
            channel_id,
            stay_duration_ms,
        })
    }

    /// Local time of the event, if the timestamp is representable.
    #[must_use]
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        DateTime::<Utc>::from_timestamp_millis(self.timestamp).map(|t| t.with_timezone(&Local))
    }
}

fn date_time_columns(timestamp_ms: i64) -> (String, String) {
    match DateTime::<Utc>::from_timestamp_millis(timestamp_ms) {
        Some(utc) => (
            utc.format("%Y-%m-%d").to_string(),
            utc.with_timezone(&Local).format("%H:%M:%S").to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

/// Quote a field if it contains a separator, quote or line break.
pub(crate) fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Split file content into records, yielding each with its 1-based first
/// line. A line break inside a quoted field belongs to the field.
pub(crate) fn split_records(content: &str) -> Vec<(usize, &str)> {
    let mut records = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let mut line: usize = 1;
    let mut start_line: usize = 1;

    // Quotes and newlines are ASCII, so every cut lands on a char boundary.
    for (i, byte) in content.bytes().enumerate() {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' => {
                line = line.saturating_add(1);
                if !in_quotes {
                    records.push((start_line, &content[start..i]));
                    start = i.saturating_add(1);
                    start_line = line;
                }
            },
            _ => {},
        }
    }
    if start < content.len() {
        records.push((start_line, &content[start..]));
    }
    records
}

/// Split one record, honoring quoted fields and doubled quotes.
fn split_row(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(COLUMNS);
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            },
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-01-15T12:34:56Z
    const TS: i64 = 1_705_322_096_000;

    fn leave() -> NormalizedEvent {
        NormalizedEvent::leave("Guild", "alice", "General", "100", TS, 90_000)
    }

    #[test]
    fn date_is_utc_and_time_is_local() {
        let record = LogRecord::from_event(&leave());
        assert_eq!(record.date, "2024-01-15");
        let expected_time = DateTime::<Utc>::from_timestamp_millis(TS)
            .unwrap()
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string();
        assert_eq!(record.time, expected_time);
    }

    #[test]
    fn row_layout() {
        let record = LogRecord::from_event(&leave());
        let row = record.to_csv_row();
        assert!(row.starts_with("1705322096000,2024-01-15,"));
        assert!(row.ends_with(",leave,Guild,alice,General,100,90000"));
    }

    #[test]
    fn zero_or_missing_duration_is_empty() {
        let zero = NormalizedEvent::leave("G", "u", "c", "1", TS, 0);
        assert!(LogRecord::from_event(&zero).to_csv_row().ends_with(",1,"));

        let join = NormalizedEvent::join("G", "u", "c", "1", TS);
        assert!(LogRecord::from_event(&join).to_csv_row().ends_with(",1,"));
    }

    #[test]
    fn special_characters_are_quoted_and_parsed_back() {
        let event = NormalizedEvent::join("My, Guild", "say \"hi\"", "plain", "1", TS);
        let record = LogRecord::from_event(&event);
        let row = record.to_csv_row();
        assert!(row.contains("\"My, Guild\""));
        assert!(row.contains("\"say \"\"hi\"\"\""));

        let parsed = LogRecord::parse_csv_row(&row).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(LogRecord::parse_csv_row("").is_none());
        assert!(LogRecord::parse_csv_row("a,b,c").is_none());
        assert!(LogRecord::parse_csv_row("x,2024-01-15,10:00:00,join,g,u,c,1,").is_none());
        assert!(LogRecord::parse_csv_row("1,2024-01-15,10:00:00,wave,g,u,c,1,").is_none());
        assert!(LogRecord::parse_csv_row("1,2024-01-15,10:00:00,leave,g,u,c,1,soon").is_none());
    }

    #[test]
    fn quoted_line_breaks_stay_in_one_record() {
        let event = NormalizedEvent::join("G", "line1\nline2", "c\r\nd", "1", TS);
        let row = LogRecord::from_event(&event).to_csv_row();
        let content = format!("{CSV_HEADER}\n{row}\n1,2024-01-15,10:00:00,join,g,u,c,1,\n");

        let records = split_records(&content);
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].0, 2);
        assert_eq!(records[2].0, 5);

        let parsed = LogRecord::parse_csv_row(records[1].1).unwrap();
        assert_eq!(parsed.user_name, "line1\nline2");
        assert_eq!(parsed.channel_name, "c\r\nd");
    }

    #[test]
    fn unterminated_last_record_is_kept() {
        let records = split_records("a,b\nc,d");
        assert_eq!(records, vec![(1, "a,b"), (2, "c,d")]);
        assert!(split_records("").is_empty());
    }

    #[test]
    fn escape_only_when_needed() {
        assert!(matches!(escape_field("plain"), Cow::Borrowed("plain")));
        assert_eq!(escape_field("a\nb"), "\"a\nb\"");
    }
}
