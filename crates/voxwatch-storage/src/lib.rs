//! Voxwatch Storage - presence log persistence and reporting.
//!
//! Presence events are appended to a CSV file ([`CsvLogStore`]) through a
//! non-blocking [`CsvLogSink`]. The file can be read back, aggregated into
//! [`Statistics`] for a [`Period`], and exported as JSON or CSV.
//!
//! # Example
//!
//! ```rust,no_run
//! use voxwatch_storage::{CsvLogStore, Period, Statistics, DEFAULT_FILE_NAME};
//!
//! # fn main() -> voxwatch_storage::StorageResult<()> {
//! let store = CsvLogStore::open("data", DEFAULT_FILE_NAME)?;
//! let records = store.load()?;
//! let stats = Statistics::calculate(&records, Period::Week, chrono::Local::now());
//! println!("{} joins this week", stats.joins);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod csv;
mod error;
mod export;
mod record;
mod stats;

pub use csv::{CsvLogSink, CsvLogStore, DEFAULT_FILE_NAME};
pub use error::{StorageError, StorageResult};
pub use export::{ExportFormat, to_csv, to_json, write_export};
pub use record::{CSV_HEADER, LogRecord};
pub use stats::{ChannelStats, GuildStats, Period, Statistics, UserStats};
