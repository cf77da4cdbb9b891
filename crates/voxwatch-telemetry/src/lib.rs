//! Logging for voxwatch binaries.
//!
//! Builds a `tracing` subscriber from a [`LogConfig`]: an `EnvFilter` level
//! plus directives, one of four line formats, and either stderr or rolling
//! files through `tracing-appender`.
//!
//! # Example
//!
//! ```rust,no_run
//! use voxwatch_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), voxwatch_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("voxwatch_gateway=debug");
//!
//! // File output stops when the guard drops.
//! let _guard = setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogGuard, LogTarget, setup_logging};
