use std::path::PathBuf;

use thiserror::Error;

/// Logging setup failures.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// `format` or `rotation` name not recognised.
    #[error("unknown {kind} '{value}'")]
    UnknownOption {
        /// Which option, e.g. `log format`.
        kind: &'static str,
        /// The rejected value.
        value: String,
    },

    /// Level or per-target directive did not parse.
    #[error("bad filter directive '{directive}': {reason}")]
    Filter {
        /// Directive as written.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// Log directory could not be created.
    #[error("cannot create log directory {}: {source}", path.display())]
    LogDir {
        /// Requested directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A global subscriber was already installed.
    #[error("subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

/// Result alias for logging setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
