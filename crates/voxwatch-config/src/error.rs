use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or checking the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// TOML syntax or type error.
    ///
    /// `origin` is a file path, or a marker such as `<merged config>` when
    /// the error surfaced after layering.
    #[error("invalid TOML in {origin}: {source}")]
    Parse {
        /// Where the bad TOML came from.
        origin: String,
        /// TOML decoder error.
        #[source]
        source: toml::de::Error,
    },

    /// A config file larger than the loader accepts.
    #[error("{} is {size} bytes, limit is {limit}", path.display())]
    TooLarge {
        /// Offending file.
        path: PathBuf,
        /// Actual size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        limit: u64,
    },

    /// A value parsed but is not usable.
    #[error("{field}: {message}")]
    Invalid {
        /// Dotted key, e.g. `gateway.token`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory for the current user.
    #[error("no home directory found for the current user")]
    NoHomeDir,
}

/// Result alias for this crate.
pub type ConfigResult<T> = Result<T, ConfigError>;
