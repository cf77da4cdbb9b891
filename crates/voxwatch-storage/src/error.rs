//! Presence log errors.

/// Failures reading, writing or summarising the presence log.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem access to the log or an export target failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON export could not be encoded.
    #[error("json export: {0}")]
    Json(#[from] serde_json::Error),

    /// Not one of `today`, `week`, `month`, `all`.
    #[error("unknown period '{0}' (expected today, week, month or all)")]
    UnknownPeriod(String),

    /// Not one of `json`, `csv`.
    #[error("unknown export format '{0}' (expected json or csv)")]
    UnknownFormat(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
