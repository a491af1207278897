/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use upmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "monitored_unit",
///     id: "unit-99".to_string(),
/// };
/// assert!(err.to_string().contains("monitored_unit"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (schedule/probe
    /// columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored column held a value the domain type rejects (e.g. an
    /// unknown status string written by a newer version).
    #[error("Storage: invalid value in column '{column}': {message}")]
    InvalidColumn {
        column: &'static str,
        message: String,
    },

    /// Filesystem error while preparing the data directory.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
