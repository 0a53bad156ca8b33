use rusqlite::ErrorCode;

/// Errors from backing store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transient failure reaching the store. Nothing was committed.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    /// Error reported by the SQLite engine.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error for {table}/{id}: {reason}")]
    Serialization {
        table: String,
        id: String,
        reason: String,
    },

    /// Table and set names must match `[a-z_]+`.
    #[error("invalid table or set name: {0:?}")]
    InvalidName(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unavailable(_) | Self::Io(_) => true,
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            ),
            Self::Serialization { .. } | Self::InvalidName(_) => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
