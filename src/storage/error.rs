use thiserror::Error;

/// Failures surfaced by the history store
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write was attempted without an open session
    #[error("no active session")]
    NoActiveSession,

    /// Unknown session or request id
    #[error("not found: {0}")]
    NotFound(String),

    /// The database could not be opened; persistence is disabled
    #[error("history storage is unavailable")]
    StorageUnavailable,

    /// The storage engine rejected a query. Transient; the caller may retry.
    #[error("query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
