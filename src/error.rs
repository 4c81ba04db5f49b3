//! Error types for promgres

/// Result type alias for promgres operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for promgres
///
/// The enum is `Clone` on purpose: a single flush failure is delivered to
/// every request that contributed to that flush, and the async-ack path
/// forwards errors across task boundaries. Foreign error types are folded
/// into string payloads at the boundary where they enter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed label set from the producer
    #[error("invalid label set: {0}")]
    InvalidLabels(String),
    /// The store did not return a table name for a metric
    #[error("missing metric table name")]
    MissingMetricTableName,
    /// Storage-level failure (connection, statement, copy)
    #[error("storage error: {0}")]
    Storage(String),
    /// The ingestor has been closed; no new inserts are accepted
    #[error("ingestor is closed")]
    Closed,
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
