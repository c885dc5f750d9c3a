use postgres_unit_of_work::TransactionError;

/// Error type for cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Invalid entity: {0}")]
    InvalidEntity(String),

    #[error("Unknown entity namespace alias: {0}")]
    UnknownNamespaceAlias(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Persistence layer error: {0}")]
    Persistence(String),

    /// The cascade for `index_key` could not delete every registered entry.
    /// The registration list is left in place so the cascade can be retried.
    #[error("Partial invalidation of '{index_key}': {} key(s) could not be deleted", .failed.len())]
    PartialInvalidation {
        index_key: String,
        failed: Vec<String>,
    },

    #[error("Transaction commit failed: {0}")]
    CommitFailed(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Conversion from CacheError to TransactionError
impl From<CacheError> for TransactionError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::CommitFailed(msg) => TransactionError::CommitFailed(msg),
            other => TransactionError::CommitFailed(format!("Cache error: {other}")),
        }
    }
}
