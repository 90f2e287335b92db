use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced to the request layer by the ingestion engine
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation failed for field '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("Buffer is busy, retry submission")]
    BufferBusy,

    #[error("Commit failed after {attempts} attempts: {reason}")]
    CommitFatal { attempts: u32, reason: String },

    #[error("Ingestion engine is shutting down")]
    Shutdown,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Classified storage failures
///
/// The commit engine keys its retry decisions on this classification, so
/// store implementations must map their native errors onto it rather than
/// passing raw driver errors through.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Worth retrying with backoff (timeout, connection reset, serialization
    /// conflict, deadlock)
    #[error("Transient storage failure: {0}")]
    Transient(String),

    /// Connection pool gave no connection within the acquisition timeout
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    /// A record's timestamp falls outside every existing partition
    #[error("No partition covers the record timestamp: {0}")]
    PartitionGap(String),

    /// The storage layer rejected record content (duplicate key, constraint
    /// violation); retrying the same content cannot succeed
    #[error("Record rejected by storage: {0}")]
    Rejected(String),

    #[error("Fatal storage failure: {0}")]
    Fatal(String),
}

impl StoreError {
    /// Whether a retry of the same request can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::PoolExhausted(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Helper for naming a record in rejection causes
pub fn record_label(timestamp: DateTime<Utc>, drone_id: Option<&str>) -> String {
    match drone_id {
        Some(id) => format!("{} ({})", timestamp.to_rfc3339(), id),
        None => timestamp.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Transient("timeout".to_string()).is_retryable());
        assert!(StoreError::PoolExhausted("10/10 in use".to_string()).is_retryable());
        assert!(!StoreError::Rejected("duplicate key".to_string()).is_retryable());
        assert!(!StoreError::PartitionGap("2027-01".to_string()).is_retryable());
        assert!(!StoreError::Fatal("relation missing".to_string()).is_retryable());
    }
}
