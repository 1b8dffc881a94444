//! Error types for record index operations.

use medcross_core::RecordId;
use thiserror::Error;

/// Errors that can occur while reading or mutating the record index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// SQLite database error. The audit log lives in the same database, so
    /// storage unavailability here is fatal to ingestion.
    #[error("sqlite error: {0}")]
    Sqlite(String),

    /// Serialization error (tags column, payload fields).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored row could not be mapped back into its domain type.
    #[error("corrupt row: {0}")]
    CorruptRow(String),

    /// A transfer resolution referenced a transfer that does not exist or
    /// is no longer pending.
    #[error("no pending transfer with id {0}")]
    UnknownTransfer(u64),

    /// Authorization transition rejected; the original state is preserved
    /// and the event is logged for operator review.
    #[error("invalid transition for record {record_id}, grantee {grantee_id}: {from} cannot accept {attempted}")]
    InvalidTransition {
        record_id: RecordId,
        grantee_id: String,
        from: &'static str,
        attempted: &'static str,
    },
}

impl From<rusqlite::Error> for IndexError {
    fn from(err: rusqlite::Error) -> Self {
        IndexError::Sqlite(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

/// Result type for record index operations.
pub type IndexResult<T> = Result<T, IndexError>;
