//! Error types for the query engine.

use medcross_index::IndexError;
use thiserror::Error;

/// Errors returned to query callers.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The record does not exist, or the requester has no access to it.
    /// Deliberately indistinguishable: a requester must not be able to
    /// probe for the existence of records they cannot see.
    #[error("record not found")]
    NotFoundOrUnauthorized,

    /// The underlying index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;
