//! Error types for the engine facade.

use medcross_adapters::GatewayError;
use medcross_core::ChainId;
use medcross_index::IndexError;
use medcross_query::QueryError;
use thiserror::Error;

/// Errors returned by the caller-facing engine API.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record does not exist, or the caller is not allowed to act on
    /// it. Uniform across both cases so callers cannot probe for records
    /// they do not own.
    #[error("record not found")]
    NotFoundOrUnauthorized,

    /// The request is malformed regardless of index state.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No submission gateway is configured for the record's origin chain.
    #[error("no gateway configured for chain {0}")]
    GatewayUnavailable(ChainId),

    /// The ledger submission failed or timed out.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// The underlying index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl From<QueryError> for EngineError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFoundOrUnauthorized => EngineError::NotFoundOrUnauthorized,
            QueryError::Index(e) => EngineError::Index(e),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error when loading config.
    #[error("failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// YAML parsing error.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    /// Validation failed with one or more errors.
    #[error("config validation failed:\n{}", .0.join("\n"))]
    ValidationFailed(Vec<String>),
}
