//! Error types for adapter and gateway operations.

use medcross_core::ChainId;
use thiserror::Error;

/// Errors raised while normalizing raw chain events.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Required fields were absent or unparseable. The event is dropped
    /// with an alert and never ingested.
    #[error("malformed {chain} event (tx {tx_ref}): {reason}")]
    MalformedEvent {
        chain: ChainId,
        tx_ref: String,
        reason: String,
    },
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Errors raised while submitting transactions to an origin ledger.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The ledger did not acknowledge the submission within the bound.
    /// Safe to retry: ingestion is idempotent by ledger tx ref.
    #[error("{chain} submission timed out after {timeout_ms}ms")]
    SubmissionTimeout { chain: ChainId, timeout_ms: u64 },

    /// The ledger rejected the submission.
    #[error("{chain} submission failed: {reason}")]
    Rejected { chain: ChainId, reason: String },
}

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
