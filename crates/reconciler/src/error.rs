//! Error types for ingestion reconciliation.

use medcross_core::{ChainId, RecordId, TxRef};
use medcross_index::IndexError;
use thiserror::Error;

/// Errors that can occur while reconciling ledger events into the index.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A grant or revoke referenced a record that never materialized
    /// within the retry window.
    #[error("orphan {kind} event on {chain} (tx {tx_ref}) references unknown record {record_id}")]
    OrphanEvent {
        chain: ChainId,
        tx_ref: TxRef,
        record_id: RecordId,
        kind: &'static str,
    },

    /// The underlying index failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
