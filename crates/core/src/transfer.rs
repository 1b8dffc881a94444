//! Cross-chain transfer records.
//!
//! A transfer anchors a copy of a record's metadata on the other ledger.
//! The index keeps one row per attempt, so the history of a record shows
//! every transfer ever requested, including the failed ones.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{ChainId, ParseTagError, RecordId, TxRef};

/// Lifecycle state of a cross-chain transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    /// Opened, target-ledger submission still outstanding.
    Pending,
    /// The target ledger acknowledged the anchoring transaction.
    Completed,
    /// The submission failed or timed out.
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(ParseTagError {
                what: "transfer status",
                value: other.to_string(),
            }),
        }
    }
}

/// One attempt to anchor a record's metadata on another ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    /// Append-order id assigned by the index.
    pub transfer_id: u64,
    pub record_id: RecordId,
    /// Ledger the record was originally uploaded on.
    pub source_chain: ChainId,
    /// Ledger the copy is anchored on.
    pub target_chain: ChainId,
    /// Request time (Unix seconds).
    pub requested_at: u64,
    /// Resolution time, present once the attempt completed or failed.
    pub resolved_at: Option<u64>,
    pub status: TransferStatus,
    /// Anchoring transaction on the target ledger, present iff completed.
    pub target_tx_ref: Option<TxRef>,
    /// Failure description, present iff the attempt failed.
    pub error: Option<String>,
}
