//! Submission gateway for caller-requested ledger transactions.
//!
//! Grants and revokes never mutate the index directly: the request is
//! submitted to the record's origin ledger, and the confirmed event flows
//! back through the adapter pipeline later. Cross-chain transfers go the
//! other way: the record's metadata is anchored on the target ledger. The
//! gateway is the seam to the chain clients; submissions are bounded by a
//! timeout and safely retryable because ingestion deduplicates on the
//! ledger tx ref.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Duration};

use medcross_core::{ChainId, Record, RecordId, TxRef};

use crate::error::{GatewayError, GatewayResult};

/// Authorization operation to anchor on the origin ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionKind {
    Grant,
    Revoke,
}

/// A grant or revoke to be recorded on a record's origin chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub kind: SubmissionKind,
    pub record_id: RecordId,
    pub owner_id: String,
    pub grantee_id: String,
}

/// Client for submitting transactions to one ledger.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Ledger this gateway submits to.
    fn chain(&self) -> ChainId;

    /// Submit the transaction and return its ledger-assigned reference.
    async fn submit(&self, request: &SubmissionRequest) -> GatewayResult<TxRef>;

    /// Anchor a copy of a record uploaded on another ledger onto this one,
    /// returning the anchoring transaction's reference.
    async fn submit_transfer(&self, record: &Record) -> GatewayResult<TxRef>;
}

/// Submit with a bounded wait, mapping elapsed deadlines to
/// [`GatewayError::SubmissionTimeout`].
pub async fn submit_with_timeout(
    gateway: &dyn SubmissionGateway,
    request: &SubmissionRequest,
    timeout_ms: u64,
) -> GatewayResult<TxRef> {
    match timeout(Duration::from_millis(timeout_ms), gateway.submit(request)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::SubmissionTimeout {
            chain: gateway.chain(),
            timeout_ms,
        }),
    }
}

/// Transfer-anchoring counterpart of [`submit_with_timeout`].
pub async fn transfer_with_timeout(
    gateway: &dyn SubmissionGateway,
    record: &Record,
    timeout_ms: u64,
) -> GatewayResult<TxRef> {
    match timeout(Duration::from_millis(timeout_ms), gateway.submit_transfer(record)).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::SubmissionTimeout {
            chain: gateway.chain(),
            timeout_ms,
        }),
    }
}
