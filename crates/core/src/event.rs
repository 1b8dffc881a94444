//! Normalized ingestion events.
//!
//! Ledger adapters reduce chain-specific transaction/event formats to this
//! common shape. Normalization is deterministic: the same raw event always
//! yields the same `IngestEvent`, which is what makes reconciliation
//! idempotent downstream.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::{AuditKind, ChainId, DataType, RecordId, TxRef};

/// Operation-specific fields of a normalized ledger event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum IngestPayload {
    /// A new record was anchored on the origin chain.
    Upload {
        file_name: String,
        data_type: DataType,
        size_bytes: u64,
        description: String,
        tags: BTreeSet<String>,
        content_hash: String,
    },
    /// The owner granted a party access to an existing record.
    Grant { grantee_id: String },
    /// The owner revoked a previously granted access.
    Revoke { grantee_id: String },
}

impl IngestPayload {
    /// Audit kind this payload maps to when accepted.
    pub fn audit_kind(&self) -> AuditKind {
        match self {
            IngestPayload::Upload { .. } => AuditKind::Upload,
            IngestPayload::Grant { .. } => AuditKind::Grant,
            IngestPayload::Revoke { .. } => AuditKind::Revoke,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        self.audit_kind().as_str()
    }
}

/// A chain event normalized into the common record shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestEvent {
    /// Chain the event was observed on.
    pub chain: ChainId,
    /// Chain-native transaction reference. Distinct per accepted fact;
    /// the reconciler deduplicates on it.
    pub tx_ref: TxRef,
    /// Height of the block containing the transaction.
    pub block_height: u64,
    /// Block time (Unix seconds).
    pub timestamp: u64,
    /// Identity that signed/submitted the transaction.
    pub actor_id: String,
    /// Record the event applies to. For uploads this is derived from
    /// `(chain, tx_ref)`; grant/revoke events carry the id they reference.
    pub record_id: RecordId,
    pub payload: IngestPayload,
}

impl IngestEvent {
    /// Whether this event references a record it does not itself create.
    pub fn references_existing_record(&self) -> bool {
        !matches!(self.payload, IngestPayload::Upload { .. })
    }
}
