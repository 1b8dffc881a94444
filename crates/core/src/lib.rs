//! Shared domain types for the MedCross record index.
//!
//! Records describe medical-data artifacts anchored on one of two ledgers:
//! an account-based chain (Ethereum family) and a permissioned chain
//! (Fabric family). This crate holds the normalized shapes every other
//! crate exchanges — record metadata, authorization state, audit events,
//! and the `IngestEvent` form that ledger adapters emit. Pure data, no I/O.

pub mod event;
pub mod record;
pub mod transfer;

pub use event::{IngestEvent, IngestPayload};
pub use record::{
    AuditEvent, AuditKind, AuthStatus, Authorization, ChainId, DataType, ParseTagError, Record,
    RecordId, SubmissionReceipt, TxRef,
};
pub use transfer::{TransferRecord, TransferStatus};

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
