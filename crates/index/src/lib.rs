//! Persistent record index for cross-chain medical record metadata.
//!
//! The index is the single source of truth for everything the query layer
//! serves: record metadata, authorization state, the append-only audit
//! log, and per-chain ingestion checkpoints. It is written to by exactly
//! one ingestion path per deployment and read concurrently by queries.

pub mod audit;
pub mod authz;
pub mod cache;
pub mod error;
pub mod scan;
pub mod store;
pub mod transfers;

pub use audit::{AppendOutcome, AuditLog, NewAuditEvent};
pub use authz::{grant_effect, revoke_effect, AuthState, GrantEffect, RevokeEffect};
pub use cache::RecordCache;
pub use error::{IndexError, IndexResult};
pub use scan::{MonthlyCount, RecordQuery, ScanPage, SortKey, Statistics};
pub use store::{Applied, PersistentRecordIndex, RecordIndex};
pub use transfers::{NewTransfer, TransferLog};
