//! Ledger adapters for the two chain families.
//!
//! An adapter is a stateless, deterministic transformer: given a raw
//! chain-specific event it either produces a normalized
//! [`IngestEvent`](medcross_core::IngestEvent) or fails with
//! [`AdapterError::MalformedEvent`]. The reconciler's idempotence depends
//! on the same raw event always normalizing to the same form.
//!
//! The crate also hosts the [`SubmissionGateway`] seam used by the engine
//! to submit caller-requested grant/revoke and transfer transactions to a
//! ledger with a bounded timeout.

pub mod error;
pub mod ethereum;
pub mod fabric;
mod fields;
pub mod gateway;

pub use error::{AdapterError, AdapterResult, GatewayError, GatewayResult};
pub use ethereum::{EthereumAdapter, EthereumLogEvent};
pub use fabric::{FabricAdapter, FabricChaincodeEvent};
pub use gateway::{
    submit_with_timeout, transfer_with_timeout, SubmissionGateway, SubmissionKind,
    SubmissionRequest,
};

use medcross_core::{ChainId, IngestEvent};

/// Normalizes chain-specific events into the common record shape.
///
/// Implementations own no persistent state and must be pure: no side
/// effects, and equal inputs yield equal outputs.
pub trait LedgerAdapter: Send + Sync {
    /// Chain-specific raw event type.
    type Raw;

    /// Chain this adapter normalizes events for.
    fn chain(&self) -> ChainId;

    /// Normalize one raw event, or reject it as malformed.
    fn normalize(&self, raw: &Self::Raw) -> AdapterResult<IngestEvent>;
}
