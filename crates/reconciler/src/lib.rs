//! Ingestion reconciliation for the cross-chain record index.
//!
//! Ledger adapters observe events per chain; this crate turns those
//! observations into index mutations that are idempotent, ordered per
//! chain, and tolerant of cross-chain arrival skew. Each chain runs its
//! own [`pipeline`]; the [`reconciler`] applies events and parks the ones
//! whose dependencies have not been indexed yet.

pub mod error;
pub mod pending;
pub mod pipeline;
pub mod reconciler;

pub use error::{ReconcileError, ReconcileResult};
pub use pending::PendingBuffer;
pub use pipeline::{spawn_pipeline, PipelineHandle, PipelineMessage};
pub use reconciler::{Reconciled, Reconciler, SweepOutcome};
