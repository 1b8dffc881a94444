//! Core reconciliation logic.
//!
//! The reconciler feeds normalized ledger events into the record index,
//! absorbing the disorder inherent to multi-chain ingestion: duplicates
//! are dropped (the index dedups on tx ref), events that reference a
//! record not yet indexed are parked and retried, and ordering violations
//! (a revoke of an already-revoked grant) are rejected and logged without
//! stopping ingestion.

use std::collections::VecDeque;
use std::sync::Arc;

use medcross_core::IngestEvent;
use medcross_index::{Applied, IndexError, RecordIndex};

use crate::error::ReconcileResult;
use crate::pending::PendingBuffer;

/// What reconciliation did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// The index applied the event; carries the index outcome.
    Applied(Applied),
    /// The event referenced a record (or grant) not yet indexed and was
    /// parked for retry.
    Parked,
    /// The event was an ordering violation; it was logged and dropped,
    /// index state untouched.
    Rejected,
}

/// Summary of a pending-buffer sweep at a batch boundary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Parked events the index accepted this round.
    pub applied: usize,
    /// Events still waiting on a dependency.
    pub still_pending: usize,
    /// Events that exhausted their retry window and were dropped.
    pub orphaned: Vec<IngestEvent>,
}

/// Reconciles normalized ledger events into the record index.
pub struct Reconciler {
    index: Arc<dyn RecordIndex>,
    pending: PendingBuffer,
}

impl Reconciler {
    pub fn new(index: Arc<dyn RecordIndex>, max_retry_rounds: u32) -> Self {
        Self {
            index,
            pending: PendingBuffer::new(max_retry_rounds),
        }
    }

    /// Number of events currently parked.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Process one event, then retry anything that was waiting on it.
    pub fn process(&mut self, event: IngestEvent) -> ReconcileResult<Reconciled> {
        let outcome = self.apply_one(event, 0)?;
        Ok(outcome)
    }

    /// Retry every parked event once. Call at batch boundaries; events
    /// that exhaust their retry window are dropped and reported.
    pub fn sweep(&mut self) -> ReconcileResult<SweepOutcome> {
        let (retry, orphaned) = self.pending.drain_round();
        let mut outcome = SweepOutcome::default();

        for (event, attempts) in retry {
            match self.apply_one(event, attempts)? {
                Reconciled::Parked => outcome.still_pending += 1,
                Reconciled::Applied(_) => outcome.applied += 1,
                Reconciled::Rejected => {}
            }
        }

        for event in &orphaned {
            let err = crate::error::ReconcileError::OrphanEvent {
                chain: event.chain,
                tx_ref: event.tx_ref.clone(),
                record_id: event.record_id,
                kind: event.payload.kind_str(),
            };
            tracing::warn!(error = %err, "dropping orphan event");
        }
        outcome.orphaned = orphaned;
        Ok(outcome)
    }

    fn apply_one(&mut self, event: IngestEvent, attempts: u32) -> ReconcileResult<Reconciled> {
        match self.index.apply_event(&event) {
            Ok(Applied::UnknownRecord) | Ok(Applied::PrematureRevoke) => {
                tracing::debug!(
                    chain = %event.chain,
                    tx_ref = %event.tx_ref,
                    record_id = %event.record_id,
                    kind = event.payload.kind_str(),
                    attempts,
                    "parking event: dependency not yet indexed"
                );
                self.pending.park(event, attempts);
                Ok(Reconciled::Parked)
            }
            Ok(outcome @ (Applied::Inserted | Applied::Granted)) => {
                // This event may be the dependency something was waiting on.
                self.retry_dependents(event)?;
                Ok(Reconciled::Applied(outcome))
            }
            Ok(outcome) => {
                if outcome == Applied::DuplicateTxRef {
                    tracing::debug!(
                        chain = %event.chain,
                        tx_ref = %event.tx_ref,
                        "dropping duplicate event"
                    );
                }
                Ok(Reconciled::Applied(outcome))
            }
            Err(IndexError::InvalidTransition {
                record_id,
                grantee_id,
                from,
                attempted,
            }) => {
                tracing::warn!(
                    chain = %event.chain,
                    tx_ref = %event.tx_ref,
                    %record_id,
                    grantee_id,
                    from,
                    attempted,
                    "rejecting event: invalid authorization transition"
                );
                Ok(Reconciled::Rejected)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replay parked events that were waiting on `unlocked`'s record. A
    /// retried grant can itself unlock a parked revoke, so this walks a
    /// worklist rather than recursing.
    fn retry_dependents(&mut self, unlocked: IngestEvent) -> ReconcileResult<()> {
        let mut queue: VecDeque<_> = self.pending.take_for(unlocked.record_id).into();

        while let Some((event, attempts)) = queue.pop_front() {
            let record_id = event.record_id;
            match self.index.apply_event(&event) {
                Ok(Applied::UnknownRecord) | Ok(Applied::PrematureRevoke) => {
                    self.pending.park(event, attempts);
                }
                Ok(Applied::Granted) | Ok(Applied::Inserted) => {
                    queue.extend(self.pending.take_for(record_id));
                }
                Ok(_) => {}
                Err(IndexError::InvalidTransition {
                    record_id,
                    grantee_id,
                    from,
                    attempted,
                }) => {
                    tracing::warn!(
                        tx_ref = %event.tx_ref,
                        %record_id,
                        grantee_id,
                        from,
                        attempted,
                        "rejecting retried event: invalid authorization transition"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
