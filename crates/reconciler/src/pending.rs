//! Buffer for events that arrived before the record they reference.
//!
//! Cross-chain delivery gives no ordering guarantee between chains, so a
//! grant or revoke can be observed before the upload (or grant) it depends
//! on. Such events are parked here keyed by record id and retried when the
//! missing dependency lands, or at batch boundaries. An event that fails
//! more than `max_attempts` retries is declared an orphan and dropped.

use std::collections::HashMap;

use medcross_core::{IngestEvent, RecordId};

/// Default number of retry rounds before an event is declared an orphan.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

#[derive(Debug)]
struct PendingEntry {
    event: IngestEvent,
    attempts: u32,
}

/// Parked events awaiting a dependency, keyed by the record they reference.
#[derive(Debug)]
pub struct PendingBuffer {
    by_record: HashMap<RecordId, Vec<PendingEntry>>,
    max_attempts: u32,
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl PendingBuffer {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            by_record: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Park an event for later retry. Attempts carry over if the event was
    /// parked before.
    pub fn park(&mut self, event: IngestEvent, prior_attempts: u32) {
        self.by_record
            .entry(event.record_id)
            .or_default()
            .push(PendingEntry {
                event,
                attempts: prior_attempts,
            });
    }

    /// Remove and return all events waiting on `record_id`, preserving
    /// arrival order, paired with their attempt counts.
    pub fn take_for(&mut self, record_id: RecordId) -> Vec<(IngestEvent, u32)> {
        self.by_record
            .remove(&record_id)
            .map(|entries| entries.into_iter().map(|e| (e.event, e.attempts)).collect())
            .unwrap_or_default()
    }

    /// Remove and return every parked event with attempt counts bumped by
    /// one round; events that have exhausted their attempts are returned
    /// separately as orphans.
    pub fn drain_round(&mut self) -> (Vec<(IngestEvent, u32)>, Vec<IngestEvent>) {
        let mut retry = Vec::new();
        let mut orphans = Vec::new();
        for (_, entries) in std::mem::take(&mut self.by_record) {
            for entry in entries {
                let attempts = entry.attempts + 1;
                if attempts >= self.max_attempts {
                    orphans.push(entry.event);
                } else {
                    retry.push((entry.event, attempts));
                }
            }
        }
        // Deterministic retry order regardless of hash map iteration.
        retry.sort_by_key(|(e, _)| (e.block_height, e.tx_ref.as_str().to_string()));
        orphans.sort_by_key(|e| (e.block_height, e.tx_ref.as_str().to_string()));
        (retry, orphans)
    }

    pub fn len(&self) -> usize {
        self.by_record.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_record.is_empty()
    }
}
