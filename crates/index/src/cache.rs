//! In-memory LRU cache for record metadata.
//!
//! Records are immutable once indexed, so cached entries can never go
//! stale. Authorization state is deliberately not cached: it is always
//! computed from the authorization rows so the visible state cannot drift
//! from ledger truth.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::RwLock;

use medcross_core::{ChainId, Record, RecordId};

/// Default number of records to cache.
pub(crate) const DEFAULT_RECORD_CACHE_SIZE: usize = 4096;

/// In-memory cache over the persistent record index.
pub struct RecordCache {
    /// Records by id.
    records: RwLock<LruCache<RecordId, Arc<Record>>>,
    /// Last processed block height per chain.
    checkpoints: RwLock<HashMap<ChainId, u64>>,
}

impl RecordCache {
    pub fn new(record_capacity: usize) -> Self {
        Self {
            records: RwLock::new(LruCache::new(
                NonZeroUsize::new(record_capacity.max(1)).unwrap(),
            )),
            checkpoints: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_RECORD_CACHE_SIZE)
    }

    pub fn insert_record(&self, record: Record) {
        let id = record.record_id;
        self.records.write().put(id, Arc::new(record));
    }

    pub fn get_record(&self, id: RecordId) -> Option<Arc<Record>> {
        self.records.write().get(&id).cloned()
    }

    /// Cached checkpoint height for a chain, if loaded.
    pub fn checkpoint(&self, chain: ChainId) -> Option<u64> {
        self.checkpoints.read().get(&chain).copied()
    }

    /// Advance the cached checkpoint; never moves backwards.
    pub fn set_checkpoint(&self, chain: ChainId, height: u64) {
        let mut map = self.checkpoints.write();
        let entry = map.entry(chain).or_insert(height);
        if height > *entry {
            *entry = height;
        }
    }

    pub fn clear(&self) {
        self.records.write().clear();
        self.checkpoints.write().clear();
    }
}
