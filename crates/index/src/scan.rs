//! Scan predicates and aggregate shapes for the record index.
//!
//! The query engine plans searches in terms of [`RecordQuery`]; the store
//! compiles it into SQL. The requester scope is part of the predicate so
//! access control is applied before pagination, never after.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use medcross_core::{ChainId, DataType, Record};

/// Result ordering for searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    /// Most recent uploads first (default).
    #[default]
    NewestFirst,
    /// Oldest uploads first.
    OldestFirst,
    /// File name, lexicographic, case-insensitive.
    FileName,
}

/// Filter and paging predicate for a record scan. All filter fields are
/// conjunctive; `None` means "no constraint".
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Caller identity. Scopes results to records the requester owns or
    /// holds an active authorization for. `None` matches nothing: there is
    /// no public data in this system.
    pub requester_id: Option<String>,
    /// Case-insensitive substring over file name, description, and tags.
    pub keyword: Option<String>,
    pub data_type: Option<DataType>,
    pub chain: Option<ChainId>,
    /// Inclusive lower bound on `uploaded_at` (Unix seconds).
    pub uploaded_after: Option<u64>,
    /// Inclusive upper bound on `uploaded_at` (Unix seconds).
    pub uploaded_before: Option<u64>,
    pub sort: SortKey,
    pub limit: u64,
    pub offset: u64,
}

/// One page of scan results plus the total match count (counted under the
/// same predicate, so hidden records are never reflected in it).
#[derive(Debug, Clone, Default)]
pub struct ScanPage {
    pub records: Vec<Record>,
    pub total: u64,
}

/// Upload count for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyCount {
    /// Month in `YYYY-MM` form.
    pub month: String,
    pub count: u64,
}

/// Read-only aggregate over the record index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_records: u64,
    pub per_chain: BTreeMap<ChainId, u64>,
    pub per_type: BTreeMap<DataType, u64>,
    /// Uploads per month, oldest first.
    pub monthly_growth: Vec<MonthlyCount>,
}
