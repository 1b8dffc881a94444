//! Query planning and access-controlled reads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use medcross_core::{
    unix_now, AuditEvent, AuditKind, Authorization, ChainId, DataType, Record, RecordId,
};
use medcross_index::{
    AuditLog, NewAuditEvent, RecordIndex, RecordQuery, SortKey, Statistics,
};

use crate::error::{QueryError, QueryResult};

/// Default page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
/// Hard cap on page size; larger requests are clamped, not rejected.
pub const MAX_PAGE_SIZE: u64 = 100;

/// A search request as it arrives from the outer surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Requesting identity. Anonymous searches match nothing.
    pub requester_id: Option<String>,
    pub keyword: Option<String>,
    pub data_type: Option<DataType>,
    pub chain: Option<ChainId>,
    pub uploaded_after: Option<u64>,
    pub uploaded_before: Option<u64>,
    #[serde(default)]
    pub sort: SortKey,
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: u64,
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub items: Vec<Record>,
    /// Total matches visible to this requester under the same predicate.
    pub total_known: u64,
    pub has_more: bool,
}

/// Full detail for one record, returned only to parties with access.
#[derive(Debug, Clone)]
pub struct RecordDetail {
    pub record: Record,
    /// Authorization history, oldest first.
    pub authorizations: Vec<Authorization>,
    /// Audit trail, oldest first, including the access being made.
    pub audit_trail: Vec<AuditEvent>,
}

/// Access-controlled read surface over the record index.
///
/// Every read is scoped to a requester. Authorization is enforced inside
/// the index predicate for searches and checked before any field of a
/// record is revealed for detail reads; the two paths agree, so a record
/// can never appear in a search the requester could not open.
pub struct QueryEngine<I> {
    index: Arc<I>,
}

impl<I: RecordIndex + AuditLog> QueryEngine<I> {
    pub fn new(index: Arc<I>) -> Self {
        Self { index }
    }

    /// Search records visible to the requester.
    pub fn search(&self, request: &SearchRequest) -> QueryResult<SearchResults> {
        let limit = request
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);

        let page = self.index.scan(&RecordQuery {
            requester_id: request.requester_id.clone(),
            keyword: normalize_keyword(request.keyword.as_deref()),
            data_type: request.data_type,
            chain: request.chain,
            uploaded_after: request.uploaded_after,
            uploaded_before: request.uploaded_before,
            sort: request.sort,
            limit,
            offset: request.offset,
        })?;

        let has_more = request.offset + (page.records.len() as u64) < page.total;
        tracing::debug!(
            requester = request.requester_id.as_deref().unwrap_or("<anonymous>"),
            returned = page.records.len(),
            total = page.total,
            "search served"
        );

        Ok(SearchResults {
            items: page.records,
            total_known: page.total,
            has_more,
        })
    }

    /// Fetch one record with its authorization history and audit trail.
    ///
    /// A successful read is itself an auditable access and is appended to
    /// the trail before it is returned. Failed reads leave no trace in the
    /// trail and reveal nothing, including whether the record exists.
    pub fn get_detail(&self, requester_id: &str, record_id: RecordId) -> QueryResult<RecordDetail> {
        let record = self
            .index
            .get_record(record_id)?
            .ok_or(QueryError::NotFoundOrUnauthorized)?;

        if record.owner_id != requester_id
            && !self.index.auth_state(record_id, requester_id)?.is_active()
        {
            return Err(QueryError::NotFoundOrUnauthorized);
        }

        self.index.append(&NewAuditEvent {
            kind: AuditKind::Access,
            record_id,
            actor_id: requester_id.to_string(),
            timestamp: unix_now(),
            origin_chain: record.origin_chain,
            ledger_tx_ref: None,
            block_height: 0,
        })?;

        Ok(RecordDetail {
            record,
            authorizations: self.index.authorizations(record_id)?,
            audit_trail: self.index.query_trail(record_id)?,
        })
    }

    /// Aggregate statistics over the whole index. Counts only; reveals no
    /// record content or ownership.
    pub fn statistics(&self) -> QueryResult<Statistics> {
        Ok(self.index.statistics()?)
    }
}

/// Trim and drop empty keywords so they do not constrain the scan.
fn normalize_keyword(keyword: Option<&str>) -> Option<String> {
    keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}
