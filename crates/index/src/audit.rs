//! Append-only audit log.
//!
//! Every accepted mutation leaves exactly one audit row per distinct
//! ledger tx ref, enforced by a partial unique index (access events carry
//! no tx ref and are exempt). Rows are never updated or deleted; the
//! trail for a record is returned oldest first, ordered by timestamp with
//! chain and block height as tie-breaks.

use rusqlite::{params, Connection, OptionalExtension};

use medcross_core::{AuditEvent, AuditKind, ChainId, RecordId, TxRef};

use crate::error::IndexResult;

/// An audit fact to append; the log assigns the `event_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEvent {
    pub kind: AuditKind,
    pub record_id: RecordId,
    pub actor_id: String,
    pub timestamp: u64,
    pub origin_chain: ChainId,
    /// Originating ledger transaction; `None` for access events.
    pub ledger_tx_ref: Option<TxRef>,
    pub block_height: u64,
}

/// Outcome of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Appended; carries the assigned event id.
    Appended(u64),
    /// A row with this ledger tx ref already exists; nothing was written.
    DuplicateTxRef,
}

/// Append-only projection of accepted mutations.
///
/// `append` fails only on storage errors, never by rejecting a well-formed
/// event; duplicate tx refs are reported, not errored.
pub trait AuditLog: Send + Sync {
    fn append(&self, event: &NewAuditEvent) -> IndexResult<AppendOutcome>;

    /// Full trail for one record, oldest first.
    fn query_trail(&self, record_id: RecordId) -> IndexResult<Vec<AuditEvent>>;

    /// Whether an audit row exists for this ledger tx ref.
    fn contains_tx_ref(&self, tx_ref: &TxRef) -> IndexResult<bool>;
}

/// Insert one audit row; returns the rowid, or `None` when the tx ref was
/// already present. Usable inside a larger write transaction.
pub(crate) fn insert_audit_row(
    conn: &Connection,
    event: &NewAuditEvent,
) -> IndexResult<Option<u64>> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO audit_events
         (kind, record_id, actor_id, timestamp, origin_chain, ledger_tx_ref, block_height)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            event.kind.as_str(),
            event.record_id.as_slice(),
            event.actor_id,
            event.timestamp as i64,
            event.origin_chain.as_str(),
            event.ledger_tx_ref.as_ref().map(|t| t.as_str()),
            event.block_height as i64,
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    Ok(Some(conn.last_insert_rowid() as u64))
}

pub(crate) fn tx_ref_exists(conn: &Connection, tx_ref: &TxRef) -> IndexResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM audit_events WHERE ledger_tx_ref = ?",
            params![tx_ref.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn load_trail(conn: &Connection, record_id: RecordId) -> IndexResult<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, kind, record_id, actor_id, timestamp, origin_chain,
                ledger_tx_ref, block_height
         FROM audit_events
         WHERE record_id = ?
         ORDER BY timestamp ASC, origin_chain ASC, block_height ASC, event_id ASC",
    )?;

    let rows = stmt.query_map(params![record_id.as_slice()], row_to_audit_event)?;
    let mut trail = Vec::new();
    for row in rows {
        trail.push(row?);
    }
    Ok(trail)
}

fn row_to_audit_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let event_id: i64 = row.get(0)?;
    let kind: String = row.get(1)?;
    let record_id_bytes: Vec<u8> = row.get(2)?;
    let actor_id: String = row.get(3)?;
    let timestamp: i64 = row.get(4)?;
    let origin_chain: String = row.get(5)?;
    let ledger_tx_ref: Option<String> = row.get(6)?;
    let block_height: i64 = row.get(7)?;

    Ok(AuditEvent {
        event_id: event_id as u64,
        kind: parse_column(&kind, 1)?,
        record_id: record_id_from_column(&record_id_bytes, 2)?,
        actor_id,
        timestamp: timestamp as u64,
        origin_chain: parse_column(&origin_chain, 5)?,
        ledger_tx_ref: ledger_tx_ref.map(TxRef::new),
        block_height: block_height as u64,
    })
}

pub(crate) fn parse_column<T: std::str::FromStr>(raw: &str, col: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn record_id_from_column(bytes: &[u8], col: usize) -> rusqlite::Result<RecordId> {
    RecordId::from_slice(bytes).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Blob,
            format!("expected 32 bytes for record id, got {}", bytes.len()).into(),
        )
    })
}
