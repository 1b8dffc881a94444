//! Queryable history of cross-chain transfer attempts.
//!
//! Each attempt to anchor a record's metadata on the other ledger gets
//! its own row: opened as pending before the target-ledger submission,
//! then resolved to completed or failed. Rows are never deleted, so the
//! history keeps failed attempts alongside the one that succeeded.

use rusqlite::{params, Connection};

use medcross_core::{ChainId, RecordId, TransferRecord, TransferStatus, TxRef};

use crate::audit::{parse_column, record_id_from_column};
use crate::error::{IndexError, IndexResult};

/// A transfer attempt to open; the log assigns the `transfer_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub record_id: RecordId,
    pub source_chain: ChainId,
    pub target_chain: ChainId,
    pub requested_at: u64,
}

/// Per-record log of cross-chain transfer attempts.
///
/// A transfer is resolved at most once: completing or failing an id that
/// is not pending yields [`IndexError::UnknownTransfer`].
pub trait TransferLog: Send + Sync {
    /// Open a pending transfer row; returns its assigned id.
    fn open_transfer(&self, transfer: &NewTransfer) -> IndexResult<u64>;

    /// Resolve a pending transfer as completed, recording the anchoring
    /// transaction on the target ledger.
    fn complete_transfer(
        &self,
        transfer_id: u64,
        target_tx_ref: &TxRef,
        resolved_at: u64,
    ) -> IndexResult<()>;

    /// Resolve a pending transfer as failed, recording the reason.
    fn fail_transfer(&self, transfer_id: u64, error: &str, resolved_at: u64) -> IndexResult<()>;

    /// All transfer attempts for a record, newest first.
    fn transfer_history(&self, record_id: RecordId) -> IndexResult<Vec<TransferRecord>>;
}

pub(crate) fn insert_transfer_row(conn: &Connection, transfer: &NewTransfer) -> IndexResult<u64> {
    conn.execute(
        "INSERT INTO transfers (record_id, source_chain, target_chain, requested_at, status)
         VALUES (?, ?, ?, ?, 'pending')",
        params![
            transfer.record_id.as_slice(),
            transfer.source_chain.as_str(),
            transfer.target_chain.as_str(),
            transfer.requested_at as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid() as u64)
}

/// Flip one pending row to a terminal status. The `status = 'pending'`
/// guard makes resolution single-shot.
pub(crate) fn resolve_transfer_row(
    conn: &Connection,
    transfer_id: u64,
    status: TransferStatus,
    target_tx_ref: Option<&TxRef>,
    error: Option<&str>,
    resolved_at: u64,
) -> IndexResult<()> {
    let changed = conn.execute(
        "UPDATE transfers
         SET status = ?, target_tx_ref = ?, error = ?, resolved_at = ?
         WHERE transfer_id = ? AND status = 'pending'",
        params![
            status.as_str(),
            target_tx_ref.map(|t| t.as_str()),
            error,
            resolved_at as i64,
            transfer_id as i64,
        ],
    )?;
    if changed == 0 {
        return Err(IndexError::UnknownTransfer(transfer_id));
    }
    Ok(())
}

pub(crate) fn load_transfers(
    conn: &Connection,
    record_id: RecordId,
) -> IndexResult<Vec<TransferRecord>> {
    let mut stmt = conn.prepare(
        "SELECT transfer_id, record_id, source_chain, target_chain, requested_at,
                resolved_at, status, target_tx_ref, error
         FROM transfers
         WHERE record_id = ?
         ORDER BY transfer_id DESC",
    )?;

    let rows = stmt.query_map(params![record_id.as_slice()], row_to_transfer)?;
    let mut transfers = Vec::new();
    for row in rows {
        transfers.push(row?);
    }
    Ok(transfers)
}

fn row_to_transfer(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransferRecord> {
    let transfer_id: i64 = row.get(0)?;
    let record_id_bytes: Vec<u8> = row.get(1)?;
    let source_chain: String = row.get(2)?;
    let target_chain: String = row.get(3)?;
    let requested_at: i64 = row.get(4)?;
    let resolved_at: Option<i64> = row.get(5)?;
    let status: String = row.get(6)?;
    let target_tx_ref: Option<String> = row.get(7)?;
    let error: Option<String> = row.get(8)?;

    Ok(TransferRecord {
        transfer_id: transfer_id as u64,
        record_id: record_id_from_column(&record_id_bytes, 1)?,
        source_chain: parse_column(&source_chain, 2)?,
        target_chain: parse_column(&target_chain, 3)?,
        requested_at: requested_at as u64,
        resolved_at: resolved_at.map(|t| t as u64),
        status: parse_column(&status, 6)?,
        target_tx_ref: target_tx_ref.map(TxRef::new),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{PersistentRecordIndex, RecordIndex};
    use medcross_core::{DataType, IngestEvent, IngestPayload};
    use std::collections::BTreeSet;

    fn indexed_record(index: &PersistentRecordIndex, tx: &str) -> RecordId {
        let tx_ref = TxRef::from(tx);
        let event = IngestEvent {
            chain: ChainId::Ethereum,
            record_id: RecordId::derive(ChainId::Ethereum, &tx_ref),
            tx_ref,
            block_height: 100,
            timestamp: 1_700_000_100,
            actor_id: "owner-1".to_string(),
            payload: IngestPayload::Upload {
                file_name: "scan.dcm".to_string(),
                data_type: DataType::Imaging,
                size_bytes: 2048,
                description: String::new(),
                tags: BTreeSet::new(),
                content_hash: "Qm1".to_string(),
            },
        };
        index.apply_event(&event).unwrap();
        event.record_id
    }

    fn open(index: &PersistentRecordIndex, record_id: RecordId) -> u64 {
        index
            .open_transfer(&NewTransfer {
                record_id,
                source_chain: ChainId::Ethereum,
                target_chain: ChainId::Fabric,
                requested_at: 1_700_001_000,
            })
            .unwrap()
    }

    #[test]
    fn opened_transfer_is_pending_in_history() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let id = indexed_record(&index, "0x01");
        open(&index, id);

        let history = index.transfer_history(id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransferStatus::Pending);
        assert_eq!(history[0].source_chain, ChainId::Ethereum);
        assert_eq!(history[0].target_chain, ChainId::Fabric);
        assert_eq!(history[0].target_tx_ref, None);
        assert_eq!(history[0].resolved_at, None);
    }

    #[test]
    fn completed_transfer_keeps_the_anchoring_tx_ref() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let id = indexed_record(&index, "0x01");
        let transfer_id = open(&index, id);

        index
            .complete_transfer(transfer_id, &TxRef::from("fabric-tx-9"), 1_700_001_050)
            .unwrap();

        let history = index.transfer_history(id).unwrap();
        assert_eq!(history[0].status, TransferStatus::Completed);
        assert_eq!(history[0].target_tx_ref, Some(TxRef::from("fabric-tx-9")));
        assert_eq!(history[0].resolved_at, Some(1_700_001_050));
        assert_eq!(history[0].error, None);
    }

    #[test]
    fn failed_transfer_records_the_reason() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let id = indexed_record(&index, "0x01");
        let transfer_id = open(&index, id);

        index
            .fail_transfer(transfer_id, "submission timed out", 1_700_001_060)
            .unwrap();

        let history = index.transfer_history(id).unwrap();
        assert_eq!(history[0].status, TransferStatus::Failed);
        assert_eq!(history[0].error.as_deref(), Some("submission timed out"));
        assert_eq!(history[0].target_tx_ref, None);
    }

    #[test]
    fn resolving_twice_is_rejected() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let id = indexed_record(&index, "0x01");
        let transfer_id = open(&index, id);
        index
            .complete_transfer(transfer_id, &TxRef::from("fabric-tx-9"), 1_700_001_050)
            .unwrap();

        let err = index
            .fail_transfer(transfer_id, "late failure", 1_700_001_070)
            .unwrap_err();
        assert!(matches!(err, IndexError::UnknownTransfer(i) if i == transfer_id));
        // The completed resolution is untouched.
        let history = index.transfer_history(id).unwrap();
        assert_eq!(history[0].status, TransferStatus::Completed);
    }

    #[test]
    fn history_is_per_record_and_newest_first() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let first = indexed_record(&index, "0x01");
        let other = indexed_record(&index, "0x02");

        let a = open(&index, first);
        open(&index, other);
        let b = open(&index, first);
        index
            .fail_transfer(a, "gateway rejected", 1_700_001_010)
            .unwrap();
        index
            .complete_transfer(b, &TxRef::from("fabric-tx-2"), 1_700_001_020)
            .unwrap();

        let history = index.transfer_history(first).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transfer_id, b);
        assert_eq!(history[0].status, TransferStatus::Completed);
        assert_eq!(history[1].transfer_id, a);
        assert_eq!(history[1].status, TransferStatus::Failed);

        assert_eq!(index.transfer_history(other).unwrap().len(), 1);
    }
}
