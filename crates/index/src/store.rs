//! Record index trait and persistent implementation.
//!
//! `PersistentRecordIndex` stores records, authorization rows, audit
//! events, and per-chain ingestion checkpoints in one SQLite database,
//! using a connection pool (r2d2) for concurrent reads and a dedicated
//! writer connection. WAL mode lets query reads proceed as snapshot reads
//! that never block on ingestion writes.
//!
//! All mutations for one ledger event happen in a single write
//! transaction, so a reader can never observe a record without its audit
//! row or a half-applied authorization transition.

use std::collections::BTreeSet;
use std::sync::Mutex;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};

use medcross_core::{
    AuditEvent, Authorization, AuthStatus, ChainId, DataType, IngestEvent, IngestPayload, Record,
    RecordId, TransferRecord, TransferStatus, TxRef,
};

use crate::audit::{
    insert_audit_row, load_trail, parse_column, record_id_from_column, tx_ref_exists,
    AppendOutcome, AuditLog, NewAuditEvent,
};
use crate::authz::{grant_effect, revoke_effect, AuthState, GrantEffect, RevokeEffect};
use crate::cache::RecordCache;
use crate::error::{IndexError, IndexResult};
use crate::scan::{MonthlyCount, RecordQuery, ScanPage, SortKey, Statistics};
use crate::transfers::{
    insert_transfer_row, load_transfers, resolve_transfer_row, NewTransfer, TransferLog,
};

/// Outcome of applying one normalized ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// A new record was indexed.
    Inserted,
    /// A fresh authorization became active.
    Granted,
    /// Grant while already active: absorbed, audit row still written.
    AlreadyActive,
    /// The active authorization was revoked.
    Revoked,
    /// This ledger tx ref was already audited; nothing was applied.
    DuplicateTxRef,
    /// Grant/revoke referenced a record the index has not seen.
    UnknownRecord,
    /// Revoke for a grantee with no grant history on this record; the
    /// grant may still be in flight, so the caller should buffer.
    PrematureRevoke,
}

/// Trait for record index operations.
///
/// All methods are synchronous; async pipelines call them from blocking
/// contexts. Implementations must serialize mutations so authorization
/// transition checks are race-free.
pub trait RecordIndex: Send + Sync {
    /// Apply one confirmed ledger event atomically (state + audit row).
    fn apply_event(&self, event: &IngestEvent) -> IndexResult<Applied>;

    /// Point lookup by record id.
    fn get_record(&self, id: RecordId) -> IndexResult<Option<Record>>;

    /// Full authorization history for a record, oldest first.
    fn authorizations(&self, id: RecordId) -> IndexResult<Vec<Authorization>>;

    /// Current authorization state for a (record, grantee) pair, computed
    /// from the latest authorization row rather than duplicated storage.
    fn auth_state(&self, id: RecordId, grantee_id: &str) -> IndexResult<AuthState>;

    /// Last processed block height for a chain.
    fn checkpoint(&self, chain: ChainId) -> IndexResult<Option<u64>>;

    /// Advance the checkpoint for a chain; never moves backwards.
    fn set_checkpoint(&self, chain: ChainId, height: u64) -> IndexResult<()>;

    /// Filtered, sorted, paginated scan. The requester scope is part of
    /// the predicate: unauthorized records are excluded before pagination
    /// and never counted.
    fn scan(&self, query: &RecordQuery) -> IndexResult<ScanPage>;

    /// Derived read-only aggregate over the whole index.
    fn statistics(&self) -> IndexResult<Statistics>;
}

/// Persistent record index backed by SQLite.
pub struct PersistentRecordIndex {
    /// Connection pool for read operations (concurrent).
    read_pool: Pool<SqliteConnectionManager>,
    /// Dedicated connection for write operations (serialized).
    writer: Mutex<Connection>,
    cache: RecordCache,
}

/// Configure a connection with standard PRAGMAs for WAL mode.
fn configure_connection(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;",
    )
}

impl PersistentRecordIndex {
    /// Open (or create) an on-disk index with the default cache size.
    pub fn open(db_path: impl AsRef<std::path::Path>) -> IndexResult<Self> {
        Self::open_with_cache(db_path, crate::cache::DEFAULT_RECORD_CACHE_SIZE)
    }

    /// Open (or create) an on-disk index with an explicit record cache
    /// capacity.
    pub fn open_with_cache(
        db_path: impl AsRef<std::path::Path>,
        cache_entries: usize,
    ) -> IndexResult<Self> {
        let writer = Connection::open(&db_path)?;
        configure_connection(&writer)?;

        let manager = SqliteConnectionManager::file(&db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| IndexError::Sqlite(e.to_string()))?;

        let index = Self {
            read_pool,
            writer: Mutex::new(writer),
            cache: RecordCache::new(cache_entries),
        };
        index.init_schema()?;
        Ok(index)
    }

    /// Create an in-memory index for testing.
    ///
    /// In-memory SQLite DBs are per-connection, so this uses a named
    /// shared-cache URI to make the pool and the writer see the same data.
    pub fn in_memory() -> IndexResult<Self> {
        let uri = format!("file:medcross_test_{}?mode=memory&cache=shared", unique_id());
        let writer = Connection::open(&uri)?;
        configure_connection(&writer)?;

        let manager =
            SqliteConnectionManager::file(&uri).with_init(|conn| configure_connection(conn));
        let read_pool = Pool::builder()
            .max_size(2)
            .build(manager)
            .map_err(|e| IndexError::Sqlite(e.to_string()))?;

        let index = Self {
            read_pool,
            writer: Mutex::new(writer),
            cache: RecordCache::with_defaults(),
        };
        index.init_schema()?;
        Ok(index)
    }

    fn read_conn(&self) -> IndexResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .map_err(|e| IndexError::Sqlite(e.to_string()))
    }

    pub fn cache(&self) -> &RecordCache {
        &self.cache
    }

    /// Load checkpoints into the cache after a restart.
    pub fn initialize(&self) -> IndexResult<()> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare("SELECT chain, block_height FROM checkpoints")?;
        let rows = stmt.query_map([], |row| {
            let chain: String = row.get(0)?;
            let height: i64 = row.get(1)?;
            Ok((chain, height as u64))
        })?;

        let mut any = false;
        for row in rows {
            let (chain, height) = row?;
            let chain: ChainId = chain
                .parse()
                .map_err(|e: medcross_core::ParseTagError| IndexError::CorruptRow(e.to_string()))?;
            self.cache.set_checkpoint(chain, height);
            tracing::info!(chain = %chain, height, "record index resuming from checkpoint");
            any = true;
        }
        if !any {
            tracing::info!("record index initialized (empty)");
        }
        Ok(())
    }

    fn init_schema(&self) -> IndexResult<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                 record_id BLOB PRIMARY KEY,
                 origin_chain TEXT NOT NULL,
                 file_name TEXT NOT NULL,
                 data_type TEXT NOT NULL,
                 owner_id TEXT NOT NULL,
                 uploaded_at INTEGER NOT NULL,
                 size_bytes INTEGER NOT NULL,
                 description TEXT NOT NULL,
                 tags_json TEXT NOT NULL,
                 content_hash TEXT NOT NULL,
                 tx_ref TEXT NOT NULL UNIQUE,
                 block_height INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_records_owner ON records(owner_id);
             CREATE INDEX IF NOT EXISTS idx_records_uploaded ON records(uploaded_at);

             CREATE TABLE IF NOT EXISTS authorizations (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 record_id BLOB NOT NULL,
                 grantee_id TEXT NOT NULL,
                 granted_at INTEGER NOT NULL,
                 status TEXT NOT NULL,
                 revoked_at INTEGER,
                 grant_tx_ref TEXT NOT NULL,
                 revoke_tx_ref TEXT,
                 FOREIGN KEY (record_id) REFERENCES records(record_id)
             );
             CREATE INDEX IF NOT EXISTS idx_auth_record_grantee
                 ON authorizations(record_id, grantee_id);
             CREATE INDEX IF NOT EXISTS idx_auth_grantee
                 ON authorizations(grantee_id, status);

             CREATE TABLE IF NOT EXISTS audit_events (
                 event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 kind TEXT NOT NULL,
                 record_id BLOB NOT NULL,
                 actor_id TEXT NOT NULL,
                 timestamp INTEGER NOT NULL,
                 origin_chain TEXT NOT NULL,
                 ledger_tx_ref TEXT,
                 block_height INTEGER NOT NULL
             );
             CREATE UNIQUE INDEX IF NOT EXISTS idx_audit_tx_ref
                 ON audit_events(ledger_tx_ref) WHERE ledger_tx_ref IS NOT NULL;
             CREATE INDEX IF NOT EXISTS idx_audit_record ON audit_events(record_id);

             CREATE TABLE IF NOT EXISTS transfers (
                 transfer_id INTEGER PRIMARY KEY AUTOINCREMENT,
                 record_id BLOB NOT NULL,
                 source_chain TEXT NOT NULL,
                 target_chain TEXT NOT NULL,
                 requested_at INTEGER NOT NULL,
                 resolved_at INTEGER,
                 status TEXT NOT NULL,
                 target_tx_ref TEXT,
                 error TEXT,
                 FOREIGN KEY (record_id) REFERENCES records(record_id)
             );
             CREATE INDEX IF NOT EXISTS idx_transfers_record ON transfers(record_id);

             CREATE TABLE IF NOT EXISTS checkpoints (
                 chain TEXT PRIMARY KEY,
                 block_height INTEGER NOT NULL
             );",
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
        let record_id_bytes: Vec<u8> = row.get(0)?;
        let origin_chain: String = row.get(1)?;
        let file_name: String = row.get(2)?;
        let data_type: String = row.get(3)?;
        let owner_id: String = row.get(4)?;
        let uploaded_at: i64 = row.get(5)?;
        let size_bytes: i64 = row.get(6)?;
        let description: String = row.get(7)?;
        let tags_json: String = row.get(8)?;
        let content_hash: String = row.get(9)?;
        let tx_ref: String = row.get(10)?;
        let block_height: i64 = row.get(11)?;

        let tags: BTreeSet<String> = serde_json::from_str(&tags_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Record {
            record_id: record_id_from_column(&record_id_bytes, 0)?,
            origin_chain: parse_column(&origin_chain, 1)?,
            file_name,
            data_type: parse_column(&data_type, 3)?,
            owner_id,
            uploaded_at: uploaded_at as u64,
            size_bytes: size_bytes as u64,
            description,
            tags,
            content_hash,
            tx_ref: TxRef::new(tx_ref),
            block_height: block_height as u64,
        })
    }

    fn row_to_authorization(row: &rusqlite::Row<'_>) -> rusqlite::Result<Authorization> {
        let record_id_bytes: Vec<u8> = row.get(0)?;
        let grantee_id: String = row.get(1)?;
        let granted_at: i64 = row.get(2)?;
        let status: String = row.get(3)?;
        let revoked_at: Option<i64> = row.get(4)?;
        let grant_tx_ref: String = row.get(5)?;
        let revoke_tx_ref: Option<String> = row.get(6)?;

        let status = match status.as_str() {
            "active" => AuthStatus::Active,
            "revoked" => AuthStatus::Revoked,
            other => {
                return Err(rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    format!("unknown authorization status '{other}'").into(),
                ))
            }
        };

        Ok(Authorization {
            record_id: record_id_from_column(&record_id_bytes, 0)?,
            grantee_id,
            granted_at: granted_at as u64,
            status,
            revoked_at: revoked_at.map(|t| t as u64),
            grant_tx_ref: TxRef::new(grant_tx_ref),
            revoke_tx_ref: revoke_tx_ref.map(TxRef::new),
        })
    }

    fn record_from_upload(event: &IngestEvent) -> Option<Record> {
        match &event.payload {
            IngestPayload::Upload {
                file_name,
                data_type,
                size_bytes,
                description,
                tags,
                content_hash,
            } => Some(Record {
                record_id: event.record_id,
                origin_chain: event.chain,
                file_name: file_name.clone(),
                data_type: *data_type,
                owner_id: event.actor_id.clone(),
                uploaded_at: event.timestamp,
                size_bytes: *size_bytes,
                description: description.clone(),
                tags: tags.clone(),
                content_hash: content_hash.clone(),
                tx_ref: event.tx_ref.clone(),
                block_height: event.block_height,
            }),
            _ => None,
        }
    }
}

/// Latest authorization state for a (record, grantee) pair, plus the row
/// id of the latest row (needed to flip it on revoke).
fn latest_auth_row(
    conn: &Connection,
    record_id: RecordId,
    grantee_id: &str,
) -> IndexResult<(AuthState, Option<i64>)> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, status FROM authorizations
             WHERE record_id = ? AND grantee_id = ?
             ORDER BY id DESC LIMIT 1",
            params![record_id.as_slice(), grantee_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok((AuthState::NoGrant, None)),
        Some((id, status)) => match status.as_str() {
            "active" => Ok((AuthState::Active, Some(id))),
            "revoked" => Ok((AuthState::Revoked, Some(id))),
            other => Err(IndexError::CorruptRow(format!(
                "unknown authorization status '{other}'"
            ))),
        },
    }
}

fn record_exists(conn: &Connection, record_id: RecordId) -> IndexResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM records WHERE record_id = ?",
            params![record_id.as_slice()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Shared scan predicate. `?1` is the requester, `?2`-`?5` the optional
/// filters, `?6` the lowercased keyword. The requester clause comes first:
/// access control is part of the predicate, not a post-filter. Tags are
/// matched per unpacked value via `json_each`, so the keyword is compared
/// against tag text and never against the stored array's punctuation.
const SCAN_WHERE: &str = "(r.owner_id = ?1 OR EXISTS (
         SELECT 1 FROM authorizations a
         WHERE a.record_id = r.record_id
           AND a.grantee_id = ?1
           AND a.status = 'active'))
     AND (?2 IS NULL OR r.data_type = ?2)
     AND (?3 IS NULL OR r.origin_chain = ?3)
     AND (?4 IS NULL OR r.uploaded_at >= ?4)
     AND (?5 IS NULL OR r.uploaded_at <= ?5)
     AND (?6 IS NULL OR instr(lower(r.file_name), ?6) > 0
                     OR instr(lower(r.description), ?6) > 0
                     OR EXISTS (
                         SELECT 1 FROM json_each(r.tags_json) tag
                         WHERE instr(lower(tag.value), ?6) > 0))";

const RECORD_COLUMNS: &str = "r.record_id, r.origin_chain, r.file_name, r.data_type, r.owner_id,
     r.uploaded_at, r.size_bytes, r.description, r.tags_json, r.content_hash,
     r.tx_ref, r.block_height";

impl RecordIndex for PersistentRecordIndex {
    fn apply_event(&self, event: &IngestEvent) -> IndexResult<Applied> {
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;

        // Exactly one audit row per distinct ledger tx ref: a ref we have
        // already audited means the whole event was already applied.
        if tx_ref_exists(&tx, &event.tx_ref)? {
            return Ok(Applied::DuplicateTxRef);
        }

        let audit = NewAuditEvent {
            kind: event.payload.audit_kind(),
            record_id: event.record_id,
            actor_id: event.actor_id.clone(),
            timestamp: event.timestamp,
            origin_chain: event.chain,
            ledger_tx_ref: Some(event.tx_ref.clone()),
            block_height: event.block_height,
        };

        let outcome = match &event.payload {
            IngestPayload::Upload { .. } => {
                let record = Self::record_from_upload(event)
                    .ok_or_else(|| IndexError::CorruptRow("upload payload expected".into()))?;
                tx.execute(
                    "INSERT OR IGNORE INTO records
                     (record_id, origin_chain, file_name, data_type, owner_id, uploaded_at,
                      size_bytes, description, tags_json, content_hash, tx_ref, block_height)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        record.record_id.as_slice(),
                        record.origin_chain.as_str(),
                        record.file_name,
                        record.data_type.as_str(),
                        record.owner_id,
                        record.uploaded_at as i64,
                        record.size_bytes as i64,
                        record.description,
                        serde_json::to_string(&record.tags)?,
                        record.content_hash,
                        record.tx_ref.as_str(),
                        record.block_height as i64,
                    ],
                )?;
                insert_audit_row(&tx, &audit)?;
                tx.commit()?;
                self.cache.insert_record(record);
                return Ok(Applied::Inserted);
            }
            IngestPayload::Grant { grantee_id } => {
                if !record_exists(&tx, event.record_id)? {
                    return Ok(Applied::UnknownRecord);
                }
                let (state, _) = latest_auth_row(&tx, event.record_id, grantee_id)?;
                match grant_effect(state) {
                    GrantEffect::InsertFresh => {
                        tx.execute(
                            "INSERT INTO authorizations
                             (record_id, grantee_id, granted_at, status, grant_tx_ref)
                             VALUES (?, ?, ?, 'active', ?)",
                            params![
                                event.record_id.as_slice(),
                                grantee_id,
                                event.timestamp as i64,
                                event.tx_ref.as_str(),
                            ],
                        )?;
                        Applied::Granted
                    }
                    GrantEffect::AlreadyActive => Applied::AlreadyActive,
                }
            }
            IngestPayload::Revoke { grantee_id } => {
                if !record_exists(&tx, event.record_id)? {
                    return Ok(Applied::UnknownRecord);
                }
                let (state, row_id) = latest_auth_row(&tx, event.record_id, grantee_id)?;
                match (revoke_effect(state), row_id) {
                    (Ok(RevokeEffect::RevokeActive), Some(row_id)) => {
                        tx.execute(
                            "UPDATE authorizations
                             SET status = 'revoked', revoked_at = ?, revoke_tx_ref = ?
                             WHERE id = ?",
                            params![event.timestamp as i64, event.tx_ref.as_str(), row_id],
                        )?;
                        Applied::Revoked
                    }
                    (Ok(RevokeEffect::RevokeActive), None) => {
                        return Err(IndexError::CorruptRow(
                            "active authorization state without a backing row".into(),
                        ))
                    }
                    (Ok(RevokeEffect::NoGrantObserved), _) => return Ok(Applied::PrematureRevoke),
                    (Err(from), _) => {
                        return Err(IndexError::InvalidTransition {
                            record_id: event.record_id,
                            grantee_id: grantee_id.clone(),
                            from: from.as_str(),
                            attempted: "revoke",
                        })
                    }
                }
            }
        };

        insert_audit_row(&tx, &audit)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn get_record(&self, id: RecordId) -> IndexResult<Option<Record>> {
        if let Some(record) = self.cache.get_record(id) {
            return Ok(Some((*record).clone()));
        }

        let conn = self.read_conn()?;
        let result = conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM records r WHERE r.record_id = ?"),
            params![id.as_slice()],
            Self::row_to_record,
        );

        match result {
            Ok(record) => {
                self.cache.insert_record(record.clone());
                Ok(Some(record))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn authorizations(&self, id: RecordId) -> IndexResult<Vec<Authorization>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_id, grantee_id, granted_at, status, revoked_at,
                    grant_tx_ref, revoke_tx_ref
             FROM authorizations WHERE record_id = ? ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.as_slice()], Self::row_to_authorization)?;
        let mut auths = Vec::new();
        for row in rows {
            auths.push(row?);
        }
        Ok(auths)
    }

    fn auth_state(&self, id: RecordId, grantee_id: &str) -> IndexResult<AuthState> {
        let conn = self.read_conn()?;
        let (state, _) = latest_auth_row(&conn, id, grantee_id)?;
        Ok(state)
    }

    fn checkpoint(&self, chain: ChainId) -> IndexResult<Option<u64>> {
        if let Some(height) = self.cache.checkpoint(chain) {
            return Ok(Some(height));
        }
        let conn = self.read_conn()?;
        let height: Option<i64> = conn
            .query_row(
                "SELECT block_height FROM checkpoints WHERE chain = ?",
                params![chain.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(height.map(|h| h as u64))
    }

    fn set_checkpoint(&self, chain: ChainId, height: u64) -> IndexResult<()> {
        let conn = self.writer.lock().unwrap();
        conn.execute(
            "INSERT INTO checkpoints (chain, block_height) VALUES (?1, ?2)
             ON CONFLICT(chain) DO UPDATE SET block_height = excluded.block_height
             WHERE excluded.block_height > checkpoints.block_height",
            params![chain.as_str(), height as i64],
        )?;
        self.cache.set_checkpoint(chain, height);
        Ok(())
    }

    fn scan(&self, query: &RecordQuery) -> IndexResult<ScanPage> {
        // No requester, no results: there is no public data.
        let Some(requester) = query.requester_id.as_deref() else {
            return Ok(ScanPage::default());
        };

        let order = match query.sort {
            SortKey::NewestFirst => "r.uploaded_at DESC, r.record_id ASC",
            SortKey::OldestFirst => "r.uploaded_at ASC, r.record_id ASC",
            SortKey::FileName => "r.file_name COLLATE NOCASE ASC, r.record_id ASC",
        };

        let keyword = query.keyword.as_ref().map(|k| k.to_lowercase());
        let conn = self.read_conn()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM records r WHERE {SCAN_WHERE}"),
            params![
                requester,
                query.data_type.map(|d| d.as_str()),
                query.chain.map(|c| c.as_str()),
                query.uploaded_after.map(|t| t as i64),
                query.uploaded_before.map(|t| t as i64),
                keyword.as_deref(),
            ],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM records r
             WHERE {SCAN_WHERE}
             ORDER BY {order}
             LIMIT ?7 OFFSET ?8"
        ))?;
        let rows = stmt.query_map(
            params![
                requester,
                query.data_type.map(|d| d.as_str()),
                query.chain.map(|c| c.as_str()),
                query.uploaded_after.map(|t| t as i64),
                query.uploaded_before.map(|t| t as i64),
                keyword.as_deref(),
                query.limit as i64,
                query.offset as i64,
            ],
            Self::row_to_record,
        )?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }

        Ok(ScanPage {
            records,
            total: total as u64,
        })
    }

    fn statistics(&self) -> IndexResult<Statistics> {
        let conn = self.read_conn()?;

        let total_records: i64 =
            conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

        let mut per_chain = std::collections::BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT origin_chain, COUNT(*) FROM records GROUP BY origin_chain")?;
        let rows = stmt.query_map([], |row| {
            let chain: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((chain, count))
        })?;
        for row in rows {
            let (chain, count) = row?;
            let chain: ChainId = chain
                .parse()
                .map_err(|e: medcross_core::ParseTagError| IndexError::CorruptRow(e.to_string()))?;
            per_chain.insert(chain, count as u64);
        }

        let mut per_type = std::collections::BTreeMap::new();
        let mut stmt =
            conn.prepare("SELECT data_type, COUNT(*) FROM records GROUP BY data_type")?;
        let rows = stmt.query_map([], |row| {
            let data_type: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok((data_type, count))
        })?;
        for row in rows {
            let (data_type, count) = row?;
            let data_type: DataType = data_type
                .parse()
                .map_err(|e: medcross_core::ParseTagError| IndexError::CorruptRow(e.to_string()))?;
            per_type.insert(data_type, count as u64);
        }

        let mut monthly_growth = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT strftime('%Y-%m', uploaded_at, 'unixepoch') AS month, COUNT(*)
             FROM records GROUP BY month ORDER BY month",
        )?;
        let rows = stmt.query_map([], |row| {
            let month: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            Ok(MonthlyCount {
                month,
                count: count as u64,
            })
        })?;
        for row in rows {
            monthly_growth.push(row?);
        }

        Ok(Statistics {
            total_records: total_records as u64,
            per_chain,
            per_type,
            monthly_growth,
        })
    }
}

impl AuditLog for PersistentRecordIndex {
    fn append(&self, event: &NewAuditEvent) -> IndexResult<AppendOutcome> {
        let conn = self.writer.lock().unwrap();
        match insert_audit_row(&conn, event)? {
            Some(event_id) => Ok(AppendOutcome::Appended(event_id)),
            None => Ok(AppendOutcome::DuplicateTxRef),
        }
    }

    fn query_trail(&self, record_id: RecordId) -> IndexResult<Vec<AuditEvent>> {
        let conn = self.read_conn()?;
        load_trail(&conn, record_id)
    }

    fn contains_tx_ref(&self, tx_ref: &TxRef) -> IndexResult<bool> {
        let conn = self.read_conn()?;
        tx_ref_exists(&conn, tx_ref)
    }
}

impl TransferLog for PersistentRecordIndex {
    fn open_transfer(&self, transfer: &NewTransfer) -> IndexResult<u64> {
        let conn = self.writer.lock().unwrap();
        insert_transfer_row(&conn, transfer)
    }

    fn complete_transfer(
        &self,
        transfer_id: u64,
        target_tx_ref: &TxRef,
        resolved_at: u64,
    ) -> IndexResult<()> {
        let conn = self.writer.lock().unwrap();
        resolve_transfer_row(
            &conn,
            transfer_id,
            TransferStatus::Completed,
            Some(target_tx_ref),
            None,
            resolved_at,
        )
    }

    fn fail_transfer(&self, transfer_id: u64, error: &str, resolved_at: u64) -> IndexResult<()> {
        let conn = self.writer.lock().unwrap();
        resolve_transfer_row(
            &conn,
            transfer_id,
            TransferStatus::Failed,
            None,
            Some(error),
            resolved_at,
        )
    }

    fn transfer_history(&self, record_id: RecordId) -> IndexResult<Vec<TransferRecord>> {
        let conn = self.read_conn()?;
        load_transfers(&conn, record_id)
    }
}

/// Generate a unique ID for in-memory shared-cache SQLite databases.
fn unique_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use medcross_core::AuditKind;
    use std::collections::BTreeSet;

    pub(crate) fn upload_event(chain: ChainId, tx: &str, owner: &str, height: u64) -> IngestEvent {
        let tx_ref = TxRef::from(tx);
        IngestEvent {
            chain,
            record_id: RecordId::derive(chain, &tx_ref),
            tx_ref,
            block_height: height,
            timestamp: 1_700_000_000 + height,
            actor_id: owner.to_string(),
            payload: IngestPayload::Upload {
                file_name: format!("file-{height}.dcm"),
                data_type: DataType::Imaging,
                size_bytes: 2048,
                description: "routine scan".to_string(),
                tags: BTreeSet::from(["ct".to_string()]),
                content_hash: format!("Qm{height}"),
            },
        }
    }

    pub(crate) fn grant_event(
        record_id: RecordId,
        chain: ChainId,
        tx: &str,
        owner: &str,
        grantee: &str,
        height: u64,
    ) -> IngestEvent {
        IngestEvent {
            chain,
            tx_ref: TxRef::from(tx),
            block_height: height,
            timestamp: 1_700_000_000 + height,
            actor_id: owner.to_string(),
            record_id,
            payload: IngestPayload::Grant {
                grantee_id: grantee.to_string(),
            },
        }
    }

    pub(crate) fn revoke_event(
        record_id: RecordId,
        chain: ChainId,
        tx: &str,
        owner: &str,
        grantee: &str,
        height: u64,
    ) -> IngestEvent {
        IngestEvent {
            chain,
            tx_ref: TxRef::from(tx),
            block_height: height,
            timestamp: 1_700_000_000 + height,
            actor_id: owner.to_string(),
            record_id,
            payload: IngestPayload::Revoke {
                grantee_id: grantee.to_string(),
            },
        }
    }

    #[test]
    fn upload_is_idempotent_with_one_audit_row() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let event = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);

        assert_eq!(index.apply_event(&event).unwrap(), Applied::Inserted);
        assert_eq!(index.apply_event(&event).unwrap(), Applied::DuplicateTxRef);

        let record = index.get_record(event.record_id).unwrap().unwrap();
        assert_eq!(record.owner_id, "owner-1");

        let trail = index.query_trail(event.record_id).unwrap();
        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].kind, AuditKind::Upload);
        assert_eq!(trail[0].ledger_tx_ref, Some(event.tx_ref.clone()));
    }

    #[test]
    fn grant_revoke_regrant_preserves_history() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();

        let grant = grant_event(id, ChainId::Ethereum, "0x02", "owner-1", "user-2", 105);
        assert_eq!(index.apply_event(&grant).unwrap(), Applied::Granted);
        assert!(index.auth_state(id, "user-2").unwrap().is_active());

        let revoke = revoke_event(id, ChainId::Ethereum, "0x03", "owner-1", "user-2", 110);
        assert_eq!(index.apply_event(&revoke).unwrap(), Applied::Revoked);
        assert_eq!(index.auth_state(id, "user-2").unwrap(), AuthState::Revoked);

        let regrant = grant_event(id, ChainId::Ethereum, "0x04", "owner-1", "user-2", 115);
        assert_eq!(index.apply_event(&regrant).unwrap(), Applied::Granted);

        // Fresh row, old one untouched.
        let auths = index.authorizations(id).unwrap();
        assert_eq!(auths.len(), 2);
        assert_eq!(auths[0].status, AuthStatus::Revoked);
        assert_eq!(auths[0].revoke_tx_ref, Some(TxRef::from("0x03")));
        assert_eq!(auths[1].status, AuthStatus::Active);

        let trail = index.query_trail(id).unwrap();
        assert_eq!(trail.len(), 4);
    }

    #[test]
    fn grant_while_active_is_audited_noop() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Fabric, "tx-1", "owner-1", 10);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();

        let g1 = grant_event(id, ChainId::Fabric, "tx-2", "owner-1", "user-2", 11);
        let g2 = grant_event(id, ChainId::Fabric, "tx-3", "owner-1", "user-2", 12);
        assert_eq!(index.apply_event(&g1).unwrap(), Applied::Granted);
        assert_eq!(index.apply_event(&g2).unwrap(), Applied::AlreadyActive);

        assert_eq!(index.authorizations(id).unwrap().len(), 1);
        // Both grant events are audited, the duplicate included.
        let grants = index
            .query_trail(id)
            .unwrap()
            .into_iter()
            .filter(|e| e.kind == AuditKind::Grant)
            .count();
        assert_eq!(grants, 2);
    }

    #[test]
    fn grant_for_unknown_record_is_not_applied_or_audited() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let id = RecordId::derive(ChainId::Ethereum, &TxRef::from("0xmissing"));
        let grant = grant_event(id, ChainId::Ethereum, "0x09", "owner-1", "user-2", 50);

        assert_eq!(index.apply_event(&grant).unwrap(), Applied::UnknownRecord);
        assert!(!index.contains_tx_ref(&grant.tx_ref).unwrap());
    }

    #[test]
    fn premature_revoke_leaves_state_untouched() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();

        let revoke = revoke_event(id, ChainId::Ethereum, "0x05", "owner-1", "user-9", 120);
        assert_eq!(index.apply_event(&revoke).unwrap(), Applied::PrematureRevoke);
        assert_eq!(index.auth_state(id, "user-9").unwrap(), AuthState::NoGrant);
        assert!(!index.contains_tx_ref(&revoke.tx_ref).unwrap());
    }

    #[test]
    fn double_revoke_is_invalid_transition() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();
        index
            .apply_event(&grant_event(id, ChainId::Ethereum, "0x02", "owner-1", "u2", 105))
            .unwrap();
        index
            .apply_event(&revoke_event(id, ChainId::Ethereum, "0x03", "owner-1", "u2", 110))
            .unwrap();

        let second = revoke_event(id, ChainId::Ethereum, "0x04", "owner-1", "u2", 115);
        let err = index.apply_event(&second).unwrap_err();
        assert!(matches!(err, IndexError::InvalidTransition { .. }));
        // Original state preserved, violating event not audited.
        assert_eq!(index.auth_state(id, "u2").unwrap(), AuthState::Revoked);
        assert!(!index.contains_tx_ref(&second.tx_ref).unwrap());
    }

    #[test]
    fn scan_scopes_results_to_requester() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let mine = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);
        let shared = upload_event(ChainId::Ethereum, "0x02", "owner-2", 101);
        let hidden = upload_event(ChainId::Ethereum, "0x03", "owner-2", 102);
        for e in [&mine, &shared, &hidden] {
            index.apply_event(e).unwrap();
        }
        index
            .apply_event(&grant_event(
                shared.record_id,
                ChainId::Ethereum,
                "0x04",
                "owner-2",
                "owner-1",
                103,
            ))
            .unwrap();

        let page = index
            .scan(&RecordQuery {
                requester_id: Some("owner-1".to_string()),
                limit: 10,
                ..RecordQuery::default()
            })
            .unwrap();

        // Owned + granted, never the hidden one; total excludes it too.
        assert_eq!(page.total, 2);
        let ids: Vec<_> = page.records.iter().map(|r| r.record_id).collect();
        assert!(ids.contains(&mine.record_id));
        assert!(ids.contains(&shared.record_id));
        assert!(!ids.contains(&hidden.record_id));
    }

    #[test]
    fn scan_without_requester_matches_nothing() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        index
            .apply_event(&upload_event(ChainId::Ethereum, "0x01", "owner-1", 100))
            .unwrap();

        let page = index
            .scan(&RecordQuery {
                limit: 10,
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(page.total, 0);
        assert!(page.records.is_empty());
    }

    #[test]
    fn revoked_grant_no_longer_matches() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Fabric, "tx-1", "owner-1", 10);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();
        index
            .apply_event(&grant_event(id, ChainId::Fabric, "tx-2", "owner-1", "u2", 11))
            .unwrap();

        let query = RecordQuery {
            requester_id: Some("u2".to_string()),
            limit: 10,
            ..RecordQuery::default()
        };
        assert_eq!(index.scan(&query).unwrap().total, 1);

        index
            .apply_event(&revoke_event(id, ChainId::Fabric, "tx-3", "owner-1", "u2", 12))
            .unwrap();
        assert_eq!(index.scan(&query).unwrap().total, 0);
    }

    #[test]
    fn scan_filters_and_sorts() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        for (tx, height) in [("0x01", 100), ("0x02", 200), ("0x03", 300)] {
            index
                .apply_event(&upload_event(ChainId::Ethereum, tx, "owner-1", height))
                .unwrap();
        }

        let newest_first = index
            .scan(&RecordQuery {
                requester_id: Some("owner-1".to_string()),
                sort: SortKey::NewestFirst,
                limit: 10,
                ..RecordQuery::default()
            })
            .unwrap();
        let uploads: Vec<_> = newest_first.records.iter().map(|r| r.uploaded_at).collect();
        assert!(uploads.windows(2).all(|w| w[0] >= w[1]));

        // Keyword matches tags case-insensitively.
        let by_tag = index
            .scan(&RecordQuery {
                requester_id: Some("owner-1".to_string()),
                keyword: Some("CT".to_string()),
                limit: 10,
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(by_tag.total, 3);

        // Date range bounds are inclusive and conjunctive.
        let ranged = index
            .scan(&RecordQuery {
                requester_id: Some("owner-1".to_string()),
                uploaded_after: Some(1_700_000_200),
                uploaded_before: Some(1_700_000_200),
                limit: 10,
                ..RecordQuery::default()
            })
            .unwrap();
        assert_eq!(ranged.total, 1);
        assert_eq!(ranged.records[0].uploaded_at, 1_700_000_200);
    }

    #[test]
    fn keyword_matches_tag_values_not_json_punctuation() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let tx_ref = TxRef::from("0x01");
        index
            .apply_event(&IngestEvent {
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
                    description: "routine".to_string(),
                    tags: BTreeSet::from(["ct".to_string(), "chest".to_string()]),
                    content_hash: "Qm1".to_string(),
                },
            })
            .unwrap();

        let query = |keyword: &str| RecordQuery {
            requester_id: Some("owner-1".to_string()),
            keyword: Some(keyword.to_string()),
            limit: 10,
            ..RecordQuery::default()
        };

        // Tag values match, the stored array's serialization does not.
        assert_eq!(index.scan(&query("chest")).unwrap().total, 1);
        assert_eq!(index.scan(&query(",")).unwrap().total, 0);
        assert_eq!(index.scan(&query("\"")).unwrap().total, 0);
        assert_eq!(index.scan(&query("[")).unwrap().total, 0);
        assert_eq!(index.scan(&query("ct\",\"")).unwrap().total, 0);
    }

    #[test]
    fn scan_paginates_after_authorization_filtering() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        // Interleave visible (owned) and hidden records so naive
        // post-filter pagination would produce short pages.
        for i in 0..6u64 {
            let owner = if i % 2 == 0 { "owner-1" } else { "someone-else" };
            index
                .apply_event(&upload_event(
                    ChainId::Ethereum,
                    &format!("0x{i:02x}"),
                    owner,
                    100 + i,
                ))
                .unwrap();
        }

        let query = |offset| RecordQuery {
            requester_id: Some("owner-1".to_string()),
            sort: SortKey::OldestFirst,
            limit: 2,
            offset,
            ..RecordQuery::default()
        };

        let first = index.scan(&query(0)).unwrap();
        let second = index.scan(&query(2)).unwrap();
        assert_eq!(first.total, 3);
        assert_eq!(first.records.len(), 2);
        assert_eq!(second.records.len(), 1);
        assert!(first
            .records
            .iter()
            .chain(second.records.iter())
            .all(|r| r.owner_id == "owner-1"));
    }

    #[test]
    fn statistics_aggregate_records() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        index
            .apply_event(&upload_event(ChainId::Ethereum, "0x01", "o1", 100))
            .unwrap();
        index
            .apply_event(&upload_event(ChainId::Fabric, "tx-1", "o2", 101))
            .unwrap();
        index
            .apply_event(&upload_event(ChainId::Fabric, "tx-2", "o2", 102))
            .unwrap();

        let stats = index.statistics().unwrap();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.per_chain.get(&ChainId::Ethereum), Some(&1));
        assert_eq!(stats.per_chain.get(&ChainId::Fabric), Some(&2));
        assert_eq!(stats.per_type.get(&DataType::Imaging), Some(&3));
        assert_eq!(stats.monthly_growth.iter().map(|m| m.count).sum::<u64>(), 3);
    }

    #[test]
    fn access_events_are_appendable_without_tx_refs() {
        let index = PersistentRecordIndex::in_memory().unwrap();
        let upload = upload_event(ChainId::Ethereum, "0x01", "owner-1", 100);
        let id = upload.record_id;
        index.apply_event(&upload).unwrap();

        let access = NewAuditEvent {
            kind: AuditKind::Access,
            record_id: id,
            actor_id: "user-2".to_string(),
            timestamp: 1_700_001_000,
            origin_chain: ChainId::Ethereum,
            ledger_tx_ref: None,
            block_height: 0,
        };
        // NULL tx refs are exempt from the uniqueness constraint.
        assert!(matches!(
            index.append(&access).unwrap(),
            AppendOutcome::Appended(_)
        ));
        assert!(matches!(
            index.append(&access).unwrap(),
            AppendOutcome::Appended(_)
        ));
        assert_eq!(index.query_trail(id).unwrap().len(), 3);
    }

    mod scoping_props {
        use super::*;
        use proptest::prelude::*;
        use std::collections::{HashMap, HashSet};

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Model-based check: for arbitrary upload/grant/revoke
            /// histories and an arbitrary requester, a scan returns
            /// exactly the records the requester owns or holds an active
            /// authorization for.
            #[test]
            fn scan_returns_exactly_the_visible_records(
                owners in proptest::collection::vec(0..3u8, 1..10),
                auth_ops in proptest::collection::vec((0..10usize, 0..3u8, any::<bool>()), 0..16),
                requester in 0..3u8,
            ) {
                let index = PersistentRecordIndex::in_memory().unwrap();

                let mut records = Vec::new();
                for (i, owner) in owners.iter().enumerate() {
                    let event = upload_event(
                        ChainId::Ethereum,
                        &format!("0xup{i:02x}"),
                        &format!("user-{owner}"),
                        100 + i as u64,
                    );
                    index.apply_event(&event).unwrap();
                    records.push((event.record_id, *owner));
                }

                let mut active: HashMap<(usize, u8), bool> = HashMap::new();
                for (seq, (idx, grantee, also_revoke)) in auth_ops.into_iter().enumerate() {
                    let idx = idx % records.len();
                    let (record_id, owner) = records[idx];
                    let owner = format!("user-{owner}");
                    let grantee_str = format!("user-{grantee}");

                    index
                        .apply_event(&grant_event(
                            record_id,
                            ChainId::Ethereum,
                            &format!("0xg{seq:03x}"),
                            &owner,
                            &grantee_str,
                            200 + seq as u64,
                        ))
                        .unwrap();
                    active.insert((idx, grantee), true);

                    if also_revoke {
                        index
                            .apply_event(&revoke_event(
                                record_id,
                                ChainId::Ethereum,
                                &format!("0xr{seq:03x}"),
                                &owner,
                                &grantee_str,
                                300 + seq as u64,
                            ))
                            .unwrap();
                        active.insert((idx, grantee), false);
                    }
                }

                let expected: HashSet<_> = records
                    .iter()
                    .enumerate()
                    .filter(|(idx, (_, owner))| {
                        *owner == requester
                            || active.get(&(*idx, requester)).copied().unwrap_or(false)
                    })
                    .map(|(_, (id, _))| *id)
                    .collect();

                let page = index
                    .scan(&RecordQuery {
                        requester_id: Some(format!("user-{requester}")),
                        limit: 100,
                        ..RecordQuery::default()
                    })
                    .unwrap();

                let got: HashSet<_> = page.records.iter().map(|r| r.record_id).collect();
                prop_assert_eq!(&got, &expected);
                prop_assert_eq!(page.total as usize, expected.len());
            }
        }
    }

    #[test]
    fn checkpoints_persist_and_never_regress() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("medcross-index.sqlite");

        {
            let index = PersistentRecordIndex::open(&db_path).unwrap();
            index.set_checkpoint(ChainId::Ethereum, 120).unwrap();
            index.set_checkpoint(ChainId::Ethereum, 80).unwrap();
            index
                .apply_event(&upload_event(ChainId::Ethereum, "0x01", "owner-1", 100))
                .unwrap();
        }

        let index = PersistentRecordIndex::open(&db_path).unwrap();
        index.initialize().unwrap();
        assert_eq!(index.checkpoint(ChainId::Ethereum).unwrap(), Some(120));
        assert_eq!(index.checkpoint(ChainId::Fabric).unwrap(), None);

        // Records and their audit trail survive the reopen too.
        let id = RecordId::derive(ChainId::Ethereum, &TxRef::from("0x01"));
        assert!(index.get_record(id).unwrap().is_some());
        assert_eq!(index.query_trail(id).unwrap().len(), 1);
    }
}
