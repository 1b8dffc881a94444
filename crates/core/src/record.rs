//! Record, authorization, and audit types.
//!
//! These are the stored shapes, optimized for the index rather than for any
//! particular transport. `RecordId` derivation is the idempotence anchor:
//! the same upload transaction always maps to the same record.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use alloy_primitives::{keccak256, B256};
use serde::{Deserialize, Serialize};

/// A tag string could not be parsed into its closed enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what} tag: {value}")]
pub struct ParseTagError {
    /// Which enum was being parsed.
    pub what: &'static str,
    /// The offending input.
    pub value: String,
}

/// One of the two ledgers records are anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    /// The account-based chain (Ethereum family).
    Ethereum,
    /// The permissioned chain (Fabric family).
    Fabric,
}

impl ChainId {
    /// All known chains, in stable order.
    pub const ALL: [ChainId; 2] = [ChainId::Ethereum, ChainId::Fabric];

    /// Stable string tag, used in storage and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Fabric => "fabric",
        }
    }

    /// Single-byte domain tag mixed into record id derivation.
    fn domain_tag(&self) -> u8 {
        match self {
            ChainId::Ethereum => 0x01,
            ChainId::Fabric => 0x02,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ethereum" => Ok(ChainId::Ethereum),
            "fabric" => Ok(ChainId::Fabric),
            other => Err(ParseTagError {
                what: "chain",
                value: other.to_string(),
            }),
        }
    }
}

/// Chain-native transaction reference: a 0x-hash on the account chain, a
/// transaction UUID on the permissioned chain. Opaque to the index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(raw: impl Into<String>) -> Self {
        TxRef(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxRef {
    fn from(s: &str) -> Self {
        TxRef(s.to_string())
    }
}

/// Globally unique record identifier, stable across chains.
///
/// Derived as `keccak256(chain_domain_tag || tx_ref_bytes)` from the upload
/// transaction, so re-ingesting the same ledger event always yields the
/// same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub B256);

impl RecordId {
    /// Derive the record id for an upload anchored by `tx_ref` on `chain`.
    pub fn derive(chain: ChainId, tx_ref: &TxRef) -> Self {
        let mut buf = Vec::with_capacity(1 + tx_ref.as_str().len());
        buf.push(chain.domain_tag());
        buf.extend_from_slice(tx_ref.as_str().as_bytes());
        RecordId(keccak256(&buf))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Reconstruct from a stored 32-byte blob.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        (bytes.len() == 32).then(|| RecordId(B256::from_slice(bytes)))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of medical data categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    ClinicalNote,
    Imaging,
    Genomic,
    Prescription,
    LabReport,
}

impl DataType {
    /// All known data types, in stable order.
    pub const ALL: [DataType; 5] = [
        DataType::ClinicalNote,
        DataType::Imaging,
        DataType::Genomic,
        DataType::Prescription,
        DataType::LabReport,
    ];

    /// Stable string tag, used in storage and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::ClinicalNote => "clinical-note",
            DataType::Imaging => "imaging",
            DataType::Genomic => "genomic",
            DataType::Prescription => "prescription",
            DataType::LabReport => "lab-report",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clinical-note" => Ok(DataType::ClinicalNote),
            "imaging" => Ok(DataType::Imaging),
            "genomic" => Ok(DataType::Genomic),
            "prescription" => Ok(DataType::Prescription),
            "lab-report" => Ok(DataType::LabReport),
            other => Err(ParseTagError {
                what: "data type",
                value: other.to_string(),
            }),
        }
    }
}

/// Metadata for one medical-data artifact. Immutable once indexed; only
/// the related authorization rows change over a record's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Globally unique id, derived from the upload transaction.
    pub record_id: RecordId,
    /// Ledger the upload was anchored on.
    pub origin_chain: ChainId,
    /// Original file name.
    pub file_name: String,
    /// Category of the artifact.
    pub data_type: DataType,
    /// User id of the data owner.
    pub owner_id: String,
    /// Upload time (Unix seconds), taken from the ledger event.
    pub uploaded_at: u64,
    /// Payload size in bytes.
    pub size_bytes: u64,
    /// Free-form description.
    pub description: String,
    /// Search tags, deduplicated and stably ordered.
    pub tags: BTreeSet<String>,
    /// Content-addressed reference to the off-chain payload.
    pub content_hash: String,
    /// Transaction that anchored the upload.
    pub tx_ref: TxRef,
    /// Block height of the upload transaction.
    pub block_height: u64,
}

/// Lifecycle state of an authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Active,
    Revoked,
}

/// A directed grant from a record's owner to a grantee.
///
/// Never deleted: revocation flips `status` and fills `revoked_at`; a
/// re-grant after revoke inserts a fresh row so history stays queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub record_id: RecordId,
    pub grantee_id: String,
    /// Grant time (Unix seconds), from the ledger event.
    pub granted_at: u64,
    pub status: AuthStatus,
    /// Revocation time, present iff `status` is `Revoked`.
    pub revoked_at: Option<u64>,
    /// Transaction that recorded the grant.
    pub grant_tx_ref: TxRef,
    /// Transaction that recorded the revoke, if any.
    pub revoke_tx_ref: Option<TxRef>,
}

/// Kind of accepted mutation an audit event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditKind {
    Upload,
    Grant,
    Revoke,
    Access,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::Upload => "upload",
            AuditKind::Grant => "grant",
            AuditKind::Revoke => "revoke",
            AuditKind::Access => "access",
        }
    }
}

impl FromStr for AuditKind {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(AuditKind::Upload),
            "grant" => Ok(AuditKind::Grant),
            "revoke" => Ok(AuditKind::Revoke),
            "access" => Ok(AuditKind::Access),
            other => Err(ParseTagError {
                what: "audit kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable fact describing one accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Append-order id assigned by the audit log.
    pub event_id: u64,
    pub kind: AuditKind,
    pub record_id: RecordId,
    /// Who performed the mutation (owner, grantee, or accessor).
    pub actor_id: String,
    /// Event time (Unix seconds).
    pub timestamp: u64,
    /// Chain the originating transaction lives on.
    pub origin_chain: ChainId,
    /// Originating ledger transaction. `None` for `Access` events, which
    /// are engine-local and have no on-chain anchor.
    pub ledger_tx_ref: Option<TxRef>,
    /// Block height of the originating transaction; 0 for `Access`.
    pub block_height: u64,
}

/// Receipt returned by an asynchronous grant/revoke submission.
///
/// The submission does not mutate index state; the caller observes the
/// effect later, once the confirmed ledger event flows back through the
/// ingestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub chain: ChainId,
    /// Transaction reference assigned by the origin ledger.
    pub tx_ref: TxRef,
    pub record_id: RecordId,
    pub grantee_id: String,
    /// Submission time (Unix seconds).
    pub submitted_at: u64,
}
