//! Adapter for the permissioned chain (Fabric family).
//!
//! Raw input is a chaincode event: the endorsed transaction's id, its
//! block position, the submitting identity, and the JSON payload the
//! chaincode emitted. Event names match the account-chain contract so the
//! two ledgers expose one logical operation set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use alloy_primitives::B256;
use medcross_core::{ChainId, IngestEvent, IngestPayload, RecordId, TxRef};

use crate::error::{AdapterError, AdapterResult};
use crate::fields::{get_str, get_tags, get_u64, parse_tag, FieldError};
use crate::LedgerAdapter;

/// A chaincode event from the permissioned chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricChaincodeEvent {
    /// Transaction id assigned by the ordering service (UUID form).
    pub tx_id: String,
    /// Block the transaction was committed in.
    pub block_number: u64,
    /// Commit timestamp (Unix seconds).
    pub timestamp: u64,
    /// MSP of the submitting organization.
    pub creator_msp: String,
    /// Enrollment id of the submitting identity.
    pub creator_id: String,
    /// Event name set by the chaincode.
    pub event_name: String,
    /// JSON payload emitted alongside the event.
    pub payload: Vec<u8>,
}

/// Stateless normalizer for permissioned-chain events.
#[derive(Debug, Clone, Copy, Default)]
pub struct FabricAdapter;

impl FabricAdapter {
    pub fn new() -> Self {
        FabricAdapter
    }

    fn malformed(raw: &FabricChaincodeEvent, reason: impl Into<String>) -> AdapterError {
        let reason = reason.into();
        tracing::warn!(
            tx_id = %raw.tx_id,
            event = %raw.event_name,
            block = raw.block_number,
            %reason,
            "dropping malformed permissioned-chain event"
        );
        AdapterError::MalformedEvent {
            chain: ChainId::Fabric,
            tx_ref: raw.tx_id.clone(),
            reason,
        }
    }

    fn field_err(raw: &FabricChaincodeEvent, e: FieldError) -> AdapterError {
        Self::malformed(raw, e.reason())
    }

    fn decode_payload(raw: &FabricChaincodeEvent) -> AdapterResult<Value> {
        serde_json::from_slice(&raw.payload)
            .map_err(|e| Self::malformed(raw, format!("payload is not valid JSON: {e}")))
    }

    fn upload_payload(args: &Value) -> Result<IngestPayload, FieldError> {
        Ok(IngestPayload::Upload {
            file_name: get_str(args, "fileName")?.to_string(),
            data_type: parse_tag(get_str(args, "dataType")?, "dataType")?,
            size_bytes: get_u64(args, "sizeBytes")?,
            description: get_str(args, "description")
                .map(str::to_string)
                .unwrap_or_default(),
            tags: get_tags(args, "tags")?,
            content_hash: get_str(args, "contentHash")?.to_string(),
        })
    }

    fn referenced_record_id(raw: &FabricChaincodeEvent, args: &Value) -> AdapterResult<RecordId> {
        let hex = get_str(args, "recordId").map_err(|e| Self::field_err(raw, e))?;
        let id: B256 = hex
            .parse()
            .map_err(|_| Self::malformed(raw, format!("field 'recordId': not a 32-byte hex id ({hex})")))?;
        Ok(RecordId(id))
    }
}

impl LedgerAdapter for FabricAdapter {
    type Raw = FabricChaincodeEvent;

    fn chain(&self) -> ChainId {
        ChainId::Fabric
    }

    fn normalize(&self, raw: &Self::Raw) -> AdapterResult<IngestEvent> {
        if raw.tx_id.is_empty() {
            return Err(Self::malformed(raw, "empty transaction id"));
        }
        let args = Self::decode_payload(raw)?;
        let tx_ref = TxRef::new(raw.tx_id.clone());

        let (record_id, payload) = match raw.event_name.as_str() {
            "DataUploaded" => {
                let payload = Self::upload_payload(&args).map_err(|e| Self::field_err(raw, e))?;
                (RecordId::derive(ChainId::Fabric, &tx_ref), payload)
            }
            "AccessGranted" => {
                let grantee_id = get_str(&args, "grantee")
                    .map_err(|e| Self::field_err(raw, e))?
                    .to_string();
                (Self::referenced_record_id(raw, &args)?, IngestPayload::Grant { grantee_id })
            }
            "AccessRevoked" => {
                let grantee_id = get_str(&args, "grantee")
                    .map_err(|e| Self::field_err(raw, e))?
                    .to_string();
                (Self::referenced_record_id(raw, &args)?, IngestPayload::Revoke { grantee_id })
            }
            other => return Err(Self::malformed(raw, format!("unrecognized event '{other}'"))),
        };

        Ok(IngestEvent {
            chain: ChainId::Fabric,
            tx_ref,
            block_height: raw.block_number,
            timestamp: raw.timestamp,
            actor_id: raw.creator_id.clone(),
            record_id,
            payload,
        })
    }
}
