//! Adapter for the account-based chain (Ethereum family).
//!
//! Raw input is a contract log event whose arguments have already been
//! ABI-decoded into named JSON values by the chain client. Recognized
//! events mirror the record-sharing contract surface: `DataUploaded`,
//! `AccessGranted`, `AccessRevoked`.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use medcross_core::{ChainId, IngestEvent, IngestPayload, RecordId, TxRef};

use crate::error::{AdapterError, AdapterResult};
use crate::fields::{get_str, get_tags, get_u64, parse_tag, FieldError};
use crate::LedgerAdapter;

/// A decoded contract log event from the account chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthereumLogEvent {
    /// Hash of the transaction that emitted the log.
    pub tx_hash: B256,
    /// Block containing the transaction.
    pub block_number: u64,
    /// Block timestamp (Unix seconds).
    pub block_timestamp: u64,
    /// Externally-owned account that signed the transaction.
    pub sender: Address,
    /// Event name from the contract ABI.
    pub event: String,
    /// ABI-decoded event arguments, keyed by parameter name.
    pub args: Value,
}

/// Stateless normalizer for account-chain events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EthereumAdapter;

impl EthereumAdapter {
    pub fn new() -> Self {
        EthereumAdapter
    }

    fn malformed(raw: &EthereumLogEvent, reason: impl Into<String>) -> AdapterError {
        let reason = reason.into();
        tracing::warn!(
            tx_hash = %raw.tx_hash,
            event = %raw.event,
            block = raw.block_number,
            %reason,
            "dropping malformed account-chain event"
        );
        AdapterError::MalformedEvent {
            chain: ChainId::Ethereum,
            tx_ref: format!("{:#x}", raw.tx_hash),
            reason,
        }
    }

    fn field_err(raw: &EthereumLogEvent, e: FieldError) -> AdapterError {
        Self::malformed(raw, e.reason())
    }

    fn upload_payload(raw: &EthereumLogEvent) -> Result<IngestPayload, FieldError> {
        Ok(IngestPayload::Upload {
            file_name: get_str(&raw.args, "fileName")?.to_string(),
            data_type: parse_tag(get_str(&raw.args, "dataType")?, "dataType")?,
            size_bytes: get_u64(&raw.args, "sizeBytes")?,
            description: get_str(&raw.args, "description")
                .map(str::to_string)
                .unwrap_or_default(),
            tags: get_tags(&raw.args, "tags")?,
            content_hash: get_str(&raw.args, "contentHash")?.to_string(),
        })
    }

    fn referenced_record_id(raw: &EthereumLogEvent) -> AdapterResult<RecordId> {
        let hex = get_str(&raw.args, "recordId").map_err(|e| Self::field_err(raw, e))?;
        let id: B256 = hex
            .parse()
            .map_err(|_| Self::malformed(raw, format!("field 'recordId': not a 32-byte hex id ({hex})")))?;
        Ok(RecordId(id))
    }
}

impl LedgerAdapter for EthereumAdapter {
    type Raw = EthereumLogEvent;

    fn chain(&self) -> ChainId {
        ChainId::Ethereum
    }

    fn normalize(&self, raw: &Self::Raw) -> AdapterResult<IngestEvent> {
        let tx_ref = TxRef::new(format!("{:#x}", raw.tx_hash));
        let actor_id = format!("{:#x}", raw.sender);

        let (record_id, payload) = match raw.event.as_str() {
            "DataUploaded" => {
                let payload = Self::upload_payload(raw).map_err(|e| Self::field_err(raw, e))?;
                (RecordId::derive(ChainId::Ethereum, &tx_ref), payload)
            }
            "AccessGranted" => {
                let grantee_id = get_str(&raw.args, "grantee")
                    .map_err(|e| Self::field_err(raw, e))?
                    .to_string();
                (Self::referenced_record_id(raw)?, IngestPayload::Grant { grantee_id })
            }
            "AccessRevoked" => {
                let grantee_id = get_str(&raw.args, "grantee")
                    .map_err(|e| Self::field_err(raw, e))?
                    .to_string();
                (Self::referenced_record_id(raw)?, IngestPayload::Revoke { grantee_id })
            }
            other => return Err(Self::malformed(raw, format!("unrecognized event '{other}'"))),
        };

        Ok(IngestEvent {
            chain: ChainId::Ethereum,
            tx_ref,
            block_height: raw.block_number,
            timestamp: raw.block_timestamp,
            actor_id,
            record_id,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upload_event() -> EthereumLogEvent {
        EthereumLogEvent {
            tx_hash: B256::repeat_byte(0x11),
            block_number: 100,
            block_timestamp: 1_700_000_000,
            sender: Address::repeat_byte(0xaa),
            event: "DataUploaded".to_string(),
            args: json!({
                "fileName": "scan.dcm",
                "dataType": "imaging",
                "sizeBytes": 1_048_576,
                "description": "chest CT",
                "tags": ["ct", "chest"],
                "contentHash": "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG",
            }),
        }
    }

    #[test]
    fn normalizes_upload() {
        let event = EthereumAdapter::new().normalize(&upload_event()).unwrap();
        assert_eq!(event.chain, ChainId::Ethereum);
        assert_eq!(event.block_height, 100);
        assert_eq!(
            event.record_id,
            RecordId::derive(ChainId::Ethereum, &event.tx_ref)
        );
        match event.payload {
            IngestPayload::Upload { ref file_name, size_bytes, .. } => {
                assert_eq!(file_name, "scan.dcm");
                assert_eq!(size_bytes, 1_048_576);
            }
            other => panic!("expected upload payload, got {other:?}"),
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let adapter = EthereumAdapter::new();
        let raw = upload_event();
        assert_eq!(adapter.normalize(&raw).unwrap(), adapter.normalize(&raw).unwrap());
    }

    #[test]
    fn normalizes_grant_with_referenced_record() {
        let record_id = RecordId::derive(ChainId::Ethereum, &TxRef::from("0xfeed"));
        let raw = EthereumLogEvent {
            tx_hash: B256::repeat_byte(0x22),
            block_number: 105,
            block_timestamp: 1_700_000_060,
            sender: Address::repeat_byte(0xaa),
            event: "AccessGranted".to_string(),
            args: json!({
                "recordId": record_id.0.to_string(),
                "grantee": "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb",
            }),
        };
        let event = EthereumAdapter::new().normalize(&raw).unwrap();
        assert_eq!(event.record_id, record_id);
        assert!(matches!(event.payload, IngestPayload::Grant { .. }));
    }

    #[test]
    fn rejects_missing_required_field() {
        let mut raw = upload_event();
        raw.args.as_object_mut().unwrap().remove("contentHash");
        let err = EthereumAdapter::new().normalize(&raw).unwrap_err();
        assert!(err.to_string().contains("contentHash"));
    }

    #[test]
    fn rejects_unknown_data_type() {
        let mut raw = upload_event();
        raw.args["dataType"] = json!("x-ray");
        assert!(EthereumAdapter::new().normalize(&raw).is_err());
    }

    #[test]
    fn rejects_unrecognized_event_name() {
        let mut raw = upload_event();
        raw.event = "OwnershipTransferred".to_string();
        assert!(EthereumAdapter::new().normalize(&raw).is_err());
    }
}
