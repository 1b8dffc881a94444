//! The caller-facing engine.
//!
//! Wires the persistent index, per-chain ingestion pipelines, the query
//! engine, and the submission gateways into one service. Reads are served
//! from the index immediately; grant/revoke requests are submitted to the
//! record's origin ledger and become visible only once the confirmed
//! event flows back through ingestion. Cross-chain transfers anchor a
//! record's metadata on the other ledger and are tracked per attempt.

use std::collections::HashMap;
use std::sync::Arc;

use medcross_adapters::{
    submit_with_timeout, transfer_with_timeout, SubmissionGateway, SubmissionKind,
    SubmissionRequest,
};
use medcross_core::{
    unix_now, ChainId, RecordId, SubmissionReceipt, TransferRecord, TransferStatus,
};
use medcross_index::{NewTransfer, PersistentRecordIndex, RecordIndex, Statistics, TransferLog};
use medcross_query::{QueryEngine, RecordDetail, SearchRequest, SearchResults};
use medcross_reconciler::{spawn_pipeline, PipelineHandle};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};

/// The MedCross engine: one index, one pipeline per chain, one query
/// surface.
pub struct MedCrossEngine {
    index: Arc<PersistentRecordIndex>,
    query: QueryEngine<PersistentRecordIndex>,
    gateways: HashMap<ChainId, Arc<dyn SubmissionGateway>>,
    pipelines: HashMap<ChainId, PipelineHandle>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    submission_timeout_ms: u64,
}

impl MedCrossEngine {
    /// Start the engine: open the index, resume from checkpoints, and
    /// spawn one ingestion pipeline per supported chain.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: &EngineConfig,
        gateways: Vec<Arc<dyn SubmissionGateway>>,
    ) -> EngineResult<Self> {
        let index = Arc::new(PersistentRecordIndex::open_with_cache(
            &config.storage.db_path,
            config.storage.cache_entries,
        )?);
        index.initialize()?;

        let mut pipelines = HashMap::new();
        let mut tasks = Vec::new();
        for chain in ChainId::ALL {
            let (handle, task) = spawn_pipeline(
                chain,
                index.clone() as Arc<dyn RecordIndex>,
                config.ingestion.max_retry_rounds,
                config.ingestion.buffer_size,
            );
            pipelines.insert(chain, handle);
            tasks.push(task);
        }

        let gateways = gateways.into_iter().map(|g| (g.chain(), g)).collect();

        Ok(Self {
            query: QueryEngine::new(index.clone()),
            index,
            gateways,
            pipelines,
            tasks,
            submission_timeout_ms: config.submission.timeout_ms,
        })
    }

    /// Ingestion handle for a chain. Adapters push normalized events
    /// through this.
    pub fn pipeline(&self, chain: ChainId) -> Option<&PipelineHandle> {
        self.pipelines.get(&chain)
    }

    /// Shared index handle, for read paths that bypass the facade.
    pub fn index(&self) -> &Arc<PersistentRecordIndex> {
        &self.index
    }

    /// Search records visible to the requester.
    pub fn search(&self, request: &SearchRequest) -> EngineResult<SearchResults> {
        Ok(self.query.search(request)?)
    }

    /// Fetch one record with authorization history and audit trail. The
    /// read itself is audited.
    pub fn get_detail(&self, requester_id: &str, record_id: RecordId) -> EngineResult<RecordDetail> {
        Ok(self.query.get_detail(requester_id, record_id)?)
    }

    /// Aggregate statistics over the whole index.
    pub fn get_statistics(&self) -> EngineResult<Statistics> {
        Ok(self.query.statistics()?)
    }

    /// Request a grant of `record_id` to `grantee_id`, submitted to the
    /// record's origin ledger.
    ///
    /// The receipt only acknowledges submission; the authorization becomes
    /// active when the confirmed event is ingested.
    pub async fn request_grant(
        &self,
        owner_id: &str,
        record_id: RecordId,
        grantee_id: &str,
    ) -> EngineResult<SubmissionReceipt> {
        if grantee_id.is_empty() {
            return Err(EngineError::InvalidRequest("grantee id is empty".into()));
        }
        if grantee_id == owner_id {
            return Err(EngineError::InvalidRequest(
                "cannot grant access to the record owner".into(),
            ));
        }

        let record = self.owned_record(owner_id, record_id)?;
        self.submit(
            record.origin_chain,
            SubmissionRequest {
                kind: SubmissionKind::Grant,
                record_id,
                owner_id: owner_id.to_string(),
                grantee_id: grantee_id.to_string(),
            },
        )
        .await
    }

    /// Request revocation of an active grant, submitted to the record's
    /// origin ledger.
    pub async fn request_revoke(
        &self,
        owner_id: &str,
        record_id: RecordId,
        grantee_id: &str,
    ) -> EngineResult<SubmissionReceipt> {
        if grantee_id.is_empty() {
            return Err(EngineError::InvalidRequest("grantee id is empty".into()));
        }

        let record = self.owned_record(owner_id, record_id)?;
        // Fail fast rather than anchor a transaction that ingestion would
        // reject as an invalid transition.
        if !self.index.auth_state(record_id, grantee_id)?.is_active() {
            return Err(EngineError::InvalidRequest(format!(
                "no active authorization for grantee {grantee_id}"
            )));
        }

        self.submit(
            record.origin_chain,
            SubmissionRequest {
                kind: SubmissionKind::Revoke,
                record_id,
                owner_id: owner_id.to_string(),
                grantee_id: grantee_id.to_string(),
            },
        )
        .await
    }

    /// Anchor a copy of `record_id`'s metadata on `target_chain`.
    ///
    /// The attempt is recorded as a pending transfer before submission and
    /// resolved to completed or failed afterwards, so the history shows
    /// every attempt regardless of outcome.
    pub async fn request_transfer(
        &self,
        owner_id: &str,
        record_id: RecordId,
        target_chain: ChainId,
    ) -> EngineResult<TransferRecord> {
        let record = self.owned_record(owner_id, record_id)?;
        if target_chain == record.origin_chain {
            return Err(EngineError::InvalidRequest(format!(
                "record is already anchored on {target_chain}"
            )));
        }
        let gateway = self
            .gateways
            .get(&target_chain)
            .ok_or(EngineError::GatewayUnavailable(target_chain))?;

        let requested_at = unix_now();
        let transfer_id = self.index.open_transfer(&NewTransfer {
            record_id,
            source_chain: record.origin_chain,
            target_chain,
            requested_at,
        })?;

        match transfer_with_timeout(gateway.as_ref(), &record, self.submission_timeout_ms).await {
            Ok(target_tx_ref) => {
                let resolved_at = unix_now();
                self.index
                    .complete_transfer(transfer_id, &target_tx_ref, resolved_at)?;
                tracing::info!(
                    %record_id,
                    source_chain = %record.origin_chain,
                    %target_chain,
                    %target_tx_ref,
                    "cross-chain transfer anchored"
                );
                Ok(TransferRecord {
                    transfer_id,
                    record_id,
                    source_chain: record.origin_chain,
                    target_chain,
                    requested_at,
                    resolved_at: Some(resolved_at),
                    status: TransferStatus::Completed,
                    target_tx_ref: Some(target_tx_ref),
                    error: None,
                })
            }
            Err(err) => {
                self.index
                    .fail_transfer(transfer_id, &err.to_string(), unix_now())?;
                tracing::warn!(
                    %record_id,
                    %target_chain,
                    error = %err,
                    "cross-chain transfer failed"
                );
                Err(err.into())
            }
        }
    }

    /// Transfer history for a record, newest first. Owner-only, with the
    /// same uniform denial as the other ownership-gated operations.
    pub fn transfer_history(
        &self,
        owner_id: &str,
        record_id: RecordId,
    ) -> EngineResult<Vec<TransferRecord>> {
        self.owned_record(owner_id, record_id)?;
        Ok(self.index.transfer_history(record_id)?)
    }

    /// Flush all pipelines and stop their tasks.
    pub async fn shutdown(self) {
        for handle in self.pipelines.values() {
            handle.shutdown().await;
        }
        for task in self.tasks {
            let _ = task.await;
        }
        tracing::info!("engine stopped");
    }

    /// Ownership pre-check. Missing record and foreign record collapse
    /// into the same error.
    fn owned_record(
        &self,
        owner_id: &str,
        record_id: RecordId,
    ) -> EngineResult<medcross_core::Record> {
        let record = self
            .index
            .get_record(record_id)?
            .ok_or(EngineError::NotFoundOrUnauthorized)?;
        if record.owner_id != owner_id {
            return Err(EngineError::NotFoundOrUnauthorized);
        }
        Ok(record)
    }

    async fn submit(
        &self,
        chain: ChainId,
        request: SubmissionRequest,
    ) -> EngineResult<SubmissionReceipt> {
        let gateway = self
            .gateways
            .get(&chain)
            .ok_or(EngineError::GatewayUnavailable(chain))?;

        let tx_ref = submit_with_timeout(gateway.as_ref(), &request, self.submission_timeout_ms)
            .await?;
        tracing::info!(
            %chain,
            record_id = %request.record_id,
            grantee_id = request.grantee_id,
            kind = ?request.kind,
            %tx_ref,
            "authorization request submitted"
        );

        Ok(SubmissionReceipt {
            chain,
            tx_ref,
            record_id: request.record_id,
            grantee_id: request.grantee_id,
            submitted_at: unix_now(),
        })
    }
}
