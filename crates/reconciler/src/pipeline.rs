//! Per-chain ingestion pipeline.
//!
//! Each chain gets its own pipeline task. Adapters push normalized events
//! into the pipeline as they observe them; the pipeline buffers a batch,
//! reorders it by block height, and applies it through the reconciler at
//! flush boundaries. Events at or below the chain checkpoint are skipped,
//! which is what makes restart-and-replay safe.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use medcross_core::{ChainId, IngestEvent};
use medcross_index::RecordIndex;

use crate::error::ReconcileResult;
use crate::reconciler::Reconciler;

/// Messages sent to a pipeline task.
#[derive(Debug)]
pub enum PipelineMessage {
    /// A normalized event observed on this pipeline's chain.
    Event(IngestEvent),
    /// Apply everything buffered so far, in block order. The optional
    /// sender is signalled once the batch (and a pending sweep) is done.
    Flush(Option<oneshot::Sender<()>>),
    /// Flush, then stop.
    Shutdown,
}

/// Handle for feeding events into a pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    chain: ChainId,
    tx: mpsc::Sender<PipelineMessage>,
}

impl PipelineHandle {
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Queue an event. Applies backpressure when the pipeline is behind.
    pub async fn submit(&self, event: IngestEvent) {
        let _ = self.tx.send(PipelineMessage::Event(event)).await;
    }

    /// Request a flush without waiting for it.
    pub async fn flush(&self) {
        let _ = self.tx.send(PipelineMessage::Flush(None)).await;
    }

    /// Flush and wait until the batch has been applied.
    pub async fn flush_and_wait(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .tx
            .send(PipelineMessage::Flush(Some(done_tx)))
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
    }

    /// Signal shutdown; the pipeline flushes once more before stopping.
    pub async fn shutdown(&self) {
        let _ = self.tx.send(PipelineMessage::Shutdown).await;
    }
}

/// Spawn the pipeline task for one chain.
///
/// Returns the handle plus the task's join handle so callers can await
/// orderly termination.
pub fn spawn_pipeline(
    chain: ChainId,
    index: Arc<dyn RecordIndex>,
    max_retry_rounds: u32,
    buffer_size: usize,
) -> (PipelineHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    let task = tokio::spawn(run_pipeline(chain, index, max_retry_rounds, rx));
    (PipelineHandle { chain, tx }, task)
}

async fn run_pipeline(
    chain: ChainId,
    index: Arc<dyn RecordIndex>,
    max_retry_rounds: u32,
    mut rx: mpsc::Receiver<PipelineMessage>,
) {
    let mut checkpoint = match index.checkpoint(chain) {
        Ok(height) => height,
        Err(e) => {
            tracing::error!(%chain, error = %e, "pipeline failed to load checkpoint");
            return;
        }
    };
    tracing::info!(%chain, checkpoint = ?checkpoint, "ingestion pipeline started");

    let mut reconciler = Reconciler::new(index.clone(), max_retry_rounds);
    // Reorder buffer: (block height, arrival sequence) keeps same-height
    // events in arrival order.
    let mut batch: BTreeMap<(u64, u64), IngestEvent> = BTreeMap::new();
    let mut seq: u64 = 0;

    while let Some(message) = rx.recv().await {
        match message {
            PipelineMessage::Event(event) => {
                if event.chain != chain {
                    tracing::warn!(
                        %chain,
                        event_chain = %event.chain,
                        tx_ref = %event.tx_ref,
                        "dropping event observed on the wrong pipeline"
                    );
                    continue;
                }
                batch.insert((event.block_height, seq), event);
                seq += 1;
            }
            PipelineMessage::Flush(done) => {
                if let Err(e) =
                    apply_batch(chain, &index, &mut reconciler, &mut batch, &mut checkpoint)
                {
                    tracing::error!(%chain, error = %e, "pipeline stopping: batch apply failed");
                    return;
                }
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }
            PipelineMessage::Shutdown => {
                if let Err(e) =
                    apply_batch(chain, &index, &mut reconciler, &mut batch, &mut checkpoint)
                {
                    tracing::error!(%chain, error = %e, "final batch apply failed");
                }
                break;
            }
        }
    }

    tracing::info!(%chain, "ingestion pipeline stopped");
}

fn apply_batch(
    chain: ChainId,
    index: &Arc<dyn RecordIndex>,
    reconciler: &mut Reconciler,
    batch: &mut BTreeMap<(u64, u64), IngestEvent>,
    checkpoint: &mut Option<u64>,
) -> ReconcileResult<()> {
    let mut max_height = None;

    for ((height, _), event) in std::mem::take(batch) {
        // Heights at or below the checkpoint were applied before a restart.
        if checkpoint.is_some_and(|cp| height <= cp) {
            tracing::debug!(
                %chain,
                height,
                tx_ref = %event.tx_ref,
                "skipping event at or below checkpoint"
            );
            continue;
        }
        reconciler.process(event)?;
        max_height = Some(max_height.map_or(height, |m: u64| m.max(height)));
    }

    let sweep = reconciler.sweep()?;
    if sweep.still_pending > 0 || !sweep.orphaned.is_empty() {
        tracing::debug!(
            %chain,
            applied = sweep.applied,
            still_pending = sweep.still_pending,
            orphaned = sweep.orphaned.len(),
            "pending sweep after batch"
        );
    }

    if let Some(height) = max_height {
        index.set_checkpoint(chain, height)?;
        *checkpoint = Some(checkpoint.map_or(height, |cp| cp.max(height)));
    }
    Ok(())
}
