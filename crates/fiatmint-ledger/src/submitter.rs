//! Per-identity submission queue.
//!
//! Nonces are scoped to the signing identity, so every signed submission is
//! funnelled through a single task that owns the nonce counter. Callers send
//! a request over an mpsc channel and await the result on a oneshot reply.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::ChainError;
use crate::traits::SignedSubmitter;
use crate::types::{ContractCall, PendingTx};

struct Submission {
    call: ContractCall,
    reply: oneshot::Sender<Result<PendingTx, ChainError>>,
}

/// Handle to the submission task. Cheap to clone.
#[derive(Clone)]
pub struct SubmissionQueue {
    tx: mpsc::Sender<Submission>,
}

impl SubmissionQueue {
    /// Spawn the queue task on the current tokio runtime.
    pub fn spawn<S: SignedSubmitter>(submitter: Arc<S>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_queue(submitter, rx));
        Self { tx }
    }

    /// Queue a call and wait for it to be signed and broadcast.
    pub async fn submit(&self, call: ContractCall) -> Result<PendingTx, ChainError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Submission {
                call,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ChainError::RpcUnavailable("submission queue not running".into()))?;

        reply_rx.await.map_err(|_| {
            ChainError::RpcUnavailable("submission queue dropped the reply channel".into())
        })?
    }
}

async fn run_queue<S: SignedSubmitter>(submitter: Arc<S>, mut rx: mpsc::Receiver<Submission>) {
    let mut next_nonce: Option<u64> = None;

    while let Some(Submission { call, reply }) = rx.recv().await {
        // The owning request was abandoned before its turn came.
        if reply.is_closed() {
            tracing::debug!(call = call.name(), "skipping abandoned submission");
            continue;
        }

        let nonce = match next_nonce {
            Some(n) => n,
            None => match submitter.pending_nonce().await {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch pending nonce");
                    let _ = reply.send(Err(e));
                    continue;
                }
            },
        };

        let result = submitter.submit(call, nonce).await;
        match &result {
            Ok(tx) => {
                next_nonce = Some(nonce + 1);
                tracing::info!(
                    call = call.name(),
                    recipient = %call.recipient(),
                    nonce,
                    tx_hash = %tx.hash,
                    "transaction submitted"
                );
            }
            Err(e) => {
                // The node may or may not have consumed the nonce; resync.
                next_nonce = None;
                tracing::warn!(call = call.name(), nonce, error = %e, "submission failed");
            }
        }

        if reply.send(result).is_err() {
            tracing::warn!(call = call.name(), nonce, "caller dropped before submission result");
        }
    }

    tracing::info!("submission queue closed");
}
