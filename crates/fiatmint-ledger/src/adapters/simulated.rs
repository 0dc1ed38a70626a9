use alloy::primitives::{keccak256, Address, TxHash, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::DecimalsCache;
use crate::error::ChainError;
use crate::submitter::SubmissionQueue;
use crate::traits::{LedgerClient, SignedSubmitter};
use crate::types::{ContractCall, PendingTx, Receipt};

/// Which step of the flow a one-shot failure is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    MintSubmit,
    MintConfirm,
    ReleaseSubmit,
    ReleaseConfirm,
}

#[derive(Debug, Clone)]
struct SimTx {
    call: ContractCall,
    applied: bool,
    block: u64,
}

/// In-process escrow token chain.
struct SimulatedChain {
    account_nonce: AtomicU64,
    block_height: AtomicU64,
    txs: DashMap<TxHash, SimTx>,
    escrow: DashMap<Address, U256>,
    balances: DashMap<Address, U256>,
    failures: Mutex<Vec<(FailurePoint, ChainError)>>,
    submitted: AtomicUsize,
}

impl SimulatedChain {
    fn take_failure(&self, point: FailurePoint) -> Option<ChainError> {
        let mut failures = self.failures.lock().ok()?;
        let idx = failures.iter().position(|(p, _)| *p == point)?;
        Some(failures.remove(idx).1)
    }

    /// Apply a transaction's effect exactly once.
    fn apply(&self, hash: &TxHash) -> Result<Receipt, ChainError> {
        let mut tx = self
            .txs
            .get_mut(hash)
            .ok_or_else(|| ChainError::Timeout {
                tx_hash: *hash,
                polls: 1,
            })?;

        if !tx.applied {
            match tx.call {
                ContractCall::MintToEscrow { recipient, amount } => {
                    *self.escrow.entry(recipient).or_insert(U256::ZERO) += amount;
                }
                ContractCall::Release { recipient } => {
                    let held = self
                        .escrow
                        .remove(&recipient)
                        .map(|(_, v)| v)
                        .unwrap_or(U256::ZERO);
                    if held.is_zero() {
                        return Err(ChainError::Reverted(format!(
                            "nothing in escrow for {}",
                            recipient
                        )));
                    }
                    *self.balances.entry(recipient).or_insert(U256::ZERO) += held;
                }
            }
            tx.applied = true;
            tx.block = self.block_height.fetch_add(1, Ordering::SeqCst) + 1;
        }

        Ok(Receipt {
            tx_hash: *hash,
            block_number: tx.block,
        })
    }
}

#[async_trait]
impl SignedSubmitter for SimulatedChain {
    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        Ok(self.account_nonce.load(Ordering::SeqCst))
    }

    async fn submit(&self, call: ContractCall, nonce: u64) -> Result<PendingTx, ChainError> {
        let point = match call {
            ContractCall::MintToEscrow { .. } => FailurePoint::MintSubmit,
            ContractCall::Release { .. } => FailurePoint::ReleaseSubmit,
        };
        if let Some(err) = self.take_failure(point) {
            return Err(err);
        }

        let expected = self.account_nonce.load(Ordering::SeqCst);
        if nonce != expected {
            return Err(ChainError::RpcUnavailable(format!(
                "nonce mismatch: got {}, expected {}",
                nonce, expected
            )));
        }

        if let ContractCall::Release { recipient } = call {
            // Estimation fails when nothing is escrowed yet.
            let held = self.escrow.get(&recipient).map(|v| *v).unwrap_or(U256::ZERO);
            if held.is_zero() {
                return Err(ChainError::Reverted(format!(
                    "execution reverted: nothing in escrow for {}",
                    recipient
                )));
            }
        }

        self.account_nonce.fetch_add(1, Ordering::SeqCst);
        self.submitted.fetch_add(1, Ordering::SeqCst);
        let hash = keccak256(format!("sim:{}:{}", nonce, call.name()));
        self.txs.insert(
            hash,
            SimTx {
                call,
                applied: false,
                block: 0,
            },
        );
        Ok(PendingTx::new(hash, nonce))
    }
}

/// Ledger client backed by an in-process simulated escrow token.
///
/// Effects apply when a transaction is confirmed. Failures can be injected
/// one-shot per step, and a confirmation delay makes in-flight windows
/// observable. Used by tests and for local runs without a chain.
pub struct SimulatedLedger {
    chain: Arc<SimulatedChain>,
    queue: SubmissionQueue,
    decimals: u8,
    decimals_cache: DecimalsCache,
    confirm_delay: Duration,
    signer: Address,
    decimals_calls: AtomicUsize,
    mint_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl SimulatedLedger {
    /// Create a simulated ledger. Must be called from within a tokio runtime.
    pub fn new(decimals: u8) -> Self {
        let chain = Arc::new(SimulatedChain {
            account_nonce: AtomicU64::new(0),
            block_height: AtomicU64::new(0),
            txs: DashMap::new(),
            escrow: DashMap::new(),
            balances: DashMap::new(),
            failures: Mutex::new(Vec::new()),
            submitted: AtomicUsize::new(0),
        });
        let queue = SubmissionQueue::spawn(chain.clone(), 64);
        tracing::info!(decimals, "simulated ledger started");
        Self {
            chain,
            queue,
            decimals,
            decimals_cache: DecimalsCache::new(),
            confirm_delay: Duration::ZERO,
            signer: Address::repeat_byte(0x5a),
            decimals_calls: AtomicUsize::new(0),
            mint_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    /// Delay every confirmation by `delay`.
    pub fn with_confirm_delay(mut self, delay: Duration) -> Self {
        self.confirm_delay = delay;
        self
    }

    /// Fail the next operation at `point` with `error`.
    pub fn inject_failure(&self, point: FailurePoint, error: ChainError) {
        if let Ok(mut failures) = self.chain.failures.lock() {
            failures.push((point, error));
        }
    }

    /// Released token balance of `recipient`.
    pub fn balance_of(&self, recipient: Address) -> U256 {
        self.chain
            .balances
            .get(&recipient)
            .map(|v| *v)
            .unwrap_or(U256::ZERO)
    }

    /// Tokens held in escrow for `recipient`.
    pub fn escrowed(&self, recipient: Address) -> U256 {
        self.chain
            .escrow
            .get(&recipient)
            .map(|v| *v)
            .unwrap_or(U256::ZERO)
    }

    pub fn mint_calls(&self) -> usize {
        self.mint_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Decimals reads that reached the token, after caching.
    pub fn decimals_calls(&self) -> usize {
        self.decimals_calls.load(Ordering::SeqCst)
    }

    /// Number of transactions accepted by the simulated chain.
    pub fn submitted_txs(&self) -> usize {
        self.chain.submitted.load(Ordering::SeqCst)
    }

    /// Total chain calls of any kind made through this client.
    pub fn chain_calls(&self) -> usize {
        self.decimals_calls() + self.mint_calls() + self.release_calls()
    }
}

#[async_trait]
impl LedgerClient for SimulatedLedger {
    async fn decimals(&self) -> Result<u8, ChainError> {
        self.decimals_cache
            .get_or_fetch(|| async {
                self.decimals_calls.fetch_add(1, Ordering::SeqCst);
                Ok(self.decimals)
            })
            .await
    }

    async fn mint_to_escrow(
        &self,
        recipient: Address,
        raw_amount: U256,
    ) -> Result<PendingTx, ChainError> {
        self.mint_calls.fetch_add(1, Ordering::SeqCst);
        self.queue
            .submit(ContractCall::MintToEscrow {
                recipient,
                amount: raw_amount,
            })
            .await
    }

    async fn release_tokens(&self, recipient: Address) -> Result<PendingTx, ChainError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.queue.submit(ContractCall::Release { recipient }).await
    }

    async fn await_confirmation(&self, tx: &PendingTx) -> Result<Receipt, ChainError> {
        if !self.confirm_delay.is_zero() {
            tokio::time::sleep(self.confirm_delay).await;
        }

        let point = match self.chain.txs.get(&tx.hash).map(|t| t.call) {
            Some(ContractCall::MintToEscrow { .. }) => FailurePoint::MintConfirm,
            Some(ContractCall::Release { .. }) => FailurePoint::ReleaseConfirm,
            None => {
                return Err(ChainError::Timeout {
                    tx_hash: tx.hash,
                    polls: 1,
                })
            }
        };
        if let Some(err) = self.chain.take_failure(point) {
            return Err(err);
        }

        self.chain.apply(&tx.hash)
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    fn ledger_id(&self) -> &str {
        "simulated"
    }
}
