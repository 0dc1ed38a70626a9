use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::error::ChainError;
use crate::types::{ContractCall, PendingTx, Receipt};

/// Ledger client interface.
///
/// Wraps one blockchain endpoint and one signing identity. Each
/// implementation bridges the orchestrator to a concrete escrow token
/// deployment (EVM JSON-RPC, in-process simulation).
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Token decimal precision. Cached after the first successful query.
    async fn decimals(&self) -> Result<u8, ChainError>;

    /// Submit `mintToEscrow(recipient, raw_amount)`.
    async fn mint_to_escrow(
        &self,
        recipient: Address,
        raw_amount: U256,
    ) -> Result<PendingTx, ChainError>;

    /// Submit `releaseTokens(recipient)`. Only call once the matching mint
    /// has confirmed.
    async fn release_tokens(&self, recipient: Address) -> Result<PendingTx, ChainError>;

    /// Wait until the transaction is included and confirmed, or fail with
    /// `ChainError::Timeout` after a bounded number of polls. Dropping the
    /// returned future cancels the wait.
    async fn await_confirmation(&self, tx: &PendingTx) -> Result<Receipt, ChainError>;

    /// Address of the signing identity.
    fn signer_address(&self) -> Address;

    /// Short identifier of this client (e.g. "evm", "simulated").
    fn ledger_id(&self) -> &str;
}

/// Low-level signed submission used by the submission queue.
///
/// Implementations send one contract call with an explicit nonce; the queue
/// owns nonce assignment.
#[async_trait]
pub trait SignedSubmitter: Send + Sync + 'static {
    /// Next nonce for the signing identity, including pending transactions.
    async fn pending_nonce(&self) -> Result<u64, ChainError>;

    /// Sign and broadcast `call` with `nonce`; returns the transaction hash.
    async fn submit(&self, call: ContractCall, nonce: u64) -> Result<PendingTx, ChainError>;
}
