use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ChainError;

/// The escrow token contract calls the orchestrator makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractCall {
    /// `mintToEscrow(recipient, amount)`.
    MintToEscrow { recipient: Address, amount: U256 },
    /// `releaseTokens(recipient)`.
    Release { recipient: Address },
}

impl ContractCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MintToEscrow { .. } => "mintToEscrow",
            Self::Release { .. } => "releaseTokens",
        }
    }

    pub fn recipient(&self) -> Address {
        match self {
            Self::MintToEscrow { recipient, .. } | Self::Release { recipient } => *recipient,
        }
    }
}

/// A submitted, not yet confirmed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub hash: TxHash,
    /// Nonce assigned by the submission queue; unknown for rebuilt handles.
    pub nonce: Option<u64>,
}

impl PendingTx {
    pub fn new(hash: TxHash, nonce: u64) -> Self {
        Self {
            hash,
            nonce: Some(nonce),
        }
    }

    /// Rebuild a handle from a hash persisted in a ledger record.
    pub fn from_hash_str(hash: &str) -> Result<Self, ChainError> {
        let hash = hash
            .parse::<TxHash>()
            .map_err(|e| ChainError::Configuration(format!("bad tx hash {}: {}", hash, e)))?;
        Ok(Self { hash, nonce: None })
    }
}

/// Proof that a transaction was included and confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// How long and how often to wait for confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Blocks required, counting the inclusion block.
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: 1,
            poll_interval: Duration::from_secs(2),
            max_polls: 90,
        }
    }
}

impl ConfirmationPolicy {
    /// Whether `head` is deep enough above the inclusion block.
    pub fn is_confirmed(&self, inclusion_block: u64, head: u64) -> bool {
        let depth = head.saturating_sub(inclusion_block) + 1;
        head >= inclusion_block && depth >= self.confirmations.max(1)
    }
}
