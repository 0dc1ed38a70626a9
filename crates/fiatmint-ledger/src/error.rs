use alloy::primitives::TxHash;

/// Chain-level failures surfaced to the orchestrator.
///
/// None of these are retried by the ledger client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    #[error("insufficient funds to execute transaction: {0}")]
    InsufficientFunds(String),

    #[error("transaction {tx_hash} not confirmed after {polls} polls")]
    Timeout { tx_hash: TxHash, polls: u32 },

    #[error("transaction reverted: {0}")]
    Reverted(String),

    #[error("rpc unavailable: {0}")]
    RpcUnavailable(String),

    #[error("ledger client misconfigured: {0}")]
    Configuration(String),
}

impl ChainError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsufficientFunds(_) => "insufficient_funds",
            Self::Timeout { .. } => "timeout",
            Self::Reverted(_) => "reverted",
            Self::RpcUnavailable(_) => "rpc_unavailable",
            Self::Configuration(_) => "configuration",
        }
    }

    /// Classify an error message returned by a node or the contract binding.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("insufficient funds") {
            Self::InsufficientFunds(message)
        } else if lower.contains("revert") {
            Self::Reverted(message)
        } else {
            Self::RpcUnavailable(message)
        }
    }
}
