use fiatmint_core::{CoreError, PaymentReference, RecipientAddress};
use fiatmint_ledger::ChainError;

/// Ledger record store and payment registry errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict on {reference}: expected {expected}, found {found}")]
    Conflict {
        reference: PaymentReference,
        expected: u64,
        found: u64,
    },

    #[error("no entry for payment reference {0}")]
    NotFound(PaymentReference),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Codec(String),
}

/// Payment verifier errors. A rejection is not an error; see `Verification`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum VerifierError {
    #[error("payment registry unavailable: {0}")]
    Registry(#[from] StoreError),
}

/// Everything `MintOrchestrator` can fail with.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Validation(#[from] CoreError),

    #[error("mint already in progress for payment reference {0}")]
    InProgress(PaymentReference),

    #[error("escrow for {recipient} is held by payment reference {holder}; {reference} stays verified")]
    RecipientBusy {
        reference: PaymentReference,
        recipient: RecipientAddress,
        holder: PaymentReference,
    },

    #[error("payment not verified: {reason}")]
    PaymentNotVerified { reason: String },

    #[error("blockchain transaction failed: {0}")]
    ChainFailure(ChainError),

    #[error("tokens minted to escrow in {escrow_tx} but release failed: {cause}")]
    ReleaseFailed { escrow_tx: String, cause: ChainError },

    #[error("payment reference {reference} needs manual review: {detail}")]
    NeedsManualReview {
        reference: PaymentReference,
        detail: String,
    },

    #[error("no ledger record for payment reference {0}")]
    NotFound(PaymentReference),

    #[error("mint for this payment reference previously failed: {reason}")]
    PreviouslyFailed { reason: String },

    #[error("payment reference {0} was already used with a different amount or recipient")]
    ReferenceConflict(PaymentReference),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error("payment verifier error: {0}")]
    Verifier(#[from] VerifierError),
}

impl OrchestrationError {
    /// Short machine-readable name, used in logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InProgress(_) => "in_progress",
            Self::RecipientBusy { .. } => "recipient_busy",
            Self::PaymentNotVerified { .. } => "payment_not_verified",
            Self::ChainFailure(_) => "chain_failure",
            Self::ReleaseFailed { .. } => "release_failed",
            Self::NeedsManualReview { .. } => "needs_manual_review",
            Self::NotFound(_) => "not_found",
            Self::PreviouslyFailed { .. } => "previously_failed",
            Self::ReferenceConflict(_) => "reference_conflict",
            Self::Internal(_) => "internal",
            Self::Store(_) => "store",
            Self::Verifier(_) => "verifier",
        }
    }
}
