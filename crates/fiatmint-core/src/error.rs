use crate::record_state::MintState;

/// Core errors: input validation and lifecycle violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: MintState, to: MintState },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid recipient address: {0}")]
    InvalidAddress(String),

    #[error("invalid payment reference: {0}")]
    InvalidReference(String),

    #[error("amount overflows token units at {decimals} decimals")]
    AmountOverflow { decimals: u8 },

    #[error("validation error: {0}")]
    ValidationError(String),
}
