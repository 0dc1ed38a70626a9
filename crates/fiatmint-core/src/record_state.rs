use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The states of a ledger record's mint lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MintState {
    /// Record created for a payment reference; nothing checked yet.
    Received,
    /// The payment verifier is being consulted.
    Verifying,
    /// The payment is settled and unconsumed.
    Verified,
    /// Mint-to-escrow and release are in progress.
    Minting,
    /// Tokens released to the recipient. Final state.
    Released,
    /// The payment verifier rejected the payment. Final for the attempt.
    VerificationFailed,
    /// The mint-to-escrow transaction failed. Final state.
    MintFailed,
}

impl MintState {
    /// Whether this is a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Released | Self::VerificationFailed | Self::MintFailed
        )
    }

    /// All states, in lifecycle order.
    pub fn all() -> [MintState; 7] {
        [
            Self::Received,
            Self::Verifying,
            Self::Verified,
            Self::Minting,
            Self::Released,
            Self::VerificationFailed,
            Self::MintFailed,
        ]
    }
}

impl fmt::Display for MintState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "Received"),
            Self::Verifying => write!(f, "Verifying"),
            Self::Verified => write!(f, "Verified"),
            Self::Minting => write!(f, "Minting"),
            Self::Released => write!(f, "Released"),
            Self::VerificationFailed => write!(f, "VerificationFailed"),
            Self::MintFailed => write!(f, "MintFailed"),
        }
    }
}

impl FromStr for MintState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|state| state.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::ValidationError(format!("unknown mint state: {}", s)))
    }
}

/// Events that trigger record state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintEvent {
    /// The orchestrator started consulting the payment verifier.
    VerificationStarted,
    /// The verifier accepted the payment.
    PaymentVerified,
    /// The verifier rejected the payment.
    PaymentRejected,
    /// The mint-to-escrow submission is about to start.
    MintStarted,
    /// The release transaction confirmed.
    ReleaseConfirmed,
    /// Mint-to-escrow failed on chain.
    MintFailed,
    /// A rejected payment is being retried as a new attempt.
    Reopen,
}

/// Manages ledger record state transitions.
///
/// Valid transitions:
/// - Received → Verifying (VerificationStarted)
/// - Verifying → Verified (PaymentVerified)
/// - Verifying → VerificationFailed (PaymentRejected)
/// - Verified → Minting (MintStarted)
/// - Minting → Released (ReleaseConfirmed)
/// - Minting → MintFailed (MintFailed)
/// - VerificationFailed → Received (Reopen)
pub struct MintStateMachine;

impl MintStateMachine {
    /// Attempt a state transition based on an event.
    /// Returns the new state on success, or an error for invalid transitions.
    pub fn transition(current: MintState, event: MintEvent) -> Result<MintState, CoreError> {
        let new_state = match (current, event) {
            (MintState::Received, MintEvent::VerificationStarted) => MintState::Verifying,

            (MintState::Verifying, MintEvent::PaymentVerified) => MintState::Verified,
            (MintState::Verifying, MintEvent::PaymentRejected) => MintState::VerificationFailed,

            (MintState::Verified, MintEvent::MintStarted) => MintState::Minting,

            (MintState::Minting, MintEvent::ReleaseConfirmed) => MintState::Released,
            (MintState::Minting, MintEvent::MintFailed) => MintState::MintFailed,

            // Verification has no on-chain effect, so a rejected payment can be retried.
            (MintState::VerificationFailed, MintEvent::Reopen) => MintState::Received,

            _ => {
                let target = match event {
                    MintEvent::VerificationStarted => MintState::Verifying,
                    MintEvent::PaymentVerified => MintState::Verified,
                    MintEvent::PaymentRejected => MintState::VerificationFailed,
                    MintEvent::MintStarted => MintState::Minting,
                    MintEvent::ReleaseConfirmed => MintState::Released,
                    MintEvent::MintFailed => MintState::MintFailed,
                    MintEvent::Reopen => MintState::Received,
                };
                return Err(CoreError::InvalidStateTransition {
                    from: current,
                    to: target,
                });
            }
        };

        tracing::debug!(
            from = %current,
            to = %new_state,
            event = ?event,
            "mint state transition"
        );

        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: MintState, event: MintEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
