use async_trait::async_trait;
use std::sync::Arc;

use fiatmint_core::{FiatAmount, PaymentReference, RecipientAddress};

use crate::error::{StoreError, VerifierError};
use crate::payments::{PaymentRegistry, PaymentStatus};

pub const REASON_NOT_FOUND: &str = "not found";
pub const REASON_ALREADY_CONSUMED: &str = "already consumed";
pub const REASON_AMOUNT_MISMATCH: &str = "amount mismatch";
pub const REASON_RECIPIENT_MISMATCH: &str = "recipient mismatch";

/// Verifier verdict. A rejection is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected(String),
}

/// Confirms that a fiat payment was settled for the requested amount and
/// has not already been used for a mint.
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    /// Read-only check.
    async fn verify(
        &self,
        reference: &PaymentReference,
        amount: &FiatAmount,
        recipient: &RecipientAddress,
    ) -> Result<Verification, VerifierError>;

    /// Record that a mint released tokens for this payment.
    async fn mark_consumed(
        &self,
        reference: &PaymentReference,
        tx_hash: &str,
    ) -> Result<(), VerifierError>;
}

/// Verifier backed by a [`PaymentRegistry`].
pub struct RegistryVerifier {
    registry: Arc<dyn PaymentRegistry>,
    allow_unregistered: bool,
}

impl RegistryVerifier {
    pub fn new(registry: Arc<dyn PaymentRegistry>) -> Self {
        Self {
            registry,
            allow_unregistered: false,
        }
    }

    /// Accept references the registry has never heard of. Demo setups only.
    pub fn allow_unregistered(mut self, allow: bool) -> Self {
        self.allow_unregistered = allow;
        self
    }
}

#[async_trait]
impl PaymentVerifier for RegistryVerifier {
    async fn verify(
        &self,
        reference: &PaymentReference,
        amount: &FiatAmount,
        recipient: &RecipientAddress,
    ) -> Result<Verification, VerifierError> {
        let payment = match self.registry.get_payment(reference).await? {
            Some(p) => p,
            None if self.allow_unregistered => {
                tracing::warn!(
                    payment_reference = %reference,
                    "accepting unregistered payment reference"
                );
                return Ok(Verification::Verified);
            }
            None => return Ok(Verification::Rejected(REASON_NOT_FOUND.into())),
        };

        if payment.status != PaymentStatus::Completed {
            tracing::debug!(
                payment_reference = %reference,
                status = %payment.status,
                "payment not settled"
            );
            return Ok(Verification::Rejected(REASON_NOT_FOUND.into()));
        }
        if payment.consumed {
            return Ok(Verification::Rejected(REASON_ALREADY_CONSUMED.into()));
        }
        if payment.amount != *amount {
            return Ok(Verification::Rejected(REASON_AMOUNT_MISMATCH.into()));
        }
        if payment.recipient.is_some_and(|r| r != *recipient) {
            return Ok(Verification::Rejected(REASON_RECIPIENT_MISMATCH.into()));
        }

        Ok(Verification::Verified)
    }

    async fn mark_consumed(
        &self,
        reference: &PaymentReference,
        tx_hash: &str,
    ) -> Result<(), VerifierError> {
        match self.registry.mark_consumed(reference, tx_hash).await {
            Ok(()) => Ok(()),
            // Accepted without a registry entry; nothing to mark.
            Err(StoreError::NotFound(_)) if self.allow_unregistered => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
