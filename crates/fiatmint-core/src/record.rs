use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::record_state::{MintEvent, MintState, MintStateMachine};
use crate::types::{FiatAmount, MintRequest, PaymentReference, RecipientAddress};

/// The durable record of one payment reference's journey to a token release.
///
/// There is at most one record per payment reference. Only the orchestrator
/// writes records, and every write goes through a compare-and-set on
/// `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub payment_reference: PaymentReference,
    pub amount: FiatAmount,
    pub recipient: RecipientAddress,
    pub state: MintState,
    /// Hash of the confirmed release transaction. Only set in `Released`.
    pub transaction_hash: Option<String>,
    /// Store-assigned write counter.
    pub version: u64,
    /// Verification attempt number, starting at 1.
    pub attempt: u32,
    pub escrow_tx_hash: Option<String>,
    pub escrow_confirmed: bool,
    pub release_tx_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub note: Option<String>,
    /// While set and in the future, an orchestration owns this record.
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    /// A fresh `Received` record leased to the caller for `lease_ttl`.
    pub fn received(request: &MintRequest, lease_ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            payment_reference: request.payment_reference.clone(),
            amount: request.amount,
            recipient: request.recipient,
            state: MintState::Received,
            transaction_hash: None,
            version: 0,
            attempt: 1,
            escrow_tx_hash: None,
            escrow_confirmed: false,
            release_tx_hash: None,
            failure_reason: None,
            note: None,
            lease_expires_at: Some(now + lease_ttl),
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuild the mint request this record was created from.
    pub fn request(&self) -> MintRequest {
        MintRequest {
            payment_reference: self.payment_reference.clone(),
            amount: self.amount,
            recipient: self.recipient,
        }
    }

    /// Apply a lifecycle event through the state machine.
    pub fn apply(&mut self, event: MintEvent) -> Result<(), CoreError> {
        self.state = MintStateMachine::transition(self.state, event)?;
        if event == MintEvent::Reopen {
            self.attempt += 1;
            self.failure_reason = None;
        }
        self.touch();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether another orchestration currently owns this record.
    pub fn lease_active(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.is_some_and(|until| until > now)
    }

    pub fn renew_lease(&mut self, lease_ttl: Duration) {
        self.lease_expires_at = Some(Utc::now() + lease_ttl);
        self.touch();
    }

    pub fn release_lease(&mut self) {
        self.lease_expires_at = None;
        self.touch();
    }

    /// Escrow minted but the release never confirmed.
    pub fn is_partial(&self) -> bool {
        self.state == MintState::Minting && self.escrow_confirmed
    }
}
