//! Mint orchestrator.
//!
//! Drives one payment reference through the mint lifecycle:
//!
//! ```text
//! Received -> Verifying -> Verified -> Minting -> Released
//!                 |                       |
//!                 v                       v
//!        VerificationFailed           MintFailed
//! ```
//!
//! Every state change is persisted with a compare-and-set before the next
//! external call is made, so a crash or a dropped request leaves a record
//! that says exactly how far the flow got. A `Minting` record with a
//! confirmed escrow mint and no confirmed release is the partial state that
//! `reconcile` finishes.
//!
//! `releaseTokens` empties a recipient's whole escrow, so before entering
//! `Minting` a record takes the recipient's escrow claim in the store and
//! keeps it until `Released` or `MintFailed`. Other references for the same
//! recipient wait in `Verified` meanwhile.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use fiatmint_core::{
    FiatAmount, LedgerRecord, MintEvent, MintRequest, MintState, OrchestratorConfig,
    PaymentReference, RecipientAddress,
};
use fiatmint_ledger::{ChainError, LedgerClient, PendingTx, Receipt, TxHash, U256};

use crate::error::{OrchestrationError, StoreError};
use crate::store::{EscrowClaim, InsertOutcome, RecordFilter, RecordStore};
use crate::verifier::{PaymentVerifier, Verification};

/// Result of a successful (or replayed) mint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MintOutcome {
    pub payment_reference: PaymentReference,
    /// Hash of the confirmed release transaction.
    pub tx_hash: String,
    pub amount: FiatAmount,
    pub recipient: RecipientAddress,
    /// True when the reference was already released and no chain call was made.
    pub replayed: bool,
}

pub struct MintOrchestrator {
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn PaymentVerifier>,
    ledger: Arc<dyn LedgerClient>,
    config: OrchestratorConfig,
}

impl MintOrchestrator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        verifier: Arc<dyn PaymentVerifier>,
        ledger: Arc<dyn LedgerClient>,
        config: OrchestratorConfig,
    ) -> Self {
        tracing::info!(
            ledger = ledger.ledger_id(),
            signer = %ledger.signer_address(),
            lease_ttl_secs = config.lease_ttl_secs,
            "mint orchestrator ready"
        );
        Self {
            store,
            verifier,
            ledger,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn ledger(&self) -> &dyn LedgerClient {
        self.ledger.as_ref()
    }

    /// Validate raw request fields. Nothing is stored on failure.
    pub fn validate(
        &self,
        payment_reference: &str,
        amount: Decimal,
        recipient: &str,
    ) -> Result<MintRequest, OrchestrationError> {
        Ok(MintRequest::new(
            payment_reference,
            amount,
            recipient,
            self.config.fiat_minor_units,
        )?)
    }

    /// Validate and process in one step.
    pub async fn submit(
        &self,
        payment_reference: &str,
        amount: Decimal,
        recipient: &str,
    ) -> Result<MintOutcome, OrchestrationError> {
        let request = self.validate(payment_reference, amount, recipient)?;
        self.process(request).await
    }

    /// Verify the payment behind `request` and mint-and-release its tokens,
    /// at most once per payment reference.
    pub async fn process(&self, request: MintRequest) -> Result<MintOutcome, OrchestrationError> {
        let span = tracing::info_span!(
            "mint",
            payment_reference = %request.payment_reference,
            attempt_id = %Uuid::now_v7(),
        );
        self.process_request(request).instrument(span).await
    }

    /// Resume or report on an existing record. This is the only path that
    /// picks up a stalled or partial orchestration.
    pub async fn reconcile(
        &self,
        reference: &PaymentReference,
    ) -> Result<MintOutcome, OrchestrationError> {
        let span = tracing::info_span!(
            "mint",
            payment_reference = %reference,
            attempt_id = %Uuid::now_v7(),
            trigger = "reconcile",
        );
        self.reconcile_record(reference).instrument(span).await
    }

    pub async fn record(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<LedgerRecord>, OrchestrationError> {
        Ok(self.store.get(reference).await?)
    }

    pub async fn records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<LedgerRecord>, OrchestrationError> {
        Ok(self.store.list(filter).await?)
    }

    async fn process_request(&self, request: MintRequest) -> Result<MintOutcome, OrchestrationError> {
        let fresh = LedgerRecord::received(&request, self.config.lease_ttl());
        let record = match self.store.insert_if_absent(fresh).await? {
            InsertOutcome::Inserted(record) => {
                tracing::info!(
                    amount = %record.amount,
                    recipient = %record.recipient,
                    "ledger record created"
                );
                record
            }
            InsertOutcome::Existing(existing) => return self.handle_existing(existing, request).await,
        };

        self.run_from_verification(record).await
    }

    async fn handle_existing(
        &self,
        existing: LedgerRecord,
        request: MintRequest,
    ) -> Result<MintOutcome, OrchestrationError> {
        match existing.state {
            MintState::Released if !same_request(&existing, &request) => {
                tracing::warn!("payment reference reused with different amount or recipient");
                Err(OrchestrationError::ReferenceConflict(existing.payment_reference))
            }
            MintState::Released => replay(&existing),
            MintState::MintFailed => Err(previously_failed(&existing)),
            MintState::VerificationFailed => {
                let mut reopened = existing.clone();
                reopened.amount = request.amount;
                reopened.recipient = request.recipient;
                self.reopen(&existing, reopened).await
            }
            state => {
                tracing::info!(%state, "rejecting request for reference already in flight");
                Err(OrchestrationError::InProgress(existing.payment_reference))
            }
        }
    }

    async fn reconcile_record(
        &self,
        reference: &PaymentReference,
    ) -> Result<MintOutcome, OrchestrationError> {
        let record = self
            .store
            .get(reference)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(reference.clone()))?;

        match record.state {
            MintState::Released => replay(&record),
            MintState::MintFailed => Err(previously_failed(&record)),
            _ if record.lease_active(Utc::now()) => {
                Err(OrchestrationError::InProgress(record.payment_reference))
            }
            MintState::VerificationFailed => {
                let reopened = record.clone();
                self.reopen(&record, reopened).await
            }
            MintState::Minting if record.escrow_tx_hash.is_none() => {
                tracing::warn!("minting record has no escrow transaction; refusing to resubmit");
                Err(OrchestrationError::NeedsManualReview {
                    reference: record.payment_reference,
                    detail: "no escrow transaction was recorded, so whether a mint was submitted is unknown"
                        .into(),
                })
            }
            MintState::Minting => {
                let claimed = self.claim(&record).await?;
                if let Err(e) = self.hold_escrow(&claimed).await {
                    self.abandon(&claimed).await;
                    return Err(e);
                }
                tracing::info!(
                    escrow_tx = claimed.escrow_tx_hash.as_deref().unwrap_or_default(),
                    escrow_confirmed = claimed.escrow_confirmed,
                    "resuming mint"
                );
                self.mint_and_release(claimed).await
            }
            MintState::Received | MintState::Verifying | MintState::Verified => {
                let claimed = self.claim(&record).await?;
                tracing::info!(state = %claimed.state, "resuming stalled orchestration");
                self.run_from_verification(claimed).await
            }
        }
    }

    /// Start a new attempt on a record whose verification failed.
    async fn reopen(
        &self,
        current: &LedgerRecord,
        mut next: LedgerRecord,
    ) -> Result<MintOutcome, OrchestrationError> {
        next.apply(MintEvent::Reopen)
            .map_err(|e| OrchestrationError::Internal(e.to_string()))?;
        next.renew_lease(self.config.lease_ttl());
        let claimed = self.write(current.version, next).await?;
        tracing::info!(attempt = claimed.attempt, "reopened after failed verification");
        self.run_from_verification(claimed).await
    }

    /// Take ownership of a record whose lease has expired.
    async fn claim(&self, record: &LedgerRecord) -> Result<LedgerRecord, OrchestrationError> {
        let mut next = record.clone();
        next.renew_lease(self.config.lease_ttl());
        self.write(record.version, next).await
    }

    async fn run_from_verification(
        &self,
        mut record: LedgerRecord,
    ) -> Result<MintOutcome, OrchestrationError> {
        if record.state == MintState::Received {
            record = self
                .advance(&record, MintEvent::VerificationStarted, |_| {})
                .await?;
        }

        if record.state == MintState::Verifying {
            let verdict = self
                .verifier
                .verify(&record.payment_reference, &record.amount, &record.recipient)
                .await;
            match verdict {
                Ok(Verification::Verified) => {
                    record = self.advance(&record, MintEvent::PaymentVerified, |_| {}).await?;
                    tracing::info!("payment verified");
                }
                Ok(Verification::Rejected(reason)) => {
                    let stored = reason.clone();
                    self.advance(&record, MintEvent::PaymentRejected, move |r| {
                        r.failure_reason = Some(stored);
                    })
                    .await?;
                    tracing::warn!(%reason, "payment verification failed");
                    return Err(OrchestrationError::PaymentNotVerified { reason });
                }
                Err(e) => {
                    tracing::error!(error = %e, "payment verifier unavailable");
                    self.abandon(&record).await;
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self.hold_escrow(&record).await {
            self.abandon(&record).await;
            return Err(e);
        }
        record = match self.advance(&record, MintEvent::MintStarted, |_| {}).await {
            Ok(next) => next,
            Err(e) => {
                self.free_escrow(&record).await;
                return Err(e);
            }
        };
        self.mint_and_release(record).await
    }

    async fn mint_and_release(
        &self,
        mut record: LedgerRecord,
    ) -> Result<MintOutcome, OrchestrationError> {
        if !record.escrow_confirmed {
            record = self.escrow(record).await?;
        }
        self.release(record).await
    }

    /// Mint into escrow (or pick up an already submitted mint) and wait for it.
    async fn escrow(&self, mut record: LedgerRecord) -> Result<LedgerRecord, OrchestrationError> {
        let pending = match record.escrow_tx_hash.clone() {
            Some(hash) => match PendingTx::from_hash_str(&hash) {
                Ok(pending) => pending,
                Err(e) => return Err(self.fail_mint(&record, OrchestrationError::ChainFailure(e)).await),
            },
            None => {
                let pending = match self.submit_mint(&record).await {
                    Ok(pending) => pending,
                    Err(cause) => return Err(self.fail_mint(&record, cause).await),
                };
                let hash = tx_hash_hex(pending.hash);
                tracing::info!(escrow_tx = %hash, "mint to escrow submitted");
                record = self
                    .save(&record, move |r| r.escrow_tx_hash = Some(hash))
                    .await?;
                pending
            }
        };

        match self.ledger.await_confirmation(&pending).await {
            Ok(receipt) => {
                tracing::info!(block = receipt.block_number, "escrow mint confirmed");
                self.save(&record, |r| r.escrow_confirmed = true).await
            }
            Err(e) => Err(self.fail_mint(&record, OrchestrationError::ChainFailure(e)).await),
        }
    }

    async fn submit_mint(&self, record: &LedgerRecord) -> Result<PendingTx, OrchestrationError> {
        let decimals = self
            .ledger
            .decimals()
            .await
            .map_err(OrchestrationError::ChainFailure)?;
        // Too large for the token's precision: a deployment mismatch, not bad input.
        let raw = record.amount.to_raw_units(decimals).map_err(|e| {
            OrchestrationError::ChainFailure(ChainError::Configuration(format!(
                "amount {} cannot be expressed with {} token decimals: {}",
                record.amount, decimals, e
            )))
        })?;
        tracing::debug!(decimals, raw_amount = %raw, "scaled fiat amount to token units");

        self.ledger
            .mint_to_escrow(record.recipient.address(), U256::from(raw))
            .await
            .map_err(OrchestrationError::ChainFailure)
    }

    async fn release(&self, record: LedgerRecord) -> Result<MintOutcome, OrchestrationError> {
        let escrow_tx = record.escrow_tx_hash.clone().unwrap_or_default();

        // A release from an earlier attempt may have landed after all.
        if let Some(hash) = record.release_tx_hash.clone() {
            match PendingTx::from_hash_str(&hash) {
                Ok(prior) => match self.ledger.await_confirmation(&prior).await {
                    Ok(receipt) => return self.finish(record, receipt).await,
                    Err(e) => {
                        tracing::warn!(release_tx = %hash, error = %e, "earlier release did not confirm; resubmitting");
                    }
                },
                Err(e) => tracing::warn!(release_tx = %hash, error = %e, "unreadable release hash"),
            }
        }

        let pending = match self.ledger.release_tokens(record.recipient.address()).await {
            Ok(pending) => pending,
            Err(e) => return Err(self.fail_release(&record, escrow_tx, e).await),
        };
        let hash = tx_hash_hex(pending.hash);
        tracing::info!(release_tx = %hash, "release submitted");
        let record = self
            .save(&record, move |r| r.release_tx_hash = Some(hash))
            .await?;

        match self.ledger.await_confirmation(&pending).await {
            Ok(receipt) => self.finish(record, receipt).await,
            Err(e) => Err(self.fail_release(&record, escrow_tx, e).await),
        }
    }

    async fn finish(
        &self,
        record: LedgerRecord,
        receipt: Receipt,
    ) -> Result<MintOutcome, OrchestrationError> {
        let tx_hash = tx_hash_hex(receipt.tx_hash);
        let stored = tx_hash.clone();
        let record = self
            .advance(&record, MintEvent::ReleaseConfirmed, move |r| {
                r.transaction_hash = Some(stored);
                r.note = None;
            })
            .await?;

        tracing::info!(tx_hash = %tx_hash, block = receipt.block_number, "tokens released");
        self.free_escrow(&record).await;

        // The record is the idempotency gate; a stale registry flag is only logged.
        if let Err(e) = self
            .verifier
            .mark_consumed(&record.payment_reference, &tx_hash)
            .await
        {
            tracing::warn!(error = %e, "failed to mark payment consumed");
        }

        Ok(MintOutcome {
            payment_reference: record.payment_reference,
            tx_hash,
            amount: record.amount,
            recipient: record.recipient,
            replayed: false,
        })
    }

    /// Record a failed mint and hand back `cause`.
    async fn fail_mint(&self, record: &LedgerRecord, cause: OrchestrationError) -> OrchestrationError {
        let reason = cause.to_string();
        tracing::error!(error = %reason, "mint to escrow failed");
        match self
            .advance(record, MintEvent::MintFailed, move |r| {
                r.failure_reason = Some(reason);
            })
            .await
        {
            Ok(failed) => self.free_escrow(&failed).await,
            Err(e) => tracing::error!(error = %e, "could not record mint failure"),
        }
        cause
    }

    /// Leave the record partial (escrowed, not released) and give up ownership.
    async fn fail_release(
        &self,
        record: &LedgerRecord,
        escrow_tx: String,
        cause: ChainError,
    ) -> OrchestrationError {
        tracing::error!(escrow_tx = %escrow_tx, error = %cause, "release failed; tokens remain in escrow");
        let note = format!("tokens escrowed by {} but release failed: {}", escrow_tx, cause);
        if let Err(e) = self
            .save(record, move |r| {
                r.note = Some(note);
                r.release_lease();
            })
            .await
        {
            tracing::error!(error = %e, "could not record release failure");
        }
        OrchestrationError::ReleaseFailed { escrow_tx, cause }
    }

    /// Take the recipient's escrow claim for `record`, waiting up to
    /// `escrow_wait` while another reference holds it.
    async fn hold_escrow(&self, record: &LedgerRecord) -> Result<(), OrchestrationError> {
        let deadline = tokio::time::Instant::now() + self.config.escrow_wait();
        let mut stale: Option<PaymentReference> = None;
        loop {
            let claim = self
                .store
                .claim_escrow(&record.recipient, &record.payment_reference, stale.as_ref())
                .await?;
            let holder = match claim {
                EscrowClaim::Acquired => {
                    if let Some(previous) = &stale {
                        tracing::warn!(%previous, "took over escrow claim from a finished holder");
                    }
                    return Ok(());
                }
                EscrowClaim::HeldBy(holder) => holder,
            };

            if self.holder_is_stale(&holder).await? {
                stale = Some(holder);
                continue;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(%holder, recipient = %record.recipient, "recipient escrow still busy; giving up");
                return Err(OrchestrationError::RecipientBusy {
                    reference: record.payment_reference.clone(),
                    recipient: record.recipient,
                    holder,
                });
            }
            tracing::debug!(%holder, "waiting for recipient escrow");
            stale = None;
            tokio::time::sleep(self.config.escrow_poll()).await;
        }
    }

    /// A holder that can no longer release has left its claim behind.
    /// `Minting` holders keep theirs: their escrow is still unreleased.
    async fn holder_is_stale(&self, holder: &PaymentReference) -> Result<bool, OrchestrationError> {
        let stale = match self.store.get(holder).await? {
            None => true,
            Some(record) if record.state == MintState::Minting => false,
            Some(record) if record.state.is_final() => true,
            Some(record) => !record.lease_active(Utc::now()),
        };
        Ok(stale)
    }

    async fn free_escrow(&self, record: &LedgerRecord) {
        if let Err(e) = self
            .store
            .release_escrow(&record.recipient, &record.payment_reference)
            .await
        {
            tracing::warn!(error = %e, "could not release escrow claim");
        }
    }

    /// Drop the lease without changing state so `reconcile` can retry.
    async fn abandon(&self, record: &LedgerRecord) {
        if let Err(e) = self.save(record, |r| r.release_lease()).await {
            tracing::error!(error = %e, "could not release lease");
        }
    }

    /// Apply `event`, then `update`, and persist.
    async fn advance<F>(
        &self,
        record: &LedgerRecord,
        event: MintEvent,
        update: F,
    ) -> Result<LedgerRecord, OrchestrationError>
    where
        F: FnOnce(&mut LedgerRecord) + Send,
    {
        let mut next = record.clone();
        next.apply(event)
            .map_err(|e| OrchestrationError::Internal(e.to_string()))?;
        if next.state.is_final() {
            next.release_lease();
        } else {
            next.renew_lease(self.config.lease_ttl());
        }
        update(&mut next);
        self.write(record.version, next).await
    }

    /// Persist a non-transition change, renewing the lease first.
    async fn save<F>(&self, record: &LedgerRecord, update: F) -> Result<LedgerRecord, OrchestrationError>
    where
        F: FnOnce(&mut LedgerRecord) + Send,
    {
        let mut next = record.clone();
        next.renew_lease(self.config.lease_ttl());
        update(&mut next);
        self.write(record.version, next).await
    }

    async fn write(
        &self,
        expected_version: u64,
        next: LedgerRecord,
    ) -> Result<LedgerRecord, OrchestrationError> {
        match self.store.compare_and_swap(expected_version, next).await {
            Ok(saved) => Ok(saved),
            Err(StoreError::Conflict {
                reference,
                expected,
                found,
            }) => {
                tracing::warn!(expected, found, "lost ownership of ledger record");
                Err(OrchestrationError::InProgress(reference))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn same_request(record: &LedgerRecord, request: &MintRequest) -> bool {
    record.amount == request.amount && record.recipient == request.recipient
}

fn replay(record: &LedgerRecord) -> Result<MintOutcome, OrchestrationError> {
    let tx_hash = record.transaction_hash.clone().ok_or_else(|| {
        OrchestrationError::Internal("released record has no transaction hash".into())
    })?;
    tracing::info!(tx_hash = %tx_hash, "replaying released mint");
    Ok(MintOutcome {
        payment_reference: record.payment_reference.clone(),
        tx_hash,
        amount: record.amount,
        recipient: record.recipient,
        replayed: true,
    })
}

fn previously_failed(record: &LedgerRecord) -> OrchestrationError {
    OrchestrationError::PreviouslyFailed {
        reason: record
            .failure_reason
            .clone()
            .unwrap_or_else(|| "unknown".into()),
    }
}

fn tx_hash_hex(hash: TxHash) -> String {
    format!("{:#x}", hash)
}
