//! Ledger record store.
//!
//! One record per payment reference. Creation is an atomic
//! create-if-absent and every later write is a compare-and-set on the
//! record's `version`, so two orchestrations can never both believe they own
//! the same reference.
//!
//! The store also tracks which reference holds the escrow of each recipient.
//! `releaseTokens` sweeps a recipient's whole escrow balance, so only one
//! reference per recipient may sit between escrow mint and release.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use fiatmint_core::{LedgerRecord, MintState, PaymentReference, RecipientAddress};

use crate::error::StoreError;

/// Result of [`RecordStore::insert_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The record was created; carries the stored copy (version 1).
    Inserted(LedgerRecord),
    /// A record already existed; carries it unchanged.
    Existing(LedgerRecord),
}

/// Result of [`RecordStore::claim_escrow`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscrowClaim {
    /// The caller now holds the recipient's escrow (or already did).
    Acquired,
    /// Another reference holds it.
    HeldBy(PaymentReference),
}

/// Listing filter for the admin surface.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub state: Option<MintState>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn matches(&self, record: &LedgerRecord) -> bool {
        self.state.map_or(true, |state| record.state == state)
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create `record` unless one already exists for its payment reference.
    async fn insert_if_absent(&self, record: LedgerRecord) -> Result<InsertOutcome, StoreError>;

    /// Replace the stored record if its version is still `expected_version`.
    /// Returns the stored copy with the version bumped.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        record: LedgerRecord,
    ) -> Result<LedgerRecord, StoreError>;

    async fn get(&self, reference: &PaymentReference) -> Result<Option<LedgerRecord>, StoreError>;

    /// Records matching `filter`, most recently updated first.
    async fn list(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>, StoreError>;

    /// Take the escrow of `recipient` for `reference` if it is free, already
    /// held by `reference`, or held by `replace` (a holder found to be stale).
    async fn claim_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
        replace: Option<&PaymentReference>,
    ) -> Result<EscrowClaim, StoreError>;

    /// Give up the escrow of `recipient` if `reference` holds it.
    async fn release_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
    ) -> Result<(), StoreError>;
}

/// Decide a claim against the current holder. Shared by every backend.
pub fn decide_claim(
    holder: Option<&PaymentReference>,
    reference: &PaymentReference,
    replace: Option<&PaymentReference>,
) -> EscrowClaim {
    match holder {
        None => EscrowClaim::Acquired,
        Some(current) if current == reference || Some(current) == replace => EscrowClaim::Acquired,
        Some(current) => EscrowClaim::HeldBy(current.clone()),
    }
}

/// Sort and truncate a listing the same way for every backend.
pub fn finish_listing(mut records: Vec<LedgerRecord>, filter: &RecordFilter) -> Vec<LedgerRecord> {
    records.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    if let Some(limit) = filter.limit {
        records.truncate(limit);
    }
    records
}

/// In-memory record store backed by a `DashMap`.
///
/// Per-key atomicity comes from the map's shard locks; no lock outlives a
/// single call.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: DashMap<PaymentReference, LedgerRecord>,
    escrow: DashMap<RecipientAddress, PaymentReference>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, mut record: LedgerRecord) -> Result<InsertOutcome, StoreError> {
        match self.records.entry(record.payment_reference.clone()) {
            Entry::Occupied(existing) => Ok(InsertOutcome::Existing(existing.get().clone())),
            Entry::Vacant(slot) => {
                record.version = 1;
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted(record))
            }
        }
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut record: LedgerRecord,
    ) -> Result<LedgerRecord, StoreError> {
        let reference = record.payment_reference.clone();
        let mut stored = self
            .records
            .get_mut(&reference)
            .ok_or_else(|| StoreError::NotFound(reference.clone()))?;

        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                reference,
                expected: expected_version,
                found: stored.version,
            });
        }

        record.version = expected_version + 1;
        *stored = record.clone();
        Ok(record)
    }

    async fn get(&self, reference: &PaymentReference) -> Result<Option<LedgerRecord>, StoreError> {
        Ok(self.records.get(reference).map(|r| r.clone()))
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>, StoreError> {
        let records = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        Ok(finish_listing(records, filter))
    }

    async fn claim_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
        replace: Option<&PaymentReference>,
    ) -> Result<EscrowClaim, StoreError> {
        let mut slot = self.escrow.entry(*recipient).or_insert_with(|| reference.clone());
        let claim = decide_claim(Some(slot.value()), reference, replace);
        if claim == EscrowClaim::Acquired {
            *slot = reference.clone();
        }
        Ok(claim)
    }

    async fn release_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
    ) -> Result<(), StoreError> {
        self.escrow.remove_if(recipient, |_, holder| holder == reference);
        Ok(())
    }
}
