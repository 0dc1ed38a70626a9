//! RocksDB storage backend for the FiatMint node.
//!
//! Ledger records, settled payments and per-recipient escrow claims live in
//! their own column families as JSON. RocksDB has no conditional put, so the read-check-write of every
//! conditional operation runs under a process-local mutex. The mutex is only
//! ever held around local disk I/O.

use anyhow::Result;
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use fiatmint_core::{LedgerRecord, PaymentReference, RecipientAddress};
use fiatmint_orchestrator::payments::merge_payment;
use fiatmint_orchestrator::store::{decide_claim, finish_listing};
use fiatmint_orchestrator::{
    EscrowClaim, InsertOutcome, PaymentRegistry, RecordFilter, RecordStore, SettledPayment, StoreError,
};

/// Column family names for different data types.
const CF_RECORDS: &str = "records";
const CF_PAYMENTS: &str = "payments";
const CF_ESCROW: &str = "escrow_claims";

/// RocksDB-backed storage for the FiatMint node.
pub struct Storage {
    db: DB,
    write_lock: Mutex<()>,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_RECORDS, Options::default()),
            ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default()),
            ColumnFamilyDescriptor::new(CF_ESCROW, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self {
            db,
            write_lock: Mutex::new(()),
        })
    }

    fn put_json<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> Result<(), StoreError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("column family '{}' not found", cf_name)))?;
        let bytes = serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.db
            .put_cf(&cf, key.as_bytes(), bytes)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>, StoreError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("column family '{}' not found", cf_name)))?;
        let Some(bytes) = self
            .db
            .get_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))?
        else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn delete(&self, cf_name: &str, key: &str) -> Result<(), StoreError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("column family '{}' not found", cf_name)))?;
        self.db
            .delete_cf(&cf, key.as_bytes())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>, StoreError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| StoreError::Backend(format!("column family '{}' not found", cf_name)))?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, bytes) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
            values.push(serde_json::from_slice(&bytes).map_err(|e| StoreError::Codec(e.to_string()))?);
        }
        Ok(values)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Backend("storage write lock poisoned".into()))
    }
}

#[async_trait]
impl RecordStore for Storage {
    async fn insert_if_absent(&self, mut record: LedgerRecord) -> Result<InsertOutcome, StoreError> {
        let key = record.payment_reference.as_str().to_string();
        let _guard = self.lock()?;
        if let Some(existing) = self.get_json::<LedgerRecord>(CF_RECORDS, &key)? {
            return Ok(InsertOutcome::Existing(existing));
        }
        record.version = 1;
        self.put_json(CF_RECORDS, &key, &record)?;
        Ok(InsertOutcome::Inserted(record))
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        mut record: LedgerRecord,
    ) -> Result<LedgerRecord, StoreError> {
        let key = record.payment_reference.as_str().to_string();
        let _guard = self.lock()?;
        let stored = self
            .get_json::<LedgerRecord>(CF_RECORDS, &key)?
            .ok_or_else(|| StoreError::NotFound(record.payment_reference.clone()))?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict {
                reference: record.payment_reference,
                expected: expected_version,
                found: stored.version,
            });
        }
        record.version = expected_version + 1;
        self.put_json(CF_RECORDS, &key, &record)?;
        Ok(record)
    }

    async fn get(&self, reference: &PaymentReference) -> Result<Option<LedgerRecord>, StoreError> {
        self.get_json(CF_RECORDS, reference.as_str())
    }

    async fn list(&self, filter: &RecordFilter) -> Result<Vec<LedgerRecord>, StoreError> {
        let records = self
            .scan_json::<LedgerRecord>(CF_RECORDS)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        Ok(finish_listing(records, filter))
    }

    async fn claim_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
        replace: Option<&PaymentReference>,
    ) -> Result<EscrowClaim, StoreError> {
        let key = recipient.to_string();
        let _guard = self.lock()?;
        let holder = self.get_json::<PaymentReference>(CF_ESCROW, &key)?;
        let claim = decide_claim(holder.as_ref(), reference, replace);
        if claim == EscrowClaim::Acquired && holder.as_ref() != Some(reference) {
            self.put_json(CF_ESCROW, &key, reference)?;
        }
        Ok(claim)
    }

    async fn release_escrow(
        &self,
        recipient: &RecipientAddress,
        reference: &PaymentReference,
    ) -> Result<(), StoreError> {
        let key = recipient.to_string();
        let _guard = self.lock()?;
        match self.get_json::<PaymentReference>(CF_ESCROW, &key)? {
            Some(holder) if &holder == reference => self.delete(CF_ESCROW, &key),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentRegistry for Storage {
    async fn record_payment(&self, payment: SettledPayment) -> Result<SettledPayment, StoreError> {
        let key = payment.payment_reference.as_str().to_string();
        let _guard = self.lock()?;
        let existing = self.get_json::<SettledPayment>(CF_PAYMENTS, &key)?;
        let merged = merge_payment(existing, payment);
        self.put_json(CF_PAYMENTS, &key, &merged)?;
        Ok(merged)
    }

    async fn get_payment(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<SettledPayment>, StoreError> {
        self.get_json(CF_PAYMENTS, reference.as_str())
    }

    async fn mark_consumed(
        &self,
        reference: &PaymentReference,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.lock()?;
        let mut payment = self
            .get_json::<SettledPayment>(CF_PAYMENTS, reference.as_str())?
            .ok_or_else(|| StoreError::NotFound(reference.clone()))?;
        payment.consumed = true;
        payment.consumed_by_tx = Some(tx_hash.to_string());
        self.put_json(CF_PAYMENTS, reference.as_str(), &payment)
    }
}
