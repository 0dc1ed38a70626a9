//! Settled payments reported by the payment processor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use fiatmint_core::{FiatAmount, PaymentReference, RecipientAddress};

use crate::error::StoreError;

/// Processor-side status of a fiat payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A payment as the processor reported it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledPayment {
    pub payment_reference: PaymentReference,
    pub amount: FiatAmount,
    /// Recipient named in the payment metadata, if the processor sent one.
    pub recipient: Option<RecipientAddress>,
    pub status: PaymentStatus,
    /// Set once a mint has released tokens against this payment.
    pub consumed: bool,
    pub consumed_by_tx: Option<String>,
    pub settled_at: DateTime<Utc>,
}

impl SettledPayment {
    pub fn new(
        payment_reference: PaymentReference,
        amount: FiatAmount,
        recipient: Option<RecipientAddress>,
        status: PaymentStatus,
    ) -> Self {
        Self {
            payment_reference,
            amount,
            recipient,
            status,
            consumed: false,
            consumed_by_tx: None,
            settled_at: Utc::now(),
        }
    }
}

/// Where the verifier looks payments up.
#[async_trait]
pub trait PaymentRegistry: Send + Sync {
    /// Insert or update a payment following [`merge_payment`] and return
    /// what ends up stored.
    async fn record_payment(&self, payment: SettledPayment) -> Result<SettledPayment, StoreError>;

    async fn get_payment(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<SettledPayment>, StoreError>;

    /// Flag a payment as consumed by the release transaction `tx_hash`.
    async fn mark_consumed(
        &self,
        reference: &PaymentReference,
        tx_hash: &str,
    ) -> Result<(), StoreError>;
}

/// Merge an incoming report into what is stored.
///
/// Consumption is final. A completed payment keeps the amount and recipient
/// it settled with; later reports can only move its status.
pub fn merge_payment(existing: Option<SettledPayment>, incoming: SettledPayment) -> SettledPayment {
    match existing {
        Some(stored) if stored.consumed => stored,
        Some(stored) if stored.status == PaymentStatus::Completed => SettledPayment {
            status: incoming.status,
            ..stored
        },
        _ => incoming,
    }
}

/// In-memory registry.
#[derive(Default)]
pub struct MemoryPaymentRegistry {
    payments: DashMap<PaymentReference, SettledPayment>,
}

impl MemoryPaymentRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentRegistry for MemoryPaymentRegistry {
    async fn record_payment(&self, payment: SettledPayment) -> Result<SettledPayment, StoreError> {
        let mut entry = self
            .payments
            .entry(payment.payment_reference.clone())
            .or_insert_with(|| payment.clone());
        let merged = merge_payment(Some(entry.clone()), payment);
        *entry = merged.clone();
        Ok(merged)
    }

    async fn get_payment(
        &self,
        reference: &PaymentReference,
    ) -> Result<Option<SettledPayment>, StoreError> {
        Ok(self.payments.get(reference).map(|p| p.clone()))
    }

    async fn mark_consumed(
        &self,
        reference: &PaymentReference,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        let mut payment = self
            .payments
            .get_mut(reference)
            .ok_or_else(|| StoreError::NotFound(reference.clone()))?;
        payment.consumed = true;
        payment.consumed_by_tx = Some(tx_hash.to_string());
        Ok(())
    }
}
