//! Shared state handed to HTTP handlers.

use std::sync::Arc;
use std::time::Instant;
use zeroize::Zeroizing;

use fiatmint_orchestrator::{MintOrchestrator, PaymentRegistry, RecordStore};

use crate::webhook;

pub struct AppState {
    /// The orchestrator, or why it could not be built. A missing signing key
    /// fails mint requests, not startup.
    mint: Result<Arc<MintOrchestrator>, String>,
    /// Read access to ledger records, available even when `mint` is not.
    pub records: Arc<dyn RecordStore>,
    pub registry: Arc<dyn PaymentRegistry>,
    webhook_key: Option<Zeroizing<[u8; 32]>>,
    pub ledger_mode: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        mint: Result<Arc<MintOrchestrator>, String>,
        records: Arc<dyn RecordStore>,
        registry: Arc<dyn PaymentRegistry>,
        webhook_secret: Option<&str>,
        ledger_mode: impl Into<String>,
    ) -> Self {
        Self {
            mint,
            records,
            registry,
            webhook_key: webhook_secret.map(webhook::signing_key),
            ledger_mode: ledger_mode.into(),
            start_time: Instant::now(),
        }
    }

    pub fn orchestrator(&self) -> Result<&Arc<MintOrchestrator>, &str> {
        self.mint.as_ref().map_err(String::as_str)
    }

    pub fn webhook_key(&self) -> Option<&[u8; 32]> {
        self.webhook_key.as_deref()
    }
}
