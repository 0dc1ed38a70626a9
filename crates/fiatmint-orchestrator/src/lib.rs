//! FiatMint Orchestrator
//!
//! Turns a settled fiat payment into a token release exactly once:
//! - [`RecordStore`]: one durable [`LedgerRecord`](fiatmint_core::LedgerRecord)
//!   per payment reference, with atomic create-if-absent and compare-and-set
//! - [`PaymentVerifier`]: read-only check against the payments the processor
//!   reported through a [`PaymentRegistry`]
//! - [`MintOrchestrator`]: the state machine driver, plus `reconcile` for
//!   stalled and partial records

pub mod error;
pub mod orchestrator;
pub mod payments;
pub mod store;
pub mod verifier;

pub use error::{OrchestrationError, StoreError, VerifierError};
pub use orchestrator::{MintOrchestrator, MintOutcome};
pub use payments::{MemoryPaymentRegistry, PaymentRegistry, PaymentStatus, SettledPayment};
pub use store::{EscrowClaim, InsertOutcome, MemoryRecordStore, RecordFilter, RecordStore};
pub use verifier::{PaymentVerifier, RegistryVerifier, Verification};
