//! Concrete ledger client implementations.

pub mod evm;
pub mod simulated;

pub use evm::{EvmLedgerClient, EvmLedgerConfig};
pub use simulated::{FailurePoint, SimulatedLedger};
