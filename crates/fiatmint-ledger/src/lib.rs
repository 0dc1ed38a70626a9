//! FiatMint Ledger Client
//!
//! Wraps one blockchain endpoint and one signing identity behind the
//! [`LedgerClient`] trait: decimal lookup, mint-to-escrow, release, and
//! bounded confirmation waits. Signed submissions are sequenced per identity
//! by a [`SubmissionQueue`].

pub mod adapters;
pub mod cache;
pub mod error;
pub mod submitter;
pub mod traits;
pub mod types;

pub use adapters::{EvmLedgerClient, EvmLedgerConfig, FailurePoint, SimulatedLedger};
pub use cache::DecimalsCache;
pub use error::ChainError;
pub use submitter::SubmissionQueue;
pub use traits::{LedgerClient, SignedSubmitter};
pub use types::{ConfirmationPolicy, ContractCall, PendingTx, Receipt};

pub use alloy::primitives::{Address, TxHash, U256};
