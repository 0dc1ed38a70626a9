//! FiatMint Core: request types, the durable ledger record, and the mint
//! lifecycle state machine shared by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod record;
pub mod record_state;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::CoreError;
pub use record::LedgerRecord;
pub use record_state::{MintEvent, MintState, MintStateMachine};
pub use types::{FiatAmount, MintRequest, PaymentReference, RecipientAddress};
