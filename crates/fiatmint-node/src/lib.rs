//! FiatMint Node: HTTP surface, persistence and wiring for the
//! payment-to-mint service.

pub mod api;
pub mod config;
pub mod node;
pub mod state;
pub mod storage;
pub mod webhook;

pub use config::FiatMintConfig;
pub use node::FiatMintNode;
pub use state::AppState;
pub use storage::Storage;
