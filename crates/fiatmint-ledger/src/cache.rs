//! Token decimals cache shared by the ledger adapters.
//!
//! The value is read from the chain at most once per client. A failed read
//! is not cached, so the next caller tries again.

use std::future::Future;
use tokio::sync::OnceCell;

use crate::error::ChainError;

#[derive(Debug, Default)]
pub struct DecimalsCache {
    cell: OnceCell<u8>,
}

impl DecimalsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached decimals, or the result of `fetch` on first use.
    ///
    /// Concurrent first callers share one fetch.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<u8, ChainError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u8, ChainError>>,
    {
        let value = self
            .cell
            .get_or_try_init(|| async {
                let decimals = fetch().await?;
                tracing::info!(decimals, "token decimals cached");
                Ok::<u8, ChainError>(decimals)
            })
            .await?;
        Ok(*value)
    }

    pub fn cached(&self) -> Option<u8> {
        self.cell.get().copied()
    }
}
