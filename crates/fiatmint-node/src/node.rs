//! The FiatMint node.
//!
//! Ties together storage, the ledger client, the payment verifier and the
//! mint orchestrator, and serves them over HTTP.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::AbortHandle;
use zeroize::Zeroizing;

use fiatmint_ledger::{Address, EvmLedgerClient, EvmLedgerConfig, LedgerClient, SimulatedLedger};
use fiatmint_orchestrator::{MintOrchestrator, RegistryVerifier};

use crate::config::{non_empty_env, FiatMintConfig, LedgerConfig, LedgerMode};
use crate::state::AppState;
use crate::storage::Storage;

/// Environment variables holding the signing key, in lookup order.
pub const SIGNER_KEY_VARS: [&str; 2] = ["FIATMINT_SIGNER_KEY", "ADMIN_PRIVATE_KEY"];

pub struct FiatMintNode {
    config: FiatMintConfig,
    storage: Option<Arc<Storage>>,
    state: Option<Arc<AppState>>,
    api_task: Option<tokio::task::JoinHandle<Result<()>>>,
    api_abort: Option<AbortHandle>,
}

impl FiatMintNode {
    pub fn new(config: FiatMintConfig) -> Self {
        Self {
            config,
            storage: None,
            state: None,
            api_task: None,
            api_abort: None,
        }
    }

    /// Open storage, build the orchestrator and start the HTTP API.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!("starting FiatMint node");

        let storage = Arc::new(Storage::open(&self.config.storage.data_dir)?);
        tracing::info!(path = %self.config.storage.data_dir.display(), "storage initialized");

        let signing_key = signing_key_from_env();
        let state = Arc::new(build_state(
            &self.config,
            storage.clone(),
            signing_key.as_deref().map(String::as_str),
        ));

        let api_addr = self.config.api_socket_addr()?;
        let api_state = state.clone();
        let task = tokio::spawn(async move { crate::api::start_api_server(api_addr, api_state).await });

        self.api_abort = Some(task.abort_handle());
        self.api_task = Some(task);
        self.storage = Some(storage);
        self.state = Some(state);
        Ok(())
    }

    /// Run until the API server exits.
    pub async fn run(&mut self) -> Result<()> {
        let task = self
            .api_task
            .take()
            .ok_or_else(|| anyhow::anyhow!("node not started"))?;
        match task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(anyhow::anyhow!("HTTP API task failed: {}", e)),
        }
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("shutting down FiatMint node");

        if let Some(abort) = self.api_abort.take() {
            abort.abort();
        }
        self.api_task = None;
        self.state = None;

        if let Some(storage) = self.storage.take() {
            drop(storage);
            tracing::info!("storage closed");
        }

        tracing::info!("FiatMint node shut down");
        Ok(())
    }

    pub fn state(&self) -> Option<Arc<AppState>> {
        self.state.clone()
    }
}

/// Signing key from the environment, if any.
pub fn signing_key_from_env() -> Option<Zeroizing<String>> {
    SIGNER_KEY_VARS
        .iter()
        .find_map(|name| non_empty_env(name))
        .map(Zeroizing::new)
}

/// Build the configured ledger client. Errors are human-readable
/// configuration problems, reported on every mint request.
pub fn build_ledger(
    config: &LedgerConfig,
    signing_key: Option<&str>,
) -> Result<Arc<dyn LedgerClient>, String> {
    match config.mode {
        LedgerMode::Simulated => {
            tracing::warn!("using the simulated ledger; no tokens are minted on a real chain");
            Ok(Arc::new(SimulatedLedger::new(config.simulated_decimals)))
        }
        LedgerMode::Evm => {
            let key = signing_key.ok_or_else(|| {
                format!("Missing private key (set {} or {})", SIGNER_KEY_VARS[0], SIGNER_KEY_VARS[1])
            })?;
            let token_address: Address = config
                .token_address
                .parse()
                .map_err(|e| format!("invalid token address {}: {}", config.token_address, e))?;
            let client = EvmLedgerClient::connect(
                &EvmLedgerConfig {
                    rpc_url: config.rpc_url.clone(),
                    token_address,
                    policy: config.policy(),
                    queue_capacity: config.queue_capacity,
                },
                key,
            )
            .map_err(|e| e.to_string())?;
            Ok(Arc::new(client))
        }
    }
}

/// Wire the stores, verifier, ledger and orchestrator into handler state.
pub fn build_state(config: &FiatMintConfig, storage: Arc<Storage>, signing_key: Option<&str>) -> AppState {
    if config.verifier.allow_unregistered {
        tracing::warn!("verifier accepts unregistered payment references; do not run this in production");
    }
    let verifier = Arc::new(
        RegistryVerifier::new(storage.clone()).allow_unregistered(config.verifier.allow_unregistered),
    );

    let mint = build_ledger(&config.ledger, signing_key).map(|ledger| {
        Arc::new(MintOrchestrator::new(
            storage.clone(),
            verifier,
            ledger,
            config.orchestrator.clone(),
        ))
    });
    if let Err(reason) = &mint {
        tracing::error!(%reason, "mint endpoints disabled until the ledger is configured");
    }
    if config.webhook.secret.is_none() {
        tracing::warn!("webhook signature checks disabled; set webhook.secret to enable them");
    }

    AppState::new(
        mint,
        storage.clone(),
        storage,
        config.webhook.secret.as_deref(),
        config.ledger.mode.as_str(),
    )
}
