//! Node configuration loading and management.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fiatmint_core::OrchestratorConfig;
use fiatmint_ledger::ConfirmationPolicy;

/// Full configuration for the FiatMint node.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FiatMintConfig {
    /// HTTP API settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Blockchain ledger settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Mint orchestrator tuning.
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Payment verifier policy.
    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Payment processor webhook settings.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API listen address.
    #[serde(default = "default_api_addr")]
    pub listen_addr: String,
    /// API port.
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the data directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Which ledger client the node runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerMode {
    Evm,
    Simulated,
}

impl LedgerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_mode")]
    pub mode: LedgerMode,
    /// JSON-RPC endpoint. `FIATMINT_RPC_URL` overrides it.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Escrow token contract address.
    #[serde(default = "default_token_address")]
    pub token_address: String,
    /// Blocks required on top of the inclusion block.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
    /// Pending submissions buffered for the signing identity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Token decimals reported by the simulated ledger.
    #[serde(default = "default_simulated_decimals")]
    pub simulated_decimals: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerifierConfig {
    /// Treat payment references the registry has never seen as settled.
    /// Demo setups only.
    #[serde(default)]
    pub allow_unregistered: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebhookConfig {
    /// Shared secret for `x-signature`. `FIATMINT_WEBHOOK_SECRET` overrides it.
    /// Unset disables signature checks.
    #[serde(default)]
    pub secret: Option<String>,
}

// Default value functions
fn default_api_addr() -> String {
    "127.0.0.1".into()
}
fn default_api_port() -> u16 {
    9101
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_ledger_mode() -> LedgerMode {
    LedgerMode::Evm
}
fn default_rpc_url() -> String {
    "https://rpc-api.glideprotocol.xyz/l1-rpc".into()
}
fn default_token_address() -> String {
    "0xf4201cF507b4806d2a1527053cC78097f3873982".into()
}
fn default_confirmations() -> u64 {
    1
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_max_polls() -> u32 {
    90
}
fn default_queue_capacity() -> usize {
    64
}
fn default_simulated_decimals() -> u8 {
    18
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_addr(),
            port: default_api_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            mode: default_ledger_mode(),
            rpc_url: default_rpc_url(),
            token_address: default_token_address(),
            confirmations: default_confirmations(),
            poll_interval_ms: default_poll_interval_ms(),
            max_polls: default_max_polls(),
            queue_capacity: default_queue_capacity(),
            simulated_decimals: default_simulated_decimals(),
        }
    }
}

impl LedgerConfig {
    pub fn policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_polls: self.max_polls,
        }
    }
}

impl FiatMintConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: FiatMintConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply environment overrides for values that should not live in files.
    pub fn apply_env(&mut self) {
        if let Some(url) = non_empty_env("FIATMINT_RPC_URL") {
            self.ledger.rpc_url = url;
        }
        if let Some(secret) = non_empty_env("FIATMINT_WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
    }

    pub fn api_socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.api.listen_addr, self.api.port).parse()?;
        Ok(addr)
    }
}

pub(crate) fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
