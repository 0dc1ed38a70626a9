//! FiatMint Node entry point.
//!
//! Starts the FiatMint node with configuration from a TOML file or defaults.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fiatmint_node::{FiatMintConfig, FiatMintNode};

/// FiatMint Node
#[derive(Parser, Debug)]
#[command(name = "fiatmint-node", version, about = "FiatMint payment-to-mint node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "fiatmint.toml")]
    config: PathBuf,

    /// Override the API port.
    #[arg(long)]
    api_port: Option<u16>,

    /// Override the data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the ledger JSON-RPC endpoint.
    #[arg(long)]
    rpc_url: Option<String>,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = if args.init {
        FiatMintConfig::default()
    } else {
        FiatMintConfig::load(&args.config)?
    };

    // Apply environment, then CLI overrides
    config.apply_env();
    if let Some(api_port) = args.api_port {
        config.api.port = api_port;
    }
    if let Some(ref data_dir) = args.data_dir {
        config.storage.data_dir = data_dir.clone();
    }
    if let Some(ref rpc_url) = args.rpc_url {
        config.ledger.rpc_url = rpc_url.clone();
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if config.logging.format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Handle --init flag
    if args.init {
        FiatMintConfig::default().save(&args.config)?;
        tracing::info!(path = %args.config.display(), "wrote default config");
        return Ok(());
    }

    tracing::info!("FiatMint Node v{}", env!("CARGO_PKG_VERSION"));

    let mut node = FiatMintNode::new(config);
    node.start().await?;

    // Set up graceful shutdown on SIGINT
    let shutdown = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("received shutdown signal"),
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await
            }
        }
    };

    tokio::select! {
        result = node.run() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP API server error");
            }
        }
        _ = shutdown => {
            tracing::info!("initiating graceful shutdown");
        }
    }

    node.shutdown().await?;
    tracing::info!("FiatMint node exited cleanly");
    Ok(())
}
