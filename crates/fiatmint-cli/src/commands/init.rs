//! `fiatmint init`: write a default node configuration.

use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (defaults to current directory).
    #[arg(default_value = ".")]
    pub dir: PathBuf,

    /// Run against the in-process simulated ledger instead of an EVM chain.
    #[arg(long)]
    pub simulated: bool,
}

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    let config_path = args.dir.join("fiatmint.toml");

    if config_path.exists() {
        anyhow::bail!("configuration file already exists at {}", config_path.display());
    }

    std::fs::create_dir_all(&args.dir)?;
    std::fs::write(&config_path, template(args.simulated))?;
    std::fs::create_dir_all(args.dir.join("data"))?;

    println!("Initialized fiatmint node at {}", config_path.display());
    println!("Edit fiatmint.toml to customize your configuration.");
    if !args.simulated {
        println!("Set FIATMINT_SIGNER_KEY to the minting wallet's private key.");
    }
    println!("Run 'fiatmint-node --config {}' to start the node.", config_path.display());
    Ok(())
}

fn template(simulated: bool) -> String {
    let mode = if simulated { "simulated" } else { "evm" };
    format!(
        r#"# FiatMint Node Configuration

[api]
listen_addr = "127.0.0.1"
port = 9101

[storage]
data_dir = "./data"

[logging]
level = "info"
format = "text"

[ledger]
mode = "{mode}"
rpc_url = "https://rpc-api.glideprotocol.xyz/l1-rpc"
token_address = "0xf4201cF507b4806d2a1527053cC78097f3873982"
confirmations = 1
poll_interval_ms = 2000
max_polls = 90
queue_capacity = 64
simulated_decimals = 18

[orchestrator]
lease_ttl_secs = 900
fiat_minor_units = 2
escrow_wait_ms = 60000
escrow_poll_ms = 250

[verifier]
allow_unregistered = false

[webhook]
# secret = "shared-with-the-payment-processor"
"#
    )
}
