//! FiatMint CLI: operator commands against a running fiatmint node.
//!
//! Subcommands: init, status, mint, records, record, process, register-payment.

mod commands;

use clap::{Parser, Subcommand};

/// FiatMint: settled bank payments to on-chain tokens.
#[derive(Parser, Debug)]
#[command(name = "fiatmint", version, about, long_about = None)]
struct Cli {
    /// Log level for the CLI itself.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default node configuration.
    Init(commands::init::InitArgs),
    /// Query the status of a running node.
    Status(commands::status::StatusArgs),
    /// Request a mint for a settled payment.
    Mint(commands::mint::MintArgs),
    /// List ledger records.
    Records(commands::records::RecordsArgs),
    /// Show one ledger record.
    Record(commands::record::RecordArgs),
    /// Resume an interrupted orchestration.
    Process(commands::process::ProcessArgs),
    /// Register a settled payment with the node's registry.
    RegisterPayment(commands::register_payment::RegisterPaymentArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Init(args) => commands::init::run(args),
        Commands::Status(args) => commands::status::run(args).await,
        Commands::Mint(args) => commands::mint::run(args).await,
        Commands::Records(args) => commands::records::run(args).await,
        Commands::Record(args) => commands::record::run(args).await,
        Commands::Process(args) => commands::process::run(args).await,
        Commands::RegisterPayment(args) => commands::register_payment::run(args).await,
    }
}
