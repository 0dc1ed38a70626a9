//! `fiatmint records`: list ledger records.

use clap::Args;
use fiatmint_core::{LedgerRecord, MintState};
use serde::Deserialize;

use super::DEFAULT_ENDPOINT;

#[derive(Args, Debug)]
pub struct RecordsArgs {
    /// Only show records in this state (e.g. minting, released).
    #[arg(short, long)]
    pub state: Option<MintState>,

    /// Maximum number of records to show.
    #[arg(short, long, default_value_t = 50)]
    pub limit: usize,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct RecordsResponse {
    records: Vec<LedgerRecord>,
    count: usize,
}

pub async fn run(args: &RecordsArgs) -> anyhow::Result<()> {
    let mut url = format!("{}/api/v1/records?limit={}", args.endpoint, args.limit);
    if let Some(state) = args.state {
        url.push_str(&format!("&state={}", state));
    }

    match reqwest::get(&url).await {
        Ok(r) if r.status().is_success() => {
            let data: RecordsResponse = r.json().await?;
            println!("Ledger records ({}):", data.count);
            if data.records.is_empty() {
                println!("  (no records)");
            }
            for record in &data.records {
                println!(
                    "  {:<24} {:<20} {:>14}  {}",
                    record.payment_reference,
                    record.state,
                    record.amount,
                    record.transaction_hash.as_deref().unwrap_or("-"),
                );
            }
        }
        Ok(r) => return Err(super::fail("listing", r).await),
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}
