//! `fiatmint record`: show one ledger record.

use clap::Args;
use fiatmint_core::LedgerRecord;

use super::DEFAULT_ENDPOINT;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Payment reference to look up.
    pub reference: String,

    /// Print the raw JSON record.
    #[arg(long)]
    pub json: bool,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run(args: &RecordArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/records/{}", args.endpoint, args.reference.trim());

    match reqwest::get(&url).await {
        Ok(r) if r.status().is_success() => {
            let record: LedgerRecord = r.json().await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
        }
        Ok(r) => return Err(super::fail("lookup", r).await),
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}

fn print_record(record: &LedgerRecord) {
    println!("Record {}", record.payment_reference);
    println!("  State:      {}", record.state);
    println!("  Amount:     {}", record.amount);
    println!("  Recipient:  {}", record.recipient);
    println!("  Attempt:    {}", record.attempt);
    if let Some(tx) = &record.escrow_tx_hash {
        let confirmed = if record.escrow_confirmed { "confirmed" } else { "pending" };
        println!("  Escrow tx:  {} ({})", tx, confirmed);
    }
    if let Some(tx) = &record.release_tx_hash {
        println!("  Release tx: {}", tx);
    }
    if let Some(reason) = &record.failure_reason {
        println!("  Failure:    {}", reason);
    }
    if let Some(note) = &record.note {
        println!("  Note:       {}", note);
    }
    println!("  Updated:    {}", record.updated_at.to_rfc3339());
}
