//! `fiatmint status`: query the status of a running node.

use clap::Args;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::DEFAULT_ENDPOINT;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    version: String,
    ledger_mode: String,
    ledger_id: Option<String>,
    signer: Option<String>,
    configuration_error: Option<String>,
    uptime_secs: u64,
    records: BTreeMap<String, usize>,
}

pub async fn run(args: &StatusArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/status", args.endpoint);
    let resp = reqwest::get(&url).await;

    match resp {
        Ok(r) if r.status().is_success() => {
            let status: StatusResponse = r.json().await?;
            println!("Node Status:");
            println!("  Version:    {}", status.version);
            println!("  Ledger:     {}", status.ledger_id.as_deref().unwrap_or(&status.ledger_mode));
            println!("  Signer:     {}", status.signer.as_deref().unwrap_or("(none)"));
            println!("  Uptime:     {}s", status.uptime_secs);
            if let Some(err) = &status.configuration_error {
                println!("  Config:     ERROR {}", err);
            }
            if status.records.is_empty() {
                println!("  Records:    (none)");
            } else {
                for (state, count) in &status.records {
                    println!("  {:<11} {}", format!("{}:", state), count);
                }
            }
        }
        Ok(r) => {
            anyhow::bail!("node returned HTTP {}", r.status());
        }
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}
