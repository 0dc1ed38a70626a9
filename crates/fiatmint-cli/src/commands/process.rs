//! `fiatmint process`: resume an interrupted orchestration.

use clap::Args;

use super::{MintResponse, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Payment reference of the record to resume.
    pub reference: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

pub async fn run(args: &ProcessArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/records/{}/process", args.endpoint, args.reference.trim());
    let client = reqwest::Client::new();

    match client.post(&url).send().await {
        Ok(r) if r.status().is_success() => {
            let data: MintResponse = r.json().await?;
            data.print("Record released.");
        }
        Ok(r) => return Err(super::fail("process", r).await),
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}
