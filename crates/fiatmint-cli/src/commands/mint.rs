//! `fiatmint mint`: request tokens for a settled payment.

use clap::Args;
use serde::Serialize;

use fiatmint_core::{PaymentReference, RecipientAddress};

use super::{MintResponse, DEFAULT_ENDPOINT};

#[derive(Args, Debug)]
pub struct MintArgs {
    /// Bank payment reference.
    #[arg(short, long)]
    pub reference: String,

    /// Fiat amount in whole currency units, e.g. 100.50.
    #[arg(short, long)]
    pub amount: String,

    /// Address that receives the released tokens.
    #[arg(short = 't', long = "to")]
    pub recipient: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MintRequestBody<'a> {
    amount: &'a str,
    recipient_address: &'a str,
    payment_reference: &'a str,
}

pub async fn run(args: &MintArgs) -> anyhow::Result<()> {
    // Catch obvious typos before the node sees them.
    PaymentReference::new(&args.reference)?;
    args.recipient
        .parse::<RecipientAddress>()
        .map_err(|e| anyhow::anyhow!("invalid recipient: {}", e))?;

    let url = format!("{}/mint", args.endpoint);
    let body = MintRequestBody {
        amount: args.amount.trim(),
        recipient_address: args.recipient.trim(),
        payment_reference: args.reference.trim(),
    };

    tracing::debug!(%url, reference = %args.reference, "submitting mint request");
    let client = reqwest::Client::new();
    match client.post(&url).json(&body).send().await {
        Ok(r) if r.status().is_success() => {
            let data: MintResponse = r.json().await?;
            data.print("Tokens released!");
        }
        Ok(r) => return Err(super::fail("mint", r).await),
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}
