//! `fiatmint register-payment`: record a settled payment with the node.
//!
//! For processors that cannot call the webhook, and for local testing.

use clap::Args;
use serde::{Deserialize, Serialize};

use super::DEFAULT_ENDPOINT;

#[derive(Args, Debug)]
pub struct RegisterPaymentArgs {
    /// Bank payment reference.
    #[arg(short, long)]
    pub reference: String,

    /// Settled fiat amount.
    #[arg(short, long)]
    pub amount: String,

    /// Recipient named in the payment metadata.
    #[arg(short = 't', long = "to")]
    pub recipient: Option<String>,

    /// Processor status: pending, completed or failed.
    #[arg(short, long, default_value = "completed")]
    pub status: String,

    /// API endpoint of the node.
    #[arg(short, long, default_value = DEFAULT_ENDPOINT)]
    pub endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBody<'a> {
    payment_reference: &'a str,
    amount: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    recipient_address: Option<&'a str>,
    status: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    payment_reference: String,
    amount: serde_json::Value,
    status: String,
    consumed: bool,
}

pub async fn run(args: &RegisterPaymentArgs) -> anyhow::Result<()> {
    let url = format!("{}/api/v1/payments", args.endpoint);
    let body = RegisterBody {
        payment_reference: args.reference.trim(),
        amount: args.amount.trim(),
        recipient_address: args.recipient.as_deref().map(str::trim),
        status: &args.status,
    };

    let client = reqwest::Client::new();
    match client.post(&url).json(&body).send().await {
        Ok(r) if r.status().is_success() => {
            let data: PaymentResponse = r.json().await?;
            println!("Payment registered.");
            println!("  Reference:  {}", data.payment_reference);
            println!("  Amount:     {}", data.amount.as_str().map(str::to_string).unwrap_or_else(|| data.amount.to_string()));
            println!("  Status:     {}", data.status);
            if data.consumed {
                println!("  Already consumed by a previous mint.");
            }
        }
        Ok(r) => return Err(super::fail("registration", r).await),
        Err(e) => super::unreachable(&args.endpoint, &e),
    }

    Ok(())
}
