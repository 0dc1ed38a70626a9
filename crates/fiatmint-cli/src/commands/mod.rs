pub mod init;
pub mod mint;
pub mod process;
pub mod record;
pub mod records;
pub mod register_payment;
pub mod status;

use serde::Deserialize;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9101";

#[derive(Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub reason: Option<String>,
    #[serde(rename = "escrowTxHash")]
    pub escrow_tx_hash: Option<String>,
}

/// Turn a non-success node response into an error carrying the node's message.
pub async fn fail(action: &str, resp: reqwest::Response) -> anyhow::Error {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(err) => {
            let mut message = format!("{} failed (HTTP {}): {}", action, status, err.error);
            if let Some(reason) = err.reason {
                message.push_str(&format!(" ({})", reason));
            }
            if let Some(tx) = err.escrow_tx_hash {
                message.push_str(&format!("\n  Escrow tx: {}", tx));
            }
            anyhow::anyhow!(message)
        }
        Err(_) => anyhow::anyhow!("{} failed (HTTP {})", action, status),
    }
}

pub fn unreachable(endpoint: &str, err: &reqwest::Error) {
    println!("Could not reach node at {}", endpoint);
    println!("  Error: {}", err);
    println!();
    println!("Is the node running? Start it with: fiatmint-node");
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintResponse {
    pub tx_hash: String,
    pub amount: serde_json::Value,
    pub recipient: String,
    pub payment_reference: String,
    #[serde(default)]
    pub replayed: bool,
}

impl MintResponse {
    pub fn print(&self, headline: &str) {
        if self.replayed {
            println!("{} (already released earlier)", headline);
        } else {
            println!("{}", headline);
        }
        println!("  Reference:  {}", self.payment_reference);
        println!("  Amount:     {}", self.amount);
        println!("  Recipient:  {}", self.recipient);
        println!("  Tx hash:    {}", self.tx_hash);
    }
}
