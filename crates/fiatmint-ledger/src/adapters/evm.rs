use alloy::network::{EthereumWallet, ReceiptResponse};
use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use async_trait::async_trait;
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::cache::DecimalsCache;
use crate::error::ChainError;
use crate::submitter::SubmissionQueue;
use crate::traits::{LedgerClient, SignedSubmitter};
use crate::types::{ConfirmationPolicy, ContractCall, PendingTx, Receipt};

// Escrow token interface. Only the calls the mint flow needs.
sol! {
    #[sol(rpc)]
    interface EscrowToken {
        function decimals() external view returns (uint8);
        function mintToEscrow(address recipient, uint256 amount) external;
        function releaseTokens(address recipient) external;
    }
}

/// Connection settings for an EVM escrow token deployment.
#[derive(Debug, Clone)]
pub struct EvmLedgerConfig {
    pub rpc_url: String,
    pub token_address: Address,
    pub policy: ConfirmationPolicy,
    pub queue_capacity: usize,
}

/// Signs and broadcasts escrow token calls for the submission queue.
struct EvmSubmitter {
    provider: DynProvider,
    token: EscrowToken::EscrowTokenInstance<DynProvider>,
    signer: Address,
}

#[async_trait]
impl SignedSubmitter for EvmSubmitter {
    async fn pending_nonce(&self) -> Result<u64, ChainError> {
        self.provider
            .get_transaction_count(self.signer)
            .pending()
            .await
            .map_err(|e| ChainError::classify(e.to_string()))
    }

    async fn submit(&self, call: ContractCall, nonce: u64) -> Result<PendingTx, ChainError> {
        let pending = match call {
            ContractCall::MintToEscrow { recipient, amount } => {
                self.token
                    .mintToEscrow(recipient, amount)
                    .nonce(nonce)
                    .send()
                    .await
            }
            ContractCall::Release { recipient } => {
                self.token.releaseTokens(recipient).nonce(nonce).send().await
            }
        }
        .map_err(|e| ChainError::classify(e.to_string()))?;

        Ok(PendingTx::new(*pending.tx_hash(), nonce))
    }
}

/// Ledger client for an escrow token on an EVM chain, over JSON-RPC/HTTP.
///
/// Holds one provider and one local private-key signer for the process
/// lifetime. All signed submissions go through a [`SubmissionQueue`].
pub struct EvmLedgerClient {
    provider: DynProvider,
    token: EscrowToken::EscrowTokenInstance<DynProvider>,
    signer: Address,
    policy: ConfirmationPolicy,
    decimals: DecimalsCache,
    queue: SubmissionQueue,
}

impl EvmLedgerClient {
    /// Build the provider and signer and spawn the submission queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(config: &EvmLedgerConfig, signing_key: &str) -> Result<Self, ChainError> {
        let key = Zeroizing::new(signing_key.trim().to_string());
        let signer: PrivateKeySigner = key
            .parse()
            .map_err(|_| ChainError::Configuration("signing key is not a valid secp256k1 private key".into()))?;
        let signer_address = signer.address();

        let url: reqwest::Url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainError::Configuration(format!("invalid rpc url {}: {}", config.rpc_url, e)))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        let submitter = Arc::new(EvmSubmitter {
            provider: provider.clone(),
            token: EscrowToken::new(config.token_address, provider.clone()),
            signer: signer_address,
        });
        let queue = SubmissionQueue::spawn(submitter, config.queue_capacity);

        tracing::info!(
            rpc_url = %config.rpc_url,
            token = %config.token_address,
            signer = %signer_address,
            confirmations = config.policy.confirmations,
            "EVM ledger client connected"
        );

        Ok(Self {
            token: EscrowToken::new(config.token_address, provider.clone()),
            provider,
            signer: signer_address,
            policy: config.policy,
            decimals: DecimalsCache::new(),
            queue,
        })
    }
}

#[async_trait]
impl LedgerClient for EvmLedgerClient {
    async fn decimals(&self) -> Result<u8, ChainError> {
        self.decimals
            .get_or_fetch(|| async {
                self.token
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| ChainError::classify(e.to_string()))
            })
            .await
    }

    async fn mint_to_escrow(
        &self,
        recipient: Address,
        raw_amount: U256,
    ) -> Result<PendingTx, ChainError> {
        self.queue
            .submit(ContractCall::MintToEscrow {
                recipient,
                amount: raw_amount,
            })
            .await
    }

    async fn release_tokens(&self, recipient: Address) -> Result<PendingTx, ChainError> {
        self.queue.submit(ContractCall::Release { recipient }).await
    }

    async fn await_confirmation(&self, tx: &PendingTx) -> Result<Receipt, ChainError> {
        let max_polls = self.policy.max_polls.max(1);
        let mut responded = false;
        let mut last_error: Option<String> = None;

        for poll in 1..=max_polls {
            match self.provider.get_transaction_receipt(tx.hash).await {
                Ok(Some(receipt)) => {
                    responded = true;
                    if !ReceiptResponse::status(&receipt) {
                        return Err(ChainError::Reverted(format!(
                            "transaction {} reverted",
                            tx.hash
                        )));
                    }
                    let block = ReceiptResponse::block_number(&receipt).unwrap_or_default();
                    match self.provider.get_block_number().await {
                        Ok(head) if self.policy.is_confirmed(block, head) => {
                            return Ok(Receipt {
                                tx_hash: ReceiptResponse::transaction_hash(&receipt),
                                block_number: block,
                            });
                        }
                        Ok(head) => {
                            tracing::debug!(tx_hash = %tx.hash, block, head, "awaiting confirmations");
                        }
                        Err(e) => last_error = Some(e.to_string()),
                    }
                }
                Ok(None) => responded = true,
                Err(e) => {
                    tracing::debug!(tx_hash = %tx.hash, poll, error = %e, "receipt poll failed");
                    last_error = Some(e.to_string());
                }
            }

            if poll < max_polls {
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        }

        match (responded, last_error) {
            (false, Some(e)) => Err(ChainError::RpcUnavailable(e)),
            _ => Err(ChainError::Timeout {
                tx_hash: tx.hash,
                polls: max_polls,
            }),
        }
    }

    fn signer_address(&self) -> Address {
        self.signer
    }

    fn ledger_id(&self) -> &str {
        "evm"
    }
}
