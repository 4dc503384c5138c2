use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::{Signature, Signer},
    transaction::{Transaction, TransactionError},
};

use crate::builder::{build_transfer, parse_recipient, Anchor, TransferTask};

/// The two ledger calls a transfer needs. Implementations must be safe to
/// share between concurrently running tasks.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn latest_anchor(&self) -> Result<Anchor>;

    async fn send_and_confirm(&self, tx: &Transaction) -> Result<Signature>;
}

pub struct RpcLedger {
    rpc_client: RpcClient,
}

impl RpcLedger {
    pub fn new(rpc_url: &str, commitment: CommitmentConfig) -> Self {
        Self {
            rpc_client: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
        }
    }

    pub fn url(&self) -> String {
        self.rpc_client.url()
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn latest_anchor(&self) -> Result<Anchor> {
        let (blockhash, last_valid_block_height) = self
            .rpc_client
            .get_latest_blockhash_with_commitment(self.rpc_client.commitment())
            .await?;
        Ok(Anchor {
            blockhash,
            last_valid_block_height,
        })
    }

    async fn send_and_confirm(&self, tx: &Transaction) -> Result<Signature> {
        Ok(self.rpc_client.send_and_confirm_transaction(tx).await?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Confirmed { signature: Signature, attempts: u32 },
    Skipped { reason: String },
    Failed { error: String, attempts: u32 },
}

impl TransferOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TransferOutcome::Confirmed { .. })
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Confirmed { signature, .. } => write!(f, "confirmed {signature}"),
            TransferOutcome::Skipped { reason } => write!(f, "skipped: {reason}"),
            TransferOutcome::Failed { error, .. } => write!(f, "failed: {error}"),
        }
    }
}

/// True when the error means the blockhash the transaction was built on
/// is no longer accepted by the cluster.
pub fn is_anchor_expired(err: &anyhow::Error) -> bool {
    if let Some(client_err) = err.downcast_ref::<ClientError>() {
        if let Some(tx_err) = client_err.get_transaction_error() {
            return tx_err == TransactionError::BlockhashNotFound;
        }
    }
    if let Some(tx_err) = err.downcast_ref::<TransactionError>() {
        return *tx_err == TransactionError::BlockhashNotFound;
    }
    // confirmation timeouts only surface as rpc text
    let msg = format!("{err:#}").to_lowercase();
    msg.contains("blockhash not found") || msg.contains("block height exceeded")
}

/// Builds, sends and confirms one transfer. Never returns an error: every
/// failure is logged and folded into the outcome.
///
/// With `max_retries == 0` a failed submission is final. Otherwise an
/// expired anchor triggers a rebuild against a fresh one, at most
/// `max_retries` extra times.
pub async fn execute<C: LedgerClient + ?Sized>(
    client: &C,
    task: &TransferTask,
    max_retries: u32,
) -> TransferOutcome {
    let payer = task.payer.pubkey();

    let recipient = match parse_recipient(&task.recipient) {
        Ok(recipient) => recipient,
        Err(e) => {
            log::warn!("[{}] skipping {} -> {:?}: {}", task.index, payer, task.recipient, e);
            return TransferOutcome::Skipped {
                reason: e.to_string(),
            };
        }
    };

    let mut attempts = 0u32;
    loop {
        attempts += 1;
        let result = async {
            let anchor = client.latest_anchor().await?;
            log::debug!(
                "[{}] anchor {} valid until height {}",
                task.index,
                anchor.blockhash,
                anchor.last_valid_block_height
            );
            let tx = build_transfer(
                &task.payer,
                &recipient,
                task.lamports,
                task.priority_fee,
                &anchor,
            );
            client.send_and_confirm(&tx).await
        }
        .await;

        match result {
            Ok(signature) => {
                log::info!("[{}] {} -> {} confirmed: {}", task.index, payer, recipient, signature);
                return TransferOutcome::Confirmed {
                    signature,
                    attempts,
                };
            }
            Err(e) if attempts <= max_retries && is_anchor_expired(&e) => {
                log::warn!(
                    "[{}] {} -> {} anchor expired, retrying ({}/{})",
                    task.index,
                    payer,
                    recipient,
                    attempts,
                    max_retries
                );
            }
            Err(e) => {
                log::error!("[{}] {} -> {} failed: {:#}", task.index, payer, recipient, e);
                return TransferOutcome::Failed {
                    error: format!("{e:#}"),
                    attempts,
                };
            }
        }
    }
}
