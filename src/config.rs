use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use solana_sdk::commitment_config::CommitmentConfig;

use crate::{dispatch::DispatchSettings, errors::DispatchError, wallet::WalletPool};

pub const WALLET_SECRETS_ENV: &str = "WALLET_SECRETS";

#[derive(Parser, Debug, Clone)]
#[command(name = "sol_dispatch", about = "Send a batch of transfers from a rotating wallet pool")]
pub struct Config {
    /// RPC endpoint of the cluster
    #[arg(long, env = "RPC_URL", default_value = "https://api.devnet.solana.com")]
    pub rpc_url: String,

    /// CSV file with an `address` column
    #[arg(long, env = "ADDRESS_BOOK", default_value = "addresses.csv")]
    pub address_book: PathBuf,

    #[arg(long, env = "TX_COUNT", default_value_t = 10)]
    pub tx_count: usize,

    /// Maximum number of submissions in flight
    #[arg(long, env = "CONCURRENCY", default_value_t = 3)]
    pub concurrency: usize,

    /// Compute unit price in micro-lamports
    #[arg(long, env = "PRIORITY_FEE", default_value_t = 1_000)]
    pub priority_fee: u64,

    /// Delay between launching consecutive transfers
    #[arg(long, env = "PACING_MS", default_value_t = 100)]
    pub pacing_ms: u64,

    #[arg(long, env = "LAMPORTS", default_value_t = 1_000)]
    pub lamports: u64,

    /// Resubmissions allowed after an expired blockhash
    #[arg(long, env = "MAX_RETRIES", default_value_t = 0)]
    pub max_retries: u32,

    /// processed, confirmed or finalized
    #[arg(long, env = "COMMITMENT", default_value = "confirmed")]
    pub commitment: String,

    /// Payer keypair file (JSON byte array), may be repeated
    #[arg(long = "keypair")]
    pub keypairs: Vec<PathBuf>,
}

impl Config {
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            tx_count: self.tx_count,
            concurrency: self.concurrency,
            priority_fee: self.priority_fee,
            pacing: Duration::from_millis(self.pacing_ms),
            lamports: self.lamports,
            max_retries: self.max_retries,
        }
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, DispatchError> {
        CommitmentConfig::from_str(&self.commitment).map_err(|_| {
            DispatchError::InvalidSettings(format!("unknown commitment {:?}", self.commitment))
        })
    }

    /// Builds the payer pool from `--keypair` files followed by the
    /// `;`-separated entries of `secrets` (normally `WALLET_SECRETS`).
    pub fn wallet_pool(&self, secrets: Option<&str>) -> Result<WalletPool, DispatchError> {
        let mut pool = WalletPool::from_keypair_files(&self.keypairs)?;
        if let Some(secrets) = secrets {
            let entries = secrets.split(';').map(str::trim).filter(|s| !s.is_empty());
            pool.extend(WalletPool::from_secrets(entries)?);
        }
        if pool.is_empty() {
            return Err(DispatchError::EmptyWalletPool);
        }
        Ok(pool)
    }
}
