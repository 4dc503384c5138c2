use std::{env, process::ExitCode, sync::Arc};

use anyhow::Result;
use clap::Parser;
use sol_dispatch::{
    address_book::load_addresses,
    config::{Config, WALLET_SECRETS_ENV},
    dispatch,
    submitter::RpcLedger,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    match run(Config::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let secrets = env::var(WALLET_SECRETS_ENV).ok();
    let pool = config.wallet_pool(secrets.as_deref())?;
    for (i, pubkey) in pool.pubkeys().iter().enumerate() {
        log::info!("wallet {}: {}", i, pubkey);
    }

    let recipients = load_addresses(&config.address_book)?;

    let ledger = Arc::new(RpcLedger::new(&config.rpc_url, config.commitment()?));
    log::info!("connected to {}", ledger.url());

    let report = dispatch::run(ledger, &pool, &recipients, &config.dispatch_settings()).await?;
    for task in &report.tasks {
        log::debug!("[{}] {} -> {}: {}", task.index, task.payer, task.recipient, task.outcome);
    }
    Ok(())
}
