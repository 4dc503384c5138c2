use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use sol_dispatch::wallet::generate_key;

#[derive(Parser, Debug)]
#[command(name = "generate_keys", about = "Generate random Solana keypairs")]
struct Args {
    /// Number of keypairs to generate
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Directory to save `<address>.json` keypair files into
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();

    if let Some(dir) = &args.out {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for _ in 0..args.count {
        let key = generate_key();

        println!("Secret key bytes: {:?}", key.secret.to_vec());
        println!("Secret key (base58): {}", key.base58);
        println!("Public key: {}", key.address);

        if let Some(dir) = &args.out {
            let path = dir.join(format!("{}.json", key.address));
            fs::write(&path, key.to_json()).with_context(|| format!("writing {}", path.display()))?;
            log::info!("saved keypair to {}", path.display());
        }
        println!();
    }

    Ok(())
}
