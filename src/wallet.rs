use std::{fs, path::Path, sync::Arc};

use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};

use crate::errors::DispatchError;

const SECRET_LEN: usize = 64;

/// Ordered set of payer wallets, immutable once loaded.
#[derive(Clone, Default)]
pub struct WalletPool {
    wallets: Vec<Arc<Keypair>>,
}

impl WalletPool {
    pub fn new(wallets: Vec<Keypair>) -> Self {
        Self {
            wallets: wallets.into_iter().map(Arc::new).collect(),
        }
    }

    /// Parses each entry as either base58 or a JSON byte array
    /// (the format written by `solana-keygen`).
    pub fn from_secrets<I, S>(secrets: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wallets = secrets
            .into_iter()
            .enumerate()
            .map(|(index, secret)| parse_secret(index, secret.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(wallets))
    }

    pub fn from_keypair_files<I, P>(paths: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut wallets = Vec::new();
        for (index, path) in paths.into_iter().enumerate() {
            let path = path.as_ref();
            let contents = fs::read_to_string(path).map_err(|source| DispatchError::KeypairFile {
                path: path.to_path_buf(),
                source,
            })?;
            wallets.push(parse_secret(index, &contents)?);
        }
        Ok(Self::new(wallets))
    }

    pub fn extend(&mut self, other: WalletPool) {
        self.wallets.extend(other.wallets);
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Round-robin selection: task `index` is paid by `pool[index mod W]`.
    pub fn for_task(&self, index: usize) -> Option<Arc<Keypair>> {
        if self.wallets.is_empty() {
            return None;
        }
        Some(self.wallets[index % self.wallets.len()].clone())
    }

    pub fn pubkeys(&self) -> Vec<Pubkey> {
        self.wallets.iter().map(|w| w.pubkey()).collect()
    }
}

fn parse_secret(index: usize, secret: &str) -> Result<Keypair, DispatchError> {
    let invalid = |reason: String| DispatchError::InvalidSecret { index, reason };
    let secret = secret.trim();

    let bytes: Vec<u8> = if secret.starts_with('[') {
        serde_json::from_str(secret).map_err(|e| invalid(format!("bad json byte array: {e}")))?
    } else {
        bs58::decode(secret)
            .into_vec()
            .map_err(|e| invalid(format!("bad base58: {e}")))?
    };

    if bytes.len() != SECRET_LEN {
        return Err(invalid(format!(
            "expected {SECRET_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Keypair::from_bytes(&bytes).map_err(|e| invalid(e.to_string()))
}

/// Freshly generated key material, as printed by `generate_keys`.
pub struct GeneratedKey {
    pub secret: [u8; SECRET_LEN],
    pub base58: String,
    pub address: Pubkey,
}

impl GeneratedKey {
    /// Keypair-file form, a JSON array of the 64 secret bytes.
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.secret.to_vec()).unwrap_or_default()
    }
}

pub fn generate_key() -> GeneratedKey {
    let keypair = Keypair::new();
    let secret = keypair.to_bytes();
    GeneratedKey {
        secret,
        base58: bs58::encode(secret).into_string(),
        address: keypair.pubkey(),
    }
}
