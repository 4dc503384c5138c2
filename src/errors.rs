use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("address book contains no addresses")]
    EmptyAddressBook,

    #[error("wallet pool is empty")]
    EmptyWalletPool,

    #[error("invalid dispatch settings: {0}")]
    InvalidSettings(String),

    #[error("failed to read address book {path}: {source}")]
    AddressBook {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("invalid recipient address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("invalid wallet secret #{index}: {reason}")]
    InvalidSecret { index: usize, reason: String },

    #[error("failed to read keypair file {path}: {source}")]
    KeypairFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
