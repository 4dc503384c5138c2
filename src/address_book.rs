//! Recipient address book.
//!
//! The address book is a delimited file with a header row. Only the column
//! named `address` is read; every other column is ignored.

use std::{fs::File, io::Read, path::Path};

use serde::Deserialize;

use crate::errors::DispatchError;

#[derive(Debug, Deserialize)]
struct AddressRow {
    #[serde(default)]
    address: Option<String>,
}

/// Loads the ordered list of recipient addresses from `path`.
pub fn load_addresses(path: impl AsRef<Path>) -> Result<Vec<String>, DispatchError> {
    let path = path.as_ref();
    let to_err = |source: csv::Error| DispatchError::AddressBook {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| to_err(e.into()))?;
    let addresses = load_from_reader(file).map_err(to_err)?;
    log::info!("loaded {} addresses from {}", addresses.len(), path.display());
    Ok(addresses)
}

/// Same as [`load_addresses`] over an arbitrary reader.
pub fn load_from_reader<R: Read>(rdr: R) -> Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(rdr);

    let mut addresses = Vec::new();
    for (line, row) in reader.deserialize::<AddressRow>().enumerate() {
        match row {
            Ok(AddressRow { address: Some(address) }) if !address.is_empty() => {
                addresses.push(address)
            }
            Ok(_) => log::debug!("row {} has no address, skipping", line + 1),
            // only a broken stream is fatal, malformed rows are skipped
            Err(e) if e.is_io_error() => return Err(e),
            Err(e) => log::debug!("row {} unreadable, skipping: {}", line + 1, e),
        }
    }
    Ok(addresses)
}
