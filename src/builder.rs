//! Builds the transfer transaction for a single dispatch task.
//!
//! Each transaction carries two instructions: a compute unit price (the
//! priority fee, in micro-lamports per compute unit) followed by a system
//! transfer from the payer to the recipient.

use std::{str::FromStr, sync::Arc};

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::Transaction,
};

use crate::errors::DispatchError;

pub const DEFAULT_TRANSFER_LAMPORTS: u64 = 1_000;

/// Recent blockhash plus the last block height at which it is still valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Anchor {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

/// One unit of dispatch work.
#[derive(Clone)]
pub struct TransferTask {
    pub index: usize,
    pub payer: Arc<Keypair>,
    pub recipient: String,
    pub lamports: u64,
    pub priority_fee: u64,
}

pub fn parse_recipient(address: &str) -> Result<Pubkey, DispatchError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::InvalidAddress {
            address: address.to_string(),
            reason: "empty address".to_string(),
        });
    }
    Pubkey::from_str(trimmed).map_err(|e| DispatchError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

pub fn transfer_instructions(
    payer: &Pubkey,
    recipient: &Pubkey,
    lamports: u64,
    priority_fee: u64,
) -> Vec<Instruction> {
    vec![
        ComputeBudgetInstruction::set_compute_unit_price(priority_fee),
        system_instruction::transfer(payer, recipient, lamports),
    ]
}

pub fn build_transfer(
    payer: &Keypair,
    recipient: &Pubkey,
    lamports: u64,
    priority_fee: u64,
    anchor: &Anchor,
) -> Transaction {
    let ixs = transfer_instructions(&payer.pubkey(), recipient, lamports, priority_fee);
    Transaction::new_signed_with_payer(&ixs, Some(&payer.pubkey()), &[payer], anchor.blockhash)
}
