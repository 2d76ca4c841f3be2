//! Transfer shape classification.
//!
//! A transfer is either a simple send or a marketplace trade. Marketplace
//! trades are recognized by their signature pattern: the listing psbt signs
//! its input with SIGHASH_SINGLE | ANYONECANPAY, so the final transaction
//! carries at least two inputs whose witness signature ends with `0x83`.
//! The classification is a pure function of transaction shape and is
//! computed once per transaction.

use ubrc20_types::{BitcoinTransactionData, TxIn};

pub const MARKETPLACE_SIGHASH_BYTE: u8 = 0x83;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferType {
    Simple,
    Marketplace,
    /// Carries the marketplace sighash on some input but not the full
    /// pattern. Logged invalid without any further processing.
    InvalidMarketplace,
}

fn has_marketplace_sighash(input: &TxIn) -> bool {
    let Some(signature) = input.witness_signature_hex() else {
        return false;
    };
    let Ok(bytes) = hex::decode(signature) else {
        return false;
    };
    bytes.last() == Some(&MARKETPLACE_SIGHASH_BYTE)
}

pub fn classify_transfer(tx: &BitcoinTransactionData) -> TransferType {
    let flagged_inputs = tx
        .metadata
        .inputs
        .iter()
        .filter(|input| has_marketplace_sighash(input))
        .count();
    match flagged_inputs {
        0 => TransferType::Simple,
        1 => TransferType::InvalidMarketplace,
        _ => TransferType::Marketplace,
    }
}
