//! Transaction construction, classification, and conversion economics.
//!
//! The wire model carries a versioned binary codec spanning three
//! historical formats; classification derives the semantic type of a
//! transaction from its input and output asset tags; the economics
//! modules price conversions against a signed oracle record; the
//! builder turns spendable sources and destinations into a signed
//! transaction; the miner module constructs coinbases and the genesis
//! block.

pub mod builder;
pub mod classify;
pub mod codec;
pub mod collateral;
pub mod conversion;
pub mod extra;
pub mod fee;
pub mod miner;
pub mod reward;
pub mod types;

pub use builder::{construct_tx, construct_tx_and_get_tx_key, construct_tx_with_tx_key};
pub use classify::{get_tx_asset_types, get_tx_type, TransactionType};
pub use types::{Block, BlockHeader, Transaction, TransactionPrefix, TxIn, TxOut, TxOutTarget};

use haven_crypto::serial::SerialError;
use haven_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TxError {
    // Format errors: the bytes cannot be a transaction.
    #[error("format error: {0}")]
    Format(String),

    #[error("transaction version {0} is outside the supported range")]
    UnknownVersion(u64),

    #[error("unrecognized variant tag {tag:#04x} for {what}")]
    UnknownVariantTag { tag: u8, what: &'static str },

    #[error("size invariant violated: {0}")]
    SizeMismatch(&'static str),

    // Semantic errors: well-formed bytes, impossible meaning.
    #[error("asset type {0} is not supported")]
    UnsupportedAsset(String),

    #[error("invalid asset combination: {0}")]
    InvalidAssetTypes(String),

    #[error("variant not allowed here: {0}")]
    UnexpectedVariant(&'static str),

    // Economic errors.
    #[error("pricing record height {pr_height} unusable at height {current_height}")]
    StalePricingRecord {
        current_height: u64,
        pr_height: u64,
    },

    #[error("outputs ({outputs}) exceed inputs ({inputs})")]
    Conservation { inputs: u64, outputs: u64 },

    #[error("economic rule violated: {0}")]
    Economic(String),

    // Crypto errors.
    #[error("crypto failure: {0}")]
    Crypto(#[from] CryptoError),

    // Configuration errors.
    #[error("configuration error: {0}")]
    Config(&'static str),
}

impl From<SerialError> for TxError {
    fn from(e: SerialError) -> Self {
        TxError::Format(e.to_string())
    }
}

impl From<haven_types::pricing::PricingError> for TxError {
    fn from(e: haven_types::pricing::PricingError) -> Self {
        TxError::Economic(e.to_string())
    }
}
