//! Transaction classification: derive source and destination assets
//! from the inputs and outputs, then the semantic transaction type.

use std::collections::BTreeSet;

use haven_crypto::Hash;
use haven_types::asset::is_supported_asset;
use haven_types::constants::COLLATERAL_TRANSACTION_VERSION;

use crate::types::{Transaction, TxIn, TxOutTarget};
use crate::TxError;

/// The semantic type of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    /// XHV → XHV.
    Transfer,
    /// XUSD → XUSD.
    OffshoreTransfer,
    /// xAsset → same xAsset.
    XassetTransfer,
    /// XHV → XUSD.
    Offshore,
    /// XUSD → XHV.
    Onshore,
    /// XUSD → xAsset.
    XusdToXasset,
    /// xAsset → XUSD.
    XassetToXusd,
}

impl TransactionType {
    pub fn is_conversion(&self) -> bool {
        !matches!(
            self,
            TransactionType::Transfer
                | TransactionType::OffshoreTransfer
                | TransactionType::XassetTransfer
        )
    }
}

/// Three transactions exploited an oracle fault to convert XJPY into
/// XBTC; consensus pins their destination back to XJPY.
const EXPLOIT_TXS: [&str; 3] = [
    "4c87e7245142cb33a8ed4f039b7f33d4e4dd6b541a42a55992fd88efeefc40d1",
    "7089a8faf5bddf8640a3cb41338f1ec2cdd063b1622e3b27923e2c1c31c55418",
    "ad5d15085594b8f2643f058b05931c3e60966128b4c33298206e70bdf9d41c22",
];

fn input_asset(input: &TxIn, is_miner_tx: bool) -> Result<String, TxError> {
    match input {
        TxIn::Gen { .. } => {
            if !is_miner_tx {
                return Err(TxError::UnexpectedVariant(
                    "generation input in a non-miner transaction",
                ));
            }
            Ok("XHV".into())
        }
        TxIn::ToKey { .. } => Ok("XHV".into()),
        TxIn::Offshore { .. } | TxIn::Onshore { .. } => Ok("XUSD".into()),
        TxIn::XAsset { asset_type, .. } => {
            if asset_type == "XHV" || asset_type == "XUSD" {
                return Err(TxError::InvalidAssetTypes(format!(
                    "{asset_type} in an xasset input"
                )));
            }
            Ok(asset_type.clone())
        }
        TxIn::HavenKey { asset_type, .. } => Ok(asset_type.clone()),
        TxIn::ToScript { .. } | TxIn::ToScriptHash { .. } => Err(TxError::UnexpectedVariant(
            "script inputs are not supported",
        )),
    }
}

/// Derive `(source, destination)` asset tags for a transaction.
///
/// Inputs must resolve to one asset, except the `{XHV, XUSD}` pair at
/// version ≥ COLLATERAL which is an onshore conversion spending xUSD
/// alongside XHV collateral. Outputs must be the source asset alone (a
/// transfer) or the source plus exactly one other asset (a conversion
/// with change).
pub fn get_tx_asset_types(
    tx: &Transaction,
    txid: &Hash,
    is_miner_tx: bool,
) -> Result<(String, String), TxError> {
    let mut source_assets: BTreeSet<String> = BTreeSet::new();
    for input in &tx.prefix.vin {
        source_assets.insert(input_asset(input, is_miner_tx)?);
    }

    let sat: Vec<&String> = source_assets.iter().collect();
    let source = if tx.prefix.version >= COLLATERAL_TRANSACTION_VERSION && sat.len() == 2 {
        // Only an onshore conversion may spend two assets.
        if sat[0] == "XHV" && sat[1] == "XUSD" {
            "XUSD".to_string()
        } else {
            return Err(TxError::InvalidAssetTypes(format!(
                "impossible input asset pair [{}, {}]",
                sat[0], sat[1]
            )));
        }
    } else {
        if sat.len() != 1 {
            return Err(TxError::InvalidAssetTypes(format!(
                "{} source asset types in one transaction",
                sat.len()
            )));
        }
        sat[0].clone()
    };

    let mut destination_assets: BTreeSet<String> = BTreeSet::new();
    for out in &tx.prefix.vout {
        match &out.target {
            TxOutTarget::XAsset { asset_type, .. } => {
                if asset_type == "XHV" || asset_type == "XUSD" {
                    return Err(TxError::InvalidAssetTypes(format!(
                        "{asset_type} in an xasset output"
                    )));
                }
                destination_assets.insert(asset_type.clone());
            }
            target => match target.asset_type() {
                Some(asset) => {
                    destination_assets.insert(asset.to_string());
                }
                None => {
                    return Err(TxError::UnexpectedVariant(
                        "script outputs are not supported",
                    ))
                }
            },
        }
    }

    let dat: Vec<&String> = destination_assets.iter().collect();
    if dat.is_empty() {
        return Err(TxError::InvalidAssetTypes(
            "no destination asset types".into(),
        ));
    }

    // Miner transactions always mint XHV; their output mix is validated
    // by block acceptance.
    let destination = if is_miner_tx {
        "XHV".to_string()
    } else if dat.len() > 2 {
        return Err(TxError::InvalidAssetTypes(format!(
            "{} destination asset types in one transaction",
            dat.len()
        )));
    } else if dat.len() == 1 {
        if source_assets.len() != 1 {
            return Err(TxError::InvalidAssetTypes(
                "dual-asset inputs with a single output asset".into(),
            ));
        }
        if dat[0] != &source {
            return Err(TxError::InvalidAssetTypes(format!(
                "conversion without change ([{source}] -> [{}])",
                dat[0]
            )));
        }
        dat[0].clone()
    } else {
        if source_assets.len() == 2
            && !(dat[0] == "XHV" && dat[1] == "XUSD")
        {
            return Err(TxError::InvalidAssetTypes(
                "onshore outputs must be XHV and XUSD".into(),
            ));
        }
        if dat[0] == &source {
            dat[1].clone()
        } else if dat[1] == &source {
            dat[0].clone()
        } else {
            return Err(TxError::InvalidAssetTypes(format!(
                "source asset not among outputs ([{source}] -> [{}, {}])",
                dat[0], dat[1]
            )));
        }
    };

    if !is_supported_asset(&source) {
        return Err(TxError::UnsupportedAsset(source));
    }
    if !is_supported_asset(&destination) {
        return Err(TxError::UnsupportedAsset(destination));
    }

    // Chain-compatibility override for the exploited conversions.
    let tx_hash = hex::encode(txid);
    if EXPLOIT_TXS.contains(&tx_hash.as_str()) {
        return Ok((source, "XJPY".to_string()));
    }

    Ok((source, destination))
}

/// Map `(source, destination)` to the transaction type.
pub fn get_tx_type(source: &str, destination: &str) -> Result<TransactionType, TxError> {
    if !is_supported_asset(source) {
        return Err(TxError::UnsupportedAsset(source.to_string()));
    }
    if !is_supported_asset(destination) {
        return Err(TxError::UnsupportedAsset(destination.to_string()));
    }

    if source == destination {
        Ok(match source {
            "XHV" => TransactionType::Transfer,
            "XUSD" => TransactionType::OffshoreTransfer,
            _ => TransactionType::XassetTransfer,
        })
    } else if source == "XHV" && destination == "XUSD" {
        Ok(TransactionType::Offshore)
    } else if source == "XUSD" && destination == "XHV" {
        Ok(TransactionType::Onshore)
    } else if source == "XUSD" {
        Ok(TransactionType::XusdToXasset)
    } else if destination == "XUSD" {
        Ok(TransactionType::XassetToXusd)
    } else {
        Err(TxError::InvalidAssetTypes(format!(
            "no direct conversion from {source} to {destination}"
        )))
    }
}
