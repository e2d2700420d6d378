//! Conversion fee schedule.
//!
//! Fees are a percentage of the converted amount (change and collateral
//! outputs never count), with the rate fixed by the hard-fork epoch.
//! All percentages are taken in 128-bit arithmetic and truncated.

use haven_types::constants::hf::{
    HF_PER_OUTPUT_UNLOCK_VERSION, HF_VERSION_USE_COLLATERAL, HF_VERSION_XASSET_FEES_V2,
};

use crate::builder::TxDestinationEntry;

fn pct(amount: u64, numerator: u128, denominator: u128) -> u64 {
    (amount as u128 * numerator / denominator) as u64
}

/// Pre-collateral conversions tiered the fee by how long the converted
/// output stayed locked. The arms run longest-first so a delayed
/// construction can only pay more, never less.
fn unlock_tier_fee(amount: u64, unlock_time: u32) -> u64 {
    if unlock_time >= 5040 {
        amount / 500
    } else if unlock_time >= 1440 {
        amount / 20
    } else if unlock_time >= 720 {
        amount / 10
    } else {
        amount / 5
    }
}

/// Fee for an XHV → XUSD conversion, in XHV.
pub fn get_offshore_fee(
    dsts: &[TxDestinationEntry],
    unlock_time: u32,
    hf_version: u8,
) -> u64 {
    // The converted amount excludes change (no xUSD side) and collateral.
    let amount: u64 = dsts
        .iter()
        .filter(|d| d.amount_usd != 0 && !d.is_collateral)
        .map(|d| d.amount)
        .sum();

    if hf_version >= HF_VERSION_USE_COLLATERAL {
        pct(amount, 3, 200)
    } else if hf_version >= HF_PER_OUTPUT_UNLOCK_VERSION {
        pct(amount, 1, 200)
    } else {
        unlock_tier_fee(amount, unlock_time)
    }
}

/// Fee for an XUSD → XHV conversion, in xUSD.
pub fn get_onshore_fee(
    dsts: &[TxDestinationEntry],
    unlock_time: u32,
    hf_version: u8,
) -> u64 {
    let amount_usd: u64 = dsts
        .iter()
        .filter(|d| d.amount != 0 && !d.is_collateral)
        .map(|d| d.amount_usd)
        .sum();

    if hf_version >= HF_VERSION_USE_COLLATERAL {
        pct(amount_usd, 3, 200)
    } else if hf_version >= HF_PER_OUTPUT_UNLOCK_VERSION {
        pct(amount_usd, 1, 200)
    } else {
        unlock_tier_fee(amount_usd, unlock_time)
    }
}

/// Fee for an XUSD → xAsset conversion, in xUSD.
pub fn get_xusd_to_xasset_fee(dsts: &[TxDestinationEntry], hf_version: u8) -> u64 {
    let amount_usd: u64 = dsts
        .iter()
        .filter(|d| d.amount_xasset != 0)
        .map(|d| d.amount_usd)
        .sum();

    if hf_version >= HF_VERSION_USE_COLLATERAL {
        pct(amount_usd, 15, 1000)
    } else if hf_version >= HF_VERSION_XASSET_FEES_V2 {
        pct(amount_usd, 5, 1000)
    } else {
        pct(amount_usd, 3, 1000)
    }
}

/// Fee for an xAsset → XUSD conversion, in the xAsset.
pub fn get_xasset_to_xusd_fee(dsts: &[TxDestinationEntry], hf_version: u8) -> u64 {
    let amount_xasset: u64 = dsts
        .iter()
        .filter(|d| d.amount_usd != 0)
        .map(|d| d.amount_xasset)
        .sum();

    if hf_version >= HF_VERSION_USE_COLLATERAL {
        pct(amount_xasset, 15, 1000)
    } else if hf_version >= HF_VERSION_XASSET_FEES_V2 {
        pct(amount_xasset, 5, 1000)
    } else {
        pct(amount_xasset, 3, 1000)
    }
}
