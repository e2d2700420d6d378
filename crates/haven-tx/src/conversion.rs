//! Conversion amounts, the block conversion cap, and pricing-record
//! freshness.
//!
//! All conversions route through xUSD. Rates are atomic units per COIN;
//! at hf ≥ PER_OUTPUT_UNLOCK the XHV leg picks the rate directionally
//! (`max(ma, spot)` onshore, `min(ma, spot)` offshore) so neither
//! direction can arbitrage the moving average against the spot price.

use haven_types::constants::hf::HF_PER_OUTPUT_UNLOCK_VERSION;
use haven_types::constants::{COIN, PRICING_RECORD_VALID_BLOCKS};
use haven_types::PricingRecord;

use haven_crypto::Hash;

use crate::classify::TransactionType;
use crate::TxError;

/// Rate scale: rates quote atomic units per 10^12.
const RATE_SCALE: u128 = 1_000_000_000_000;

/// One mainnet transaction used an eleven-block-old pricing record and
/// is already buried; it stays valid forever.
const PR_EXCEPTION_TX: &str = "3e61439c9f751a56777a1df1479ce70311755b9d42db5bcbbd873c6f09a020a6";

/// The XHV↔xUSD rate for `tx_type` at `hf_version`.
fn xhv_rate(pr: &PricingRecord, tx_type: TransactionType, hf_version: u8) -> u64 {
    if hf_version >= HF_PER_OUTPUT_UNLOCK_VERSION {
        if tx_type == TransactionType::Onshore {
            pr.onshore_price()
        } else {
            pr.offshore_price()
        }
    } else {
        pr.ma_rate()
    }
}

/// Value of `amount` units of `asset` in xUSD.
pub fn get_xusd_amount(
    amount: u64,
    asset_type: &str,
    pr: &PricingRecord,
    tx_type: TransactionType,
    hf_version: u8,
) -> Result<u64, TxError> {
    if asset_type == "XUSD" {
        return Ok(amount);
    }

    if asset_type == "XHV" {
        let rate = xhv_rate(pr, tx_type, hf_version);
        if rate == 0 {
            return Err(TxError::Economic("zero XHV exchange rate".into()));
        }
        Ok((amount as u128 * rate as u128 / RATE_SCALE) as u64)
    } else {
        let rate = pr.rate(asset_type)?;
        Ok((amount as u128 * RATE_SCALE / rate as u128) as u64)
    }
}

/// Value of `xusd_amount` in the destination xAsset.
pub fn get_xasset_amount(
    xusd_amount: u64,
    to_asset_type: &str,
    pr: &PricingRecord,
) -> Result<u64, TxError> {
    let rate = pr.rate(to_asset_type)?;
    Ok((xusd_amount as u128 * rate as u128 / RATE_SCALE) as u64)
}

/// Value of `xusd_amount` in XHV, using the directional rate.
pub fn get_xhv_amount(
    xusd_amount: u64,
    pr: &PricingRecord,
    tx_type: TransactionType,
    hf_version: u8,
) -> Result<u64, TxError> {
    let rate = xhv_rate(pr, tx_type, hf_version);
    if rate == 0 {
        return Err(TxError::Economic("zero XHV exchange rate".into()));
    }
    Ok((xusd_amount as u128 * RATE_SCALE / rate as u128) as u64)
}

/// Per-block conversion throughput cap in atomic XHV:
/// `(⌊(mcap·3000)^0.42⌋ + 0.5% of supply) · COIN`, with the market cap
/// priced at `min(ma, spot)`.
pub fn get_block_cap(supply_amounts: &[(String, u128)], pr: &PricingRecord) -> u64 {
    let xhv_supply_atomic = supply_amounts
        .iter()
        .find(|(asset, _)| asset == "XHV")
        .map(|(_, amount)| *amount)
        .unwrap_or(0);
    let xhv_supply = (xhv_supply_atomic / COIN as u128) as u64;

    let price = pr.offshore_price() as f64 / COIN as f64;
    let market_cap = (xhv_supply as f64 * price) as u64;

    let cap_coins =
        (market_cap as f64 * 3000.0).powf(0.42) as u128 + (xhv_supply as u128 * 5) / 1000;
    (cap_coins * COIN as u128).min(u64::MAX as u128) as u64
}

/// Whether a transaction at `current_height` may use the pricing record
/// from `pr_height`. The record must be strictly older than the current
/// block and at most `PRICING_RECORD_VALID_BLOCKS` behind, with one
/// grandfathered exception.
pub fn tx_pr_height_valid(current_height: u64, pr_height: u64, tx_hash: &Hash) -> bool {
    if pr_height >= current_height {
        return false;
    }
    if pr_height < current_height.saturating_sub(PRICING_RECORD_VALID_BLOCKS) {
        return hex::encode(tx_hash) == PR_EXCEPTION_TX;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PricingRecord {
        PricingRecord {
            // Spot above MA: offshore uses MA, onshore uses spot.
            xusd: 2 * COIN,
            unused1: COIN + COIN / 2,
            xbtc: 25_000_000,
            xjpy: 140 * COIN,
            ..PricingRecord::empty()
        }
    }

    #[test]
    fn xusd_amount_identity() {
        let pr = record();
        assert_eq!(
            get_xusd_amount(123, "XUSD", &pr, TransactionType::OffshoreTransfer, 20).unwrap(),
            123
        );
    }

    #[test]
    fn xhv_leg_picks_directional_rate() {
        let pr = record();
        // Offshore: min(ma, spot) = 1.5 COIN per XHV.
        let offshore =
            get_xusd_amount(10 * COIN, "XHV", &pr, TransactionType::Offshore, 20).unwrap();
        assert_eq!(offshore, 15 * COIN);
        // Onshore: max(ma, spot) = 2 COIN per XHV.
        let onshore =
            get_xusd_amount(10 * COIN, "XHV", &pr, TransactionType::Onshore, 20).unwrap();
        assert_eq!(onshore, 20 * COIN);
    }

    #[test]
    fn old_forks_use_raw_ma() {
        let pr = record();
        let amount = get_xusd_amount(10 * COIN, "XHV", &pr, TransactionType::Offshore, 10).unwrap();
        assert_eq!(amount, 15 * COIN);
        let amount = get_xusd_amount(10 * COIN, "XHV", &pr, TransactionType::Onshore, 10).unwrap();
        // MA applies to both directions before the fork.
        assert_eq!(amount, 15 * COIN);
    }

    #[test]
    fn xasset_legs_are_inverse() {
        let pr = record();
        let usd = get_xusd_amount(1_000_000_000, "XJPY", &pr, TransactionType::XassetToXusd, 20)
            .unwrap();
        let back = get_xasset_amount(usd, "XJPY", &pr).unwrap();
        // Truncation may lose at most a few atomic units.
        assert!(back <= 1_000_000_000 && back > 1_000_000_000 - 200);
    }

    #[test]
    fn xhv_roundtrip_under_one_rate() {
        let pr = record();
        let usd = get_xusd_amount(7 * COIN, "XHV", &pr, TransactionType::Offshore, 20).unwrap();
        let xhv = get_xhv_amount(usd, &pr, TransactionType::Offshore, 20).unwrap();
        assert!(xhv <= 7 * COIN && xhv >= 7 * COIN - 2);
    }

    #[test]
    fn block_cap_grows_with_supply() {
        let pr = record();
        let small = get_block_cap(&[("XHV".into(), 1_000_000 * COIN as u128)], &pr);
        let large = get_block_cap(&[("XHV".into(), 30_000_000 * COIN as u128)], &pr);
        assert!(large > small);
        assert!(small > 0);
    }

    #[test]
    fn pricing_record_window() {
        let txid = [0u8; 32];
        // Strictly older than current, within the window.
        assert!(tx_pr_height_valid(100, 99, &txid));
        assert!(tx_pr_height_valid(100, 90, &txid));
        // At or after current.
        assert!(!tx_pr_height_valid(100, 100, &txid));
        assert!(!tx_pr_height_valid(100, 101, &txid));
        // Beyond the window.
        assert!(!tx_pr_height_valid(100, 89, &txid));
    }

    #[test]
    fn pricing_record_exception_hash() {
        let mut txid = [0u8; 32];
        txid.copy_from_slice(&hex::decode(PR_EXCEPTION_TX).unwrap());
        assert!(tx_pr_height_valid(100, 89, &txid));
        assert!(tx_pr_height_valid(100, 1, &txid));
        // The exception does not excuse a future record.
        assert!(!tx_pr_height_valid(100, 100, &txid));
    }
}
