//! Volatility-based collateral for XHV↔xUSD conversions.
//!
//! The requirement scales with the ratio of the xAsset market cap to
//! the XHV market cap and with how much the conversion itself would
//! move that ratio. The market-cap ratios are taken in arbitrary
//! precision before the floating-point `exp`/`sqrt` steps; the ratio
//! terms can overflow an `f64` division when the xAsset cap dwarfs the
//! XHV cap.

use num::rational::Ratio;
use num::{BigInt, ToPrimitive};

use haven_types::constants::COIN;
use haven_types::PricingRecord;

use crate::classify::TransactionType;
use crate::TxError;

type BigRational = Ratio<BigInt>;

fn big_ratio(numerator: u128, denominator: u128) -> Option<BigRational> {
    if denominator == 0 {
        return None;
    }
    Some(BigRational::new(
        BigInt::from(numerator),
        BigInt::from(denominator),
    ))
}

/// Sum of all non-XHV market caps, denominated in xUSD atomic units:
/// `Σ supply_a · COIN / rate_a`.
fn xasset_market_cap(
    supply_amounts: &[(String, u128)],
    pr: &PricingRecord,
) -> Result<u128, TxError> {
    let mut mcap: u128 = 0;
    for (asset, supply) in supply_amounts {
        if asset == "XHV" {
            continue;
        }
        let rate = pr.rate(asset)? as u128;
        mcap += supply * COIN as u128 / rate;
    }
    Ok(mcap)
}

/// XHV market cap in xUSD atomic units at the directional price.
fn xhv_market_cap(supply_amounts: &[(String, u128)], price_xhv: u64) -> u128 {
    let supply = supply_amounts
        .iter()
        .find(|(asset, _)| asset == "XHV")
        .map(|(_, amount)| *amount)
        .unwrap_or(0);
    supply * price_xhv as u128 / COIN as u128
}

/// Market-cap VBS rate: exponential while the ratio is small, a square
/// root envelope once it passes 0.9.
fn rate_mcvbs(ratio_mcap: f64) -> f64 {
    if ratio_mcap == 0.0 {
        0.0
    } else if ratio_mcap < 0.9 {
        ((ratio_mcap + ratio_mcap.sqrt()) * 2.0).exp() - 0.5
    } else {
        ratio_mcap.sqrt() * 40.0
    }
}

/// XHV collateral required to convert `amount` (XHV for offshore, xUSD
/// for onshore) under the supplied pricing record and circulating
/// supplies.
pub fn get_collateral_requirements(
    tx_type: TransactionType,
    amount: u64,
    pr: &PricingRecord,
    supply_amounts: &[(String, u128)],
) -> Result<u64, TxError> {
    use TransactionType as Tt;

    match tx_type {
        Tt::Transfer | Tt::OffshoreTransfer | Tt::XassetTransfer => return Ok(0),
        Tt::XusdToXasset | Tt::XassetToXusd => return Ok(0),
        Tt::Offshore | Tt::Onshore => {}
    }

    let price_xhv = match tx_type {
        Tt::Offshore => pr.offshore_price(),
        _ => pr.onshore_price(),
    };
    if price_xhv == 0 {
        return Err(TxError::Economic("zero XHV price in pricing record".into()));
    }

    let mcap_xassets = xasset_market_cap(supply_amounts, pr)?;
    let mcap_xhv = xhv_market_cap(supply_amounts, price_xhv);
    if mcap_xhv == 0 {
        return Err(TxError::Economic("zero XHV market cap".into()));
    }

    let ratio_mcap = big_ratio(mcap_xassets, mcap_xhv)
        .and_then(|r| r.to_f64())
        .ok_or_else(|| TxError::Economic("market-cap ratio overflow".into()))?;

    let ratio_spread = if ratio_mcap >= 1.0 { 0.0 } else { 1.0 - ratio_mcap };
    let mcvbs = rate_mcvbs(ratio_mcap);
    let srvbs = (1.0 + ratio_spread.sqrt()).exp() + mcvbs + 1.5;

    let amount_128 = amount as u128;
    let collateral = match tx_type {
        Tt::Offshore => {
            // The conversion burns XHV cap and mints xAsset cap.
            let amount_usd = amount_128 * price_xhv as u128 / COIN as u128;
            if mcap_xhv <= amount_usd {
                return Err(TxError::Economic(
                    "conversion exceeds the XHV market cap".into(),
                ));
            }
            let ratio_mcap_new = big_ratio(amount_usd + mcap_xassets, mcap_xhv - amount_usd)
                .and_then(|r| r.to_f64())
                .ok_or_else(|| TxError::Economic("market-cap ratio overflow".into()))?;

            let ratio_mcri = if ratio_mcap == 0.0 {
                ratio_mcap_new
            } else {
                (ratio_mcap_new / ratio_mcap - 1.0).abs()
            };

            let slippage_multiplier = if ratio_mcap_new <= 0.1 { 3.0 } else { 10.0 };
            let vbs = (mcvbs + ratio_mcri.sqrt() * slippage_multiplier).max(1.0);

            let vbs_scaled = (vbs * COIN as f64) as u64;
            vbs_scaled as u128 * amount_128 / COIN as u128
        }
        Tt::Onshore => {
            // The conversion burns xUSD cap and mints XHV cap.
            let ratio_mcap_new = if mcap_xassets >= amount_128 {
                big_ratio(mcap_xassets - amount_128, mcap_xhv + amount_128)
                    .and_then(|r| r.to_f64())
                    .ok_or_else(|| TxError::Economic("market-cap ratio overflow".into()))?
            } else {
                0.0
            };

            let ratio_sri = if ratio_mcap == 0.0 {
                -ratio_mcap_new
            } else {
                (1.0 - ratio_mcap_new) / (1.0 - ratio_mcap) - 1.0
            }
            .max(0.0);

            let vbs = (mcvbs.max(srvbs) + ratio_sri.sqrt() * 3.0).max(1.0);

            let vbs_scaled = (vbs * COIN as f64) as u64;
            vbs_scaled as u128 * amount_128 / price_xhv as u128
        }
        _ => unreachable!(),
    };

    Ok(collateral.min(u64::MAX as u128) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PricingRecord {
        PricingRecord {
            xusd: 2 * COIN,
            unused1: COIN + COIN / 2,
            xbtc: 25_000_000,
            ..PricingRecord::empty()
        }
    }

    fn supplies(xhv: u64, xusd: u64) -> Vec<(String, u128)> {
        vec![
            ("XHV".into(), xhv as u128 * COIN as u128),
            ("XUSD".into(), xusd as u128 * COIN as u128),
        ]
    }

    #[test]
    fn transfers_need_no_collateral() {
        let pr = record();
        let supply = supplies(1_000_000, 100_000);
        for tt in [
            TransactionType::Transfer,
            TransactionType::OffshoreTransfer,
            TransactionType::XassetTransfer,
            TransactionType::XusdToXasset,
            TransactionType::XassetToXusd,
        ] {
            assert_eq!(
                get_collateral_requirements(tt, 50 * COIN, &pr, &supply).unwrap(),
                0
            );
        }
    }

    #[test]
    fn offshore_collateral_is_positive_and_scales() {
        let pr = record();
        let supply = supplies(10_000_000, 1_000_000);
        let small =
            get_collateral_requirements(TransactionType::Offshore, 100 * COIN, &pr, &supply)
                .unwrap();
        let large =
            get_collateral_requirements(TransactionType::Offshore, 10_000 * COIN, &pr, &supply)
                .unwrap();
        assert!(small > 0);
        // At minimum the VBS floor of 1.0 means collateral >= amount.
        assert!(small >= 100 * COIN);
        assert!(large > small);
    }

    #[test]
    fn collateral_monotone_in_amount() {
        let pr = record();
        let supply = supplies(10_000_000, 4_000_000);
        let mut last = 0u64;
        for amount in [1, 10, 100, 1000, 10_000] {
            let c = get_collateral_requirements(
                TransactionType::Offshore,
                amount * COIN,
                &pr,
                &supply,
            )
            .unwrap();
            assert!(c >= last, "collateral decreased at {amount}");
            last = c;
        }
    }

    #[test]
    fn onshore_collateral_uses_onshore_price() {
        let pr = record();
        let supply = supplies(10_000_000, 2_000_000);
        let c = get_collateral_requirements(TransactionType::Onshore, 1_000 * COIN, &pr, &supply)
            .unwrap();
        // vbs ≥ 1 means at least amount_usd / price_xhv in XHV.
        let floor = 1_000u128 * COIN as u128 * COIN as u128 / pr.onshore_price() as u128;
        assert!(c as u128 >= floor);
    }

    #[test]
    fn empty_xhv_supply_is_an_error() {
        let pr = record();
        let supply = vec![("XUSD".to_string(), 100 * COIN as u128)];
        assert!(get_collateral_requirements(
            TransactionType::Offshore,
            COIN,
            &pr,
            &supply
        )
        .is_err());
    }

    #[test]
    fn offshore_larger_than_market_cap_is_an_error() {
        let pr = record();
        let supply = supplies(100, 50);
        assert!(get_collateral_requirements(
            TransactionType::Offshore,
            1_000_000 * COIN,
            &pr,
            &supply
        )
        .is_err());
    }

    #[test]
    fn zero_xasset_cap_still_works() {
        // No xAssets in circulation: ratio is zero, mcvbs zero, floor 1.
        let pr = record();
        let supply = vec![("XHV".to_string(), 1_000_000 * COIN as u128)];
        let c = get_collateral_requirements(TransactionType::Offshore, 10 * COIN, &pr, &supply)
            .unwrap();
        assert!(c >= 10 * COIN);
    }
}
