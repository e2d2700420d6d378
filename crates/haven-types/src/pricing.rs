//! Oracle pricing records.
//!
//! A pricing record is an immutable per-block snapshot of exchange
//! rates, signed by the oracle (signature verification happens outside
//! this crate). All rates are atomic units of the asset per one XHV,
//! except `xusd`/`unused1` which quote XHV in xUSD: `xusd` is the spot
//! rate and `unused1` the moving average, the field keeping its
//! historical wire name.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PricingError {
    #[error("no rate for asset type {0}")]
    MissingRate(String),

    #[error("zero exchange rate for asset type {0}")]
    ZeroRate(String),
}

/// Exchange-rate snapshot for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRecord {
    pub xag: u64,
    pub xau: u64,
    pub xaud: u64,
    pub xbtc: u64,
    pub xcad: u64,
    pub xchf: u64,
    pub xcny: u64,
    pub xeur: u64,
    pub xgbp: u64,
    pub xjpy: u64,
    pub xnok: u64,
    pub xnzd: u64,
    /// XHV spot price in xUSD.
    pub xusd: u64,
    /// XHV moving-average price in xUSD.
    pub unused1: u64,
    pub unused2: u64,
    pub unused3: u64,
    /// Oracle signature over the rate fields.
    #[serde(with = "sig_serde")]
    pub signature: [u8; 64],
}

/// Hex round-tripping for the fixed-size signature field.
mod sig_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sig: &[u8; 64], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(sig))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 64], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        if bytes.len() != 64 {
            return Err(serde::de::Error::custom("signature must be 64 bytes"));
        }
        let mut sig = [0u8; 64];
        sig.copy_from_slice(&bytes);
        Ok(sig)
    }
}

impl Default for PricingRecord {
    fn default() -> Self {
        PricingRecord {
            xag: 0,
            xau: 0,
            xaud: 0,
            xbtc: 0,
            xcad: 0,
            xchf: 0,
            xcny: 0,
            xeur: 0,
            xgbp: 0,
            xjpy: 0,
            xnok: 0,
            xnzd: 0,
            xusd: 0,
            unused1: 0,
            unused2: 0,
            unused3: 0,
            signature: [0u8; 64],
        }
    }
}

impl PricingRecord {
    /// An all-zero record, as found in blocks before the oracle fork.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// Exchange rate slot for `asset`. XHV has no slot; its price is the
    /// xUSD pair itself.
    pub fn rate(&self, asset: &str) -> Result<u64, PricingError> {
        let rate = match asset {
            "XAG" => self.xag,
            "XAU" => self.xau,
            "XAUD" => self.xaud,
            "XBTC" => self.xbtc,
            "XCAD" => self.xcad,
            "XCHF" => self.xchf,
            "XCNY" => self.xcny,
            "XEUR" => self.xeur,
            "XGBP" => self.xgbp,
            "XJPY" => self.xjpy,
            "XNOK" => self.xnok,
            "XNZD" => self.xnzd,
            "XUSD" => self.xusd,
            _ => return Err(PricingError::MissingRate(asset.to_string())),
        };
        if rate == 0 {
            return Err(PricingError::ZeroRate(asset.to_string()));
        }
        Ok(rate)
    }

    /// XHV price used by offshore conversions: the smaller of the moving
    /// average and the spot rate, removing the directional arbitrage.
    pub fn offshore_price(&self) -> u64 {
        self.unused1.min(self.xusd)
    }

    /// XHV price used by onshore conversions: the larger of the two.
    pub fn onshore_price(&self) -> u64 {
        self.unused1.max(self.xusd)
    }

    /// The raw moving-average XHV rate.
    pub fn ma_rate(&self) -> u64 {
        self.unused1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> PricingRecord {
        PricingRecord {
            xbtc: 25_000_000,
            xjpy: 14_000_000_000_000_000,
            xusd: 2_000_000_000_000,
            unused1: 1_800_000_000_000,
            ..PricingRecord::empty()
        }
    }

    #[test]
    fn empty_record_detection() {
        assert!(PricingRecord::empty().is_empty());
        assert!(!record().is_empty());
    }

    #[test]
    fn rate_lookup() {
        let pr = record();
        assert_eq!(pr.rate("XBTC").unwrap(), 25_000_000);
        assert_eq!(pr.rate("XUSD").unwrap(), 2_000_000_000_000);
        assert!(matches!(pr.rate("XHV"), Err(PricingError::MissingRate(_))));
        assert!(matches!(pr.rate("XAG"), Err(PricingError::ZeroRate(_))));
    }

    #[test]
    fn directional_price_selection() {
        let pr = record();
        assert_eq!(pr.offshore_price(), 1_800_000_000_000);
        assert_eq!(pr.onshore_price(), 2_000_000_000_000);
    }

    #[test]
    fn serde_roundtrip() {
        let mut pr = record();
        pr.signature = [7u8; 64];
        let json = serde_json::to_string(&pr).unwrap();
        let back: PricingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(pr, back);
    }
}
