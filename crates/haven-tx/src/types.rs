//! The wire model: input/output variants, transaction prefix,
//! transaction, and block.
//!
//! After decoding, inputs and outputs are uniformly haven-shaped (the
//! legacy variants survive only as long as a caller builds them by
//! hand); the codec demotes them back to the era-appropriate variants
//! on save. Hash, prunable-hash, and blob-size caches publish through
//! `OnceLock`, so concurrent readers observe either a completed value
//! or nothing; every mutating path swaps in fresh cells.

use std::sync::OnceLock;

use haven_crypto::{Hash, KeyImage, PublicKey, ViewTag};
use serde_json::{json, Value};

use haven_crypto::rct::RctSig;
use haven_crypto::ring::Signature;

/// Binary variant tags (fixed wire values).
pub mod wire_tag {
    pub mod input {
        pub const GEN: u8 = 0xff;
        pub const TO_SCRIPT: u8 = 0x00;
        pub const TO_SCRIPTHASH: u8 = 0x01;
        pub const TO_KEY: u8 = 0x02;
        pub const OFFSHORE: u8 = 0x03;
        pub const ONSHORE: u8 = 0x04;
        pub const XASSET: u8 = 0x05;
        pub const HAVEN_KEY: u8 = 0x06;
    }
    pub mod output {
        pub const TO_SCRIPT: u8 = 0x00;
        pub const TO_SCRIPTHASH: u8 = 0x01;
        pub const TO_KEY: u8 = 0x02;
        pub const OFFSHORE: u8 = 0x03;
        pub const XASSET: u8 = 0x05;
        pub const HAVEN_KEY: u8 = 0x06;
        pub const HAVEN_TAGGED_KEY: u8 = 0x07;
    }
    pub const TRANSACTION: u8 = 0xcc;
    pub const BLOCK: u8 = 0xbb;
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxIn {
    /// Coinbase generation input.
    Gen { height: u64 },
    /// Script spend (legacy, unused on mainnet).
    ToScript {
        prev: Hash,
        prevout: u64,
        sigset: Vec<u8>,
    },
    /// Script-hash spend (legacy, unused on mainnet).
    ToScriptHash {
        prev: Hash,
        prevout: u64,
        keys: Vec<PublicKey>,
        script: Vec<u8>,
        sigset: Vec<u8>,
    },
    /// XHV key spend (legacy variant set).
    ToKey {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// xUSD key spend in an offshore-era transfer.
    Offshore {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// xUSD key spend converting back to XHV.
    Onshore {
        amount: u64,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// xAsset key spend; the tag must not be XHV or XUSD.
    XAsset {
        amount: u64,
        asset_type: String,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    /// Unified input carrying any asset tag.
    HavenKey {
        amount: u64,
        asset_type: String,
        key_offsets: Vec<u64>,
        key_image: KeyImage,
    },
}

impl TxIn {
    pub fn wire_tag(&self) -> u8 {
        use wire_tag::input::*;
        match self {
            TxIn::Gen { .. } => GEN,
            TxIn::ToScript { .. } => TO_SCRIPT,
            TxIn::ToScriptHash { .. } => TO_SCRIPTHASH,
            TxIn::ToKey { .. } => TO_KEY,
            TxIn::Offshore { .. } => OFFSHORE,
            TxIn::Onshore { .. } => ONSHORE,
            TxIn::XAsset { .. } => XASSET,
            TxIn::HavenKey { .. } => HAVEN_KEY,
        }
    }

    /// Stable string tag used by the JSON archive.
    pub fn json_tag(&self) -> &'static str {
        match self {
            TxIn::Gen { .. } => "gen",
            TxIn::ToScript { .. } => "script",
            TxIn::ToScriptHash { .. } => "scripthash",
            TxIn::ToKey { .. } => "key",
            TxIn::Offshore { .. } => "offshore",
            TxIn::Onshore { .. } => "onshore",
            TxIn::XAsset { .. } => "xasset",
            TxIn::HavenKey { .. } => "haven_key",
        }
    }

    pub fn amount(&self) -> u64 {
        match self {
            TxIn::ToKey { amount, .. }
            | TxIn::Offshore { amount, .. }
            | TxIn::Onshore { amount, .. }
            | TxIn::XAsset { amount, .. }
            | TxIn::HavenKey { amount, .. } => *amount,
            _ => 0,
        }
    }

    pub fn set_amount(&mut self, value: u64) {
        match self {
            TxIn::ToKey { amount, .. }
            | TxIn::Offshore { amount, .. }
            | TxIn::Onshore { amount, .. }
            | TxIn::XAsset { amount, .. }
            | TxIn::HavenKey { amount, .. } => *amount = value,
            _ => {}
        }
    }

    pub fn key_offsets(&self) -> Option<&[u64]> {
        match self {
            TxIn::ToKey { key_offsets, .. }
            | TxIn::Offshore { key_offsets, .. }
            | TxIn::Onshore { key_offsets, .. }
            | TxIn::XAsset { key_offsets, .. }
            | TxIn::HavenKey { key_offsets, .. } => Some(key_offsets),
            _ => None,
        }
    }

    pub fn key_image(&self) -> Option<&KeyImage> {
        match self {
            TxIn::ToKey { key_image, .. }
            | TxIn::Offshore { key_image, .. }
            | TxIn::Onshore { key_image, .. }
            | TxIn::XAsset { key_image, .. }
            | TxIn::HavenKey { key_image, .. } => Some(key_image),
            _ => None,
        }
    }

    /// Ring size, which is also the v1 signature count for this input.
    pub fn signature_size(&self) -> usize {
        self.key_offsets().map_or(0, |o| o.len())
    }

    pub fn to_json(&self) -> Value {
        match self {
            TxIn::Gen { height } => json!({ "type": self.json_tag(), "height": height }),
            TxIn::HavenKey {
                amount,
                asset_type,
                key_offsets,
                key_image,
            }
            | TxIn::XAsset {
                amount,
                asset_type,
                key_offsets,
                key_image,
            } => json!({
                "type": self.json_tag(),
                "amount": amount.to_string(),
                "asset_type": asset_type,
                "key_offsets": key_offsets,
                "key_image": hex::encode(key_image),
            }),
            TxIn::ToKey {
                amount,
                key_offsets,
                key_image,
            }
            | TxIn::Offshore {
                amount,
                key_offsets,
                key_image,
            }
            | TxIn::Onshore {
                amount,
                key_offsets,
                key_image,
            } => json!({
                "type": self.json_tag(),
                "amount": amount.to_string(),
                "key_offsets": key_offsets,
                "key_image": hex::encode(key_image),
            }),
            _ => json!({ "type": self.json_tag() }),
        }
    }
}

/// Transaction output target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutTarget {
    ToScript {
        keys: Vec<PublicKey>,
        script: Vec<u8>,
    },
    ToScriptHash { hash: Hash },
    ToKey { key: PublicKey },
    Offshore { key: PublicKey },
    XAsset {
        key: PublicKey,
        asset_type: String,
    },
    HavenKey {
        key: PublicKey,
        asset_type: String,
        unlock_time: u64,
        is_collateral: bool,
    },
    HavenTaggedKey {
        key: PublicKey,
        asset_type: String,
        unlock_time: u64,
        is_collateral: bool,
        view_tag: ViewTag,
    },
}

impl TxOutTarget {
    pub fn wire_tag(&self) -> u8 {
        use wire_tag::output::*;
        match self {
            TxOutTarget::ToScript { .. } => TO_SCRIPT,
            TxOutTarget::ToScriptHash { .. } => TO_SCRIPTHASH,
            TxOutTarget::ToKey { .. } => TO_KEY,
            TxOutTarget::Offshore { .. } => OFFSHORE,
            TxOutTarget::XAsset { .. } => XASSET,
            TxOutTarget::HavenKey { .. } => HAVEN_KEY,
            TxOutTarget::HavenTaggedKey { .. } => HAVEN_TAGGED_KEY,
        }
    }

    pub fn json_tag(&self) -> &'static str {
        match self {
            TxOutTarget::ToScript { .. } => "script",
            TxOutTarget::ToScriptHash { .. } => "scripthash",
            TxOutTarget::ToKey { .. } => "key",
            TxOutTarget::Offshore { .. } => "offshore",
            TxOutTarget::XAsset { .. } => "xasset",
            TxOutTarget::HavenKey { .. } => "haven_key",
            TxOutTarget::HavenTaggedKey { .. } => "haven_tagged_key",
        }
    }

    /// One-time public key, for every keyed variant.
    pub fn public_key(&self) -> Option<&PublicKey> {
        match self {
            TxOutTarget::ToKey { key }
            | TxOutTarget::Offshore { key }
            | TxOutTarget::XAsset { key, .. }
            | TxOutTarget::HavenKey { key, .. }
            | TxOutTarget::HavenTaggedKey { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Asset tag implied or carried by the variant.
    pub fn asset_type(&self) -> Option<&str> {
        match self {
            TxOutTarget::ToKey { .. } => Some("XHV"),
            TxOutTarget::Offshore { .. } => Some("XUSD"),
            TxOutTarget::XAsset { asset_type, .. }
            | TxOutTarget::HavenKey { asset_type, .. }
            | TxOutTarget::HavenTaggedKey { asset_type, .. } => Some(asset_type),
            _ => None,
        }
    }

    pub fn unlock_time(&self) -> Option<u64> {
        match self {
            TxOutTarget::HavenKey { unlock_time, .. }
            | TxOutTarget::HavenTaggedKey { unlock_time, .. } => Some(*unlock_time),
            _ => None,
        }
    }

    pub fn is_collateral(&self) -> bool {
        match self {
            TxOutTarget::HavenKey { is_collateral, .. }
            | TxOutTarget::HavenTaggedKey { is_collateral, .. } => *is_collateral,
            _ => false,
        }
    }

    pub fn view_tag(&self) -> Option<ViewTag> {
        match self {
            TxOutTarget::HavenTaggedKey { view_tag, .. } => Some(*view_tag),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut v = json!({ "type": self.json_tag() });
        if let Some(key) = self.public_key() {
            v["key"] = Value::String(hex::encode(key));
        }
        if let Some(asset) = self.asset_type() {
            v["asset_type"] = Value::String(asset.to_string());
        }
        if let Some(t) = self.unlock_time() {
            v["unlock_time"] = Value::from(t);
            v["is_collateral"] = Value::from(self.is_collateral());
        }
        if let Some(tag) = self.view_tag() {
            v["view_tag"] = Value::from(tag);
        }
        v
    }
}

/// An output: cleartext amount (zero once hidden by rct) and target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub amount: u64,
    pub target: TxOutTarget,
}

impl TxOut {
    pub fn to_json(&self) -> Value {
        json!({ "amount": self.amount.to_string(), "target": self.target.to_json() })
    }
}

/// Everything covered by the prefix hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPrefix {
    pub version: u64,
    /// Transaction-level unlock time (versions below POU only).
    pub unlock_time: u64,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub extra: Vec<u8>,
    /// Block height whose pricing record priced this conversion.
    pub pricing_record_height: u64,
    /// Serialized circulating-supply snapshot (versions 3 and 4 only).
    pub offshore_data: Vec<u8>,
    pub amount_burnt: u64,
    pub amount_minted: u64,
    /// Wire-level per-output unlock times (POU-era transactions).
    pub output_unlock_times: Vec<u64>,
    /// Wire-level collateral output indices (collateral-era conversions).
    pub collateral_indices: Vec<u32>,
}

impl Default for TransactionPrefix {
    fn default() -> Self {
        TransactionPrefix {
            version: 1,
            unlock_time: 0,
            vin: Vec::new(),
            vout: Vec::new(),
            extra: Vec::new(),
            pricing_record_height: 0,
            offshore_data: Vec::new(),
            amount_burnt: 0,
            amount_minted: 0,
            output_unlock_times: Vec::new(),
            collateral_indices: Vec::new(),
        }
    }
}

impl TransactionPrefix {
    pub fn to_json(&self) -> Value {
        json!({
            "version": self.version,
            "unlock_time": self.unlock_time,
            "vin": self.vin.iter().map(TxIn::to_json).collect::<Vec<_>>(),
            "vout": self.vout.iter().map(TxOut::to_json).collect::<Vec<_>>(),
            "extra": hex::encode(&self.extra),
            "pricing_record_height": self.pricing_record_height,
            "amount_burnt": self.amount_burnt.to_string(),
            "amount_minted": self.amount_minted.to_string(),
        })
    }
}

/// A full transaction: prefix plus signatures, with lazily computed
/// hash and size caches.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub prefix: TransactionPrefix,
    /// Per-input ring signatures (version 1).
    pub signatures: Vec<Vec<Signature>>,
    /// Confidential signature bundle (version ≥ 2).
    pub rct_signatures: RctSig,
    /// Whether the prunable section was dropped during decode.
    pub pruned: bool,
    /// Byte length of the encoded prefix, recorded by the codec.
    pub prefix_size: usize,
    /// Byte length of the unprunable region, recorded by the codec.
    pub unprunable_size: usize,

    pub(crate) hash_cache: OnceLock<Hash>,
    pub(crate) prunable_hash_cache: OnceLock<Hash>,
    pub(crate) blob_size_cache: OnceLock<usize>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the null transaction.
    pub fn set_null(&mut self) {
        *self = Transaction::default();
    }

    /// Drop all cached hashes and sizes. Must be called by every path
    /// that mutates the transaction after construction.
    pub fn invalidate_hashes(&mut self) {
        self.hash_cache = OnceLock::new();
        self.prunable_hash_cache = OnceLock::new();
        self.blob_size_cache = OnceLock::new();
    }

    pub fn is_hash_valid(&self) -> bool {
        self.hash_cache.get().is_some()
    }

    pub fn is_blob_size_valid(&self) -> bool {
        self.blob_size_cache.get().is_some()
    }

    /// Seed the hash cache with an externally computed value.
    pub fn set_hash(&self, hash: Hash) {
        let _ = self.hash_cache.set(hash);
    }

    pub fn set_blob_size(&self, size: usize) {
        let _ = self.blob_size_cache.set(size);
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.prefix.vin.first(), Some(TxIn::Gen { .. }))
    }

    pub fn to_json(&self) -> Value {
        let mut v = json!({ "type": "tx", "prefix": self.prefix.to_json() });
        if self.prefix.version == 1 {
            v["signature_counts"] = Value::from(
                self.signatures.iter().map(Vec::len).collect::<Vec<_>>(),
            );
        } else {
            v["rct_type"] = Value::from(self.rct_signatures.rct_type);
        }
        v
    }
}

/// Block header fields covered by proof of work.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub prev_id: Hash,
    pub nonce: u32,
}

/// A block: header, coinbase transaction, and the hashes of every
/// other included transaction.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub header: BlockHeader,
    pub miner_tx: Transaction,
    pub tx_hashes: Vec<Hash>,

    pub(crate) hash_cache: OnceLock<Hash>,
}

impl Block {
    pub fn invalidate_hashes(&mut self) {
        self.hash_cache = OnceLock::new();
    }

    pub fn is_hash_valid(&self) -> bool {
        self.hash_cache.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn haven_in(asset: &str, amount: u64) -> TxIn {
        TxIn::HavenKey {
            amount,
            asset_type: asset.into(),
            key_offsets: vec![1, 2, 3],
            key_image: [9u8; 32],
        }
    }

    #[test]
    fn wire_tags_are_fixed() {
        assert_eq!(TxIn::Gen { height: 0 }.wire_tag(), 0xff);
        assert_eq!(haven_in("XHV", 0).wire_tag(), 0x06);
        assert_eq!(
            TxOutTarget::HavenTaggedKey {
                key: [0u8; 32],
                asset_type: "XHV".into(),
                unlock_time: 0,
                is_collateral: false,
                view_tag: 1,
            }
            .wire_tag(),
            0x07
        );
        assert_eq!(TxOutTarget::Offshore { key: [0u8; 32] }.wire_tag(), 0x03);
    }

    #[test]
    fn json_tags_are_stable() {
        assert_eq!(TxIn::Gen { height: 1 }.json_tag(), "gen");
        assert_eq!(haven_in("XUSD", 0).json_tag(), "haven_key");
        assert_eq!(TxOutTarget::ToKey { key: [0u8; 32] }.json_tag(), "key");
    }

    #[test]
    fn legacy_targets_imply_assets() {
        assert_eq!(TxOutTarget::ToKey { key: [0u8; 32] }.asset_type(), Some("XHV"));
        assert_eq!(
            TxOutTarget::Offshore { key: [0u8; 32] }.asset_type(),
            Some("XUSD")
        );
    }

    #[test]
    fn cache_invalidation() {
        let mut tx = Transaction::new();
        tx.set_hash([1u8; 32]);
        tx.set_blob_size(77);
        assert!(tx.is_hash_valid());
        assert!(tx.is_blob_size_valid());
        tx.invalidate_hashes();
        assert!(!tx.is_hash_valid());
        assert!(!tx.is_blob_size_valid());
    }

    #[test]
    fn clone_copies_cached_values() {
        let mut tx = Transaction::new();
        tx.prefix.version = 2;
        tx.set_hash([5u8; 32]);
        let copy = tx.clone();
        assert_eq!(copy.hash_cache.get(), Some(&[5u8; 32]));
    }

    #[test]
    fn signature_size_follows_ring() {
        assert_eq!(haven_in("XHV", 0).signature_size(), 3);
        assert_eq!(TxIn::Gen { height: 4 }.signature_size(), 0);
    }
}
