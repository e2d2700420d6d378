//! Versioned binary codec for transactions and blocks.
//!
//! Three prefix eras exist on the wire:
//!
//! * pre-OFFSHORE (v1..2): `vin, vout, extra` (+ prefix unlock time);
//! * OFFSHORE/POU/COLLATERAL (v3..6): adds pricing-record height,
//!   supply data (v3..4 only), per-output unlock times (v5+), burnt /
//!   minted amounts, and collateral indices (v6+, conversions only);
//!   inputs and outputs use the legacy variant set;
//! * HAVEN_TYPES (v7+): inputs and outputs are the unified haven
//!   variants with unlock times and collateral flags folded in.
//!
//! Loading a legacy transaction promotes its inputs and outputs into
//! the haven form; saving demotes them again. Promotion and demotion
//! are pure functions flanking the raw field codec, so the in-memory
//! representation is uniform regardless of version.

use haven_crypto::rct::{self, rct_type};
use haven_crypto::ring::Signature;
use haven_crypto::serial::{Reader, Writer};
use haven_crypto::{keccak256, Hash, NULL_HASH};
use haven_types::constants::{
    CRYPTONOTE_MAX_TX_PER_BLOCK, CURRENT_TRANSACTION_VERSION, HAVEN_TYPES_TRANSACTION_VERSION,
    COLLATERAL_TRANSACTION_VERSION, OFFSHORE_DATA_LAST_VERSION, OFFSHORE_TRANSACTION_VERSION,
    POU_TRANSACTION_VERSION,
};

use crate::types::{wire_tag, Block, BlockHeader, Transaction, TransactionPrefix, TxIn, TxOut, TxOutTarget};
use crate::TxError;

// --- Input / output variant codec ------------------------------------------

fn write_input(w: &mut Writer, input: &TxIn) {
    w.write_u8(input.wire_tag());
    match input {
        TxIn::Gen { height } => w.write_varint(*height),
        TxIn::ToScript {
            prev,
            prevout,
            sigset,
        } => {
            w.write_bytes(prev);
            w.write_varint(*prevout);
            w.write_blob(sigset);
        }
        TxIn::ToScriptHash {
            prev,
            prevout,
            keys,
            script,
            sigset,
        } => {
            w.write_bytes(prev);
            w.write_varint(*prevout);
            w.write_varint(keys.len() as u64);
            for k in keys {
                w.write_bytes(k);
            }
            w.write_blob(script);
            w.write_blob(sigset);
        }
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
        } => {
            w.write_varint(*amount);
            w.write_varint(key_offsets.len() as u64);
            for o in key_offsets {
                w.write_varint(*o);
            }
            w.write_bytes(key_image);
        }
        TxIn::XAsset {
            amount,
            asset_type,
            key_offsets,
            key_image,
        }
        | TxIn::HavenKey {
            amount,
            asset_type,
            key_offsets,
            key_image,
        } => {
            w.write_varint(*amount);
            w.write_string(asset_type);
            w.write_varint(key_offsets.len() as u64);
            for o in key_offsets {
                w.write_varint(*o);
            }
            w.write_bytes(key_image);
        }
    }
}

fn read_offsets(r: &mut Reader) -> Result<Vec<u64>, TxError> {
    let count = r.read_length()?;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(r.read_varint()?);
    }
    Ok(offsets)
}

fn read_input(r: &mut Reader) -> Result<TxIn, TxError> {
    let tag = r.read_u8()?;
    use wire_tag::input::*;
    Ok(match tag {
        GEN => TxIn::Gen {
            height: r.read_varint()?,
        },
        TO_SCRIPT => TxIn::ToScript {
            prev: r.read_key()?,
            prevout: r.read_varint()?,
            sigset: r.read_blob()?,
        },
        TO_SCRIPTHASH => {
            let prev = r.read_key()?;
            let prevout = r.read_varint()?;
            let nkeys = r.read_length()?;
            let mut keys = Vec::with_capacity(nkeys);
            for _ in 0..nkeys {
                keys.push(r.read_key()?);
            }
            TxIn::ToScriptHash {
                prev,
                prevout,
                keys,
                script: r.read_blob()?,
                sigset: r.read_blob()?,
            }
        }
        TO_KEY => TxIn::ToKey {
            amount: r.read_varint()?,
            key_offsets: read_offsets(r)?,
            key_image: r.read_key()?,
        },
        OFFSHORE => TxIn::Offshore {
            amount: r.read_varint()?,
            key_offsets: read_offsets(r)?,
            key_image: r.read_key()?,
        },
        ONSHORE => TxIn::Onshore {
            amount: r.read_varint()?,
            key_offsets: read_offsets(r)?,
            key_image: r.read_key()?,
        },
        XASSET => TxIn::XAsset {
            amount: r.read_varint()?,
            asset_type: r.read_string()?,
            key_offsets: read_offsets(r)?,
            key_image: r.read_key()?,
        },
        HAVEN_KEY => TxIn::HavenKey {
            amount: r.read_varint()?,
            asset_type: r.read_string()?,
            key_offsets: read_offsets(r)?,
            key_image: r.read_key()?,
        },
        tag => {
            return Err(TxError::UnknownVariantTag {
                tag,
                what: "transaction input",
            })
        }
    })
}

fn write_output(w: &mut Writer, out: &TxOut) {
    w.write_varint(out.amount);
    w.write_u8(out.target.wire_tag());
    match &out.target {
        TxOutTarget::ToScript { keys, script } => {
            w.write_varint(keys.len() as u64);
            for k in keys {
                w.write_bytes(k);
            }
            w.write_blob(script);
        }
        TxOutTarget::ToScriptHash { hash } => w.write_bytes(hash),
        TxOutTarget::ToKey { key } | TxOutTarget::Offshore { key } => w.write_bytes(key),
        TxOutTarget::XAsset { key, asset_type } => {
            w.write_bytes(key);
            w.write_string(asset_type);
        }
        TxOutTarget::HavenKey {
            key,
            asset_type,
            unlock_time,
            is_collateral,
        } => {
            w.write_bytes(key);
            w.write_string(asset_type);
            w.write_varint(*unlock_time);
            w.write_bool(*is_collateral);
        }
        TxOutTarget::HavenTaggedKey {
            key,
            asset_type,
            unlock_time,
            is_collateral,
            view_tag,
        } => {
            w.write_bytes(key);
            w.write_string(asset_type);
            w.write_varint(*unlock_time);
            w.write_bool(*is_collateral);
            w.write_u8(*view_tag);
        }
    }
}

fn read_output(r: &mut Reader) -> Result<TxOut, TxError> {
    let amount = r.read_varint()?;
    let tag = r.read_u8()?;
    use wire_tag::output::*;
    let target = match tag {
        TO_SCRIPT => {
            let nkeys = r.read_length()?;
            let mut keys = Vec::with_capacity(nkeys);
            for _ in 0..nkeys {
                keys.push(r.read_key()?);
            }
            TxOutTarget::ToScript {
                keys,
                script: r.read_blob()?,
            }
        }
        TO_SCRIPTHASH => TxOutTarget::ToScriptHash {
            hash: r.read_key()?,
        },
        TO_KEY => TxOutTarget::ToKey { key: r.read_key()? },
        OFFSHORE => TxOutTarget::Offshore { key: r.read_key()? },
        XASSET => TxOutTarget::XAsset {
            key: r.read_key()?,
            asset_type: r.read_string()?,
        },
        HAVEN_KEY => TxOutTarget::HavenKey {
            key: r.read_key()?,
            asset_type: r.read_string()?,
            unlock_time: r.read_varint()?,
            is_collateral: r.read_bool()?,
        },
        HAVEN_TAGGED_KEY => TxOutTarget::HavenTaggedKey {
            key: r.read_key()?,
            asset_type: r.read_string()?,
            unlock_time: r.read_varint()?,
            is_collateral: r.read_bool()?,
            view_tag: r.read_u8()?,
        },
        tag => {
            return Err(TxError::UnknownVariantTag {
                tag,
                what: "transaction output",
            })
        }
    };
    Ok(TxOut { amount, target })
}

// --- Haven normalization ----------------------------------------------------

/// Map a legacy input to its haven form. The asset tag is implied by
/// the variant; xAsset inputs must not smuggle XHV or XUSD.
pub fn promote_input(input: TxIn) -> Result<TxIn, TxError> {
    Ok(match input {
        TxIn::ToKey {
            amount,
            key_offsets,
            key_image,
        } => TxIn::HavenKey {
            amount,
            asset_type: "XHV".into(),
            key_offsets,
            key_image,
        },
        TxIn::Offshore {
            amount,
            key_offsets,
            key_image,
        }
        | TxIn::Onshore {
            amount,
            key_offsets,
            key_image,
        } => TxIn::HavenKey {
            amount,
            asset_type: "XUSD".into(),
            key_offsets,
            key_image,
        },
        TxIn::XAsset {
            amount,
            asset_type,
            key_offsets,
            key_image,
        } => {
            if asset_type == "XHV" || asset_type == "XUSD" {
                return Err(TxError::InvalidAssetTypes(format!(
                    "{asset_type} in an xasset input"
                )));
            }
            TxIn::HavenKey {
                amount,
                asset_type,
                key_offsets,
                key_image,
            }
        }
        other => other,
    })
}

/// Map a legacy output to its haven form, folding in the per-output
/// unlock time and collateral flag carried beside the output vector.
pub fn promote_output(
    out: TxOut,
    unlock_time: u64,
    is_collateral: bool,
) -> Result<TxOut, TxError> {
    let TxOut { amount, target } = out;
    let target = match target {
        TxOutTarget::ToKey { key } => TxOutTarget::HavenKey {
            key,
            asset_type: "XHV".into(),
            unlock_time,
            is_collateral,
        },
        TxOutTarget::Offshore { key } => TxOutTarget::HavenKey {
            key,
            asset_type: "XUSD".into(),
            unlock_time,
            is_collateral,
        },
        TxOutTarget::XAsset { key, asset_type } => {
            if asset_type == "XHV" || asset_type == "XUSD" {
                return Err(TxError::InvalidAssetTypes(format!(
                    "{asset_type} in an xasset output"
                )));
            }
            TxOutTarget::HavenKey {
                key,
                asset_type,
                unlock_time,
                is_collateral,
            }
        }
        other => other,
    };
    Ok(TxOut { amount, target })
}

/// Map a haven input back to the legacy variant set. An XUSD input is
/// an onshore spend exactly when some output pays out XHV.
pub fn demote_input(input: TxIn, any_xhv_output: bool) -> TxIn {
    match input {
        TxIn::HavenKey {
            amount,
            asset_type,
            key_offsets,
            key_image,
        } => match asset_type.as_str() {
            "XHV" => TxIn::ToKey {
                amount,
                key_offsets,
                key_image,
            },
            "XUSD" => {
                if any_xhv_output {
                    TxIn::Onshore {
                        amount,
                        key_offsets,
                        key_image,
                    }
                } else {
                    TxIn::Offshore {
                        amount,
                        key_offsets,
                        key_image,
                    }
                }
            }
            _ => TxIn::XAsset {
                amount,
                asset_type,
                key_offsets,
                key_image,
            },
        },
        other => other,
    }
}

/// Map a haven output back to the legacy variant set. Tagged outputs
/// keep their haven form; the tag byte disambiguates them on the wire.
pub fn demote_output(out: TxOut) -> TxOut {
    let TxOut { amount, target } = out;
    let target = match target {
        TxOutTarget::HavenKey {
            key, asset_type, ..
        } => match asset_type.as_str() {
            "XHV" => TxOutTarget::ToKey { key },
            "XUSD" => TxOutTarget::Offshore { key },
            _ => TxOutTarget::XAsset { key, asset_type },
        },
        other => other,
    };
    TxOut { amount, target }
}

// --- Prefix codec -----------------------------------------------------------

fn check_version(version: u64) -> Result<(), TxError> {
    if version == 0 || version > CURRENT_TRANSACTION_VERSION {
        return Err(TxError::UnknownVersion(version));
    }
    Ok(())
}

/// Per-output unlock times for the wire, preferring the stored vector
/// (it is what the bytes said) over re-derivation from the outputs.
fn wire_unlock_times(prefix: &TransactionPrefix) -> Vec<u64> {
    if prefix.output_unlock_times.len() == prefix.vout.len() {
        return prefix.output_unlock_times.clone();
    }
    prefix
        .vout
        .iter()
        .map(|o| o.target.unlock_time().unwrap_or(prefix.unlock_time))
        .collect()
}

/// Collateral indices for the wire, preferring the stored vector.
fn wire_collateral_indices(prefix: &TransactionPrefix) -> Vec<u32> {
    if !prefix.collateral_indices.is_empty() {
        return prefix.collateral_indices.clone();
    }
    prefix
        .vout
        .iter()
        .enumerate()
        .filter(|(_, o)| o.target.is_collateral())
        .map(|(i, _)| i as u32)
        .collect()
}

fn check_collateral_indices(indices: &[u32], n_outputs: usize) -> Result<(), TxError> {
    if indices.len() != 2 {
        return Err(TxError::SizeMismatch(
            "conversions carry exactly two collateral indices",
        ));
    }
    if indices.iter().any(|&i| i as usize >= n_outputs) {
        return Err(TxError::SizeMismatch("collateral index out of range"));
    }
    Ok(())
}

pub(crate) fn encode_prefix_into(w: &mut Writer, prefix: &TransactionPrefix) -> Result<(), TxError> {
    let version = prefix.version;
    check_version(version)?;
    w.write_varint(version);
    if version < POU_TRANSACTION_VERSION {
        w.write_varint(prefix.unlock_time);
    }

    if version < HAVEN_TYPES_TRANSACTION_VERSION {
        let any_xhv_output = prefix
            .vout
            .iter()
            .any(|o| o.target.asset_type() == Some("XHV"));

        w.write_varint(prefix.vin.len() as u64);
        for input in &prefix.vin {
            write_input(w, &demote_input(input.clone(), any_xhv_output));
        }

        w.write_varint(prefix.vout.len() as u64);
        for out in &prefix.vout {
            write_output(w, &demote_output(out.clone()));
        }

        w.write_blob(&prefix.extra);

        if version >= OFFSHORE_TRANSACTION_VERSION {
            w.write_varint(prefix.pricing_record_height);
            if version < OFFSHORE_DATA_LAST_VERSION {
                w.write_blob(&prefix.offshore_data);
            }
        }

        if version >= POU_TRANSACTION_VERSION {
            let unlock_times = wire_unlock_times(prefix);
            w.write_varint(unlock_times.len() as u64);
            for t in &unlock_times {
                w.write_varint(*t);
            }
        }

        w.write_varint(prefix.amount_burnt);
        w.write_varint(prefix.amount_minted);

        if version >= COLLATERAL_TRANSACTION_VERSION && prefix.amount_burnt != 0 {
            let indices = wire_collateral_indices(prefix);
            check_collateral_indices(&indices, prefix.vout.len())?;
            w.write_varint(indices.len() as u64);
            for i in &indices {
                w.write_varint(*i as u64);
            }
        }
    } else {
        w.write_varint(prefix.vin.len() as u64);
        for input in &prefix.vin {
            write_input(w, input);
        }
        w.write_varint(prefix.vout.len() as u64);
        for out in &prefix.vout {
            write_output(w, out);
        }
        w.write_blob(&prefix.extra);
        w.write_varint(prefix.pricing_record_height);
        w.write_varint(prefix.amount_burnt);
        w.write_varint(prefix.amount_minted);
    }
    Ok(())
}

pub fn encode_prefix(prefix: &TransactionPrefix) -> Result<Vec<u8>, TxError> {
    let mut w = Writer::with_capacity(512);
    encode_prefix_into(&mut w, prefix)?;
    Ok(w.into_bytes())
}

pub(crate) fn decode_prefix_from(r: &mut Reader) -> Result<TransactionPrefix, TxError> {
    let version = r.read_varint()?;
    check_version(version)?;

    let mut prefix = TransactionPrefix {
        version,
        ..Default::default()
    };
    if version < POU_TRANSACTION_VERSION {
        prefix.unlock_time = r.read_varint()?;
    }

    let nin = r.read_length()?;
    for _ in 0..nin {
        prefix.vin.push(read_input(r)?);
    }
    let nout = r.read_length()?;
    for _ in 0..nout {
        prefix.vout.push(read_output(r)?);
    }
    prefix.extra = r.read_blob()?;

    if version < HAVEN_TYPES_TRANSACTION_VERSION {
        if version >= OFFSHORE_TRANSACTION_VERSION {
            prefix.pricing_record_height = r.read_varint()?;
            if version < OFFSHORE_DATA_LAST_VERSION {
                prefix.offshore_data = r.read_blob()?;
            }
        }

        if version >= POU_TRANSACTION_VERSION {
            let count = r.read_length()?;
            for _ in 0..count {
                prefix.output_unlock_times.push(r.read_varint()?);
            }
            if prefix.output_unlock_times.len() != prefix.vout.len() {
                return Err(TxError::SizeMismatch(
                    "output unlock times must match output count",
                ));
            }
        }

        prefix.amount_burnt = r.read_varint()?;
        prefix.amount_minted = r.read_varint()?;

        if version >= COLLATERAL_TRANSACTION_VERSION && prefix.amount_burnt != 0 {
            let count = r.read_length()?;
            for _ in 0..count {
                prefix.collateral_indices.push(r.read_varint()? as u32);
            }
            check_collateral_indices(&prefix.collateral_indices, prefix.vout.len())?;
        }

        // Normalize into the haven form.
        let vin = std::mem::take(&mut prefix.vin);
        prefix.vin = vin.into_iter().map(promote_input).collect::<Result<_, _>>()?;

        let vout = std::mem::take(&mut prefix.vout);
        prefix.vout = vout
            .into_iter()
            .enumerate()
            .map(|(i, out)| {
                let unlock = prefix
                    .output_unlock_times
                    .get(i)
                    .copied()
                    .unwrap_or(prefix.unlock_time);
                let is_collateral = prefix.collateral_indices.contains(&(i as u32));
                promote_output(out, unlock, is_collateral)
            })
            .collect::<Result<_, _>>()?;
    } else {
        prefix.pricing_record_height = r.read_varint()?;
        prefix.amount_burnt = r.read_varint()?;
        prefix.amount_minted = r.read_varint()?;
    }

    Ok(prefix)
}

pub fn decode_prefix(bytes: &[u8]) -> Result<TransactionPrefix, TxError> {
    let mut r = Reader::new(bytes);
    let prefix = decode_prefix_from(&mut r)?;
    if !r.is_at_end() {
        return Err(TxError::Format("trailing bytes after prefix".into()));
    }
    Ok(prefix)
}

// --- Transaction codec ------------------------------------------------------

fn ring_sizes(prefix: &TransactionPrefix) -> Vec<usize> {
    prefix.vin.iter().map(TxIn::signature_size).collect()
}

/// Encode the full transaction (prefix, then ring signatures or the
/// rct bundle).
pub fn encode_transaction(tx: &Transaction) -> Result<Vec<u8>, TxError> {
    let mut w = Writer::with_capacity(2048);
    encode_prefix_into(&mut w, &tx.prefix)?;

    if tx.prefix.version == 1 {
        if !tx.pruned {
            if tx.signatures.is_empty() {
                // Unsigned v1 transactions can only hit the wire when no
                // input expects a signature (coinbase).
                if tx.prefix.vin.iter().any(|i| i.signature_size() != 0) {
                    return Err(TxError::SizeMismatch(
                        "v1 transaction is missing its signatures",
                    ));
                }
            } else {
                if tx.signatures.len() != tx.prefix.vin.len() {
                    return Err(TxError::SizeMismatch(
                        "one signature set per input required",
                    ));
                }
                for (input, sigs) in tx.prefix.vin.iter().zip(&tx.signatures) {
                    if sigs.len() != input.signature_size() {
                        return Err(TxError::SizeMismatch(
                            "signature count must equal ring size",
                        ));
                    }
                    for sig in sigs {
                        w.write_bytes(&sig.c);
                        w.write_bytes(&sig.r);
                    }
                }
            }
        }
    } else if !tx.prefix.vin.is_empty() {
        rct::write_rct_base(&mut w, &tx.rct_signatures);
        if !tx.pruned && tx.rct_signatures.rct_type != rct_type::NULL {
            rct::write_rct_prunable(&mut w, &tx.rct_signatures);
        }
    }

    Ok(w.into_bytes())
}

fn decode_transaction_inner(bytes: &[u8], base_only: bool) -> Result<Transaction, TxError> {
    let mut r = Reader::new(bytes);
    let prefix = decode_prefix_from(&mut r)?;
    let prefix_size = r.position();

    let mut tx = Transaction {
        prefix,
        prefix_size,
        ..Default::default()
    };

    if tx.prefix.version == 1 {
        tx.unprunable_size = r.position();
        if !base_only {
            for input in &tx.prefix.vin {
                let mut sigs = Vec::with_capacity(input.signature_size());
                for _ in 0..input.signature_size() {
                    sigs.push(Signature {
                        c: r.read_key()?,
                        r: r.read_key()?,
                    });
                }
                tx.signatures.push(sigs);
            }
        }
    } else if !tx.prefix.vin.is_empty() {
        tx.rct_signatures =
            rct::read_rct_base(&mut r, tx.prefix.vin.len(), tx.prefix.vout.len())?;
        tx.unprunable_size = r.position();
        if !base_only && tx.rct_signatures.rct_type != rct_type::NULL {
            let rings = ring_sizes(&tx.prefix);
            let mut sig = std::mem::take(&mut tx.rct_signatures);
            rct::read_rct_prunable(&mut r, &mut sig, tx.prefix.vout.len(), &rings)?;
            tx.rct_signatures = sig;
        }
    }

    if !base_only && !r.is_at_end() {
        return Err(TxError::Format("trailing bytes after transaction".into()));
    }
    tx.pruned = base_only;
    Ok(tx)
}

/// Decode a complete transaction.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, TxError> {
    decode_transaction_inner(bytes, false)
}

/// Decode only the unprunable part (prefix + rct base) of a pruned
/// transaction.
pub fn decode_transaction_base(bytes: &[u8]) -> Result<Transaction, TxError> {
    decode_transaction_inner(bytes, true)
}

// --- Hashing ----------------------------------------------------------------

/// Hash of the serialized prefix, the message signed by v1 ring
/// signatures and bound into the rct message.
pub fn get_transaction_prefix_hash(prefix: &TransactionPrefix) -> Result<Hash, TxError> {
    Ok(keccak256(&encode_prefix(prefix)?))
}

impl Transaction {
    /// Serialized size in bytes, cached after the first computation.
    pub fn blob_size(&self) -> Result<usize, TxError> {
        if let Some(&size) = self.blob_size_cache.get() {
            return Ok(size);
        }
        let size = encode_transaction(self)?.len();
        Ok(*self.blob_size_cache.get_or_init(|| size))
    }

    /// Transaction id. Version 1 hashes the whole blob; version 2+
    /// hashes the prefix, base, and prunable section hashes together.
    pub fn hash(&self) -> Result<Hash, TxError> {
        if let Some(&h) = self.hash_cache.get() {
            return Ok(h);
        }
        let h = self.calculate_hash()?;
        Ok(*self.hash_cache.get_or_init(|| h))
    }

    fn calculate_hash(&self) -> Result<Hash, TxError> {
        if self.prefix.version == 1 {
            return Ok(keccak256(&encode_transaction(self)?));
        }
        let prefix_hash = get_transaction_prefix_hash(&self.prefix)?;
        let base_hash = keccak256(&rct::rct_base_bytes(&self.rct_signatures));
        let prunable = self.prunable_hash()?;
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&prefix_hash);
        buf.extend_from_slice(&base_hash);
        buf.extend_from_slice(&prunable);
        Ok(keccak256(&buf))
    }

    /// Hash of the prunable section; the null hash for v1 and rct-null
    /// or pruned transactions.
    pub fn prunable_hash(&self) -> Result<Hash, TxError> {
        if let Some(&h) = self.prunable_hash_cache.get() {
            return Ok(h);
        }
        let h = if self.prefix.version == 1
            || self.pruned
            || self.rct_signatures.rct_type == rct_type::NULL
        {
            NULL_HASH
        } else {
            let mut w = Writer::new();
            rct::write_rct_prunable(&mut w, &self.rct_signatures);
            keccak256(&w.into_bytes())
        };
        Ok(*self.prunable_hash_cache.get_or_init(|| h))
    }
}

// --- Block codec ------------------------------------------------------------

fn write_block_header(w: &mut Writer, header: &BlockHeader) {
    w.write_varint(header.major_version as u64);
    w.write_varint(header.minor_version as u64);
    w.write_varint(header.timestamp);
    w.write_bytes(&header.prev_id);
    w.write_u32_le(header.nonce);
}

fn read_block_header(r: &mut Reader) -> Result<BlockHeader, TxError> {
    Ok(BlockHeader {
        major_version: r.read_varint()? as u8,
        minor_version: r.read_varint()? as u8,
        timestamp: r.read_varint()?,
        prev_id: r.read_key()?,
        nonce: r.read_u32_le()?,
    })
}

pub fn encode_block(block: &Block) -> Result<Vec<u8>, TxError> {
    if block.tx_hashes.len() > CRYPTONOTE_MAX_TX_PER_BLOCK {
        return Err(TxError::SizeMismatch("too many transactions in block"));
    }
    let mut w = Writer::with_capacity(2048);
    write_block_header(&mut w, &block.header);
    w.write_bytes(&encode_transaction(&block.miner_tx)?);
    w.write_varint(block.tx_hashes.len() as u64);
    for h in &block.tx_hashes {
        w.write_bytes(h);
    }
    Ok(w.into_bytes())
}

pub fn decode_block(bytes: &[u8]) -> Result<Block, TxError> {
    let mut r = Reader::new(bytes);
    let header = read_block_header(&mut r)?;

    // The miner transaction is parsed in place from the stream.
    let tx_start = r.position();
    let prefix = decode_prefix_from(&mut r)?;
    let mut miner_tx = Transaction {
        prefix,
        ..Default::default()
    };
    miner_tx.prefix_size = r.position() - tx_start;
    if miner_tx.prefix.version == 1 {
        for i in 0..miner_tx.prefix.vin.len() {
            let size = miner_tx.prefix.vin[i].signature_size();
            let mut sigs = Vec::with_capacity(size);
            for _ in 0..size {
                sigs.push(Signature {
                    c: r.read_key()?,
                    r: r.read_key()?,
                });
            }
            miner_tx.signatures.push(sigs);
        }
    } else if !miner_tx.prefix.vin.is_empty() {
        miner_tx.rct_signatures = rct::read_rct_base(
            &mut r,
            miner_tx.prefix.vin.len(),
            miner_tx.prefix.vout.len(),
        )?;
        if miner_tx.rct_signatures.rct_type != rct_type::NULL {
            let rings = ring_sizes(&miner_tx.prefix);
            let mut sig = std::mem::take(&mut miner_tx.rct_signatures);
            rct::read_rct_prunable(&mut r, &mut sig, miner_tx.prefix.vout.len(), &rings)?;
            miner_tx.rct_signatures = sig;
        }
    }
    miner_tx.unprunable_size = r.position() - tx_start;

    let count = r.read_length()?;
    if count > CRYPTONOTE_MAX_TX_PER_BLOCK {
        return Err(TxError::SizeMismatch("too many transactions in block"));
    }
    let mut tx_hashes = Vec::with_capacity(count);
    for _ in 0..count {
        tx_hashes.push(r.read_key()?);
    }
    if !r.is_at_end() {
        return Err(TxError::Format("trailing bytes after block".into()));
    }

    Ok(Block {
        header,
        miner_tx,
        tx_hashes,
        ..Default::default()
    })
}

/// CryptoNote Merkle tree hash.
pub fn tree_hash(hashes: &[Hash]) -> Hash {
    fn pair(a: &Hash, b: &Hash) -> Hash {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(a);
        buf[32..].copy_from_slice(b);
        keccak256(&buf)
    }

    match hashes.len() {
        0 => NULL_HASH,
        1 => hashes[0],
        2 => pair(&hashes[0], &hashes[1]),
        n => {
            let mut cnt = 1usize;
            while cnt * 2 < n {
                cnt *= 2;
            }
            let mut ints = vec![NULL_HASH; cnt];
            let carried = 2 * cnt - n;
            ints[..carried].copy_from_slice(&hashes[..carried]);
            let mut src = carried;
            for slot in ints.iter_mut().take(cnt).skip(carried) {
                *slot = pair(&hashes[src], &hashes[src + 1]);
                src += 2;
            }
            while cnt > 2 {
                cnt /= 2;
                for i in 0..cnt {
                    let (a, b) = (ints[2 * i], ints[2 * i + 1]);
                    ints[i] = pair(&a, &b);
                }
            }
            pair(&ints[0], &ints[1])
        }
    }
}

/// The byte string fed to the proof-of-work hash: header, Merkle root
/// of all transaction hashes, and the transaction count.
pub fn get_block_hashing_blob(block: &Block) -> Result<Vec<u8>, TxError> {
    let mut w = Writer::with_capacity(128);
    write_block_header(&mut w, &block.header);
    let mut hashes = Vec::with_capacity(1 + block.tx_hashes.len());
    hashes.push(block.miner_tx.hash()?);
    hashes.extend_from_slice(&block.tx_hashes);
    let root = tree_hash(&hashes);
    w.write_bytes(&root);
    w.write_varint(hashes.len() as u64);
    Ok(w.into_bytes())
}

impl Block {
    /// Block id: hash of the length-prefixed hashing blob.
    pub fn hash(&self) -> Result<Hash, TxError> {
        if let Some(&h) = self.hash_cache.get() {
            return Ok(h);
        }
        let blob = get_block_hashing_blob(self)?;
        let mut buf = Writer::with_capacity(blob.len() + 9);
        buf.write_varint(blob.len() as u64);
        buf.write_bytes(&blob);
        let h = keccak256(&buf.into_bytes());
        Ok(*self.hash_cache.get_or_init(|| h))
    }
}
