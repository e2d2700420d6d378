//! Transaction extra field parsing and construction.
//!
//! The extra blob is a sequence of tagged fields:
//! - 0x00 padding (run of zero bytes)
//! - 0x01 transaction public key (32 bytes)
//! - 0x02 nonce (1-byte size + data; carries payment ids)
//! - 0x03 merge-mining tag (varint size + data)
//! - 0x04 additional per-output public keys (varint count + 32·N)
//! - 0xDE minergate tag (varint size + data)
//!
//! Unknown tags are preserved opaquely as varint-sized blobs.

use haven_crypto::serial::{Reader, Writer};
use haven_crypto::{Hash, PublicKey};

use crate::TxError;

pub const TX_EXTRA_TAG_PADDING: u8 = 0x00;
pub const TX_EXTRA_TAG_PUBKEY: u8 = 0x01;
pub const TX_EXTRA_NONCE: u8 = 0x02;
pub const TX_EXTRA_MERGE_MINING_TAG: u8 = 0x03;
pub const TX_EXTRA_TAG_ADDITIONAL_PUBKEYS: u8 = 0x04;
pub const TX_EXTRA_MYSTERIOUS_MINERGATE_TAG: u8 = 0xDE;

pub const TX_EXTRA_NONCE_MAX_COUNT: usize = 255;
pub const TX_EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;
pub const TX_EXTRA_NONCE_ENCRYPTED_PAYMENT_ID: u8 = 0x01;

const TX_EXTRA_PADDING_MAX_COUNT: usize = 255;

/// One parsed extra field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    Padding { size: usize },
    TxPubKey { key: PublicKey },
    Nonce { nonce: Vec<u8> },
    MergeMining { data: Vec<u8> },
    AdditionalPubKeys { keys: Vec<PublicKey> },
    Minergate { data: Vec<u8> },
    Unknown { tag: u8, data: Vec<u8> },
}

impl ExtraField {
    fn tag(&self) -> u8 {
        match self {
            ExtraField::Padding { .. } => TX_EXTRA_TAG_PADDING,
            ExtraField::TxPubKey { .. } => TX_EXTRA_TAG_PUBKEY,
            ExtraField::Nonce { .. } => TX_EXTRA_NONCE,
            ExtraField::MergeMining { .. } => TX_EXTRA_MERGE_MINING_TAG,
            ExtraField::AdditionalPubKeys { .. } => TX_EXTRA_TAG_ADDITIONAL_PUBKEYS,
            ExtraField::Minergate { .. } => TX_EXTRA_MYSTERIOUS_MINERGATE_TAG,
            ExtraField::Unknown { tag, .. } => *tag,
        }
    }

    /// Canonical ordering rank; padding sorts last so parsers that stop
    /// at padding never miss a field.
    fn sort_rank(&self) -> u8 {
        match self {
            ExtraField::Padding { .. } => u8::MAX,
            other => other.tag(),
        }
    }
}

/// Parse an extra blob into its fields.
pub fn parse_tx_extra(extra: &[u8]) -> Result<Vec<ExtraField>, TxError> {
    let mut fields = Vec::new();
    let mut r = Reader::new(extra);
    while !r.is_at_end() {
        let tag = r.read_u8()?;
        match tag {
            TX_EXTRA_TAG_PADDING => {
                // Padding runs to the end of the blob and must be zero.
                let mut size = 1;
                while !r.is_at_end() {
                    if r.read_u8()? != 0 {
                        return Err(TxError::Format("nonzero byte inside extra padding".into()));
                    }
                    size += 1;
                    if size > TX_EXTRA_PADDING_MAX_COUNT {
                        return Err(TxError::Format("extra padding too long".into()));
                    }
                }
                fields.push(ExtraField::Padding { size });
            }
            TX_EXTRA_TAG_PUBKEY => fields.push(ExtraField::TxPubKey { key: r.read_key()? }),
            TX_EXTRA_NONCE => {
                let size = r.read_u8()? as usize;
                fields.push(ExtraField::Nonce {
                    nonce: r.read_bytes(size)?.to_vec(),
                });
            }
            TX_EXTRA_MERGE_MINING_TAG => fields.push(ExtraField::MergeMining {
                data: r.read_blob()?,
            }),
            TX_EXTRA_TAG_ADDITIONAL_PUBKEYS => {
                let count = r.read_length()?;
                let mut keys = Vec::with_capacity(count);
                for _ in 0..count {
                    keys.push(r.read_key()?);
                }
                fields.push(ExtraField::AdditionalPubKeys { keys });
            }
            TX_EXTRA_MYSTERIOUS_MINERGATE_TAG => fields.push(ExtraField::Minergate {
                data: r.read_blob()?,
            }),
            tag => fields.push(ExtraField::Unknown {
                tag,
                data: r.read_blob()?,
            }),
        }
    }
    Ok(fields)
}

/// Serialize fields back into an extra blob.
pub fn write_tx_extra(fields: &[ExtraField]) -> Vec<u8> {
    let mut w = Writer::new();
    for field in fields {
        match field {
            ExtraField::Padding { size } => {
                for _ in 0..*size {
                    w.write_u8(0);
                }
                continue;
            }
            ExtraField::TxPubKey { key } => {
                w.write_u8(TX_EXTRA_TAG_PUBKEY);
                w.write_bytes(key);
            }
            ExtraField::Nonce { nonce } => {
                w.write_u8(TX_EXTRA_NONCE);
                w.write_u8(nonce.len() as u8);
                w.write_bytes(nonce);
            }
            ExtraField::MergeMining { data } => {
                w.write_u8(TX_EXTRA_MERGE_MINING_TAG);
                w.write_blob(data);
            }
            ExtraField::AdditionalPubKeys { keys } => {
                w.write_u8(TX_EXTRA_TAG_ADDITIONAL_PUBKEYS);
                w.write_varint(keys.len() as u64);
                for k in keys {
                    w.write_bytes(k);
                }
            }
            ExtraField::Minergate { data } => {
                w.write_u8(TX_EXTRA_MYSTERIOUS_MINERGATE_TAG);
                w.write_blob(data);
            }
            ExtraField::Unknown { tag, data } => {
                w.write_u8(*tag);
                w.write_blob(data);
            }
        }
    }
    w.into_bytes()
}

/// Re-serialize `extra` with its fields in canonical order. Fails if
/// the blob does not parse.
pub fn sort_tx_extra(extra: &[u8]) -> Result<Vec<u8>, TxError> {
    let mut fields = parse_tx_extra(extra)?;
    fields.sort_by_key(ExtraField::sort_rank);
    Ok(write_tx_extra(&fields))
}

/// Find the first transaction public key.
pub fn get_tx_pub_key_from_extra(extra: &[u8]) -> Option<PublicKey> {
    parse_tx_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::TxPubKey { key } => Some(key),
        _ => None,
    })
}

/// Find the additional per-output public keys.
pub fn get_additional_tx_pub_keys_from_extra(extra: &[u8]) -> Option<Vec<PublicKey>> {
    parse_tx_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::AdditionalPubKeys { keys } => Some(keys),
        _ => None,
    })
}

/// Find the nonce payload, if any.
pub fn get_extra_nonce(extra: &[u8]) -> Option<Vec<u8>> {
    parse_tx_extra(extra).ok()?.into_iter().find_map(|f| match f {
        ExtraField::Nonce { nonce } => Some(nonce),
        _ => None,
    })
}

/// Append the transaction public key field.
pub fn add_tx_pub_key_to_extra(extra: &mut Vec<u8>, key: &PublicKey) {
    extra.push(TX_EXTRA_TAG_PUBKEY);
    extra.extend_from_slice(key);
}

/// Append the additional public keys field.
pub fn add_additional_tx_pub_keys_to_extra(extra: &mut Vec<u8>, keys: &[PublicKey]) {
    let mut w = Writer::new();
    w.write_u8(TX_EXTRA_TAG_ADDITIONAL_PUBKEYS);
    w.write_varint(keys.len() as u64);
    for k in keys {
        w.write_bytes(k);
    }
    extra.extend_from_slice(&w.into_bytes());
}

/// Append a nonce field. The nonce may be at most 255 bytes.
pub fn add_extra_nonce_to_tx_extra(extra: &mut Vec<u8>, nonce: &[u8]) -> Result<(), TxError> {
    if nonce.len() > TX_EXTRA_NONCE_MAX_COUNT {
        return Err(TxError::Config("extra nonce too long"));
    }
    extra.push(TX_EXTRA_NONCE);
    extra.push(nonce.len() as u8);
    extra.extend_from_slice(nonce);
    Ok(())
}

/// Remove every field with the given wire tag, leaving the rest in
/// their original order.
pub fn remove_field_from_tx_extra(extra: &mut Vec<u8>, tag: u8) -> Result<(), TxError> {
    let fields = parse_tx_extra(extra)?;
    let kept: Vec<ExtraField> = fields.into_iter().filter(|f| f.tag() != tag).collect();
    *extra = write_tx_extra(&kept);
    Ok(())
}

/// Build a nonce payload holding a plain 32-byte payment id.
pub fn set_payment_id_to_tx_extra_nonce(payment_id: &Hash) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(33);
    nonce.push(TX_EXTRA_NONCE_PAYMENT_ID);
    nonce.extend_from_slice(payment_id);
    nonce
}

/// Build a nonce payload holding an encrypted 8-byte payment id.
pub fn set_encrypted_payment_id_to_tx_extra_nonce(payment_id: &[u8; 8]) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(9);
    nonce.push(TX_EXTRA_NONCE_ENCRYPTED_PAYMENT_ID);
    nonce.extend_from_slice(payment_id);
    nonce
}

/// Extract a plain 32-byte payment id from a nonce payload.
pub fn get_payment_id_from_tx_extra_nonce(nonce: &[u8]) -> Option<Hash> {
    if nonce.len() != 33 || nonce[0] != TX_EXTRA_NONCE_PAYMENT_ID {
        return None;
    }
    let mut id = [0u8; 32];
    id.copy_from_slice(&nonce[1..]);
    Some(id)
}

/// Extract an encrypted 8-byte payment id from a nonce payload.
pub fn get_encrypted_payment_id_from_tx_extra_nonce(nonce: &[u8]) -> Option<[u8; 8]> {
    if nonce.len() != 9 || nonce[0] != TX_EXTRA_NONCE_ENCRYPTED_PAYMENT_ID {
        return None;
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&nonce[1..]);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pubkey_roundtrip() {
        let mut extra = Vec::new();
        add_tx_pub_key_to_extra(&mut extra, &[0x42; 32]);
        assert_eq!(get_tx_pub_key_from_extra(&extra), Some([0x42; 32]));
    }

    #[test]
    fn additional_keys_roundtrip() {
        let mut extra = Vec::new();
        add_additional_tx_pub_keys_to_extra(&mut extra, &[[0xAA; 32], [0xBB; 32]]);
        assert_eq!(
            get_additional_tx_pub_keys_from_extra(&extra),
            Some(vec![[0xAA; 32], [0xBB; 32]])
        );
    }

    #[test]
    fn nonce_payment_ids() {
        let nonce = set_encrypted_payment_id_to_tx_extra_nonce(&[9u8; 8]);
        assert_eq!(get_encrypted_payment_id_from_tx_extra_nonce(&nonce), Some([9u8; 8]));
        assert_eq!(get_payment_id_from_tx_extra_nonce(&nonce), None);

        let nonce = set_payment_id_to_tx_extra_nonce(&[7u8; 32]);
        assert_eq!(get_payment_id_from_tx_extra_nonce(&nonce), Some([7u8; 32]));
    }

    #[test]
    fn remove_field() {
        let mut extra = Vec::new();
        add_tx_pub_key_to_extra(&mut extra, &[0x42; 32]);
        add_extra_nonce_to_tx_extra(&mut extra, &[1, 2, 3]).unwrap();
        remove_field_from_tx_extra(&mut extra, TX_EXTRA_TAG_PUBKEY).unwrap();
        assert_eq!(get_tx_pub_key_from_extra(&extra), None);
        assert_eq!(get_extra_nonce(&extra), Some(vec![1, 2, 3]));
    }

    #[test]
    fn sort_is_canonical_and_stable_on_content() {
        let mut extra = Vec::new();
        add_extra_nonce_to_tx_extra(&mut extra, &[5]).unwrap();
        add_tx_pub_key_to_extra(&mut extra, &[0x11; 32]);
        let sorted = sort_tx_extra(&extra).unwrap();
        // Pubkey (0x01) now precedes the nonce (0x02).
        assert_eq!(sorted[0], TX_EXTRA_TAG_PUBKEY);
        // Sorting again changes nothing.
        assert_eq!(sort_tx_extra(&sorted).unwrap(), sorted);
    }

    #[test]
    fn unknown_tag_is_preserved() {
        let blob = vec![0x77, 2, 0xde, 0xad];
        let fields = parse_tx_extra(&blob).unwrap();
        assert_eq!(
            fields,
            vec![ExtraField::Unknown {
                tag: 0x77,
                data: vec![0xde, 0xad]
            }]
        );
        assert_eq!(write_tx_extra(&fields), blob);
    }

    #[test]
    fn truncated_pubkey_fails() {
        let blob = vec![TX_EXTRA_TAG_PUBKEY, 1, 2, 3];
        assert!(parse_tx_extra(&blob).is_err());
    }

    #[test]
    fn oversized_nonce_rejected() {
        let mut extra = Vec::new();
        assert!(add_extra_nonce_to_tx_extra(&mut extra, &[0u8; 256]).is_err());
    }

    #[test]
    fn padding_parses_to_end() {
        let blob = vec![0, 0, 0];
        let fields = parse_tx_extra(&blob).unwrap();
        assert_eq!(fields, vec![ExtraField::Padding { size: 3 }]);
    }
}
