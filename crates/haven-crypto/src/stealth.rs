//! Stealth-address derivation for building inputs and outputs.
//!
//! Output side: derive the recipient's one-time key (standard address,
//! subaddress, or change), optionally with a view tag. Input side:
//! recover the one-time secret for a spent output through the
//! subaddress lookup table and produce its key image.

use std::collections::HashMap;

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;

use haven_types::SubaddressIndex;

use crate::{
    compress, decompress, derivation_to_scalar, derive_public_key, derive_secret_key,
    derive_subaddress_public_key, derive_view_tag, generate_key_derivation, generate_key_image,
    hash_to_scalar, scalar, scalarmult_base, CryptoError, KeyDerivation, KeyImage, KeyPair,
    PublicKey, SecretKey, ViewTag,
};

/// A wallet's public address: spend and view public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountPublicAddress {
    pub spend_public_key: PublicKey,
    pub view_public_key: PublicKey,
}

/// Full account keys of the sender.
#[derive(Debug, Clone)]
pub struct AccountKeys {
    pub address: AccountPublicAddress,
    pub spend_secret_key: SecretKey,
    pub view_secret_key: SecretKey,
}

impl AccountKeys {
    pub fn generate() -> Self {
        let spend = KeyPair::generate();
        let view = KeyPair::generate();
        AccountKeys {
            address: AccountPublicAddress {
                spend_public_key: spend.public,
                view_public_key: view.public,
            },
            spend_secret_key: spend.secret,
            view_secret_key: view.secret,
        }
    }

    /// Watch-only wallets carry an all-zero spend secret.
    pub fn is_watch_only(&self) -> bool {
        self.spend_secret_key == [0u8; 32]
    }
}

/// `Hs("SubAddr\0" ‖ view_sec ‖ major ‖ minor)`.
pub fn subaddress_secret_key(view_secret: &SecretKey, index: SubaddressIndex) -> Scalar {
    let mut buf = Vec::with_capacity(48);
    buf.extend_from_slice(b"SubAddr\0");
    buf.extend_from_slice(view_secret);
    buf.extend_from_slice(&index.major.to_le_bytes());
    buf.extend_from_slice(&index.minor.to_le_bytes());
    hash_to_scalar(&[&buf])
}

/// Derive the one-time output key for `destination` at `output_index`.
///
/// `tx_secret` is the transaction key (or the per-output additional key
/// when `use_additional` is set); for the sender's own change output the
/// derivation runs against the transaction public key and the sender's
/// view secret instead, so the recipient-side scan finds it.
#[allow(clippy::too_many_arguments)]
pub fn generate_output_ephemeral_key(
    destination: &AccountPublicAddress,
    is_subaddress: bool,
    is_change: bool,
    tx_secret: &SecretKey,
    additional_secret: Option<&SecretKey>,
    tx_public: &PublicKey,
    sender_view_secret: &SecretKey,
    output_index: u64,
    want_view_tag: bool,
) -> Result<(PublicKey, Option<ViewTag>, Scalar, Option<PublicKey>), CryptoError> {
    // Subaddress destinations derive against their per-output key; the
    // sender's own change derives against the tx pubkey so the normal
    // wallet scan finds it; everything else uses the shared tx secret.
    let derivation: KeyDerivation = if is_change {
        generate_key_derivation(tx_public, sender_view_secret)?
    } else if let (true, Some(sec)) = (is_subaddress, additional_secret) {
        generate_key_derivation(&destination.view_public_key, sec)?
    } else {
        generate_key_derivation(&destination.view_public_key, tx_secret)?
    };

    // Published additional pubkey: sec*D for subaddresses, sec*G otherwise.
    let additional_public = match additional_secret {
        Some(sec) => Some(if is_subaddress {
            compress(&(scalar(sec) * decompress(&destination.spend_public_key)?))
        } else {
            scalarmult_base(sec)
        }),
        None => None,
    };

    let amount_key = derivation_to_scalar(&derivation, output_index);
    let one_time = derive_public_key(&derivation, output_index, &destination.spend_public_key)?;
    let view_tag = want_view_tag.then(|| derive_view_tag(&derivation, output_index));

    Ok((one_time, view_tag, amount_key, additional_public))
}

/// Ephemeral spend keys recovered for a real input.
#[derive(Debug, Clone)]
pub struct InputEphemeral {
    pub keypair: KeyPair,
    pub key_image: KeyImage,
    pub subaddress: SubaddressIndex,
}

/// Recover the one-time secret for `out_key`, trying the main tx pubkey
/// and then each additional pubkey, and produce the key image. Fails if
/// the re-derived public key does not match the stored output key.
pub fn generate_key_image_helper(
    keys: &AccountKeys,
    subaddresses: &HashMap<PublicKey, SubaddressIndex>,
    out_key: &PublicKey,
    tx_public_key: &PublicKey,
    additional_tx_public_keys: &[PublicKey],
    real_output_index: u64,
) -> Result<InputEphemeral, CryptoError> {
    let mut candidates: Vec<KeyDerivation> = Vec::with_capacity(1 + additional_tx_public_keys.len());
    candidates.push(generate_key_derivation(tx_public_key, &keys.view_secret_key)?);
    for pk in additional_tx_public_keys {
        candidates.push(generate_key_derivation(pk, &keys.view_secret_key)?);
    }

    let mut found: Option<(KeyDerivation, SubaddressIndex)> = None;
    for derivation in &candidates {
        let base = derive_subaddress_public_key(out_key, derivation, real_output_index)?;
        if let Some(&index) = subaddresses.get(&base) {
            found = Some((*derivation, index));
            break;
        }
    }
    let (derivation, index) = found.ok_or(CryptoError::NotOurs)?;

    let mut secret = scalar(&derive_secret_key(
        &derivation,
        real_output_index,
        &keys.spend_secret_key,
    ));
    if !index.is_zero() {
        secret += subaddress_secret_key(&keys.view_secret_key, index);
    }

    let public = compress(&(ED25519_BASEPOINT_TABLE * &secret));
    if &public != out_key {
        return Err(CryptoError::KeyMismatch);
    }

    let secret = secret.to_bytes();
    let key_image = generate_key_image(&public, &secret);
    Ok(InputEphemeral {
        keypair: KeyPair { public, secret },
        key_image,
        subaddress: index,
    })
}

/// The spend public key of subaddress `index` for these account keys.
pub fn subaddress_spend_public_key(
    keys: &AccountKeys,
    index: SubaddressIndex,
) -> Result<PublicKey, CryptoError> {
    if index.is_zero() {
        return Ok(keys.address.spend_public_key);
    }
    let m = subaddress_secret_key(&keys.view_secret_key, index);
    Ok(compress(
        &(decompress(&keys.address.spend_public_key)? + ED25519_BASEPOINT_TABLE * &m),
    ))
}

/// Map every `(account, index)` pair up to the given bounds to its
/// subaddress spend key, the lookup table input building expects.
pub fn build_subaddress_map(
    keys: &AccountKeys,
    majors: u32,
    minors: u32,
) -> Result<HashMap<PublicKey, SubaddressIndex>, CryptoError> {
    let mut map = HashMap::new();
    for major in 0..majors.max(1) {
        for minor in 0..minors.max(1) {
            let index = SubaddressIndex { major, minor };
            map.insert(subaddress_spend_public_key(keys, index)?, index);
        }
    }
    Ok(map)
}

/// Encrypted-payment-id tail byte mixed into the shared-secret hash.
const ENCRYPTED_PAYMENT_ID_TAIL: u8 = 0x8d;

/// XOR an 8-byte payment id with the shared-secret stream.
pub fn encrypt_payment_id(
    payment_id: &mut [u8; 8],
    public_key: &PublicKey,
    secret_key: &SecretKey,
) -> Result<(), CryptoError> {
    let derivation = generate_key_derivation(public_key, secret_key)?;
    let mut buf = Vec::with_capacity(33);
    buf.extend_from_slice(&derivation);
    buf.push(ENCRYPTED_PAYMENT_ID_TAIL);
    let hash = crate::keccak256(&buf);
    for (b, k) in payment_id.iter_mut().zip(&hash[..8]) {
        *b ^= k;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalarmult_key;

    #[test]
    fn standard_output_spendable_by_recipient() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let tx_key = KeyPair::generate();

        let (one_time, tag, _amount_key, additional) = generate_output_ephemeral_key(
            &recipient.address,
            false,
            false,
            &tx_key.secret,
            None,
            &tx_key.public,
            &sender.view_secret_key,
            0,
            true,
        )
        .unwrap();
        assert!(tag.is_some());
        assert!(additional.is_none());

        let map = build_subaddress_map(&recipient, 1, 1).unwrap();
        let eph = generate_key_image_helper(&recipient, &map, &one_time, &tx_key.public, &[], 0)
            .unwrap();
        assert_eq!(eph.keypair.public, one_time);
        assert!(eph.subaddress.is_zero());
    }

    #[test]
    fn subaddress_output_spendable_via_additional_key() {
        let sender = AccountKeys::generate();
        let recipient = AccountKeys::generate();
        let index = SubaddressIndex { major: 1, minor: 3 };
        let sub_spend = subaddress_spend_public_key(&recipient, index).unwrap();
        // Subaddress view key is m-adjusted spend times the view secret;
        // for the derivation test we follow the sender-side convention of
        // deriving against C = view_sec * D.
        let sub_view = scalarmult_key(&sub_spend, &recipient.view_secret_key).unwrap();
        let sub_addr = AccountPublicAddress {
            spend_public_key: sub_spend,
            view_public_key: sub_view,
        };

        let additional = KeyPair::generate();
        let tx_key = KeyPair::generate();
        let (one_time, _, _, add_pub) = generate_output_ephemeral_key(
            &sub_addr,
            true,
            false,
            &tx_key.secret,
            Some(&additional.secret),
            &tx_key.public,
            &sender.view_secret_key,
            1,
            false,
        )
        .unwrap();
        // Published key for a subaddress destination is sec*D.
        let expected = scalarmult_key(&sub_spend, &additional.secret).unwrap();
        assert_eq!(add_pub.unwrap(), expected);

        let map = build_subaddress_map(&recipient, 2, 4).unwrap();
        let eph = generate_key_image_helper(
            &recipient,
            &map,
            &one_time,
            &tx_key.public,
            &[expected],
            1,
        )
        .unwrap();
        assert_eq!(eph.keypair.public, one_time);
        assert_eq!(eph.subaddress, index);
    }

    #[test]
    fn foreign_output_is_rejected() {
        let us = AccountKeys::generate();
        let them = AccountKeys::generate();
        let tx_key = KeyPair::generate();
        let (one_time, _, _, _) = generate_output_ephemeral_key(
            &them.address,
            false,
            false,
            &tx_key.secret,
            None,
            &tx_key.public,
            &us.view_secret_key,
            0,
            false,
        )
        .unwrap();
        let map = build_subaddress_map(&us, 1, 1).unwrap();
        assert_eq!(
            generate_key_image_helper(&us, &map, &one_time, &tx_key.public, &[], 0).unwrap_err(),
            CryptoError::NotOurs
        );
    }

    #[test]
    fn payment_id_encryption_roundtrips() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let mut pid = *b"\x01\x02\x03\x04\x05\x06\x07\x08";
        let original = pid;
        encrypt_payment_id(&mut pid, &b.public, &a.secret).unwrap();
        assert_ne!(pid, original);
        // Decryption is the same XOR with the symmetric derivation.
        encrypt_payment_id(&mut pid, &a.public, &b.secret).unwrap();
        assert_eq!(pid, original);
    }
}
