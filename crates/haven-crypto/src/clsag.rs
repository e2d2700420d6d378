//! CLSAG ring signatures.
//!
//! The compact two-key ring signature used by the Bulletproof+ RingCT
//! type: one response per ring member plus aggregated key and
//! commitment images, replacing the two-row MLSAG.

use curve25519_dalek::constants::{ED25519_BASEPOINT_POINT, ED25519_BASEPOINT_TABLE};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::VartimeMultiscalarMul;

use crate::{
    compress, decompress, hash_to_point, hash_to_scalar, inv_eight, random_scalar, scalar,
    CryptoError, Hash, KeyImage, PublicKey,
};

/// Domain separators, zero-padded to scalar width like the reference
/// implementation hashes them.
fn domain(tag: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..tag.len()].copy_from_slice(tag);
    out
}

/// CLSAG signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClsagSig {
    pub s: Vec<[u8; 32]>,
    pub c1: [u8; 32],
    /// Aggregate commitment image, stored divided by eight.
    pub d: [u8; 32],
}

struct Aggregates {
    mu_p: Scalar,
    mu_c: Scalar,
}

fn aggregate_hashes(
    ring: &[PublicKey],
    commitments: &[PublicKey],
    key_image: &KeyImage,
    d8: &[u8; 32],
    pseudo_out: &PublicKey,
) -> Aggregates {
    let agg0 = domain(b"CLSAG_agg_0");
    let agg1 = domain(b"CLSAG_agg_1");
    let mut parts: Vec<&[u8]> = Vec::with_capacity(2 * ring.len() + 4);
    parts.push(&agg0);
    for k in ring {
        parts.push(k);
    }
    for c in commitments {
        parts.push(c);
    }
    parts.push(key_image);
    parts.push(d8);
    parts.push(pseudo_out);
    let mu_p = hash_to_scalar(&parts);
    parts[0] = &agg1;
    let mu_c = hash_to_scalar(&parts);
    Aggregates { mu_p, mu_c }
}

fn round_challenge(
    ring: &[PublicKey],
    commitments: &[PublicKey],
    pseudo_out: &PublicKey,
    message: &Hash,
    l: &[u8; 32],
    r: &[u8; 32],
) -> Scalar {
    let round = domain(b"CLSAG_round");
    let mut parts: Vec<&[u8]> = Vec::with_capacity(2 * ring.len() + 5);
    parts.push(&round);
    for k in ring {
        parts.push(k);
    }
    for c in commitments {
        parts.push(c);
    }
    parts.push(pseudo_out);
    parts.push(message);
    parts.push(l);
    parts.push(r);
    hash_to_scalar(&parts)
}

/// Sign `message` over `ring`, proving ownership of
/// `ring[secret_index]` and that `commitments[secret_index]` minus the
/// pseudo output commits to zero under `commitment_mask`.
pub fn clsag_sign(
    message: &Hash,
    ring: &[PublicKey],
    secret_key: &[u8; 32],
    commitments: &[PublicKey],
    commitment_mask: &[u8; 32],
    pseudo_out: &PublicKey,
    secret_index: usize,
) -> Result<(ClsagSig, KeyImage), CryptoError> {
    let n = ring.len();
    if n == 0 || secret_index >= n || commitments.len() != n {
        return Err(CryptoError::Signature("bad CLSAG ring shape"));
    }

    let sk = scalar(secret_key);
    let z = scalar(commitment_mask);
    let pseudo_pt = decompress(pseudo_out)?;

    let mut c_diff = Vec::with_capacity(n);
    for c in commitments {
        c_diff.push(decompress(c)? - pseudo_pt);
    }

    let hp_l = hash_to_point(&ring[secret_index]);
    let key_image_pt = sk * hp_l;
    let key_image = compress(&key_image_pt);
    let d_full = z * hp_l;
    let d8 = compress(&(inv_eight() * d_full));

    let agg = aggregate_hashes(ring, commitments, &key_image, &d8, pseudo_out);

    let alpha = random_scalar();
    let a_g = compress(&(ED25519_BASEPOINT_TABLE * &alpha));
    let a_h = compress(&(alpha * hp_l));
    let mut c = round_challenge(ring, commitments, pseudo_out, message, &a_g, &a_h);

    let mut s = vec![[0u8; 32]; n];
    let mut c1 = None;
    let mut i = (secret_index + 1) % n;
    if i == 0 {
        c1 = Some(c);
    }

    while i != secret_index {
        let s_i = random_scalar();
        s[i] = s_i.to_bytes();
        let member = decompress(&ring[i])?;
        let c_p = c * agg.mu_p;
        let c_c = c * agg.mu_c;
        let l = EdwardsPoint::vartime_multiscalar_mul(
            &[s_i, c_p, c_c],
            &[ED25519_BASEPOINT_POINT, member, c_diff[i]],
        );
        let r = EdwardsPoint::vartime_multiscalar_mul(
            &[s_i, c_p, c_c],
            &[hash_to_point(&ring[i]), key_image_pt, d_full],
        );
        c = round_challenge(
            ring,
            commitments,
            pseudo_out,
            message,
            &compress(&l),
            &compress(&r),
        );
        i = (i + 1) % n;
        if i == 0 {
            c1 = Some(c);
        }
    }

    s[secret_index] = (alpha - c * (agg.mu_p * sk + agg.mu_c * z)).to_bytes();

    // A one-member ring never wrapped past zero.
    let c1 = match c1 {
        Some(v) => v,
        None => {
            let s_l = scalar(&s[secret_index]);
            let member = decompress(&ring[secret_index])?;
            let c_p = c * agg.mu_p;
            let c_c = c * agg.mu_c;
            let l = EdwardsPoint::vartime_multiscalar_mul(
                &[s_l, c_p, c_c],
                &[ED25519_BASEPOINT_POINT, member, c_diff[secret_index]],
            );
            let r = EdwardsPoint::vartime_multiscalar_mul(
                &[s_l, c_p, c_c],
                &[hp_l, key_image_pt, d_full],
            );
            round_challenge(
                ring,
                commitments,
                pseudo_out,
                message,
                &compress(&l),
                &compress(&r),
            )
        }
    };

    Ok((
        ClsagSig {
            s,
            c1: c1.to_bytes(),
            d: d8,
        },
        key_image,
    ))
}

/// Verify a CLSAG signature.
pub fn clsag_verify(
    message: &Hash,
    sig: &ClsagSig,
    key_image: &KeyImage,
    ring: &[PublicKey],
    commitments: &[PublicKey],
    pseudo_out: &PublicKey,
) -> bool {
    let n = ring.len();
    if n == 0 || commitments.len() != n || sig.s.len() != n {
        return false;
    }
    let pseudo_pt = match decompress(pseudo_out) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let key_image_pt = match decompress(key_image) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let d8_pt = match decompress(&sig.d) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let d_full = d8_pt.mul_by_cofactor();

    let mut c_diff = Vec::with_capacity(n);
    for c in commitments {
        match decompress(c) {
            Ok(p) => c_diff.push(p - pseudo_pt),
            Err(_) => return false,
        }
    }

    let agg = aggregate_hashes(ring, commitments, key_image, &sig.d, pseudo_out);

    let mut c = scalar(&sig.c1);
    for i in 0..n {
        let s_i = scalar(&sig.s[i]);
        let member = match decompress(&ring[i]) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let c_p = c * agg.mu_p;
        let c_c = c * agg.mu_c;
        let l = EdwardsPoint::vartime_multiscalar_mul(
            &[s_i, c_p, c_c],
            &[ED25519_BASEPOINT_POINT, member, c_diff[i]],
        );
        let r = EdwardsPoint::vartime_multiscalar_mul(
            &[s_i, c_p, c_c],
            &[hash_to_point(&ring[i]), key_image_pt, d_full],
        );
        c = round_challenge(
            ring,
            commitments,
            pseudo_out,
            message,
            &compress(&l),
            &compress(&r),
        );
    }

    c.to_bytes() == sig.c1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keccak256;

    fn setup(n: usize, secret_index: usize) -> (Vec<PublicKey>, Vec<PublicKey>, [u8; 32], [u8; 32], PublicKey) {
        let mut ring = Vec::with_capacity(n);
        let mut commitments = Vec::with_capacity(n);
        let mut secret = [0u8; 32];
        let mut z = [0u8; 32];
        let pseudo_mask = random_scalar();
        let pseudo_out = compress(&(ED25519_BASEPOINT_TABLE * &pseudo_mask));

        for i in 0..n {
            let x = random_scalar();
            let mask = random_scalar();
            ring.push(compress(&(ED25519_BASEPOINT_TABLE * &x)));
            commitments.push(compress(&(ED25519_BASEPOINT_TABLE * &mask)));
            if i == secret_index {
                secret = x.to_bytes();
                z = (mask - pseudo_mask).to_bytes();
            }
        }
        (ring, commitments, secret, z, pseudo_out)
    }

    #[test]
    fn sign_verify_ring_16() {
        let (ring, commitments, secret, z, pseudo) = setup(16, 9);
        let msg = keccak256(b"clsag message");
        let (sig, image) =
            clsag_sign(&msg, &ring, &secret, &commitments, &z, &pseudo, 9).unwrap();
        assert!(clsag_verify(&msg, &sig, &image, &ring, &commitments, &pseudo));
    }

    #[test]
    fn sign_verify_ring_1() {
        let (ring, commitments, secret, z, pseudo) = setup(1, 0);
        let msg = keccak256(b"solo");
        let (sig, image) =
            clsag_sign(&msg, &ring, &secret, &commitments, &z, &pseudo, 0).unwrap();
        assert!(clsag_verify(&msg, &sig, &image, &ring, &commitments, &pseudo));
    }

    #[test]
    fn wrong_message_fails() {
        let (ring, commitments, secret, z, pseudo) = setup(5, 2);
        let msg = keccak256(b"right");
        let (sig, image) =
            clsag_sign(&msg, &ring, &secret, &commitments, &z, &pseudo, 2).unwrap();
        assert!(!clsag_verify(&keccak256(b"wrong"), &sig, &image, &ring, &commitments, &pseudo));
    }

    #[test]
    fn wrong_pseudo_out_fails() {
        let (ring, commitments, secret, z, pseudo) = setup(5, 2);
        let msg = keccak256(b"m");
        let (sig, image) =
            clsag_sign(&msg, &ring, &secret, &commitments, &z, &pseudo, 2).unwrap();
        let other = compress(&(ED25519_BASEPOINT_TABLE * &random_scalar()));
        assert!(!clsag_verify(&msg, &sig, &image, &ring, &commitments, &other));
    }
}
