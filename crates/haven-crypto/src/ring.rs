//! Legacy (version 1) ring signatures.
//!
//! One signature element per ring member; the prover closes the ring
//! at its secret index. Linkability comes from the key image included
//! in the challenge.

use curve25519_dalek::constants::{ED25519_BASEPOINT_POINT, ED25519_BASEPOINT_TABLE};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::VartimeMultiscalarMul;

use crate::{
    compress, decompress, hash_to_point, hash_to_scalar, random_scalar, scalar, CryptoError, Hash,
    KeyImage, PublicKey, SecretKey,
};

/// One ring member's `(c, r)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signature {
    pub c: [u8; 32],
    pub r: [u8; 32],
}

/// Sign `prefix_hash` over `ring`, proving knowledge of the secret key
/// behind `ring[secret_index]` without revealing which member it is.
pub fn generate_ring_signature(
    prefix_hash: &Hash,
    key_image: &KeyImage,
    ring: &[PublicKey],
    secret_key: &SecretKey,
    secret_index: usize,
) -> Result<Vec<Signature>, CryptoError> {
    let n = ring.len();
    if n == 0 || secret_index >= n {
        return Err(CryptoError::Signature("empty ring or bad secret index"));
    }

    let image_pt = decompress(key_image)?;
    let sec = scalar(secret_key);

    let mut sigs = vec![Signature::default(); n];
    let mut challenge_sum = Scalar::ZERO;
    let mut k = Scalar::ZERO;

    // Transcript: prefix hash, then (L, R) per member in ring order.
    let mut transcript = Vec::with_capacity(32 + n * 64);
    transcript.extend_from_slice(prefix_hash);

    for i in 0..n {
        let (l_pt, r_pt) = if i == secret_index {
            k = random_scalar();
            (ED25519_BASEPOINT_TABLE * &k, k * hash_to_point(&ring[i]))
        } else {
            let c = random_scalar();
            let r = random_scalar();
            sigs[i] = Signature {
                c: c.to_bytes(),
                r: r.to_bytes(),
            };
            challenge_sum += c;
            let member = decompress(&ring[i])?;
            let l = EdwardsPoint::vartime_multiscalar_mul(
                &[r, c],
                &[ED25519_BASEPOINT_POINT, member],
            );
            let r_pt = EdwardsPoint::vartime_multiscalar_mul(
                &[r, c],
                &[hash_to_point(&ring[i]), image_pt],
            );
            (l, r_pt)
        };
        transcript.extend_from_slice(&compress(&l_pt));
        transcript.extend_from_slice(&compress(&r_pt));
    }

    let h = hash_to_scalar(&[&transcript]);
    let c_s = h - challenge_sum;
    let r_s = k - c_s * sec;
    sigs[secret_index] = Signature {
        c: c_s.to_bytes(),
        r: r_s.to_bytes(),
    };
    Ok(sigs)
}

/// Verify a ring signature produced by [`generate_ring_signature`].
pub fn check_ring_signature(
    prefix_hash: &Hash,
    key_image: &KeyImage,
    ring: &[PublicKey],
    sigs: &[Signature],
) -> bool {
    if ring.is_empty() || ring.len() != sigs.len() {
        return false;
    }
    let image_pt = match decompress(key_image) {
        Ok(p) => p,
        Err(_) => return false,
    };

    let mut transcript = Vec::with_capacity(32 + ring.len() * 64);
    transcript.extend_from_slice(prefix_hash);
    let mut challenge_sum = Scalar::ZERO;

    for (member, sig) in ring.iter().zip(sigs) {
        let c = scalar(&sig.c);
        let r = scalar(&sig.r);
        challenge_sum += c;
        let member_pt = match decompress(member) {
            Ok(p) => p,
            Err(_) => return false,
        };
        let l = EdwardsPoint::vartime_multiscalar_mul(&[r, c], &[ED25519_BASEPOINT_POINT, member_pt]);
        let r_pt =
            EdwardsPoint::vartime_multiscalar_mul(&[r, c], &[hash_to_point(member), image_pt]);
        transcript.extend_from_slice(&compress(&l));
        transcript.extend_from_slice(&compress(&r_pt));
    }

    hash_to_scalar(&[&transcript]) == challenge_sum
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate_key_image, keccak256, KeyPair};

    fn ring_with_secret(n: usize, secret_index: usize) -> (Vec<PublicKey>, KeyPair) {
        let mut ring = Vec::with_capacity(n);
        let mut owner = None;
        for i in 0..n {
            let kp = KeyPair::generate();
            ring.push(kp.public);
            if i == secret_index {
                owner = Some(kp);
            }
        }
        (ring, owner.unwrap())
    }

    #[test]
    fn sign_and_verify() {
        let (ring, owner) = ring_with_secret(7, 3);
        let image = generate_key_image(&owner.public, &owner.secret);
        let prefix = keccak256(b"tx prefix");

        let sigs = generate_ring_signature(&prefix, &image, &ring, &owner.secret, 3).unwrap();
        assert_eq!(sigs.len(), 7);
        assert!(check_ring_signature(&prefix, &image, &ring, &sigs));
    }

    #[test]
    fn wrong_message_fails() {
        let (ring, owner) = ring_with_secret(4, 0);
        let image = generate_key_image(&owner.public, &owner.secret);
        let prefix = keccak256(b"tx prefix");
        let sigs = generate_ring_signature(&prefix, &image, &ring, &owner.secret, 0).unwrap();
        assert!(!check_ring_signature(&keccak256(b"other"), &image, &ring, &sigs));
    }

    #[test]
    fn wrong_key_image_fails() {
        let (ring, owner) = ring_with_secret(4, 2);
        let image = generate_key_image(&owner.public, &owner.secret);
        let prefix = keccak256(b"tx prefix");
        let sigs = generate_ring_signature(&prefix, &image, &ring, &owner.secret, 2).unwrap();

        let other = KeyPair::generate();
        let bad_image = generate_key_image(&other.public, &other.secret);
        assert!(!check_ring_signature(&prefix, &bad_image, &ring, &sigs));
    }

    #[test]
    fn single_member_ring() {
        let (ring, owner) = ring_with_secret(1, 0);
        let image = generate_key_image(&owner.public, &owner.secret);
        let prefix = keccak256(b"solo");
        let sigs = generate_ring_signature(&prefix, &image, &ring, &owner.secret, 0).unwrap();
        assert!(check_ring_signature(&prefix, &image, &ring, &sigs));
    }

    #[test]
    fn bad_secret_index_rejected() {
        let (ring, owner) = ring_with_secret(3, 1);
        let image = generate_key_image(&owner.public, &owner.secret);
        let prefix = keccak256(b"oob");
        assert!(generate_ring_signature(&prefix, &image, &ring, &owner.secret, 3).is_err());
    }
}
