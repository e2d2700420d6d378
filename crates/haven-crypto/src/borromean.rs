//! Borromean range signatures.
//!
//! A range proof over a 64-bit amount: the amount is decomposed into
//! per-bit commitments `C_i = a_i*G + b_i*2^i*H`, and a Borromean ring
//! signature proves each `C_i` commits to either 0 or `2^i` without
//! revealing which. The commitment masks sum to the output mask.

use curve25519_dalek::constants::{ED25519_BASEPOINT_POINT, ED25519_BASEPOINT_TABLE};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::{Identity, VartimeMultiscalarMul};

use crate::{compress, decompress, h_point, hash_to_scalar, random_scalar, scalar, PublicKey};

/// Borromean ring signature over 64 two-member rings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorromeanSig {
    pub s0: Vec<[u8; 32]>,
    pub s1: Vec<[u8; 32]>,
    pub ee: [u8; 32],
}

/// A full range signature: the Borromean part plus the per-bit
/// commitments it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSig {
    pub asig: BorromeanSig,
    pub ci: Vec<PublicKey>,
}

fn challenge(point: &EdwardsPoint) -> Scalar {
    hash_to_scalar(&[&compress(point)])
}

/// `2^i * H` for each bit position.
fn h_powers() -> Vec<EdwardsPoint> {
    let mut powers = Vec::with_capacity(64);
    let mut cur = h_point();
    for _ in 0..64 {
        powers.push(cur);
        cur = cur + cur;
    }
    powers
}

/// Sign 64 two-member rings: `p1[i]` commits to zero when `bits[i]` is
/// clear, `p2[i] = p1[i] - 2^i*H` commits to zero when it is set, and
/// `x[i]` opens whichever one does.
fn gen_borromean(
    x: &[Scalar],
    p1: &[EdwardsPoint],
    p2: &[EdwardsPoint],
    bits: u64,
) -> BorromeanSig {
    let n = x.len();
    let mut alpha = Vec::with_capacity(n);
    let mut s0 = vec![[0u8; 32]; n];
    let mut s1 = vec![[0u8; 32]; n];
    let mut l1_transcript = Vec::with_capacity(n * 32);

    for i in 0..n {
        let a = random_scalar();
        let commit = ED25519_BASEPOINT_TABLE * &a;
        if (bits >> i) & 1 == 0 {
            // Start at ring position 0; fast-forward through position 1.
            let s = random_scalar();
            s1[i] = s.to_bytes();
            let c = challenge(&commit);
            let l1 = EdwardsPoint::vartime_multiscalar_mul(&[s, c], &[ED25519_BASEPOINT_POINT, p2[i]]);
            l1_transcript.extend_from_slice(&compress(&l1));
        } else {
            l1_transcript.extend_from_slice(&compress(&commit));
        }
        alpha.push(a);
    }

    let ee = hash_to_scalar(&[&l1_transcript]);

    for i in 0..n {
        if (bits >> i) & 1 == 0 {
            s0[i] = (alpha[i] - x[i] * ee).to_bytes();
        } else {
            let s = random_scalar();
            s0[i] = s.to_bytes();
            let ll = EdwardsPoint::vartime_multiscalar_mul(&[s, ee], &[ED25519_BASEPOINT_POINT, p1[i]]);
            let cc = challenge(&ll);
            s1[i] = (alpha[i] - x[i] * cc).to_bytes();
        }
    }

    BorromeanSig {
        s0,
        s1,
        ee: ee.to_bytes(),
    }
}

fn ver_borromean(sig: &BorromeanSig, p1: &[EdwardsPoint], p2: &[EdwardsPoint]) -> bool {
    let n = p1.len();
    if sig.s0.len() != n || sig.s1.len() != n || p2.len() != n {
        return false;
    }
    let ee = scalar(&sig.ee);
    let mut l1_transcript = Vec::with_capacity(n * 32);
    for i in 0..n {
        let s0 = scalar(&sig.s0[i]);
        let lv = EdwardsPoint::vartime_multiscalar_mul(&[s0, ee], &[ED25519_BASEPOINT_POINT, p1[i]]);
        let c = challenge(&lv);
        let s1 = scalar(&sig.s1[i]);
        let lv1 = EdwardsPoint::vartime_multiscalar_mul(&[s1, c], &[ED25519_BASEPOINT_POINT, p2[i]]);
        l1_transcript.extend_from_slice(&compress(&lv1));
    }
    hash_to_scalar(&[&l1_transcript]) == ee
}

/// Prove `amount` lies in `[0, 2^64)`. Returns the signature, the total
/// commitment `C = mask*G + amount*H`, and the mask.
pub fn prove_range(amount: u64) -> (RangeSig, PublicKey, Scalar) {
    let powers = h_powers();
    let mut masks = Vec::with_capacity(64);
    let mut ci = Vec::with_capacity(64);
    let mut ci_minus = Vec::with_capacity(64);
    let mut mask_sum = Scalar::ZERO;
    let mut total = EdwardsPoint::identity();

    for i in 0..64 {
        let a = random_scalar();
        mask_sum += a;
        let mut point = ED25519_BASEPOINT_TABLE * &a;
        if (amount >> i) & 1 == 1 {
            point += powers[i];
        }
        total += point;
        ci.push(point);
        ci_minus.push(point - powers[i]);
        masks.push(a);
    }

    let asig = gen_borromean(&masks, &ci, &ci_minus, amount);
    let sig = RangeSig {
        asig,
        ci: ci.iter().map(compress).collect(),
    };
    (sig, compress(&total), mask_sum)
}

/// Verify that `commitment` opens to a 64-bit amount under `sig`.
pub fn verify_range(commitment: &PublicKey, sig: &RangeSig) -> bool {
    if sig.ci.len() != 64 {
        return false;
    }
    let powers = h_powers();
    let mut ci = Vec::with_capacity(64);
    let mut ci_minus = Vec::with_capacity(64);
    let mut total = EdwardsPoint::identity();
    for (i, c) in sig.ci.iter().enumerate() {
        let point = match decompress(c) {
            Ok(p) => p,
            Err(_) => return false,
        };
        total += point;
        ci_minus.push(point - powers[i]);
        ci.push(point);
    }
    if &compress(&total) != commitment {
        return false;
    }
    ver_borromean(&sig.asig, &ci, &ci_minus)
}
