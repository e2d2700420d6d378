//! MLSAG multilayered linkable ring signatures.
//!
//! The matrix form used by RingCT: `n` ring columns of `m` rows each.
//! The first `ds_rows` rows are linkable (carry key images); the
//! remaining rows only prove knowledge of a discrete log. Full RingCT
//! uses `m = inputs + 1` with `ds_rows = inputs`; simple RingCT uses
//! one signature per input with `m = 2`, `ds_rows = 1`.

use curve25519_dalek::constants::{ED25519_BASEPOINT_POINT, ED25519_BASEPOINT_TABLE};
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::VartimeMultiscalarMul;

use crate::{
    compress, decompress, hash_to_point, hash_to_scalar, random_scalar, scalar, CryptoError, Hash,
    KeyImage, PublicKey,
};

/// MLSAG signature: the response matrix and the seed challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgSig {
    /// `ss[column][row]` responses.
    pub ss: Vec<Vec<[u8; 32]>>,
    /// Challenge at column 0.
    pub cc: [u8; 32],
}

/// Sign `message` over the key matrix `pk` (`pk[column][row]`), knowing
/// the secrets `xx` of column `index`. Returns the signature together
/// with the key images of the first `ds_rows` rows.
pub fn mlsag_sign(
    message: &Hash,
    pk: &[Vec<PublicKey>],
    xx: &[Scalar],
    index: usize,
    ds_rows: usize,
) -> Result<(MgSig, Vec<KeyImage>), CryptoError> {
    let n = pk.len();
    if n == 0 || index >= n {
        return Err(CryptoError::Signature("empty ring or bad index"));
    }
    let rows = xx.len();
    if rows == 0 || ds_rows > rows || pk.iter().any(|col| col.len() != rows) {
        return Err(CryptoError::Signature("bad key matrix shape"));
    }

    // Key images and alpha commitments for the secret column.
    let mut images = Vec::with_capacity(ds_rows);
    let mut image_pts = Vec::with_capacity(ds_rows);
    for j in 0..ds_rows {
        let pt = xx[j] * hash_to_point(&pk[index][j]);
        images.push(compress(&pt));
        image_pts.push(pt);
    }

    let mut alpha = Vec::with_capacity(rows);
    let mut transcript = Vec::new();
    transcript.extend_from_slice(message);
    for j in 0..rows {
        let a = random_scalar();
        let a_g = ED25519_BASEPOINT_TABLE * &a;
        transcript.extend_from_slice(&pk[index][j]);
        transcript.extend_from_slice(&compress(&a_g));
        if j < ds_rows {
            let a_h = a * hash_to_point(&pk[index][j]);
            transcript.extend_from_slice(&compress(&a_h));
        }
        alpha.push(a);
    }
    let mut c = hash_to_scalar(&[&transcript]);

    let mut ss = vec![vec![[0u8; 32]; rows]; n];
    let mut cc = Scalar::ZERO;
    let mut i = (index + 1) % n;
    if i == 0 {
        cc = c;
    }

    while i != index {
        let mut round = Vec::new();
        round.extend_from_slice(message);
        for j in 0..rows {
            let s = random_scalar();
            ss[i][j] = s.to_bytes();
            let member = decompress(&pk[i][j])?;
            let l = EdwardsPoint::vartime_multiscalar_mul(&[s, c], &[ED25519_BASEPOINT_POINT, member]);
            round.extend_from_slice(&pk[i][j]);
            round.extend_from_slice(&compress(&l));
            if j < ds_rows {
                let r = EdwardsPoint::vartime_multiscalar_mul(
                    &[s, c],
                    &[hash_to_point(&pk[i][j]), image_pts[j]],
                );
                round.extend_from_slice(&compress(&r));
            }
        }
        c = hash_to_scalar(&[&round]);
        i = (i + 1) % n;
        if i == 0 {
            cc = c;
        }
    }

    for j in 0..rows {
        ss[index][j] = (alpha[j] - c * xx[j]).to_bytes();
    }

    Ok((
        MgSig {
            ss,
            cc: cc.to_bytes(),
        },
        images,
    ))
}

/// Verify an MLSAG signature against the key matrix and key images.
pub fn mlsag_verify(
    message: &Hash,
    pk: &[Vec<PublicKey>],
    sig: &MgSig,
    images: &[KeyImage],
    ds_rows: usize,
) -> bool {
    let n = pk.len();
    if n == 0 || sig.ss.len() != n {
        return false;
    }
    let rows = match pk.first() {
        Some(col) => col.len(),
        None => return false,
    };
    if rows == 0 || ds_rows > rows || images.len() != ds_rows {
        return false;
    }
    if pk.iter().any(|col| col.len() != rows) || sig.ss.iter().any(|col| col.len() != rows) {
        return false;
    }

    let mut image_pts = Vec::with_capacity(ds_rows);
    for img in images {
        match decompress(img) {
            Ok(p) => image_pts.push(p),
            Err(_) => return false,
        }
    }

    let mut c = scalar(&sig.cc);
    for i in 0..n {
        let mut round = Vec::new();
        round.extend_from_slice(message);
        for j in 0..rows {
            let s = scalar(&sig.ss[i][j]);
            let member = match decompress(&pk[i][j]) {
                Ok(p) => p,
                Err(_) => return false,
            };
            let l = EdwardsPoint::vartime_multiscalar_mul(&[s, c], &[ED25519_BASEPOINT_POINT, member]);
            round.extend_from_slice(&pk[i][j]);
            round.extend_from_slice(&compress(&l));
            if j < ds_rows {
                let r = EdwardsPoint::vartime_multiscalar_mul(
                    &[s, c],
                    &[hash_to_point(&pk[i][j]), image_pts[j]],
                );
                round.extend_from_slice(&compress(&r));
            }
        }
        c = hash_to_scalar(&[&round]);
    }

    c == scalar(&sig.cc)
}
