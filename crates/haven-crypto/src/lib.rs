//! Crypto primitives consumed by the transaction core.
//!
//! Hashing, one-time key derivation, view tags, key images, Pedersen
//! commitments, plus the signature suites (legacy ring signatures,
//! Borromean range proofs, MLSAG, CLSAG, Bulletproof+) and the RingCT
//! bundle generator built on them. Everything is expressed over
//! 32-byte compressed Edwards points and scalars so the wire model
//! never has to hold curve types.

use curve25519_dalek::constants::{ED25519_BASEPOINT_POINT, ED25519_BASEPOINT_TABLE};
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};

pub mod borromean;
pub mod bpp;
pub mod clsag;
pub mod hw;
pub mod mlsag;
pub mod rct;
pub mod ring;
pub mod serial;
pub mod stealth;

pub type PublicKey = [u8; 32];
pub type SecretKey = [u8; 32];
pub type KeyImage = [u8; 32];
pub type KeyDerivation = [u8; 32];
pub type Hash = [u8; 32];

/// A one-byte fast-reject hint derived from the output shared secret.
pub type ViewTag = u8;

pub const NULL_PKEY: PublicKey = [0u8; 32];
pub const NULL_HASH: Hash = [0u8; 32];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid curve point")]
    InvalidPoint,

    #[error("invalid scalar encoding")]
    InvalidScalar,

    #[error("derived output key does not match the stored output key")]
    KeyMismatch,

    #[error("output is not owned by these keys")]
    NotOurs,

    #[error("signature generation failed: {0}")]
    Signature(&'static str),
}

/// H generator for Pedersen commitments, `H = to_point(keccak(G))`.
pub(crate) const H_POINT: [u8; 32] = [
    0x8b, 0x65, 0x59, 0x70, 0x15, 0x37, 0x99, 0xaf, 0x2a, 0xea, 0xdc, 0x9f, 0xf1, 0xad, 0xd0,
    0xea, 0x6c, 0x72, 0x51, 0xd5, 0x41, 0x54, 0xcf, 0xa9, 0x2c, 0x17, 0x3a, 0x0d, 0xd3, 0x9c,
    0x1f, 0x94,
];

// --- Hashing ---------------------------------------------------------------

/// Keccak-256 (the CryptoNote fast hash, not SHA3).
pub fn keccak256(data: &[u8]) -> Hash {
    let mut keccak = Keccak::v256();
    let mut out = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut out);
    out
}

/// Hash the concatenation of `parts` and reduce mod L.
pub fn hash_to_scalar(parts: &[&[u8]]) -> Scalar {
    let mut keccak = Keccak::v256();
    let mut out = [0u8; 32];
    for p in parts {
        keccak.update(p);
    }
    keccak.finalize(&mut out);
    Scalar::from_bytes_mod_order(out)
}

/// Deterministic point derivation: iterate keccak until the digest
/// decompresses, then clear the cofactor.
pub fn hash_to_point(data: &[u8]) -> EdwardsPoint {
    let mut digest = keccak256(data);
    loop {
        if let Some(p) = CompressedEdwardsY(digest).decompress() {
            let p8 = p.mul_by_cofactor();
            if p8 != EdwardsPoint::identity() {
                return p8;
            }
        }
        digest = keccak256(&digest);
    }
}

// --- Scalar / point helpers ------------------------------------------------

pub(crate) fn decompress(bytes: &PublicKey) -> Result<EdwardsPoint, CryptoError> {
    CompressedEdwardsY(*bytes)
        .decompress()
        .ok_or(CryptoError::InvalidPoint)
}

pub(crate) fn compress(p: &EdwardsPoint) -> [u8; 32] {
    p.compress().to_bytes()
}

pub(crate) fn scalar(bytes: &[u8; 32]) -> Scalar {
    Scalar::from_bytes_mod_order(*bytes)
}

/// A uniformly random scalar from OS entropy.
pub fn random_scalar() -> Scalar {
    let mut wide = [0u8; 64];
    getrandom::getrandom(&mut wide).expect("OS entropy unavailable");
    Scalar::from_bytes_mod_order_wide(&wide)
}

/// `8^-1 mod L`, used to store torsion-safe group elements.
pub(crate) fn inv_eight() -> Scalar {
    Scalar::from(8u64).invert()
}

/// `s * G` in compressed form.
pub fn scalarmult_base(sec: &SecretKey) -> PublicKey {
    compress(&(ED25519_BASEPOINT_TABLE * &scalar(sec)))
}

/// `s * P` in compressed form.
pub fn scalarmult_key(point: &PublicKey, sec: &SecretKey) -> Result<PublicKey, CryptoError> {
    Ok(compress(&(scalar(sec) * decompress(point)?)))
}

// --- Keypairs --------------------------------------------------------------

/// A public/secret key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

impl KeyPair {
    /// Generate a fresh keypair from OS entropy.
    pub fn generate() -> Self {
        let sec = random_scalar();
        KeyPair {
            public: compress(&(ED25519_BASEPOINT_TABLE * &sec)),
            secret: sec.to_bytes(),
        }
    }
}

// --- One-time key derivation ----------------------------------------------

/// ECDH shared secret with the cofactor cleared: `D = 8 * sec * pub`.
pub fn generate_key_derivation(
    pub_key: &PublicKey,
    sec_key: &SecretKey,
) -> Result<KeyDerivation, CryptoError> {
    let shared = scalar(sec_key) * decompress(pub_key)?;
    Ok(compress(&shared.mul_by_cofactor()))
}

/// `Hs(derivation ‖ varint(index))`.
pub fn derivation_to_scalar(derivation: &KeyDerivation, output_index: u64) -> Scalar {
    let mut buf = Vec::with_capacity(40);
    buf.extend_from_slice(derivation);
    serial::push_varint(&mut buf, output_index);
    hash_to_scalar(&[&buf])
}

/// One-time output key: `base + Hs(derivation ‖ index) * G`.
pub fn derive_public_key(
    derivation: &KeyDerivation,
    output_index: u64,
    base: &PublicKey,
) -> Result<PublicKey, CryptoError> {
    let s = derivation_to_scalar(derivation, output_index);
    Ok(compress(
        &(ED25519_BASEPOINT_TABLE * &s + decompress(base)?),
    ))
}

/// One-time secret key: `base + Hs(derivation ‖ index)`.
pub fn derive_secret_key(
    derivation: &KeyDerivation,
    output_index: u64,
    base: &SecretKey,
) -> SecretKey {
    (scalar(base) + derivation_to_scalar(derivation, output_index)).to_bytes()
}

/// Recover the recipient base key: `out_key - Hs(derivation ‖ index) * G`.
pub fn derive_subaddress_public_key(
    out_key: &PublicKey,
    derivation: &KeyDerivation,
    output_index: u64,
) -> Result<PublicKey, CryptoError> {
    let s = derivation_to_scalar(derivation, output_index);
    Ok(compress(
        &(decompress(out_key)? - ED25519_BASEPOINT_TABLE * &s),
    ))
}

/// First byte of `Hs("view_tag" ‖ derivation ‖ varint(index))`.
pub fn derive_view_tag(derivation: &KeyDerivation, output_index: u64) -> ViewTag {
    let mut buf = Vec::with_capacity(48);
    buf.extend_from_slice(b"view_tag");
    buf.extend_from_slice(derivation);
    serial::push_varint(&mut buf, output_index);
    keccak256(&buf)[0]
}

/// Key image: `sec * to_point(pub)`, globally unique per spendable output.
pub fn generate_key_image(pub_key: &PublicKey, sec_key: &SecretKey) -> KeyImage {
    compress(&(scalar(sec_key) * hash_to_point(pub_key)))
}

// --- Pedersen commitments --------------------------------------------------

pub(crate) fn h_point() -> EdwardsPoint {
    CompressedEdwardsY(H_POINT)
        .decompress()
        .expect("H generator is a valid point")
}

/// `C = mask * G + amount * H`.
pub fn pedersen_commit(amount: u64, mask: &Scalar) -> PublicKey {
    compress(&(ED25519_BASEPOINT_TABLE * mask + Scalar::from(amount) * h_point()))
}

/// Commitment with the identity mask, used for coinbase amounts and fees:
/// `C = G + amount * H`.
pub fn zero_commit(amount: u64) -> PublicKey {
    compress(&(ED25519_BASEPOINT_POINT + Scalar::from(amount) * h_point()))
}

/// Deterministic output commitment mask:
/// `Hs("commitment_mask" ‖ shared_secret)`.
pub fn gen_commitment_mask(shared_secret: &[u8; 32]) -> Scalar {
    hash_to_scalar(&[b"commitment_mask", shared_secret])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_known_vector() {
        // keccak256("") from the original Keccak submission.
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn derivation_is_symmetric() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let d1 = generate_key_derivation(&b.public, &a.secret).unwrap();
        let d2 = generate_key_derivation(&a.public, &b.secret).unwrap();
        assert_eq!(d1, d2);
    }

    #[test]
    fn one_time_keys_agree() {
        // Receiver derives the one-time pubkey; sender derives the matching
        // secret; they must correspond.
        let view = KeyPair::generate();
        let spend = KeyPair::generate();
        let tx_key = KeyPair::generate();

        let sender_d = generate_key_derivation(&view.public, &tx_key.secret).unwrap();
        let out_key = derive_public_key(&sender_d, 3, &spend.public).unwrap();

        let recv_d = generate_key_derivation(&tx_key.public, &view.secret).unwrap();
        assert_eq!(sender_d, recv_d);
        let out_sec = derive_secret_key(&recv_d, 3, &spend.secret);
        assert_eq!(scalarmult_base(&out_sec), out_key);
    }

    #[test]
    fn subaddress_key_recovery() {
        let view = KeyPair::generate();
        let spend = KeyPair::generate();
        let tx_key = KeyPair::generate();

        let d = generate_key_derivation(&view.public, &tx_key.secret).unwrap();
        let out_key = derive_public_key(&d, 0, &spend.public).unwrap();
        let recovered = derive_subaddress_public_key(&out_key, &d, 0).unwrap();
        assert_eq!(recovered, spend.public);
    }

    #[test]
    fn key_image_is_deterministic() {
        let kp = KeyPair::generate();
        let img1 = generate_key_image(&kp.public, &kp.secret);
        let img2 = generate_key_image(&kp.public, &kp.secret);
        assert_eq!(img1, img2);

        let other = KeyPair::generate();
        assert_ne!(img1, generate_key_image(&other.public, &other.secret));
    }

    #[test]
    fn commitments_are_additive() {
        let m1 = random_scalar();
        let m2 = random_scalar();
        let c1 = decompress(&pedersen_commit(10, &m1)).unwrap();
        let c2 = decompress(&pedersen_commit(32, &m2)).unwrap();
        let sum = decompress(&pedersen_commit(42, &(m1 + m2))).unwrap();
        assert_eq!(c1 + c2, sum);
    }

    #[test]
    fn view_tag_depends_on_index() {
        let d = [9u8; 32];
        // Not guaranteed distinct, but must be deterministic.
        assert_eq!(derive_view_tag(&d, 0), derive_view_tag(&d, 0));
    }

    #[test]
    fn hash_to_point_is_torsion_free() {
        let p = hash_to_point(b"some output key");
        assert!(p.is_torsion_free());
    }
}
