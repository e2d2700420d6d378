//! RingCT signature bundles.
//!
//! `gen_rct` produces the aggregate (full) form over a single shared
//! ring; `gen_rct_simple` produces the per-input form with pseudo
//! output commitments. Three bundle types are generated: `FULL` and
//! `SIMPLE` carry Borromean range proofs with MLSAG ring signatures,
//! `BULLETPROOF_PLUS` carries one aggregate Bulletproof+ with CLSAG
//! ring signatures and compact encrypted amounts.

use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;

use crate::borromean::{self, BorromeanSig, RangeSig};
use crate::bpp::{self, BulletproofPlus};
use crate::clsag::{self, ClsagSig};
use crate::mlsag::{self, MgSig};
use crate::serial::{Reader, SerialError, Writer};
use crate::{
    compress, decompress, gen_commitment_mask, h_point, hash_to_scalar, keccak256,
    pedersen_commit, random_scalar, scalar, CryptoError, Hash, KeyImage, PublicKey,
};

/// RingCT bundle type identifiers (wire values).
pub mod rct_type {
    pub const NULL: u8 = 0;
    pub const FULL: u8 = 1;
    pub const SIMPLE: u8 = 2;
    pub const BULLETPROOF: u8 = 3;
    pub const BULLETPROOF2: u8 = 4;
    pub const CLSAG: u8 = 5;
    pub const BULLETPROOF_PLUS: u8 = 6;
}

/// Which range proof the caller wants; anything but Borromean forces
/// the simple bundle shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeProofType {
    Borromean,
    PaddedBulletproof,
}

/// Signing configuration handed to the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RctConfig {
    pub range_proof_type: RangeProofType,
    pub bp_version: u8,
}

impl RctConfig {
    pub fn borromean() -> Self {
        RctConfig {
            range_proof_type: RangeProofType::Borromean,
            bp_version: 0,
        }
    }

    pub fn bulletproof_plus() -> Self {
        RctConfig {
            range_proof_type: RangeProofType::PaddedBulletproof,
            bp_version: 4,
        }
    }
}

/// A ring member: one-time output key and its amount commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtKey {
    pub dest: PublicKey,
    pub mask: PublicKey,
}

/// Encrypted amount data for one output. Legacy bundles use both
/// fields; compact bundles keep the 8-byte amount in `amount[..8]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EcdhTuple {
    pub mask: [u8; 32],
    pub amount: [u8; 32],
}

/// The full signature bundle attached to a version ≥ 2 transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RctSig {
    pub rct_type: u8,
    pub txn_fee: u64,
    pub ecdh_info: Vec<EcdhTuple>,
    /// Output amount commitments.
    pub out_pk: Vec<PublicKey>,
    /// Input pseudo commitments (simple shapes only).
    pub pseudo_outs: Vec<PublicKey>,
    pub range_sigs: Vec<RangeSig>,
    pub bulletproofs_plus: Vec<BulletproofPlus>,
    pub mlsags: Vec<MgSig>,
    pub clsags: Vec<ClsagSig>,
}

impl RctSig {
    pub fn is_null(&self) -> bool {
        self.rct_type == rct_type::NULL
    }

    /// Whether amounts ride in the compact 8-byte ecdh form.
    pub fn compact_amounts(&self) -> bool {
        self.rct_type >= rct_type::BULLETPROOF2
    }
}

// --- Encrypted amounts -----------------------------------------------------

/// Legacy additive encryption: mask and amount are blinded by hashes of
/// the shared secret.
pub fn ecdh_encode(tuple: &mut EcdhTuple, shared_secret: &[u8; 32]) {
    let first = hash_to_scalar(&[shared_secret]);
    let second = hash_to_scalar(&[&first.to_bytes()]);
    tuple.mask = (scalar(&tuple.mask) + first).to_bytes();
    tuple.amount = (scalar(&tuple.amount) + second).to_bytes();
}

pub fn ecdh_decode(tuple: &mut EcdhTuple, shared_secret: &[u8; 32]) {
    let first = hash_to_scalar(&[shared_secret]);
    let second = hash_to_scalar(&[&first.to_bytes()]);
    tuple.mask = (scalar(&tuple.mask) - first).to_bytes();
    tuple.amount = (scalar(&tuple.amount) - second).to_bytes();
}

/// Compact XOR encryption of the 8-byte amount.
pub fn ecdh_encode_compact(amount: u64, shared_secret: &[u8; 32]) -> [u8; 8] {
    let mut buf = Vec::with_capacity(38);
    buf.extend_from_slice(b"amount");
    buf.extend_from_slice(shared_secret);
    let pad = keccak256(&buf);
    let mut out = amount.to_le_bytes();
    for (b, k) in out.iter_mut().zip(&pad[..8]) {
        *b ^= k;
    }
    out
}

pub fn ecdh_decode_compact(encrypted: &[u8; 8], shared_secret: &[u8; 32]) -> u64 {
    // XOR is its own inverse.
    u64::from_le_bytes(ecdh_encode_compact(
        u64::from_le_bytes(*encrypted),
        shared_secret,
    ))
}

// --- Message hashing -------------------------------------------------------

/// The message actually signed by the ring signatures:
/// `keccak(prefix_hash ‖ keccak(base) ‖ keccak(range proofs))`.
pub fn pre_sig_hash(prefix_hash: &Hash, base_bytes: &[u8], range_bytes: &[u8]) -> Hash {
    let mut buf = Vec::with_capacity(96);
    buf.extend_from_slice(prefix_hash);
    buf.extend_from_slice(&keccak256(base_bytes));
    buf.extend_from_slice(&keccak256(range_bytes));
    keccak256(&buf)
}

/// Canonical base bytes (also the wire form of the base section).
pub fn rct_base_bytes(sig: &RctSig) -> Vec<u8> {
    let mut w = Writer::with_capacity(64 + sig.out_pk.len() * 64);
    write_rct_base(&mut w, sig);
    w.into_bytes()
}

/// Flat range-proof component bytes for the message hash: Borromean
/// signatures or Bulletproof+ elements, no length framing.
pub fn rct_range_bytes(sig: &RctSig) -> Vec<u8> {
    let mut buf = Vec::new();
    for rs in &sig.range_sigs {
        for s in &rs.asig.s0 {
            buf.extend_from_slice(s);
        }
        for s in &rs.asig.s1 {
            buf.extend_from_slice(s);
        }
        buf.extend_from_slice(&rs.asig.ee);
        for c in &rs.ci {
            buf.extend_from_slice(c);
        }
    }
    for bp in &sig.bulletproofs_plus {
        buf.extend_from_slice(&bp.a);
        buf.extend_from_slice(&bp.a1);
        buf.extend_from_slice(&bp.b);
        buf.extend_from_slice(&bp.r1);
        buf.extend_from_slice(&bp.s1);
        buf.extend_from_slice(&bp.d1);
        for l in &bp.l {
            buf.extend_from_slice(l);
        }
        for r in &bp.r {
            buf.extend_from_slice(r);
        }
    }
    buf
}

// --- Generation ------------------------------------------------------------

/// Secret opening of a real input: one-time secret key and commitment
/// mask.
#[derive(Debug, Clone, Copy)]
pub struct InSk {
    pub dest: [u8; 32],
    pub mask: [u8; 32],
}

fn fee_point(fee: u64) -> EdwardsPoint {
    Scalar::from(fee) * h_point()
}

/// Aggregate (full) RingCT: all inputs share one ring and one real
/// position. `outamounts` may carry one trailing entry beyond the
/// output count; it becomes the transaction fee.
#[allow(clippy::too_many_arguments)]
pub fn gen_rct(
    prefix_hash: &Hash,
    in_sk: &[InSk],
    outamounts: &[u64],
    n_outputs: usize,
    mix_ring: &[Vec<CtKey>],
    amount_keys: &[[u8; 32]],
    real_index: usize,
    config: RctConfig,
) -> Result<RctSig, CryptoError> {
    if config.range_proof_type != RangeProofType::Borromean {
        return Err(CryptoError::Signature(
            "full rct requires Borromean range proofs",
        ));
    }
    if in_sk.is_empty() || mix_ring.is_empty() || real_index >= mix_ring.len() {
        return Err(CryptoError::Signature("bad full-rct ring shape"));
    }
    if outamounts.len() < n_outputs || outamounts.len() > n_outputs + 1 {
        return Err(CryptoError::Signature("bad amount count"));
    }
    if amount_keys.len() != n_outputs {
        return Err(CryptoError::Signature("amount key count mismatch"));
    }
    if mix_ring.iter().any(|col| col.len() != in_sk.len()) {
        return Err(CryptoError::Signature("ragged full-rct ring"));
    }

    let txn_fee = if outamounts.len() == n_outputs + 1 {
        outamounts[n_outputs]
    } else {
        0
    };

    let mut sig = RctSig {
        rct_type: rct_type::FULL,
        txn_fee,
        ..Default::default()
    };

    let mut out_masks = Vec::with_capacity(n_outputs);
    for i in 0..n_outputs {
        let (range_sig, commitment, mask) = borromean::prove_range(outamounts[i]);
        sig.out_pk.push(commitment);
        sig.range_sigs.push(range_sig);

        let mut tuple = EcdhTuple {
            mask: mask.to_bytes(),
            amount: Scalar::from(outamounts[i]).to_bytes(),
        };
        ecdh_encode(&mut tuple, &amount_keys[i]);
        sig.ecdh_info.push(tuple);
        out_masks.push(mask);
    }

    let message = pre_sig_hash(prefix_hash, &rct_base_bytes(&sig), &rct_range_bytes(&sig));

    // Matrix: input rows plus a balance row per ring position.
    let rows = in_sk.len();
    let out_sum = {
        let mut acc = fee_point(txn_fee);
        for c in &sig.out_pk {
            acc += decompress(c)?;
        }
        acc
    };
    let mut pk = Vec::with_capacity(mix_ring.len());
    for col in mix_ring {
        let mut column = Vec::with_capacity(rows + 1);
        let mut commit_sum = EdwardsPoint::identity();
        for member in col {
            column.push(member.dest);
            commit_sum += decompress(&member.mask)?;
        }
        column.push(compress(&(commit_sum - out_sum)));
        pk.push(column);
    }

    let mut xx: Vec<Scalar> = in_sk.iter().map(|k| scalar(&k.dest)).collect();
    let mask_diff = in_sk.iter().map(|k| scalar(&k.mask)).sum::<Scalar>()
        - out_masks.iter().sum::<Scalar>();
    xx.push(mask_diff);

    let (mg, _images) = mlsag::mlsag_sign(&message, &pk, &xx, real_index, rows)?;
    sig.mlsags.push(mg);
    Ok(sig)
}

/// Per-input RingCT with pseudo output commitments.
#[allow(clippy::too_many_arguments)]
pub fn gen_rct_simple(
    prefix_hash: &Hash,
    in_sk: &[InSk],
    inamounts: &[u64],
    outamounts: &[u64],
    txn_fee: u64,
    mix_ring: &[Vec<CtKey>],
    amount_keys: &[[u8; 32]],
    in_indices: &[usize],
    config: RctConfig,
) -> Result<RctSig, CryptoError> {
    let n_in = in_sk.len();
    if n_in == 0
        || inamounts.len() != n_in
        || mix_ring.len() != n_in
        || in_indices.len() != n_in
    {
        return Err(CryptoError::Signature("bad simple-rct input shape"));
    }
    if outamounts.is_empty() || amount_keys.len() != outamounts.len() {
        return Err(CryptoError::Signature("bad simple-rct output shape"));
    }
    for (ring, &idx) in mix_ring.iter().zip(in_indices) {
        if ring.is_empty() || idx >= ring.len() {
            return Err(CryptoError::Signature("real index outside ring"));
        }
    }

    let bulletproof = config.range_proof_type != RangeProofType::Borromean;
    let mut sig = RctSig {
        rct_type: if bulletproof {
            rct_type::BULLETPROOF_PLUS
        } else {
            rct_type::SIMPLE
        },
        txn_fee,
        ..Default::default()
    };

    // Outputs: commitments, range proofs, encrypted amounts.
    let mut out_masks = Vec::with_capacity(outamounts.len());
    if bulletproof {
        for (i, &amount) in outamounts.iter().enumerate() {
            let mask = gen_commitment_mask(&amount_keys[i]);
            sig.out_pk.push(pedersen_commit(amount, &mask));
            let mut tuple = EcdhTuple::default();
            tuple.amount[..8]
                .copy_from_slice(&ecdh_encode_compact(amount, &amount_keys[i]));
            sig.ecdh_info.push(tuple);
            out_masks.push(mask);
        }
        sig.bulletproofs_plus
            .push(bpp::bpp_prove(outamounts, &out_masks)?);
    } else {
        for (i, &amount) in outamounts.iter().enumerate() {
            let (range_sig, commitment, mask) = borromean::prove_range(amount);
            sig.out_pk.push(commitment);
            sig.range_sigs.push(range_sig);
            let mut tuple = EcdhTuple {
                mask: mask.to_bytes(),
                amount: Scalar::from(amount).to_bytes(),
            };
            ecdh_encode(&mut tuple, &amount_keys[i]);
            sig.ecdh_info.push(tuple);
            out_masks.push(mask);
        }
    }

    // Pseudo commitments: random masks except the last, which balances.
    let out_mask_sum: Scalar = out_masks.iter().sum();
    let mut pseudo_masks = Vec::with_capacity(n_in);
    let mut partial = Scalar::ZERO;
    for _ in 0..n_in - 1 {
        let a = random_scalar();
        partial += a;
        pseudo_masks.push(a);
    }
    pseudo_masks.push(out_mask_sum - partial);
    for (i, mask) in pseudo_masks.iter().enumerate() {
        sig.pseudo_outs.push(pedersen_commit(inamounts[i], mask));
    }

    let message = pre_sig_hash(prefix_hash, &rct_base_bytes(&sig), &rct_range_bytes(&sig));

    // Ring signatures binding each input to its pseudo commitment.
    for i in 0..n_in {
        let z = (scalar(&in_sk[i].mask) - pseudo_masks[i]).to_bytes();
        if bulletproof {
            let ring: Vec<PublicKey> = mix_ring[i].iter().map(|m| m.dest).collect();
            let commitments: Vec<PublicKey> = mix_ring[i].iter().map(|m| m.mask).collect();
            let (cl, _image) = clsag::clsag_sign(
                &message,
                &ring,
                &in_sk[i].dest,
                &commitments,
                &z,
                &sig.pseudo_outs[i],
                in_indices[i],
            )?;
            sig.clsags.push(cl);
        } else {
            let pseudo_pt = decompress(&sig.pseudo_outs[i])?;
            let mut pk = Vec::with_capacity(mix_ring[i].len());
            for member in &mix_ring[i] {
                pk.push(vec![
                    member.dest,
                    compress(&(decompress(&member.mask)? - pseudo_pt)),
                ]);
            }
            let xx = vec![scalar(&in_sk[i].dest), scalar(&z)];
            let (mg, _images) = mlsag::mlsag_sign(&message, &pk, &xx, in_indices[i], 1)?;
            sig.mlsags.push(mg);
        }
    }

    Ok(sig)
}

// --- Verification ----------------------------------------------------------

/// Commitment conservation for simple bundles:
/// `Σ pseudo_outs == Σ out_pk + fee·H`.
pub fn verify_rct_balance(sig: &RctSig) -> bool {
    if sig.rct_type != rct_type::SIMPLE && sig.rct_type != rct_type::BULLETPROOF_PLUS {
        return false;
    }
    let mut lhs = EdwardsPoint::identity();
    for p in &sig.pseudo_outs {
        match decompress(p) {
            Ok(pt) => lhs += pt,
            Err(_) => return false,
        }
    }
    let mut rhs = fee_point(sig.txn_fee);
    for c in &sig.out_pk {
        match decompress(c) {
            Ok(pt) => rhs += pt,
            Err(_) => return false,
        }
    }
    lhs == rhs
}

/// Range-proof validity for every output of a simple or full bundle.
pub fn verify_rct_ranges(sig: &RctSig) -> bool {
    match sig.rct_type {
        rct_type::FULL | rct_type::SIMPLE => {
            sig.range_sigs.len() == sig.out_pk.len()
                && sig
                    .out_pk
                    .iter()
                    .zip(&sig.range_sigs)
                    .all(|(c, rs)| borromean::verify_range(c, rs))
        }
        rct_type::BULLETPROOF_PLUS => {
            sig.bulletproofs_plus.len() == 1 && bpp::bpp_verify(&sig.out_pk, &sig.bulletproofs_plus[0])
        }
        _ => false,
    }
}

/// Verify the ring signatures of a simple bundle against the rings and
/// key images recorded in the transaction inputs.
pub fn verify_rct_simple_signatures(
    sig: &RctSig,
    prefix_hash: &Hash,
    mix_ring: &[Vec<CtKey>],
    key_images: &[KeyImage],
) -> bool {
    let message = pre_sig_hash(prefix_hash, &rct_base_bytes(sig), &rct_range_bytes(sig));
    let n_in = mix_ring.len();
    if key_images.len() != n_in || sig.pseudo_outs.len() != n_in {
        return false;
    }
    match sig.rct_type {
        rct_type::BULLETPROOF_PLUS => {
            if sig.clsags.len() != n_in {
                return false;
            }
            for i in 0..n_in {
                let ring: Vec<PublicKey> = mix_ring[i].iter().map(|m| m.dest).collect();
                let commitments: Vec<PublicKey> = mix_ring[i].iter().map(|m| m.mask).collect();
                if !clsag::clsag_verify(
                    &message,
                    &sig.clsags[i],
                    &key_images[i],
                    &ring,
                    &commitments,
                    &sig.pseudo_outs[i],
                ) {
                    return false;
                }
            }
            true
        }
        rct_type::SIMPLE => {
            if sig.mlsags.len() != n_in {
                return false;
            }
            for i in 0..n_in {
                let pseudo_pt = match decompress(&sig.pseudo_outs[i]) {
                    Ok(p) => p,
                    Err(_) => return false,
                };
                let mut pk = Vec::with_capacity(mix_ring[i].len());
                for member in &mix_ring[i] {
                    let diff = match decompress(&member.mask) {
                        Ok(p) => compress(&(p - pseudo_pt)),
                        Err(_) => return false,
                    };
                    pk.push(vec![member.dest, diff]);
                }
                if !mlsag::mlsag_verify(&message, &pk, &sig.mlsags[i], &key_images[i..=i], 1) {
                    return false;
                }
            }
            true
        }
        _ => false,
    }
}

// --- Wire codec ------------------------------------------------------------

/// Write the base section (everything the unprunable hash covers).
pub fn write_rct_base(w: &mut Writer, sig: &RctSig) {
    w.write_varint(sig.rct_type as u64);
    if sig.rct_type == rct_type::NULL {
        return;
    }
    w.write_varint(sig.txn_fee);
    if sig.rct_type == rct_type::SIMPLE {
        for p in &sig.pseudo_outs {
            w.write_bytes(p);
        }
    }
    for tuple in &sig.ecdh_info {
        if sig.compact_amounts() {
            w.write_bytes(&tuple.amount[..8]);
        } else {
            w.write_bytes(&tuple.mask);
            w.write_bytes(&tuple.amount);
        }
    }
    for c in &sig.out_pk {
        w.write_bytes(c);
    }
}

/// Read the base section; counts come from the transaction prefix.
pub fn read_rct_base(
    r: &mut Reader,
    n_inputs: usize,
    n_outputs: usize,
) -> Result<RctSig, SerialError> {
    let rct_type = r.read_varint()? as u8;
    let mut sig = RctSig {
        rct_type,
        ..Default::default()
    };
    if rct_type == rct_type::NULL {
        return Ok(sig);
    }
    sig.txn_fee = r.read_varint()?;
    if rct_type == rct_type::SIMPLE {
        for _ in 0..n_inputs {
            sig.pseudo_outs.push(r.read_key()?);
        }
    }
    for _ in 0..n_outputs {
        let mut tuple = EcdhTuple::default();
        if sig.compact_amounts() {
            tuple.amount[..8].copy_from_slice(r.read_bytes(8)?);
        } else {
            tuple.mask = r.read_key()?;
            tuple.amount = r.read_key()?;
        }
        sig.ecdh_info.push(tuple);
    }
    for _ in 0..n_outputs {
        sig.out_pk.push(r.read_key()?);
    }
    Ok(sig)
}

/// Write the prunable section. Element counts are implied by the
/// transaction prefix, so nothing here is length-framed except the
/// bulletproofs.
pub fn write_rct_prunable(w: &mut Writer, sig: &RctSig) {
    match sig.rct_type {
        rct_type::NULL => {}
        rct_type::FULL | rct_type::SIMPLE => {
            for rs in &sig.range_sigs {
                for s in &rs.asig.s0 {
                    w.write_bytes(s);
                }
                for s in &rs.asig.s1 {
                    w.write_bytes(s);
                }
                w.write_bytes(&rs.asig.ee);
                for c in &rs.ci {
                    w.write_bytes(c);
                }
            }
            for mg in &sig.mlsags {
                for col in &mg.ss {
                    for s in col {
                        w.write_bytes(s);
                    }
                }
                w.write_bytes(&mg.cc);
            }
        }
        _ => {
            w.write_varint(sig.bulletproofs_plus.len() as u64);
            for bp in &sig.bulletproofs_plus {
                w.write_bytes(&bp.a);
                w.write_bytes(&bp.a1);
                w.write_bytes(&bp.b);
                w.write_bytes(&bp.r1);
                w.write_bytes(&bp.s1);
                w.write_bytes(&bp.d1);
                w.write_varint(bp.l.len() as u64);
                for l in &bp.l {
                    w.write_bytes(l);
                }
                w.write_varint(bp.r.len() as u64);
                for r in &bp.r {
                    w.write_bytes(r);
                }
            }
            for cl in &sig.clsags {
                for s in &cl.s {
                    w.write_bytes(s);
                }
                w.write_bytes(&cl.c1);
                w.write_bytes(&cl.d);
            }
            for p in &sig.pseudo_outs {
                w.write_bytes(p);
            }
        }
    }
}

fn read_borromean(r: &mut Reader) -> Result<RangeSig, SerialError> {
    let mut s0 = Vec::with_capacity(64);
    let mut s1 = Vec::with_capacity(64);
    for _ in 0..64 {
        s0.push(r.read_key()?);
    }
    for _ in 0..64 {
        s1.push(r.read_key()?);
    }
    let ee = r.read_key()?;
    let mut ci = Vec::with_capacity(64);
    for _ in 0..64 {
        ci.push(r.read_key()?);
    }
    Ok(RangeSig {
        asig: BorromeanSig { s0, s1, ee },
        ci,
    })
}

/// Read the prunable section into an already-decoded base.
pub fn read_rct_prunable(
    r: &mut Reader,
    sig: &mut RctSig,
    n_outputs: usize,
    ring_sizes: &[usize],
) -> Result<(), SerialError> {
    let n_inputs = ring_sizes.len();
    match sig.rct_type {
        rct_type::NULL => {}
        rct_type::FULL => {
            for _ in 0..n_outputs {
                sig.range_sigs.push(read_borromean(r)?);
            }
            let ring = ring_sizes.first().copied().unwrap_or(0);
            let rows = n_inputs + 1;
            let mut ss = Vec::with_capacity(ring);
            for _ in 0..ring {
                let mut col = Vec::with_capacity(rows);
                for _ in 0..rows {
                    col.push(r.read_key()?);
                }
                ss.push(col);
            }
            let cc = r.read_key()?;
            sig.mlsags.push(MgSig { ss, cc });
        }
        rct_type::SIMPLE => {
            for _ in 0..n_outputs {
                sig.range_sigs.push(read_borromean(r)?);
            }
            for &ring in ring_sizes {
                let mut ss = Vec::with_capacity(ring);
                for _ in 0..ring {
                    ss.push(vec![r.read_key()?, r.read_key()?]);
                }
                let cc = r.read_key()?;
                sig.mlsags.push(MgSig { ss, cc });
            }
        }
        rct_type::BULLETPROOF_PLUS => {
            let nbp = r.read_length()?;
            for _ in 0..nbp {
                let a = r.read_key()?;
                let a1 = r.read_key()?;
                let b = r.read_key()?;
                let r1 = r.read_key()?;
                let s1 = r.read_key()?;
                let d1 = r.read_key()?;
                let nl = r.read_length()?;
                let mut l = Vec::with_capacity(nl);
                for _ in 0..nl {
                    l.push(r.read_key()?);
                }
                let nr = r.read_length()?;
                let mut rr = Vec::with_capacity(nr);
                for _ in 0..nr {
                    rr.push(r.read_key()?);
                }
                sig.bulletproofs_plus.push(BulletproofPlus {
                    a,
                    a1,
                    b,
                    r1,
                    s1,
                    d1,
                    l,
                    r: rr,
                });
            }
            for &ring in ring_sizes {
                let mut s = Vec::with_capacity(ring);
                for _ in 0..ring {
                    s.push(r.read_key()?);
                }
                let c1 = r.read_key()?;
                let d = r.read_key()?;
                sig.clsags.push(ClsagSig { s, c1, d });
            }
            for _ in 0..n_inputs {
                sig.pseudo_outs.push(r.read_key()?);
            }
        }
        _ => {
            // Historical intermediate types are recognized but not parsed.
            return Err(SerialError::Unsupported("rct signature type"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generate_key_image, KeyPair};

    fn fake_ring(n: usize, real: usize, amount: u64) -> (Vec<CtKey>, InSk, KeyImage) {
        let mut ring = Vec::with_capacity(n);
        let mut in_sk = InSk {
            dest: [0u8; 32],
            mask: [0u8; 32],
        };
        let mut image = [0u8; 32];
        for i in 0..n {
            let kp = KeyPair::generate();
            let mask = random_scalar();
            let commitment = pedersen_commit(if i == real { amount } else { 123 }, &mask);
            ring.push(CtKey {
                dest: kp.public,
                mask: commitment,
            });
            if i == real {
                in_sk = InSk {
                    dest: kp.secret,
                    mask: mask.to_bytes(),
                };
                image = generate_key_image(&kp.public, &kp.secret);
            }
        }
        (ring, in_sk, image)
    }

    #[test]
    fn simple_borromean_bundle_balances_and_verifies() {
        let prefix = keccak256(b"prefix");
        let (ring1, sk1, img1) = fake_ring(4, 1, 70);
        let (ring2, sk2, img2) = fake_ring(4, 2, 30);
        let amount_keys = [[5u8; 32], [6u8; 32]];

        let sig = gen_rct_simple(
            &prefix,
            &[sk1, sk2],
            &[70, 30],
            &[60, 30],
            10,
            &[ring1.clone(), ring2.clone()],
            &amount_keys,
            &[1, 2],
            RctConfig::borromean(),
        )
        .unwrap();

        assert_eq!(sig.rct_type, rct_type::SIMPLE);
        assert_eq!(sig.mlsags.len(), 2);
        assert!(verify_rct_balance(&sig));
        assert!(verify_rct_ranges(&sig));
        assert!(verify_rct_simple_signatures(
            &sig,
            &prefix,
            &[ring1, ring2],
            &[img1, img2]
        ));
    }

    #[test]
    fn simple_bpp_bundle_balances_and_verifies() {
        let prefix = keccak256(b"prefix2");
        let (ring1, sk1, img1) = fake_ring(6, 4, 1000);
        let amount_keys = [[9u8; 32], [10u8; 32]];

        let sig = gen_rct_simple(
            &prefix,
            &[sk1],
            &[1000],
            &[400, 500],
            100,
            &[ring1.clone()],
            &amount_keys,
            &[4],
            RctConfig::bulletproof_plus(),
        )
        .unwrap();

        assert_eq!(sig.rct_type, rct_type::BULLETPROOF_PLUS);
        assert_eq!(sig.clsags.len(), 1);
        assert!(verify_rct_balance(&sig));
        assert!(verify_rct_ranges(&sig));
        assert!(verify_rct_simple_signatures(&sig, &prefix, &[ring1], &[img1]));
    }

    #[test]
    fn full_bundle_signs() {
        let prefix = keccak256(b"full");
        // Two inputs sharing a ring of 3 with the same real position.
        let n = 3;
        let real = 1;
        let mut mix_ring = vec![Vec::new(); n];
        let mut in_sk = Vec::new();
        for &amount in &[40u64, 20] {
            let (ring, sk, _img) = fake_ring(n, real, amount);
            for (pos, member) in ring.into_iter().enumerate() {
                mix_ring[pos].push(member);
            }
            in_sk.push(sk);
        }

        let sig = gen_rct(
            &prefix,
            &in_sk,
            &[55, 5],
            1,
            &mix_ring,
            &[[7u8; 32]],
            real,
            RctConfig::borromean(),
        )
        .unwrap();
        assert_eq!(sig.rct_type, rct_type::FULL);
        assert_eq!(sig.txn_fee, 5);
        assert_eq!(sig.mlsags.len(), 1);
        assert!(verify_rct_ranges(&sig));
    }

    #[test]
    fn ecdh_legacy_roundtrip() {
        let secret = [3u8; 32];
        let mut tuple = EcdhTuple {
            mask: random_scalar().to_bytes(),
            amount: Scalar::from(999u64).to_bytes(),
        };
        let original = tuple;
        ecdh_encode(&mut tuple, &secret);
        assert_ne!(tuple, original);
        ecdh_decode(&mut tuple, &secret);
        assert_eq!(tuple, original);
    }

    #[test]
    fn ecdh_compact_roundtrip() {
        let secret = [4u8; 32];
        let enc = ecdh_encode_compact(123_456_789, &secret);
        assert_eq!(ecdh_decode_compact(&enc, &secret), 123_456_789);
    }

    #[test]
    fn base_wire_roundtrip_simple() {
        let prefix = keccak256(b"wire");
        let (ring1, sk1, _img) = fake_ring(3, 0, 50);
        let sig = gen_rct_simple(
            &prefix,
            &[sk1],
            &[50],
            &[50],
            0,
            &[ring1],
            &[[1u8; 32]],
            &[0],
            RctConfig::borromean(),
        )
        .unwrap();

        let mut w = Writer::new();
        write_rct_base(&mut w, &sig);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = read_rct_base(&mut r, 1, 1).unwrap();
        assert!(r.is_at_end());
        assert_eq!(decoded.rct_type, sig.rct_type);
        assert_eq!(decoded.txn_fee, sig.txn_fee);
        assert_eq!(decoded.pseudo_outs, sig.pseudo_outs);
        assert_eq!(decoded.ecdh_info, sig.ecdh_info);
        assert_eq!(decoded.out_pk, sig.out_pk);
    }

    #[test]
    fn prunable_wire_roundtrip_bpp() {
        let prefix = keccak256(b"wire2");
        let (ring1, sk1, _img) = fake_ring(5, 3, 80);
        let sig = gen_rct_simple(
            &prefix,
            &[sk1],
            &[80],
            &[80],
            0,
            &[ring1],
            &[[2u8; 32]],
            &[3],
            RctConfig::bulletproof_plus(),
        )
        .unwrap();

        let mut w = Writer::new();
        write_rct_prunable(&mut w, &sig);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let mut decoded = RctSig {
            rct_type: sig.rct_type,
            txn_fee: sig.txn_fee,
            ecdh_info: sig.ecdh_info.clone(),
            out_pk: sig.out_pk.clone(),
            ..Default::default()
        };
        read_rct_prunable(&mut r, &mut decoded, 1, &[5]).unwrap();
        assert!(r.is_at_end());
        assert_eq!(decoded, sig);
    }
}
