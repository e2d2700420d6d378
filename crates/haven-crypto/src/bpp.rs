//! Bulletproof+ aggregate range proofs.
//!
//! Proves every committed output amount lies in `[0, 2^64)` with one
//! logarithmic-size proof per transaction. Group elements inside the
//! proof are stored divided by eight; verification clears the factor.

use curve25519_dalek::constants::ED25519_BASEPOINT_POINT;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::{Identity, VartimeMultiscalarMul};

use crate::{
    compress, decompress, h_point, hash_to_point, hash_to_scalar, inv_eight, keccak256,
    random_scalar, serial, CryptoError, PublicKey, H_POINT,
};

/// Bits per amount.
const N_BITS: usize = 64;
const LOG_N: usize = 6;

/// Maximum outputs covered by one aggregate proof.
pub const BPP_MAX_OUTPUTS: usize = 16;

/// A Bulletproof+ proof. All points compressed, divided by eight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulletproofPlus {
    pub a: PublicKey,
    pub a1: PublicKey,
    pub b: PublicKey,
    pub r1: [u8; 32],
    pub s1: [u8; 32],
    pub d1: [u8; 32],
    pub l: Vec<PublicKey>,
    pub r: Vec<PublicKey>,
}

fn padded(m: usize) -> (usize, usize) {
    let mut m_pad = 1usize;
    let mut log_m = 0usize;
    while m_pad < m {
        m_pad *= 2;
        log_m += 1;
    }
    (m_pad, log_m)
}

/// Domain-separated generator vectors. `Hi` takes even indices, `Gi`
/// odd, hashed from the commitment generator.
fn generators(count: usize) -> (Vec<EdwardsPoint>, Vec<EdwardsPoint>) {
    let mut prefix = Vec::with_capacity(58);
    prefix.extend_from_slice(&H_POINT);
    prefix.extend_from_slice(b"bulletproof_plus");

    let gen_at = |index: u64| {
        let mut seed = prefix.clone();
        serial::push_varint(&mut seed, index);
        hash_to_point(&seed)
    };

    let mut gi = Vec::with_capacity(count);
    let mut hi = Vec::with_capacity(count);
    for i in 0..count as u64 {
        hi.push(gen_at(2 * i));
        gi.push(gen_at(2 * i + 1));
    }
    (gi, hi)
}

fn transcript_seed() -> [u8; 32] {
    compress(&hash_to_point(b"bulletproof_plus_transcript"))
}

fn absorb(transcript: &mut [u8; 32], elements: &[&[u8; 32]]) -> Scalar {
    let mut parts: Vec<&[u8]> = Vec::with_capacity(elements.len() + 1);
    parts.push(&transcript[..]);
    for e in elements {
        parts.push(&e[..]);
    }
    let s = hash_to_scalar(&parts);
    *transcript = s.to_bytes();
    s
}

fn hash_points(points: &[EdwardsPoint]) -> Scalar {
    let mut data = Vec::with_capacity(points.len() * 32);
    for p in points {
        data.extend_from_slice(&compress(p));
    }
    hash_to_scalar(&[&data])
}

/// Prove that each `amounts[j]` opens `commit(amounts[j], masks[j])`.
pub fn bpp_prove(amounts: &[u64], masks: &[Scalar]) -> Result<BulletproofPlus, CryptoError> {
    let m = amounts.len();
    if m == 0 || m != masks.len() || m > BPP_MAX_OUTPUTS {
        return Err(CryptoError::Signature("bad bulletproof+ input shape"));
    }
    let (m_pad, log_m) = padded(m);
    let mn = m_pad * N_BITS;
    let rounds = LOG_N + log_m;

    let inv8 = inv_eight();
    let g = ED25519_BASEPOINT_POINT;
    let h = h_point();
    let (gi, hi) = generators(mn);

    let mut transcript = transcript_seed();

    // V_j = (gamma_j G + v_j H) / 8
    let v_points: Vec<EdwardsPoint> = amounts
        .iter()
        .zip(masks)
        .map(|(&v, gamma)| {
            EdwardsPoint::vartime_multiscalar_mul(
                &[gamma * inv8, Scalar::from(v) * inv8],
                &[g, h],
            )
        })
        .collect();
    absorb(&mut transcript, &[&hash_points(&v_points).to_bytes()]);

    // Bit decomposition.
    let minus_one = -Scalar::ONE;
    let mut al = vec![Scalar::ZERO; mn];
    let mut ar = vec![minus_one; mn];
    for (j, &amount) in amounts.iter().enumerate() {
        for i in 0..N_BITS {
            if (amount >> i) & 1 == 1 {
                al[j * N_BITS + i] = Scalar::ONE;
                ar[j * N_BITS + i] = Scalar::ZERO;
            }
        }
    }
    for i in m * N_BITS..mn {
        al[i] = Scalar::ZERO;
        ar[i] = minus_one;
    }

    // A = (sum aL_i Gi + sum aR_i Hi + alpha G) / 8
    let alpha = random_scalar();
    let mut scalars = Vec::with_capacity(2 * mn + 1);
    let mut points = Vec::with_capacity(2 * mn + 1);
    for i in 0..mn {
        scalars.push(al[i] * inv8);
        points.push(gi[i]);
        scalars.push(ar[i] * inv8);
        points.push(hi[i]);
    }
    scalars.push(alpha * inv8);
    points.push(g);
    let a_point = EdwardsPoint::vartime_multiscalar_mul(&scalars, &points);

    let y = absorb(&mut transcript, &[&compress(&a_point)]);
    let z = Scalar::from_bytes_mod_order(keccak256(&y.to_bytes()));
    transcript = z.to_bytes();
    let z_sq = z * z;

    // d_i = z^{2(j+1)} 2^i over windows of 64 bits.
    let mut d = vec![Scalar::ZERO; mn];
    let mut z_pow = z_sq;
    for j in 0..m_pad {
        let mut two_pow = Scalar::ONE;
        for i in 0..N_BITS {
            d[j * N_BITS + i] = z_pow * two_pow;
            two_pow = two_pow + two_pow;
        }
        z_pow *= z_sq;
    }

    // Powers of y and its inverse.
    let mut y_pows = Vec::with_capacity(mn + 2);
    y_pows.push(Scalar::ONE);
    for i in 1..=mn + 1 {
        y_pows.push(y_pows[i - 1] * y);
    }
    let y_inv = y.invert();
    let mut y_inv_pows = Vec::with_capacity(mn);
    y_inv_pows.push(Scalar::ONE);
    for i in 1..mn {
        y_inv_pows.push(y_inv_pows[i - 1] * y_inv);
    }

    let mut a_vec = vec![Scalar::ZERO; mn];
    let mut b_vec = vec![Scalar::ZERO; mn];
    for i in 0..mn {
        a_vec[i] = al[i] - z;
        b_vec[i] = ar[i] + z + d[i] * y_pows[mn - i];
    }

    let mut alpha1 = alpha;
    let mut z_acc = Scalar::ONE;
    for gamma in masks.iter().take(m) {
        z_acc *= z_sq;
        alpha1 += z_acc * y_pows[mn + 1] * gamma;
    }

    // Logarithmic folding.
    let mut width = mn;
    let mut g_prime = gi;
    let mut h_prime = hi;
    let mut l_points = Vec::with_capacity(rounds);
    let mut r_points = Vec::with_capacity(rounds);

    while width > 1 {
        width /= 2;

        let mut c_l = Scalar::ZERO;
        let mut c_r = Scalar::ZERO;
        let mut y_run = y;
        for i in 0..width {
            c_l += a_vec[i] * b_vec[width + i] * y_run;
            c_r += a_vec[width + i] * y_pows[width] * b_vec[i] * y_run;
            y_run *= y;
        }

        let d_l = random_scalar();
        let d_r = random_scalar();

        let mut scalars = Vec::with_capacity(2 * width + 2);
        let mut points = Vec::with_capacity(2 * width + 2);
        for i in 0..width {
            scalars.push(a_vec[i] * y_inv_pows[width] * inv8);
            points.push(g_prime[width + i]);
            scalars.push(b_vec[width + i] * inv8);
            points.push(h_prime[i]);
        }
        scalars.push(c_l * inv8);
        points.push(h);
        scalars.push(d_l * inv8);
        points.push(g);
        let l_point = EdwardsPoint::vartime_multiscalar_mul(&scalars, &points);

        let mut scalars = Vec::with_capacity(2 * width + 2);
        let mut points = Vec::with_capacity(2 * width + 2);
        for i in 0..width {
            scalars.push(a_vec[width + i] * y_pows[width] * inv8);
            points.push(g_prime[i]);
            scalars.push(b_vec[i] * inv8);
            points.push(h_prime[width + i]);
        }
        scalars.push(c_r * inv8);
        points.push(h);
        scalars.push(d_r * inv8);
        points.push(g);
        let r_point = EdwardsPoint::vartime_multiscalar_mul(&scalars, &points);

        let x = absorb(
            &mut transcript,
            &[&compress(&l_point), &compress(&r_point)],
        );
        let x_inv = x.invert();

        let g_fold = y_inv_pows[width] * x;
        let h_fold = x_inv * y_pows[width];
        let mut next_g = Vec::with_capacity(width);
        let mut next_h = Vec::with_capacity(width);
        for i in 0..width {
            next_g.push(EdwardsPoint::vartime_multiscalar_mul(
                &[x_inv, g_fold],
                &[g_prime[i], g_prime[width + i]],
            ));
            next_h.push(EdwardsPoint::vartime_multiscalar_mul(
                &[x, x_inv],
                &[h_prime[i], h_prime[width + i]],
            ));
        }
        g_prime = next_g;
        h_prime = next_h;

        let a_fold = x_inv * y_pows[width];
        let mut next_a = Vec::with_capacity(width);
        let mut next_b = Vec::with_capacity(width);
        for i in 0..width {
            next_a.push(a_vec[i] * x + a_vec[width + i] * a_fold);
            next_b.push(b_vec[i] * x_inv + b_vec[width + i] * x);
        }
        a_vec = next_a;
        b_vec = next_b;

        alpha1 += d_l * x * x + d_r * x_inv * x_inv;

        l_points.push(l_point);
        r_points.push(r_point);
    }

    // Final blinded inner product.
    let r = random_scalar();
    let s = random_scalar();
    let delta = random_scalar();
    let eta = random_scalar();

    let h_coeff = r * y * b_vec[0] + s * y * a_vec[0];
    let a1 = EdwardsPoint::vartime_multiscalar_mul(
        &[r * inv8, s * inv8, delta * inv8, h_coeff * inv8],
        &[g_prime[0], h_prime[0], g, h],
    );
    let b_point = EdwardsPoint::vartime_multiscalar_mul(
        &[eta * inv8, r * y * s * inv8],
        &[g, h],
    );

    let e = absorb(&mut transcript, &[&compress(&a1), &compress(&b_point)]);

    Ok(BulletproofPlus {
        a: compress(&a_point),
        a1: compress(&a1),
        b: compress(&b_point),
        r1: (r + a_vec[0] * e).to_bytes(),
        s1: (s + b_vec[0] * e).to_bytes(),
        d1: (eta + delta * e + alpha1 * e * e).to_bytes(),
        l: l_points.iter().map(compress).collect(),
        r: r_points.iter().map(compress).collect(),
    })
}

/// Verify a proof against full (un-divided) output commitments.
pub fn bpp_verify(commitments: &[PublicKey], proof: &BulletproofPlus) -> bool {
    let m = commitments.len();
    if m == 0 || m > BPP_MAX_OUTPUTS {
        return false;
    }
    let (m_pad, log_m) = padded(m);
    let mn = m_pad * N_BITS;
    let rounds = LOG_N + log_m;
    if proof.l.len() != rounds || proof.r.len() != rounds {
        return false;
    }

    let inv8 = inv_eight();
    let mut v_points = Vec::with_capacity(m);
    for c in commitments {
        match decompress(c) {
            Ok(p) => v_points.push(inv8 * p),
            Err(_) => return false,
        }
    }
    let a_point = match decompress(&proof.a) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let a1 = match decompress(&proof.a1) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let b_point = match decompress(&proof.b) {
        Ok(p) => p,
        Err(_) => return false,
    };
    let mut l_pts = Vec::with_capacity(rounds);
    let mut r_pts = Vec::with_capacity(rounds);
    for (l, r) in proof.l.iter().zip(&proof.r) {
        match (decompress(l), decompress(r)) {
            (Ok(lp), Ok(rp)) => {
                l_pts.push(lp);
                r_pts.push(rp);
            }
            _ => return false,
        }
    }

    // Replay the transcript.
    let mut transcript = transcript_seed();
    absorb(&mut transcript, &[&hash_points(&v_points).to_bytes()]);
    let y = absorb(&mut transcript, &[&compress(&a_point)]);
    if y == Scalar::ZERO {
        return false;
    }
    let z = Scalar::from_bytes_mod_order(keccak256(&y.to_bytes()));
    transcript = z.to_bytes();
    let mut challenges = Vec::with_capacity(rounds);
    for j in 0..rounds {
        let x = absorb(&mut transcript, &[&proof.l[j], &proof.r[j]]);
        if x == Scalar::ZERO {
            return false;
        }
        challenges.push(x);
    }
    let e = absorb(&mut transcript, &[&proof.a1, &proof.b]);
    if e == Scalar::ZERO {
        return false;
    }

    let r1 = Scalar::from_bytes_mod_order(proof.r1);
    let s1 = Scalar::from_bytes_mod_order(proof.s1);
    let d1 = Scalar::from_bytes_mod_order(proof.d1);
    let e_sq = e * e;
    let y_inv = y.invert();
    let challenge_invs: Vec<Scalar> = challenges.iter().map(|c| c.invert()).collect();

    let mut y_pow = Scalar::ONE;
    for _ in 0..mn {
        y_pow *= y;
    }
    let y_mn = y_pow;
    let y_mn_p1 = y_mn * y;

    let z_sq = z * z;
    let mut z_pows = Vec::with_capacity(m_pad);
    z_pows.push(z_sq);
    for j in 1..m_pad {
        z_pows.push(z_pows[j - 1] * z_sq);
    }

    let sum_z: Scalar = z_pows.iter().sum();
    let sum_d = Scalar::from(u64::MAX) * sum_z;
    let mut sum_y = Scalar::ZERO;
    let mut y_run = y;
    for _ in 0..mn {
        sum_y += y_run;
        y_run *= y;
    }

    // Per-slot products of folding challenges.
    let mut cache = vec![Scalar::ZERO; mn];
    cache[0] = challenge_invs[0];
    cache[1] = challenges[0];
    for j in 1..rounds {
        let slots = 1usize << (j + 1);
        for s in (0..slots).rev() {
            cache[s] = if s % 2 == 1 {
                cache[s / 2] * challenges[j]
            } else {
                cache[s / 2] * challenge_invs[j]
            };
        }
    }

    let (gi, hi) = generators(mn);
    let mut scalars: Vec<Scalar> = Vec::with_capacity(2 * mn + 2 * rounds + m + 5);
    let mut points: Vec<EdwardsPoint> = Vec::with_capacity(scalars.capacity());

    for j in 0..m {
        scalars.push(-(e_sq * z_pows[j] * y_mn_p1));
        points.push(v_points[j].mul_by_cofactor());
    }
    scalars.push(-e_sq);
    points.push(a_point.mul_by_cofactor());
    scalars.push(-e);
    points.push(a1.mul_by_cofactor());
    scalars.push(-Scalar::ONE);
    points.push(b_point.mul_by_cofactor());

    let mut e_r1 = e * r1;
    let e_s1 = e * s1;
    let e2_z = e_sq * z;
    let mut neg_e2_y = -(e_sq * y_mn);
    for i in 0..mn {
        let window = i / N_BITS;
        let bit = i % N_BITS;
        let d_val = z_pows[window] * Scalar::from(1u64 << bit);

        scalars.push(e_r1 * cache[i] + e2_z);
        points.push(gi[i]);

        let mirror = (!i) & (mn - 1);
        scalars.push(e_s1 * cache[mirror] - e2_z + neg_e2_y * d_val);
        points.push(hi[i]);

        e_r1 *= y_inv;
        neg_e2_y *= y_inv;
    }

    for j in 0..rounds {
        scalars.push(-(e_sq * challenges[j] * challenges[j]));
        points.push(l_pts[j].mul_by_cofactor());
        scalars.push(-(e_sq * challenge_invs[j] * challenge_invs[j]));
        points.push(r_pts[j].mul_by_cofactor());
    }

    scalars.push(d1);
    points.push(ED25519_BASEPOINT_POINT);
    let h_term = r1 * y * s1 + e_sq * (y_mn_p1 * z * sum_d + (z_sq - z) * sum_y);
    scalars.push(h_term);
    points.push(h_point());

    EdwardsPoint::vartime_multiscalar_mul(&scalars, &points) == EdwardsPoint::identity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pedersen_commit;

    fn commitments_for(amounts: &[u64], masks: &[Scalar]) -> Vec<PublicKey> {
        amounts
            .iter()
            .zip(masks)
            .map(|(&v, m)| pedersen_commit(v, m))
            .collect()
    }

    #[test]
    fn prove_verify_single() {
        let amounts = [123_456_789u64];
        let masks = [random_scalar()];
        let proof = bpp_prove(&amounts, &masks).unwrap();
        assert!(bpp_verify(&commitments_for(&amounts, &masks), &proof));
    }

    #[test]
    fn prove_verify_two_outputs() {
        let amounts = [5u64, u64::MAX];
        let masks = [random_scalar(), random_scalar()];
        let proof = bpp_prove(&amounts, &masks).unwrap();
        assert!(bpp_verify(&commitments_for(&amounts, &masks), &proof));
    }

    #[test]
    fn prove_verify_three_outputs_padded() {
        let amounts = [0u64, 1, 2];
        let masks = [random_scalar(), random_scalar(), random_scalar()];
        let proof = bpp_prove(&amounts, &masks).unwrap();
        assert!(bpp_verify(&commitments_for(&amounts, &masks), &proof));
    }

    #[test]
    fn wrong_commitment_fails() {
        let amounts = [77u64];
        let masks = [random_scalar()];
        let proof = bpp_prove(&amounts, &masks).unwrap();
        let wrong = [pedersen_commit(78, &masks[0])];
        assert!(!bpp_verify(&wrong, &proof));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(bpp_prove(&[], &[]).is_err());
        let amounts = vec![1u64; BPP_MAX_OUTPUTS + 1];
        let masks: Vec<Scalar> = amounts.iter().map(|_| random_scalar()).collect();
        assert!(bpp_prove(&amounts, &masks).is_err());
    }
}
