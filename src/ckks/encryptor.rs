//! Public-key encryption and secret-key decryption of encoded blocks.

use super::ciphertext::CiphertextBlock;
use super::keys::{PublicKey, SecretKey};
use super::ring::RingContext;
use crate::math::{GaussianSampler, ModQ, RnsPoly};

/// Encrypt integer coefficients Δ·m(X) under the public key.
///
/// `(c0, c1) = (b·u + e0 + m, a·u + e1)` for a fresh ternary `u`, over the
/// full data chain.
pub fn encrypt_coeffs(
    ring: &RingContext,
    pk: &PublicKey,
    coeffs: &[i64],
    sampler: &mut GaussianSampler,
) -> CiphertextBlock {
    let n = ring.dimension();
    let ntt = ring.ntt();
    let moduli = ring.data_moduli();

    let mut u = RnsPoly::ternary(n, moduli, sampler);
    u.to_ntt(ntt);

    let mut c0 = pk.b.mul(&u, ntt);
    c0.from_ntt(ntt);
    c0 += &RnsPoly::gaussian(n, moduli, sampler);
    c0 += &RnsPoly::from_signed(coeffs, moduli);

    let mut c1 = pk.a.mul(&u, ntt);
    c1.from_ntt(ntt);
    c1 += &RnsPoly::gaussian(n, moduli, sampler);

    CiphertextBlock { c0, c1 }
}

/// Recover the centered coefficients of Δ·m(X) + noise.
///
/// Only the first prime is needed: the plaintext is bounded well below q_0/2.
pub fn decrypt_coeffs(ring: &RingContext, sk: &SecretKey, block: &CiphertextBlock) -> Vec<i64> {
    let ntt = ring.ntt();
    let q0 = ring.data_moduli()[0];

    let s0 = sk.ntt_poly(ring, &[q0]);
    let mut c1 = block.c1.residue(0).to_vec();
    ntt.forward(&mut c1, 0);
    let mut m = vec![0u64; ring.dimension()];
    ntt.pointwise_mul(&c1, s0.residue(0), &mut m, 0);
    ntt.inverse(&mut m, 0);

    m.iter()
        .zip(block.c0.residue(0))
        .map(|(&x, &c)| ModQ::to_signed(ModQ::add(x, c, q0), q0))
        .collect()
}
