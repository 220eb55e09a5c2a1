//! Hybrid key switching through the special prime.

use rayon::prelude::*;

use super::keys::KeySwitchKey;
use super::ring::RingContext;
use crate::math::RnsPoly;

/// Switch a coefficient-domain component `d` from s' to s.
///
/// Returns `(u0, u1)` over the moduli of `d` with `u0 + u1·s ≈ d·s'`. Each
/// residue d_j is lifted into every modulus of the extended basis
/// `q_0 ⋯ q_l, P`, multiplied with the j-th key pair and accumulated; the sum
/// is then divided by P and rounded.
pub fn switch_key(ring: &RingContext, d: &RnsPoly, key: &KeySwitchKey) -> (RnsPoly, RnsPoly) {
    let n = ring.dimension();
    let ntt = ring.ntt();
    let levels = d.moduli().len();
    let extended = ring.extended_moduli(levels);

    let accumulated: Vec<(Vec<u64>, Vec<u64>)> = extended
        .par_iter()
        .enumerate()
        .map(|(t, &q_t)| {
            let idx = ring.extended_index(levels, t);
            let mut acc0 = vec![0u64; n];
            let mut acc1 = vec![0u64; n];
            let mut lifted = vec![0u64; n];

            for (j, (b_j, a_j)) in key.parts.iter().take(levels).enumerate() {
                for (dst, &c) in lifted.iter_mut().zip(d.residue(j)) {
                    *dst = c % q_t;
                }
                ntt.forward(&mut lifted, idx);
                ntt.pointwise_mul_acc(&lifted, b_j.residue(idx), &mut acc0, idx);
                ntt.pointwise_mul_acc(&lifted, a_j.residue(idx), &mut acc1, idx);
            }

            ntt.inverse(&mut acc0, idx);
            ntt.inverse(&mut acc1, idx);
            (acc0, acc1)
        })
        .collect();

    let (res0, res1): (Vec<_>, Vec<_>) = accumulated.into_iter().unzip();
    let mut u0 = RnsPoly::from_residues(res0, extended.clone());
    let mut u1 = RnsPoly::from_residues(res1, extended);
    u0.divide_round_by_last();
    u1.divide_round_by_last();
    (u0, u1)
}
