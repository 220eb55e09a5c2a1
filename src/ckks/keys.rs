//! Key material: secret, public, key-switching and Galois keys.
//!
//! Public and evaluation keys are stored in NTT form. Key-switching keys use
//! the hybrid construction with the special prime P: one RLWE sample per data
//! prime q_j, encrypting `P · s'` in residue j only, so that a ciphertext
//! component decomposed by residue can be switched with noise divided by P.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::galois::rotation_elements;
use super::ring::RingContext;
use crate::math::{GaussianSampler, RnsPoly};

/// Ternary secret key. Never serialized; wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    coeffs: Vec<i64>,
}

impl SecretKey {
    pub fn generate(ring: &RingContext, sampler: &mut GaussianSampler) -> Self {
        Self {
            coeffs: sampler.ternary_vec(ring.dimension()),
        }
    }

    /// The key as an NTT-domain polynomial over `moduli`
    pub(crate) fn ntt_poly(&self, ring: &RingContext, moduli: &[u64]) -> RnsPoly {
        let mut s = RnsPoly::from_signed(&self.coeffs, moduli);
        s.to_ntt(ring.ntt());
        s
    }

    /// Coefficient-domain polynomial over `moduli`
    pub(crate) fn poly(&self, moduli: &[u64]) -> RnsPoly {
        RnsPoly::from_signed(&self.coeffs, moduli)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey([REDACTED])")
    }
}

/// RLWE public key `(b, a) = (-a·s + e, a)` over the data chain
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicKey {
    pub(crate) b: RnsPoly,
    pub(crate) a: RnsPoly,
}

impl PublicKey {
    pub fn generate(ring: &RingContext, sk: &SecretKey, sampler: &mut GaussianSampler) -> Self {
        let (b, a) = rlwe_sample(ring, sk, ring.data_moduli(), sampler);
        Self { b, a }
    }

    pub(crate) fn is_well_formed(&self, ring: &RingContext) -> bool {
        let expected = ring.data_moduli();
        [&self.b, &self.a].iter().all(|p| {
            p.is_ntt() && p.moduli() == expected && p.is_well_formed(ring.dimension())
        })
    }
}

/// Key switching from some s' to s, one `(b_j, a_j)` pair per data prime
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeySwitchKey {
    pub(crate) parts: Vec<(RnsPoly, RnsPoly)>,
}

impl KeySwitchKey {
    /// Key that turns a component decryptable under `from` into one under `sk`.
    pub fn generate(
        ring: &RingContext,
        sk: &SecretKey,
        from: &RnsPoly,
        sampler: &mut GaussianSampler,
    ) -> Self {
        let all = ring.all_moduli();
        let mut from_ntt = from.clone();
        from_ntt.to_ntt(ring.ntt());

        let special = ring.special_prime();
        let parts = (0..ring.data_moduli().len())
            .map(|j| {
                let (mut b, a) = rlwe_sample(ring, sk, all, sampler);
                b.add_scaled_residue(&from_ntt, special, j);
                (b, a)
            })
            .collect();

        Self { parts }
    }

    pub(crate) fn is_well_formed(&self, ring: &RingContext) -> bool {
        let all = ring.all_moduli();
        self.parts.len() == ring.data_moduli().len()
            && self.parts.iter().all(|(b, a)| {
                [b, a].iter().all(|p| {
                    p.is_ntt() && p.moduli() == all && p.is_well_formed(ring.dimension())
                })
            })
    }
}

/// Rotation keys indexed by Galois element
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GaloisKeys {
    pub(crate) keys: BTreeMap<usize, KeySwitchKey>,
}

impl GaloisKeys {
    /// Keys for left rotation by every power of two below the slot count.
    pub fn generate(ring: &RingContext, sk: &SecretKey, sampler: &mut GaussianSampler) -> Self {
        let all = ring.all_moduli();
        let s = sk.poly(all);
        let keys = rotation_elements(ring.dimension())
            .into_iter()
            .map(|g| {
                let rotated = s.automorphism(g);
                (g, KeySwitchKey::generate(ring, sk, &rotated, sampler))
            })
            .collect();
        Self { keys }
    }

    pub fn get(&self, galois_elt: usize) -> Option<&KeySwitchKey> {
        self.keys.get(&galois_elt)
    }

    pub fn elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// `(-a·s + e, a)` in NTT form over `moduli`
fn rlwe_sample(
    ring: &RingContext,
    sk: &SecretKey,
    moduli: &[u64],
    sampler: &mut GaussianSampler,
) -> (RnsPoly, RnsPoly) {
    let n = ring.dimension();
    let ntt = ring.ntt();

    let s = sk.ntt_poly(ring, moduli);
    let mut a = RnsPoly::uniform(n, moduli, sampler);
    a.to_ntt(ntt);
    let mut e = RnsPoly::gaussian(n, moduli, sampler);
    e.to_ntt(ntt);

    let mut b = -a.mul(&s, ntt);
    b += &e;
    (b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ModQ;
    use crate::params::CkksParams;

    fn ring() -> RingContext {
        let params = CkksParams {
            poly_modulus_degree: 4096,
            coeff_mod_bit_sizes: vec![36, 30, 36],
            global_scale: 2f64.powi(25),
            ..CkksParams::secure_128_n8192()
        };
        RingContext::new(&params).unwrap()
    }

    #[test]
    fn test_public_key_is_small_under_secret() {
        let ring = ring();
        let mut sampler = GaussianSampler::with_seed(3.2, 1);
        let sk = SecretKey::generate(&ring, &mut sampler);
        let pk = PublicKey::generate(&ring, &sk, &mut sampler);
        assert!(pk.is_well_formed(&ring));

        // b + a·s = e
        let s = sk.ntt_poly(&ring, ring.data_moduli());
        let mut e = pk.a.mul(&s, ring.ntt());
        e += &pk.b;
        e.from_ntt(ring.ntt());

        for i in 0..ring.data_moduli().len() {
            let q = ring.data_moduli()[i];
            assert!(e.residue(i).iter().all(|&c| ModQ::to_signed(c, q).abs() <= 20));
        }
    }

    #[test]
    fn test_galois_keys_cover_power_of_two_rotations() {
        let ring = ring();
        let mut sampler = GaussianSampler::with_seed(3.2, 2);
        let sk = SecretKey::generate(&ring, &mut sampler);
        let gk = GaloisKeys::generate(&ring, &sk, &mut sampler);

        assert_eq!(gk.len(), 11); // log2(2048)
        assert!(gk.get(5).is_some());
        assert!(gk.get(3).is_none());
        assert!(gk.keys.values().all(|k| k.is_well_formed(&ring)));
    }

    #[test]
    fn test_secret_key_debug_is_redacted() {
        let ring = ring();
        let mut sampler = GaussianSampler::with_seed(3.2, 3);
        let sk = SecretKey::generate(&ring, &mut sampler);
        assert_eq!(format!("{:?}", sk), "SecretKey([REDACTED])");
    }
}
