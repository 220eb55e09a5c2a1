//! Polynomials over R_Q = Z_Q[X]/(X^N + 1) in residue-number-system form.
//!
//! Q is a product of word-sized primes q_0 ⋯ q_l, and a polynomial is stored
//! as one residue polynomial per prime. Polynomials live either in the
//! coefficient domain or in the NTT domain; addition works in both, while
//! multiplication requires NTT form and basis changes (rescaling, the
//! automorphisms) require coefficient form.
//!
//! # Example
//!
//! ```
//! use ckks_fedagg::math::{NttContext, RnsPoly};
//! use ckks_fedagg::math::primes::ntt_primes;
//!
//! let primes = ntt_primes(16, &[30, 30]).unwrap();
//! let ctx = NttContext::with_moduli(16, &primes);
//!
//! let mut a = RnsPoly::from_signed(&[3; 16], &primes);
//! let mut b = RnsPoly::from_signed(&[-1; 16], &primes);
//! a.to_ntt(&ctx);
//! b.to_ntt(&ctx);
//! let mut product = a.mul(&b, &ctx);
//! product.from_ntt(&ctx);
//! ```

use serde::{Deserialize, Serialize};
use std::ops::{AddAssign, Neg, SubAssign};

use super::gaussian::GaussianSampler;
use super::modular::ModQ;
use super::ntt::NttContext;

/// Polynomial in RNS representation.
///
/// # Fields
///
/// * `residues` - One length-N coefficient vector per modulus
/// * `moduli` - The RNS primes, in chain order
/// * `is_ntt` - Whether residues are in NTT (Montgomery) form
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RnsPoly {
    residues: Vec<Vec<u64>>,
    moduli: Vec<u64>,
    is_ntt: bool,
}

impl RnsPoly {
    /// Zero polynomial in coefficient domain
    pub fn zero(n: usize, moduli: &[u64]) -> Self {
        Self {
            residues: vec![vec![0; n]; moduli.len()],
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Lift a small signed polynomial into every residue
    pub fn from_signed(coeffs: &[i64], moduli: &[u64]) -> Self {
        let residues = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| ModQ::from_signed(c, q)).collect())
            .collect();
        Self {
            residues,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Coefficient-domain polynomial from reduced residues
    pub(crate) fn from_residues(residues: Vec<Vec<u64>>, moduli: Vec<u64>) -> Self {
        debug_assert_eq!(residues.len(), moduli.len());
        Self {
            residues,
            moduli,
            is_ntt: false,
        }
    }

    /// Uniformly random polynomial; uniform residues are uniform in R_Q by CRT
    pub fn uniform(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        let residues = moduli.iter().map(|&q| sampler.uniform_vec(n, q)).collect();
        Self {
            residues,
            moduli: moduli.to_vec(),
            is_ntt: false,
        }
    }

    /// Error polynomial with discrete Gaussian coefficients
    pub fn gaussian(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        Self::from_signed(&sampler.sample_vec(n), moduli)
    }

    /// Polynomial with coefficients uniform in {-1, 0, 1}
    pub fn ternary(n: usize, moduli: &[u64], sampler: &mut GaussianSampler) -> Self {
        Self::from_signed(&sampler.ternary_vec(n), moduli)
    }

    pub fn dimension(&self) -> usize {
        self.residues.first().map_or(0, Vec::len)
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    pub fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// Residue polynomial modulo `moduli()[i]`
    pub fn residue(&self, i: usize) -> &[u64] {
        &self.residues[i]
    }

    pub fn residue_mut(&mut self, i: usize) -> &mut [u64] {
        &mut self.residues[i]
    }

    /// Structural check for polynomials read from untrusted bytes.
    pub fn is_well_formed(&self, n: usize) -> bool {
        self.residues.len() == self.moduli.len()
            && !self.moduli.is_empty()
            && self
                .residues
                .iter()
                .zip(&self.moduli)
                .all(|(r, &q)| r.len() == n && r.iter().all(|&c| c < q))
    }

    /// Convert to NTT domain in place.
    ///
    /// # Panics
    ///
    /// Panics if a modulus is missing from the context basis.
    pub fn to_ntt(&mut self, ctx: &NttContext) {
        if self.is_ntt {
            return;
        }
        for (res, &q) in self.residues.iter_mut().zip(&self.moduli) {
            ctx.forward(res, basis_index(ctx, q));
        }
        self.is_ntt = true;
    }

    /// Convert back to coefficient domain in place.
    pub fn from_ntt(&mut self, ctx: &NttContext) {
        if !self.is_ntt {
            return;
        }
        for (res, &q) in self.residues.iter_mut().zip(&self.moduli) {
            ctx.inverse(res, basis_index(ctx, q));
        }
        self.is_ntt = false;
    }

    /// Product of two NTT-domain polynomials over the same basis.
    pub fn mul(&self, other: &RnsPoly, ctx: &NttContext) -> RnsPoly {
        assert!(self.is_ntt && other.is_ntt, "multiplication requires NTT form");
        assert_eq!(self.moduli, other.moduli, "moduli mismatch");

        let n = self.dimension();
        let residues = self
            .residues
            .iter()
            .zip(&other.residues)
            .zip(&self.moduli)
            .map(|((a, b), &q)| {
                let mut out = vec![0u64; n];
                ctx.pointwise_mul(a, b, &mut out, basis_index(ctx, q));
                out
            })
            .collect();

        RnsPoly {
            residues,
            moduli: self.moduli.clone(),
            is_ntt: true,
        }
    }

    /// Multiply by a non-negative integer constant (valid in either domain).
    pub fn mul_scalar(&mut self, k: u64) {
        for (res, &q) in self.residues.iter_mut().zip(&self.moduli) {
            let k_q = k % q;
            for c in res.iter_mut() {
                *c = ModQ::mul(*c, k_q, q);
            }
        }
    }

    /// Add `k · other` into residue `target` only.
    pub(crate) fn add_scaled_residue(&mut self, other: &RnsPoly, k: u64, target: usize) {
        let q = self.moduli[target];
        let k_q = k % q;
        for (c, &o) in self.residues[target].iter_mut().zip(&other.residues[target]) {
            *c = ModQ::add(*c, ModQ::mul(o, k_q, q), q);
        }
    }

    /// Keep the first `count` residues.
    pub fn truncate(&mut self, count: usize) {
        self.residues.truncate(count);
        self.moduli.truncate(count);
    }

    /// Divide by the last modulus with rounding and drop it.
    ///
    /// Computes `(c - [c]_{q_last}) · q_last^{-1} mod q_i`, where the last
    /// residue is taken in centered form. This is both the CKKS rescale and
    /// the mod-down step after key switching with the special prime.
    pub fn divide_round_by_last(&mut self) {
        assert!(!self.is_ntt, "rescaling requires coefficient form");
        assert!(self.moduli.len() >= 2, "cannot drop the only modulus");

        let (Some(last), Some(q_last)) = (self.residues.pop(), self.moduli.pop()) else {
            return;
        };
        for (res, &q) in self.residues.iter_mut().zip(&self.moduli) {
            // q_last and q are distinct primes
            let inv = ModQ::inv(q_last % q, q).unwrap_or(0);
            for (c, &r) in res.iter_mut().zip(&last) {
                let shift = ModQ::from_signed(ModQ::to_signed(r, q_last), q);
                *c = ModQ::mul(ModQ::sub(*c, shift, q), inv, q);
            }
        }
    }

    /// Apply τ_g: X ↦ X^g, in coefficient domain.
    pub fn automorphism(&self, g: usize) -> RnsPoly {
        assert!(!self.is_ntt, "automorphism requires coefficient form");
        let n = self.dimension();
        let two_n = 2 * n;

        let residues = self
            .residues
            .iter()
            .zip(&self.moduli)
            .map(|(res, &q)| {
                let mut out = vec![0u64; n];
                for (i, &c) in res.iter().enumerate() {
                    let target = (i * g) % two_n;
                    if target < n {
                        out[target] = ModQ::add(out[target], c, q);
                    } else {
                        out[target - n] = ModQ::sub(out[target - n], c, q);
                    }
                }
                out
            })
            .collect();

        RnsPoly {
            residues,
            moduli: self.moduli.clone(),
            is_ntt: false,
        }
    }
}

fn basis_index(ctx: &NttContext, q: u64) -> usize {
    ctx.index_of(q)
        .unwrap_or_else(|| panic!("modulus {} is not part of the NTT basis", q))
}

impl AddAssign<&RnsPoly> for RnsPoly {
    fn add_assign(&mut self, rhs: &RnsPoly) {
        assert_eq!(self.moduli, rhs.moduli, "moduli mismatch");
        assert_eq!(self.is_ntt, rhs.is_ntt, "domain mismatch");
        for ((a, b), &q) in self.residues.iter_mut().zip(&rhs.residues).zip(&self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = ModQ::add(*x, y, q);
            }
        }
    }
}

impl SubAssign<&RnsPoly> for RnsPoly {
    fn sub_assign(&mut self, rhs: &RnsPoly) {
        assert_eq!(self.moduli, rhs.moduli, "moduli mismatch");
        assert_eq!(self.is_ntt, rhs.is_ntt, "domain mismatch");
        for ((a, b), &q) in self.residues.iter_mut().zip(&rhs.residues).zip(&self.moduli) {
            for (x, &y) in a.iter_mut().zip(b) {
                *x = ModQ::sub(*x, y, q);
            }
        }
    }
}

impl Neg for RnsPoly {
    type Output = RnsPoly;

    fn neg(mut self) -> RnsPoly {
        for (res, &q) in self.residues.iter_mut().zip(&self.moduli) {
            for c in res.iter_mut() {
                *c = ModQ::negate(*c, q);
            }
        }
        self
    }
}
