//! Number-Theoretic Transform (NTT) over an RNS basis.
//!
//! Cooley-Tukey / Gentleman-Sande radix-2 NTT for negacyclic convolution over
//! R_q = Z_q[X]/(X^N + 1), with one independent set of twiddle factors per
//! RNS prime.
//!
//! # Theory
//!
//! For multiplication modulo X^N + 1 we use a primitive 2N-th root of unity ψ
//! with ψ^N = -1. The forward transform evaluates a polynomial at the odd
//! powers of ψ, turning negacyclic convolution into pointwise products.
//!
//! Values in the NTT domain are kept in Montgomery form (a·2^64 mod q).
//! Sums, differences and multiplication by plain scalars commute with that
//! representation, so the evaluation domain can be used for everything except
//! moving between moduli.
//!
//! # Example
//!
//! ```
//! use ckks_fedagg::math::ntt::NttContext;
//! use ckks_fedagg::math::primes::ntt_primes;
//!
//! let primes = ntt_primes(256, &[40, 40]).unwrap();
//! let ctx = NttContext::with_moduli(256, &primes);
//!
//! let mut coeffs = vec![1u64; 256];
//! ctx.forward(&mut coeffs, 1);
//! ctx.inverse(&mut coeffs, 1);
//! assert_eq!(coeffs[0], 1);
//! ```

/// Precomputed NTT tables for every modulus of an RNS basis.
#[derive(Clone)]
pub struct NttContext {
    /// Ring dimension (power of two).
    n: usize,
    /// RNS moduli, each ≡ 1 (mod 2n).
    moduli: Vec<u64>,
    /// -q^(-1) mod 2^64 per modulus.
    q_inv_neg: Vec<u64>,
    /// 2^128 mod q per modulus, for conversion into Montgomery form.
    r_squared: Vec<u64>,
    /// Forward twiddle factors in bit-reversed order.
    psi_powers: Vec<Vec<u64>>,
    /// Inverse twiddle factors in bit-reversed order.
    psi_inv_powers: Vec<Vec<u64>>,
    /// n^(-1) mod q in Montgomery form.
    n_inv: Vec<u64>,
}

impl NttContext {
    /// Creates an NTT context for a single modulus.
    pub fn new(n: usize, q: u64) -> Self {
        Self::with_moduli(n, &[q])
    }

    /// Creates an NTT context for every modulus of an RNS basis.
    ///
    /// # Panics
    ///
    /// Panics if `n` is not a power of two or a modulus is not ≡ 1 (mod 2n).
    /// Moduli are expected to come from [`super::primes::ntt_primes`].
    pub fn with_moduli(n: usize, moduli: &[u64]) -> Self {
        assert!(n.is_power_of_two() && n >= 2, "n must be a power of two");
        assert!(!moduli.is_empty(), "moduli must be non-empty");

        let mut q_inv_neg = Vec::with_capacity(moduli.len());
        let mut r_squared = Vec::with_capacity(moduli.len());
        let mut psi_powers = Vec::with_capacity(moduli.len());
        let mut psi_inv_powers = Vec::with_capacity(moduli.len());
        let mut n_inv = Vec::with_capacity(moduli.len());

        for &q in moduli {
            assert!(q % (2 * n as u64) == 1, "q must be ≡ 1 (mod 2n)");

            let q_inv = Self::compute_q_inv_neg(q);
            let r2 = Self::compute_r_squared(q);

            let psi = Self::find_primitive_root(2 * n as u64, q);
            let psi_mont = Self::to_montgomery(psi, q, r2, q_inv);
            psi_powers.push(Self::compute_twiddle_factors(n, psi_mont, q, q_inv, r2));

            let psi_inv = Self::mod_pow(psi, q - 2, q);
            let psi_inv_mont = Self::to_montgomery(psi_inv, q, r2, q_inv);
            psi_inv_powers.push(Self::compute_twiddle_factors(n, psi_inv_mont, q, q_inv, r2));

            let n_inv_val = Self::mod_pow(n as u64, q - 2, q);
            n_inv.push(Self::to_montgomery(n_inv_val, q, r2, q_inv));

            q_inv_neg.push(q_inv);
            r_squared.push(r2);
        }

        Self {
            n,
            moduli: moduli.to_vec(),
            q_inv_neg,
            r_squared,
            psi_powers,
            psi_inv_powers,
            n_inv,
        }
    }

    /// Returns the ring dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// Returns the RNS moduli.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Position of `q` in the basis, if present.
    pub fn index_of(&self, q: u64) -> Option<usize> {
        self.moduli.iter().position(|&m| m == q)
    }

    /// Forward NTT of one residue polynomial modulo `moduli[idx]`.
    ///
    /// Input is in standard form and reduced; output is in Montgomery form.
    pub fn forward(&self, coeffs: &mut [u64], idx: usize) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");

        let q = self.moduli[idx];
        let r2 = self.r_squared[idx];
        let q_inv = self.q_inv_neg[idx];
        for c in coeffs.iter_mut() {
            *c = Self::to_montgomery(*c, q, r2, q_inv);
        }

        let psi_powers = &self.psi_powers[idx];
        let mut t = self.n;
        let mut m = 1;
        while m < self.n {
            t >>= 1;
            for i in 0..m {
                let j1 = 2 * i * t;
                let w = psi_powers[m + i];

                for j in j1..(j1 + t) {
                    let u = coeffs[j];
                    let v = self.montgomery_mul(coeffs[j + t], w, idx);

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    coeffs[j + t] = if u >= v { u - v } else { q - v + u };
                }
            }
            m <<= 1;
        }
    }

    /// Inverse NTT of one residue polynomial modulo `moduli[idx]`.
    ///
    /// Input is in Montgomery form; output is in standard form.
    pub fn inverse(&self, coeffs: &mut [u64], idx: usize) {
        assert_eq!(coeffs.len(), self.n, "Input length must match dimension");

        let q = self.moduli[idx];
        let psi_inv_powers = &self.psi_inv_powers[idx];
        let mut t = 1;
        let mut m = self.n;
        while m > 1 {
            m >>= 1;
            for i in 0..m {
                let j1 = i * 2 * t;
                let w = psi_inv_powers[m + i];

                for j in j1..(j1 + t) {
                    let u = coeffs[j];
                    let v = coeffs[j + t];

                    coeffs[j] = if u + v >= q { u + v - q } else { u + v };
                    let diff = if u >= v { u - v } else { q - v + u };
                    coeffs[j + t] = self.montgomery_mul(diff, w, idx);
                }
            }
            t <<= 1;
        }

        // n^(-1) scaling, then out of Montgomery form
        let n_inv = self.n_inv[idx];
        for c in coeffs.iter_mut() {
            let scaled = self.montgomery_mul(*c, n_inv, idx);
            *c = self.montgomery_mul(scaled, 1, idx);
        }
    }

    /// Pointwise product of two NTT-domain residues modulo `moduli[idx]`.
    pub fn pointwise_mul(&self, a: &[u64], b: &[u64], result: &mut [u64], idx: usize) {
        assert_eq!(a.len(), self.n, "Input length must match dimension");
        assert_eq!(b.len(), self.n, "Input length must match dimension");
        assert_eq!(result.len(), self.n, "Input length must match dimension");

        for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
            *r = self.montgomery_mul(x, y, idx);
        }
    }

    /// `acc += a * b` pointwise modulo `moduli[idx]`, all in NTT domain.
    pub fn pointwise_mul_acc(&self, a: &[u64], b: &[u64], acc: &mut [u64], idx: usize) {
        let q = self.moduli[idx];
        for ((r, &x), &y) in acc.iter_mut().zip(a).zip(b) {
            let p = self.montgomery_mul(x, y, idx);
            let s = *r + p;
            *r = if s >= q { s - q } else { s };
        }
    }

    #[inline]
    fn montgomery_mul(&self, a: u64, b: u64, idx: usize) -> u64 {
        let q = self.moduli[idx];
        let ab = (a as u128) * (b as u128);
        let m = ((ab as u64).wrapping_mul(self.q_inv_neg[idx])) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn to_montgomery(a: u64, q: u64, r_squared: u64, q_inv_neg: u64) -> u64 {
        let ab = (a as u128) * (r_squared as u128);
        let m = ((ab as u64).wrapping_mul(q_inv_neg)) as u128;
        let t = ((ab + m * (q as u128)) >> 64) as u64;
        if t >= q {
            t - q
        } else {
            t
        }
    }

    fn compute_q_inv_neg(q: u64) -> u64 {
        let mut y: u64 = 1;
        for i in 1..64 {
            let yi = y.wrapping_mul(q) & (1u64 << i);
            y |= yi;
        }
        y.wrapping_neg()
    }

    fn compute_r_squared(q: u64) -> u64 {
        let r_mod_q = (1u128 << 64) % (q as u128);
        ((r_mod_q * r_mod_q) % (q as u128)) as u64
    }

    fn mod_pow(mut base: u64, mut exp: u64, m: u64) -> u64 {
        let mut result = 1u64;
        base %= m;
        while exp > 0 {
            if exp & 1 == 1 {
                result = ((result as u128 * base as u128) % m as u128) as u64;
            }
            exp >>= 1;
            base = ((base as u128 * base as u128) % m as u128) as u64;
        }
        result
    }

    /// Primitive `order`-th root of unity modulo q, `order` a power of two.
    fn find_primitive_root(order: u64, q: u64) -> u64 {
        let exp = (q - 1) / order;
        let mut g = 2;
        loop {
            let candidate = Self::mod_pow(g, exp, q);
            if Self::mod_pow(candidate, order / 2, q) == q - 1 {
                return candidate;
            }
            g += 1;
        }
    }

    /// Twiddle factors in the bit-reversed order the butterflies consume.
    fn compute_twiddle_factors(
        n: usize,
        psi: u64,
        q: u64,
        q_inv_neg: u64,
        r_squared: u64,
    ) -> Vec<u64> {
        let mont = |a: u64, b: u64| -> u64 {
            let ab = (a as u128) * (b as u128);
            let mm = ((ab as u64).wrapping_mul(q_inv_neg)) as u128;
            let t = ((ab + mm * (q as u128)) >> 64) as u64;
            if t >= q {
                t - q
            } else {
                t
            }
        };

        let one = Self::to_montgomery(1, q, r_squared, q_inv_neg);
        let mut factors = vec![0u64; n];
        factors[1] = one;

        for m in 1..n {
            if m.is_power_of_two() {
                // ψ^(n/(2m)) by repeated squaring in Montgomery form
                let mut exp = n / (2 * m);
                let mut base = psi;
                let mut pow = one;
                while exp > 0 {
                    if exp & 1 == 1 {
                        pow = mont(pow, base);
                    }
                    base = mont(base, base);
                    exp >>= 1;
                }
                factors[m] = pow;
            } else {
                let prev_idx = m & (m - 1);
                let step_idx = m & m.wrapping_neg();
                factors[m] = mont(factors[prev_idx], factors[step_idx]);
            }
        }

        factors
    }
}

impl std::fmt::Debug for NttContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NttContext")
            .field("n", &self.n)
            .field("moduli", &self.moduli)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::primes::ntt_primes;

    fn context(n: usize) -> NttContext {
        let primes = ntt_primes(n, &[60, 40, 40]).unwrap();
        NttContext::with_moduli(n, &primes)
    }

    fn naive_negacyclic(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut r = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let p = ((a[i] as u128 * b[j] as u128) % q as u128) as u64;
                let k = i + j;
                if k < n {
                    r[k] = ((r[k] as u128 + p as u128) % q as u128) as u64;
                } else {
                    r[k - n] = (r[k - n] + q - p) % q;
                }
            }
        }
        r
    }

    #[test]
    fn test_roundtrip_every_modulus() {
        let n = 1024;
        let ctx = context(n);
        for (idx, &q) in ctx.moduli().iter().enumerate() {
            let original: Vec<u64> = (0..n as u64).map(|i| (i * 12345) % q).collect();
            let mut coeffs = original.clone();
            ctx.forward(&mut coeffs, idx);
            ctx.inverse(&mut coeffs, idx);
            assert_eq!(coeffs, original, "modulus index {}", idx);
        }
    }

    #[test]
    fn test_zero_polynomial() {
        let ctx = context(256);
        let mut coeffs = vec![0u64; 256];
        ctx.forward(&mut coeffs, 0);
        assert!(coeffs.iter().all(|&c| c == 0));
        ctx.inverse(&mut coeffs, 0);
        assert!(coeffs.iter().all(|&c| c == 0));
    }

    #[test]
    fn test_negacyclic_wraparound() {
        // x * x^(n-1) = x^n = -1 in Z_q[X]/(X^n + 1)
        let n = 256;
        let ctx = context(n);
        let q = ctx.moduli()[1];

        let mut a = vec![0u64; n];
        let mut b = vec![0u64; n];
        a[1] = 1;
        b[n - 1] = 1;
        ctx.forward(&mut a, 1);
        ctx.forward(&mut b, 1);

        let mut result = vec![0u64; n];
        ctx.pointwise_mul(&a, &b, &mut result, 1);
        ctx.inverse(&mut result, 1);

        assert_eq!(result[0], q - 1);
        assert!(result[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn test_matches_schoolbook_product() {
        use rand::{Rng, SeedableRng};
        use rand_chacha::ChaCha20Rng;

        let n = 64;
        let ctx = context(n);
        let mut rng = ChaCha20Rng::seed_from_u64(7);

        for (idx, &q) in ctx.moduli().iter().enumerate() {
            let a: Vec<u64> = (0..n).map(|_| rng.gen_range(0..q)).collect();
            let b: Vec<u64> = (0..n).map(|_| rng.gen_range(0..q)).collect();
            let expected = naive_negacyclic(&a, &b, q);

            let mut a_ntt = a.clone();
            let mut b_ntt = b.clone();
            ctx.forward(&mut a_ntt, idx);
            ctx.forward(&mut b_ntt, idx);
            let mut acc = vec![0u64; n];
            ctx.pointwise_mul_acc(&a_ntt, &b_ntt, &mut acc, idx);
            ctx.inverse(&mut acc, idx);

            assert_eq!(acc, expected);
        }
    }

    #[test]
    fn test_linearity() {
        let n = 256;
        let ctx = context(n);
        let q = ctx.moduli()[0];

        let a: Vec<u64> = (0..n as u64).collect();
        let b: Vec<u64> = (0..n as u64).map(|i| (i * 2) % q).collect();

        let mut a_ntt = a.clone();
        let mut b_ntt = b.clone();
        ctx.forward(&mut a_ntt, 0);
        ctx.forward(&mut b_ntt, 0);

        let mut sum: Vec<u64> = a.iter().zip(b.iter()).map(|(&x, &y)| (x + y) % q).collect();
        ctx.forward(&mut sum, 0);

        for i in 0..n {
            assert_eq!(sum[i], (a_ntt[i] + b_ntt[i]) % q);
        }
    }
}
