//! Canonical-embedding encoder.
//!
//! A plaintext polynomial m(X) ∈ Z[X]/(X^N + 1) holds N/2 complex slots, slot
//! j being m(ζ^{5^j}) / Δ for ζ = exp(iπ/N). Ordering slots along the powers
//! of 5 makes the Galois automorphism X ↦ X^{5^k} a cyclic left rotation by k.
//!
//! Both directions use the "special FFT": a radix-2 butterfly network whose
//! twiddles are indexed by the rotation group instead of the natural order.

use num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{FedAggError, Result};

/// Precomputed rotation group and roots of unity for one ring dimension.
#[derive(Clone, Debug)]
pub struct Encoder {
    slots: usize,
    /// 2N
    m: usize,
    /// 5^j mod 2N for j < N/2
    rot_group: Vec<usize>,
    /// exp(2πik / 2N) for k ≤ 2N
    ksi_pows: Vec<Complex64>,
}

impl Encoder {
    /// Create an encoder for ring dimension `n` (power of two, at least 4).
    pub fn new(n: usize) -> Self {
        let slots = n / 2;
        let m = 2 * n;

        let mut rot_group = Vec::with_capacity(slots);
        let mut five_pow = 1usize;
        for _ in 0..slots {
            rot_group.push(five_pow);
            five_pow = (five_pow * 5) % m;
        }

        let ksi_pows = (0..=m)
            .map(|k| Complex64::from_polar(1.0, 2.0 * PI * k as f64 / m as f64))
            .collect();

        Self {
            slots,
            m,
            rot_group,
            ksi_pows,
        }
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Encode up to `slots` reals into integer coefficients of Δ·m(X).
    ///
    /// Fails if a value is not finite or a coefficient would reach
    /// `coeff_bound` in absolute value.
    pub fn encode(&self, values: &[f64], scale: f64, coeff_bound: f64) -> Result<Vec<i64>> {
        if values.len() > self.slots {
            return Err(FedAggError::Encoding(format!(
                "{} values exceed {} slots",
                values.len(),
                self.slots
            )));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(FedAggError::Encoding(format!("non-finite value {}", bad)));
        }

        let mut z = vec![Complex64::new(0.0, 0.0); self.slots];
        for (slot, &v) in z.iter_mut().zip(values) {
            *slot = Complex64::new(v, 0.0);
        }
        self.emb_inv(&mut z);

        let n = 2 * self.slots;
        let mut coeffs = vec![0i64; n];
        for (i, u) in z.iter().enumerate() {
            let re = (u.re * scale).round();
            let im = (u.im * scale).round();
            if re.abs() >= coeff_bound || im.abs() >= coeff_bound {
                return Err(FedAggError::Encoding(format!(
                    "scaled coefficient {:e} overflows the first modulus",
                    re.abs().max(im.abs())
                )));
            }
            coeffs[i] = re as i64;
            coeffs[i + self.slots] = im as i64;
        }
        Ok(coeffs)
    }

    /// Decode centered coefficients back to the real parts of every slot.
    pub fn decode(&self, coeffs: &[i64], scale: f64) -> Vec<f64> {
        let mut z: Vec<Complex64> = (0..self.slots)
            .map(|i| {
                Complex64::new(
                    coeffs[i] as f64 / scale,
                    coeffs[i + self.slots] as f64 / scale,
                )
            })
            .collect();
        self.emb(&mut z);
        z.into_iter().map(|c| c.re).collect()
    }

    /// Slot values → coefficient pairs
    fn emb_inv(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        let mut len = size;
        while len >= 1 {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = self.m / lenq;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (lenq - (self.rot_group[j] % lenq)) * gap;
                    let u = vals[i + j] + vals[i + j + lenh];
                    let v = (vals[i + j] - vals[i + j + lenh]) * self.ksi_pows[idx];
                    vals[i + j] = u;
                    vals[i + j + lenh] = v;
                }
            }
            len >>= 1;
        }
        bit_reverse(vals);
        let inv = 1.0 / size as f64;
        for v in vals.iter_mut() {
            *v *= inv;
        }
    }

    /// Coefficient pairs → slot values
    fn emb(&self, vals: &mut [Complex64]) {
        let size = vals.len();
        bit_reverse(vals);
        let mut len = 2;
        while len <= size {
            let lenh = len >> 1;
            let lenq = len << 2;
            let gap = self.m / lenq;
            for i in (0..size).step_by(len) {
                for j in 0..lenh {
                    let idx = (self.rot_group[j] % lenq) * gap;
                    let u = vals[i + j];
                    let v = vals[i + j + lenh] * self.ksi_pows[idx];
                    vals[i + j] = u + v;
                    vals[i + j + lenh] = u - v;
                }
            }
            len <<= 1;
        }
    }
}

fn bit_reverse(vals: &mut [Complex64]) {
    let n = vals.len();
    let mut j = 0;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            vals.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALE: f64 = 1099511627776.0; // 2^40
    const BOUND: f64 = 5.0e17;

    #[test]
    fn test_roundtrip() {
        let encoder = Encoder::new(64);
        let values: Vec<f64> = (0..32).map(|i| (i as f64 - 16.0) * 0.37).collect();

        let coeffs = encoder.encode(&values, SCALE, BOUND).unwrap();
        let decoded = encoder.decode(&coeffs, SCALE);

        for (v, d) in values.iter().zip(decoded.iter()) {
            assert!((v - d).abs() < 1e-9, "{} vs {}", v, d);
        }
    }

    #[test]
    fn test_short_vector_pads_with_zeros() {
        let encoder = Encoder::new(32);
        let coeffs = encoder.encode(&[1.5, -2.5], SCALE, BOUND).unwrap();
        let decoded = encoder.decode(&coeffs, SCALE);

        assert!((decoded[0] - 1.5).abs() < 1e-9);
        assert!((decoded[1] + 2.5).abs() < 1e-9);
        assert!(decoded[2..].iter().all(|d| d.abs() < 1e-9));
    }

    #[test]
    fn test_matches_direct_evaluation() {
        // slot j = m(ζ^{5^j}) / Δ with ζ = exp(iπ/N)
        let n = 32;
        let encoder = Encoder::new(n);
        let values: Vec<f64> = (0..16).map(|i| (i as f64).sin()).collect();
        let coeffs = encoder.encode(&values, SCALE, BOUND).unwrap();

        for j in [0usize, 3, 11] {
            let exponent = encoder.rot_group[j] as f64;
            let mut acc = Complex64::new(0.0, 0.0);
            for (k, &c) in coeffs.iter().enumerate() {
                acc += Complex64::from_polar(c as f64, PI * k as f64 * exponent / n as f64);
            }
            acc /= SCALE;
            assert!((acc.re - values[j]).abs() < 1e-6);
            assert!(acc.im.abs() < 1e-6);
        }
    }

    #[test]
    fn test_rejects_bad_input() {
        let encoder = Encoder::new(16);
        assert!(matches!(
            encoder.encode(&[f64::NAN], SCALE, BOUND),
            Err(FedAggError::Encoding(_))
        ));
        assert!(encoder.encode(&[0.0; 9], SCALE, BOUND).is_err());
        assert!(encoder.encode(&[1.0e9], SCALE, BOUND).is_err());
    }
}
