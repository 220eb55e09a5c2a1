//! Parameter sets for the CKKS scheme
//!
//! Modulus budgets follow the homomorphic encryption security standard
//! tables for ternary secrets.

use serde::{Deserialize, Serialize};

use crate::error::{FedAggError, Result};
use crate::math::gaussian::DEFAULT_SIGMA;
use crate::math::primes::ntt_primes;

/// Security level for parameter selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityLevel {
    /// 128-bit security (recommended)
    #[default]
    Bits128,
    /// 192-bit security
    Bits192,
    /// 256-bit security (conservative)
    Bits256,
}

impl SecurityLevel {
    /// Largest total bit size of the coefficient modulus for ring degree `n`
    pub fn max_modulus_bits(self, n: usize) -> Option<u32> {
        let row = match self {
            SecurityLevel::Bits128 => [27, 54, 109, 218, 438, 881],
            SecurityLevel::Bits192 => [19, 37, 75, 152, 305, 611],
            SecurityLevel::Bits256 => [14, 29, 58, 118, 237, 476],
        };
        let idx = match n {
            1024 => 0,
            2048 => 1,
            4096 => 2,
            8192 => 3,
            16384 => 4,
            32768 => 5,
            _ => return None,
        };
        Some(row[idx])
    }
}

/// Core parameters for the CKKS scheme
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CkksParams {
    /// Ring dimension N (power of two)
    pub poly_modulus_degree: usize,

    /// Bit size of each RNS prime.
    /// All but the last form the data chain; the last is the special
    /// key-switching prime.
    pub coeff_mod_bit_sizes: Vec<u32>,

    /// Encoding scale Δ
    pub global_scale: f64,

    /// Standard deviation for Gaussian error sampling
    pub sigma: f64,

    /// Target security level
    pub security_level: SecurityLevel,

    /// Whether to generate rotation keys
    pub galois_keys: bool,
}

impl Default for CkksParams {
    fn default() -> Self {
        Self::secure_128_n16384()
    }
}

impl CkksParams {
    /// 128-bit secure parameters for N=16384 with a [60, 40, 40, 60] chain
    /// and scale 2^40
    pub fn secure_128_n16384() -> Self {
        Self {
            poly_modulus_degree: 16384,
            coeff_mod_bit_sizes: vec![60, 40, 40, 60],
            global_scale: 2f64.powi(40),
            sigma: DEFAULT_SIGMA,
            security_level: SecurityLevel::Bits128,
            galois_keys: true,
        }
    }

    /// 128-bit secure parameters for N=8192, same chain without rotation keys
    pub fn secure_128_n8192() -> Self {
        Self {
            poly_modulus_degree: 8192,
            galois_keys: false,
            ..Self::secure_128_n16384()
        }
    }

    /// Number of real values packed into one ciphertext block
    pub fn slot_count(&self) -> usize {
        self.poly_modulus_degree / 2
    }

    /// Number of primes usable by ciphertexts (excludes the special prime)
    pub fn data_modulus_count(&self) -> usize {
        self.coeff_mod_bit_sizes.len().saturating_sub(1)
    }

    /// Total bit size of the coefficient modulus including the special prime
    pub fn total_modulus_bits(&self) -> u32 {
        self.coeff_mod_bit_sizes.iter().sum()
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<()> {
        self.primes().map(|_| ())
    }

    /// Validate and return the RNS primes, special prime last
    pub fn primes(&self) -> Result<Vec<u64>> {
        let n = self.poly_modulus_degree;
        if !n.is_power_of_two() || !(1024..=32768).contains(&n) {
            return Err(config_err(format!(
                "poly_modulus_degree {} must be a power of two in [1024, 32768]",
                n
            )));
        }

        let bits = &self.coeff_mod_bit_sizes;
        if bits.len() < 2 {
            return Err(config_err(
                "coeff_mod_bit_sizes needs at least one data prime and the special prime",
            ));
        }

        let min_bits = (2 * n).trailing_zeros() + 2;
        if let Some(&b) = bits.iter().find(|&&b| b < min_bits || b > 60) {
            return Err(config_err(format!(
                "prime bit size {} outside [{}, 60] for N={}",
                b, min_bits, n
            )));
        }

        let special = bits[bits.len() - 1];
        let max_data = bits[..bits.len() - 1].iter().copied().max().unwrap_or(0);
        if special < max_data {
            return Err(config_err(format!(
                "special prime ({} bits) must be at least as large as every data prime ({} bits)",
                special, max_data
            )));
        }

        let limit = self
            .security_level
            .max_modulus_bits(n)
            .ok_or_else(|| config_err(format!("no security table entry for N={}", n)))?;
        if self.total_modulus_bits() > limit {
            return Err(config_err(format!(
                "total modulus {} bits exceeds {} bits allowed for N={} at {:?}",
                self.total_modulus_bits(),
                limit,
                n,
                self.security_level
            )));
        }

        let scale = self.global_scale;
        if !scale.is_finite() || scale <= 1.0 {
            return Err(config_err(format!("global_scale {} must be finite and > 1", scale)));
        }
        if scale.log2() >= f64::from(bits[0]) - 1.0 {
            return Err(config_err(format!(
                "global_scale 2^{:.1} leaves no headroom under the first {}-bit prime",
                scale.log2(),
                bits[0]
            )));
        }

        if !self.sigma.is_finite() || self.sigma <= 0.0 {
            return Err(config_err(format!("sigma {} must be positive", self.sigma)));
        }

        ntt_primes(n, bits).ok_or_else(|| {
            config_err(format!(
                "not enough NTT-friendly primes for bit sizes {:?} at N={}",
                bits, n
            ))
        })
    }
}

fn config_err(msg: impl Into<String>) -> FedAggError {
    FedAggError::Configuration(msg.into())
}
