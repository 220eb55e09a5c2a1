//! Randomness for key generation and encryption
//!
//! One ChaCha20 stream drives every distribution the scheme needs: the
//! discrete Gaussian for error terms, ternary secrets and ephemeral keys, and
//! uniform residues for the `a` components of RLWE samples.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Discrete Gaussian sampler over Z using rejection sampling
#[derive(Clone)]
pub struct GaussianSampler {
    /// Standard deviation σ
    sigma: f64,
    /// Tailcut: reject samples beyond this many standard deviations
    tailcut: usize,
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Sampler seeded from the operating system
    pub fn new(sigma: f64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::from_entropy())
    }

    /// Deterministic sampler, for tests and reproducible setups
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self::from_rng(sigma, ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(sigma: f64, rng: ChaCha20Rng) -> Self {
        Self {
            sigma,
            tailcut: (sigma * 6.0).ceil() as usize,
            rng,
        }
    }

    /// Get the standard deviation
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample a single value from the discrete Gaussian D_σ
    pub fn sample(&mut self) -> i64 {
        let sigma_sq_2 = 2.0 * self.sigma * self.sigma;
        let bound = self.tailcut as i64;

        loop {
            let x = self.rng.gen_range(-bound..=bound);

            // accept with probability exp(-x²/(2σ²))
            let prob = (-((x * x) as f64) / sigma_sq_2).exp();
            let u: f64 = self.rng.gen();
            if u < prob {
                return x;
            }
        }
    }

    /// Sample a vector of Gaussian values
    pub fn sample_vec(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.sample()).collect()
    }

    /// Uniform coefficients in {-1, 0, 1}
    pub fn ternary_vec(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.rng.gen_range(-1i64..=1)).collect()
    }

    /// Uniform residues in [0, q)
    pub fn uniform_vec(&mut self, len: usize, q: u64) -> Vec<u64> {
        (0..len).map(|_| self.rng.gen_range(0..q)).collect()
    }
}

impl std::fmt::Debug for GaussianSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianSampler")
            .field("sigma", &self.sigma)
            .field("tailcut", &self.tailcut)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tailcut_bounds() {
        let mut sampler = GaussianSampler::with_seed(DEFAULT_SIGMA, 1);
        let bound = (6.0 * DEFAULT_SIGMA).ceil() as i64;
        for _ in 0..10_000 {
            let s = sampler.sample();
            assert!(s.abs() <= bound, "Sample {} exceeds 6σ bound {}", s, bound);
        }
    }

    #[test]
    fn test_deterministic_seeding() {
        let mut a = GaussianSampler::with_seed(DEFAULT_SIGMA, 12345);
        let mut b = GaussianSampler::with_seed(DEFAULT_SIGMA, 12345);
        assert_eq!(a.sample_vec(100), b.sample_vec(100));
        assert_eq!(a.ternary_vec(100), b.ternary_vec(100));
    }

    #[test]
    fn test_distribution_moments() {
        let mut sampler = GaussianSampler::with_seed(DEFAULT_SIGMA, 42);
        let n = 100_000;
        let samples = sampler.sample_vec(n);

        let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n as f64;
        let variance = samples
            .iter()
            .map(|&x| (x as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;

        assert!(mean.abs() < 0.1, "Mean {} is too far from 0", mean);
        let expected = DEFAULT_SIGMA * DEFAULT_SIGMA;
        assert!(
            (variance - expected).abs() / expected < 0.1,
            "Variance {} differs from {}",
            variance,
            expected
        );
    }

    #[test]
    fn test_ternary_and_uniform_ranges() {
        let mut sampler = GaussianSampler::with_seed(DEFAULT_SIGMA, 9);
        let t = sampler.ternary_vec(1000);
        assert!(t.iter().all(|&x| (-1..=1).contains(&x)));
        assert!(t.contains(&-1) && t.contains(&0) && t.contains(&1));

        let q = 97;
        let u = sampler.uniform_vec(1000, q);
        assert!(u.iter().all(|&x| x < q));
    }
}
