//! The RNS basis shared by every key and ciphertext of one context.

use crate::error::Result;
use crate::math::NttContext;
use crate::params::CkksParams;

/// Ring dimension, modulus chain and NTT tables.
///
/// The NTT basis is the data chain `q_0 ⋯ q_L` followed by the special
/// prime `P`, so the position of a data prime in the chain is also its NTT
/// index and `P` always sits at index `L + 1`.
#[derive(Clone, Debug)]
pub struct RingContext {
    n: usize,
    data_count: usize,
    ntt: NttContext,
}

impl RingContext {
    /// Build from validated parameters.
    pub fn new(params: &CkksParams) -> Result<Self> {
        let primes = params.primes()?;
        Ok(Self::from_primes(params.poly_modulus_degree, &primes))
    }

    /// Build from an explicit prime list, special prime last.
    pub fn from_primes(n: usize, primes: &[u64]) -> Self {
        Self {
            n,
            data_count: primes.len() - 1,
            ntt: NttContext::with_moduli(n, primes),
        }
    }

    pub fn dimension(&self) -> usize {
        self.n
    }

    pub fn slots(&self) -> usize {
        self.n / 2
    }

    pub fn ntt(&self) -> &NttContext {
        &self.ntt
    }

    /// Every prime, special prime last
    pub fn all_moduli(&self) -> &[u64] {
        self.ntt.moduli()
    }

    /// The chain ciphertexts live in
    pub fn data_moduli(&self) -> &[u64] {
        &self.ntt.moduli()[..self.data_count]
    }

    pub fn special_prime(&self) -> u64 {
        self.ntt.moduli()[self.data_count]
    }

    pub fn special_index(&self) -> usize {
        self.data_count
    }

    /// `q_0 ⋯ q_{level_count-1}` followed by `P`
    pub fn extended_moduli(&self, level_count: usize) -> Vec<u64> {
        let mut moduli = self.data_moduli()[..level_count].to_vec();
        moduli.push(self.special_prime());
        moduli
    }

    /// NTT index of the `t`-th modulus of `extended_moduli(level_count)`
    pub fn extended_index(&self, level_count: usize, t: usize) -> usize {
        if t < level_count {
            t
        } else {
            self.data_count
        }
    }
}
