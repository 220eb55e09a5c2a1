//! NTT-friendly prime generation for the RNS modulus chain.
//!
//! Every prime q in the chain satisfies q ≡ 1 (mod 2N) so that a primitive
//! 2N-th root of unity exists and the negacyclic NTT applies.

use super::modular::ModQ;

const WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Deterministic Miller-Rabin for 64-bit integers.
pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &WITNESSES {
        if n % p == 0 {
            return n == p;
        }
    }

    let mut d = n - 1;
    let mut s = 0;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    'witness: for &a in &WITNESSES {
        let mut x = ModQ::pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..s {
            x = ModQ::mul(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Find one distinct prime per requested bit size, each ≡ 1 (mod 2n).
///
/// Candidates are scanned downward from the largest value below `2^bits`
/// congruent to 1 mod 2n, so every prime has exactly `bits` bits. Returns
/// `None` if some bit size has no unused prime left.
pub fn ntt_primes(n: usize, bit_sizes: &[u32]) -> Option<Vec<u64>> {
    let m = 2 * n as u64;
    let mut primes: Vec<u64> = Vec::with_capacity(bit_sizes.len());

    for &bits in bit_sizes {
        if !(2..=62).contains(&bits) {
            return None;
        }
        let upper = 1u64 << bits;
        let lower = 1u64 << (bits - 1);
        if upper <= m {
            return None;
        }

        let mut candidate = upper - m + 1;
        let found = loop {
            if candidate <= lower {
                break None;
            }
            if !primes.contains(&candidate) && is_prime(candidate) {
                break Some(candidate);
            }
            candidate -= m;
        };
        primes.push(found?);
    }

    Some(primes)
}
