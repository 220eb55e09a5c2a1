//! Scalar arithmetic over Z_q for the 64-bit RNS primes.

/// Modular arithmetic operations over Z_q
pub struct ModQ;

impl ModQ {
    /// Add two reduced values modulo q
    #[inline]
    pub fn add(a: u64, b: u64, q: u64) -> u64 {
        let sum = (a as u128) + (b as u128);
        (sum % (q as u128)) as u64
    }

    /// Subtract two reduced values modulo q
    #[inline]
    pub fn sub(a: u64, b: u64, q: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            q - (b - a)
        }
    }

    /// Multiply two values modulo q
    #[inline]
    pub fn mul(a: u64, b: u64, q: u64) -> u64 {
        let prod = (a as u128) * (b as u128);
        (prod % (q as u128)) as u64
    }

    /// Negate a reduced value modulo q
    #[inline]
    pub fn negate(a: u64, q: u64) -> u64 {
        if a == 0 {
            0
        } else {
            q - a
        }
    }

    /// `base^exp mod q` by square-and-multiply
    pub fn pow(base: u64, mut exp: u64, q: u64) -> u64 {
        let mut result = 1u64 % q;
        let mut base = base % q;
        while exp > 0 {
            if exp & 1 == 1 {
                result = Self::mul(result, base, q);
            }
            base = Self::mul(base, base, q);
            exp >>= 1;
        }
        result
    }

    /// Multiplicative inverse modulo a prime q (Fermat)
    ///
    /// Returns `None` when `a ≡ 0 (mod q)`.
    pub fn inv(a: u64, q: u64) -> Option<u64> {
        let a = a % q;
        if a == 0 {
            return None;
        }
        Some(Self::pow(a, q - 2, q))
    }

    /// Convert a signed integer to its representation in Z_q
    #[inline]
    pub fn from_signed(val: i64, q: u64) -> u64 {
        if val >= 0 {
            (val as u64) % q
        } else {
            let r = val.unsigned_abs() % q;
            if r == 0 {
                0
            } else {
                q - r
            }
        }
    }

    /// Convert from Z_q to the centered representative in (-q/2, q/2]
    #[inline]
    pub fn to_signed(val: u64, q: u64) -> i64 {
        if val <= q / 2 {
            val as i64
        } else {
            -((q - val) as i64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: u64 = 1152921504606830593;

    #[test]
    fn test_add_sub() {
        assert_eq!(ModQ::add(5, 7, Q), 12);
        assert_eq!(ModQ::add(Q - 1, 2, Q), 1);
        assert_eq!(ModQ::sub(10, 3, Q), 7);
        assert_eq!(ModQ::sub(3, 10, Q), Q - 7);
    }

    #[test]
    fn test_mul_negate() {
        assert_eq!(ModQ::mul(5, 7, Q), 35);
        assert_eq!(ModQ::mul(Q - 1, Q - 1, Q), 1);
        assert_eq!(ModQ::negate(5, Q), Q - 5);
        assert_eq!(ModQ::negate(0, Q), 0);
    }

    #[test]
    fn test_pow_and_inverse() {
        assert_eq!(ModQ::pow(3, 0, Q), 1);
        assert_eq!(ModQ::pow(2, 10, Q), 1024);
        let a = 123_456_789u64;
        let a_inv = ModQ::inv(a, Q).unwrap();
        assert_eq!(ModQ::mul(a, a_inv, Q), 1);
        assert!(ModQ::inv(Q, Q).is_none());
    }

    #[test]
    fn test_signed_conversions() {
        assert_eq!(ModQ::from_signed(5, Q), 5);
        assert_eq!(ModQ::from_signed(-5, Q), Q - 5);
        assert_eq!(ModQ::from_signed(0, Q), 0);
        assert_eq!(ModQ::from_signed(-(Q as i64), Q), 0);
        assert_eq!(ModQ::to_signed(5, Q), 5);
        assert_eq!(ModQ::to_signed(Q - 5, Q), -5);
    }
}
