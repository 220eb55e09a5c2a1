//! Homomorphic operations on ciphertexts.
//!
//! The aggregator only needs linear operations: addition, multiplication by a
//! real constant followed by rescaling, and slot rotation.

use super::ciphertext::{Ciphertext, CiphertextBlock};
use super::galois::rotation_plan;
use super::keys::GaloisKeys;
use super::keyswitch::switch_key;
use super::ring::RingContext;
use super::SCALE_TOLERANCE;
use crate::error::{FedAggError, Result};

pub struct Evaluator<'a> {
    ring: &'a RingContext,
    galois_keys: Option<&'a GaloisKeys>,
}

impl<'a> Evaluator<'a> {
    pub fn new(ring: &'a RingContext, galois_keys: Option<&'a GaloisKeys>) -> Self {
        Self { ring, galois_keys }
    }

    /// Slot-wise sum of two ciphertexts.
    pub fn add(&self, a: &Ciphertext, b: &Ciphertext) -> Result<Ciphertext> {
        let mut out = a.clone();
        self.add_inplace(&mut out, b)?;
        Ok(out)
    }

    pub fn add_inplace(&self, acc: &mut Ciphertext, other: &Ciphertext) -> Result<()> {
        check_compatible(acc, other)?;
        for (x, y) in acc.blocks.iter_mut().zip(&other.blocks) {
            x.c0 += &y.c0;
            x.c1 += &y.c1;
        }
        Ok(())
    }

    /// Sum of a non-empty set of ciphertexts.
    pub fn sum(&self, cts: &[Ciphertext]) -> Result<Ciphertext> {
        let (first, rest) = cts
            .split_first()
            .ok_or_else(|| FedAggError::Incompatible("nothing to sum".into()))?;
        let mut acc = first.clone();
        for ct in rest {
            self.add_inplace(&mut acc, ct)?;
        }
        Ok(acc)
    }

    /// Divide by the last prime q_l of the chain; the scale shrinks by q_l.
    pub fn rescale(&self, ct: &Ciphertext) -> Result<Ciphertext> {
        let q_last = self.last_prime(ct)?;
        let mut out = ct.clone();
        for block in &mut out.blocks {
            block.c0.divide_round_by_last();
            block.c1.divide_round_by_last();
        }
        out.scale = ct.scale / q_last as f64;
        Ok(out)
    }

    /// Multiply every slot by a real constant in (0, 1].
    ///
    /// The constant is lifted to the integer `k = round(c·q_l)` and the
    /// product rescaled by q_l, so the result keeps a scale close to the
    /// input's and one prime is consumed.
    pub fn multiply_const_and_rescale(&self, ct: &Ciphertext, c: f64) -> Result<Ciphertext> {
        if !c.is_finite() || c <= 0.0 {
            return Err(FedAggError::Encoding(format!(
                "constant {} must be finite and positive",
                c
            )));
        }
        let q_last = self.last_prime(ct)?;
        let k = (c * q_last as f64).round();
        if k < 1.0 || k > q_last as f64 {
            return Err(FedAggError::Encoding(format!(
                "constant {} has no integer lift under a {}-bit prime",
                c,
                64 - q_last.leading_zeros()
            )));
        }

        let mut out = ct.clone();
        for block in &mut out.blocks {
            block.c0.mul_scalar(k as u64);
            block.c1.mul_scalar(k as u64);
            block.c0.divide_round_by_last();
            block.c1.divide_round_by_last();
        }
        out.scale = ct.scale * k / (q_last as f64 * c);
        tracing::debug!(constant = c, k, new_scale = out.scale, "multiplied and rescaled");
        Ok(out)
    }

    /// Rotate every block left by `steps` slots.
    pub fn rotate(&self, ct: &Ciphertext, steps: usize) -> Result<Ciphertext> {
        let plan = rotation_plan(steps, self.ring.dimension());
        if plan.is_empty() {
            return Ok(ct.clone());
        }
        let keys = self
            .galois_keys
            .ok_or(FedAggError::MissingGaloisKey(plan[0]))?;

        let mut out = ct.clone();
        for g in plan {
            let key = keys.get(g).ok_or(FedAggError::MissingGaloisKey(g))?;
            out.blocks = out
                .blocks
                .iter()
                .map(|block| {
                    let mut c0 = block.c0.automorphism(g);
                    let c1 = block.c1.automorphism(g);
                    let (u0, u1) = switch_key(self.ring, &c1, key);
                    c0 += &u0;
                    CiphertextBlock { c0, c1: u1 }
                })
                .collect();
        }
        Ok(out)
    }

    fn last_prime(&self, ct: &Ciphertext) -> Result<u64> {
        let moduli = ct.moduli();
        if moduli.len() < 2 {
            return Err(FedAggError::Incompatible(
                "ciphertext has no prime left to rescale by".into(),
            ));
        }
        Ok(moduli[moduli.len() - 1])
    }
}

fn check_compatible(a: &Ciphertext, b: &Ciphertext) -> Result<()> {
    if a.context_id != b.context_id {
        return Err(FedAggError::Incompatible("ciphertexts from different contexts".into()));
    }
    if a.len != b.len || a.blocks.len() != b.blocks.len() {
        return Err(FedAggError::Incompatible(format!(
            "vector lengths differ: {} vs {}",
            a.len, b.len
        )));
    }
    if a.moduli() != b.moduli() {
        return Err(FedAggError::Incompatible(format!(
            "levels differ: {} vs {} primes",
            a.level_count(),
            b.level_count()
        )));
    }
    if ((a.scale - b.scale) / a.scale).abs() > SCALE_TOLERANCE {
        return Err(FedAggError::Incompatible(format!(
            "scales differ: {} vs {}",
            a.scale, b.scale
        )));
    }
    Ok(())
}
