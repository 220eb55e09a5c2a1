//! RLWE ciphertexts carrying a packed real vector.

use serde::{Deserialize, Serialize};

use crate::math::RnsPoly;

/// One RLWE pair `(c0, c1)` in coefficient domain, decrypting to
/// `c0 + c1·s ≈ Δ·m`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CiphertextBlock {
    pub(crate) c0: RnsPoly,
    pub(crate) c1: RnsPoly,
}

impl CiphertextBlock {
    pub fn moduli(&self) -> &[u64] {
        self.c0.moduli()
    }
}

/// Encrypted vector of `len` reals, split into blocks of N/2 slots.
///
/// The context identifier binds the ciphertext to the public key it was
/// produced under.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ciphertext {
    pub(crate) blocks: Vec<CiphertextBlock>,
    pub(crate) len: usize,
    pub(crate) scale: f64,
    pub(crate) context_id: [u8; 32],
}

impl Ciphertext {
    /// Logical length of the encrypted vector
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn blocks(&self) -> &[CiphertextBlock] {
        &self.blocks
    }

    /// Moduli the ciphertext currently lives in
    pub fn moduli(&self) -> &[u64] {
        self.blocks.first().map_or(&[][..], CiphertextBlock::moduli)
    }

    /// Number of primes left in the chain
    pub fn level_count(&self) -> usize {
        self.moduli().len()
    }

    pub fn context_id(&self) -> &[u8; 32] {
        &self.context_id
    }
}
