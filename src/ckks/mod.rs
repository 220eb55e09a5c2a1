//! CKKS approximate homomorphic encryption over an RNS modulus chain.
//!
//! Only the linear part of the scheme is provided: encryption under a public
//! key, decryption, addition, multiplication by constants with rescaling, and
//! rotations through Galois keys. There is no ciphertext-ciphertext
//! multiplication and therefore no relinearization key.

pub mod ciphertext;
pub mod encoder;
pub mod encryptor;
pub mod evaluator;
pub mod galois;
pub mod keys;
pub mod keyswitch;
pub mod ring;

/// Relative difference tolerated between the scales of two compatible ciphertexts
pub(crate) const SCALE_TOLERANCE: f64 = 1e-6;

pub use ciphertext::{Ciphertext, CiphertextBlock};
pub use encoder::Encoder;
pub use evaluator::Evaluator;
pub use keys::{GaloisKeys, KeySwitchKey, PublicKey, SecretKey};
pub use ring::RingContext;
