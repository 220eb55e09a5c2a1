//! Arithmetic primitives for the CKKS scheme.
//!
//! - **Modular arithmetic** over word-sized primes
//! - **Prime search** for an NTT-friendly RNS chain
//! - **Number-Theoretic Transform (NTT)** for fast negacyclic multiplication
//! - **RNS polynomials** over R_Q = Z_Q[X]/(X^N + 1)
//! - **Sampling** of Gaussian, ternary and uniform polynomials

pub mod gaussian;
pub mod modular;
pub mod ntt;
pub mod poly;
pub mod primes;

pub use gaussian::GaussianSampler;
pub use modular::ModQ;
pub use ntt::NttContext;
pub use poly::RnsPoly;
