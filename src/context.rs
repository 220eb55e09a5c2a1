//! Encryption context: scheme parameters plus key material.
//!
//! The server creates one context at startup. It holds the secret key, the
//! public key and (optionally) rotation keys, and publishes a snapshot without
//! the secret key for clients. A context rebuilt from that snapshot can
//! encrypt and evaluate but never decrypt.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

use crate::ckks::{Encoder, Evaluator, GaloisKeys, PublicKey, RingContext, SecretKey};
use crate::error::{FedAggError, Result};
use crate::math::GaussianSampler;
use crate::params::CkksParams;

/// Leading bytes of an exported public context
pub const CONTEXT_MAGIC: [u8; 4] = *b"CKPC";
/// Snapshot format version
pub const CONTEXT_VERSION: u16 = 1;

/// Distributable part of a context
#[derive(Serialize, Deserialize)]
struct PublicContextSnapshot {
    magic: [u8; 4],
    version: u16,
    params: CkksParams,
    moduli: Vec<u64>,
    public_key: PublicKey,
    galois_keys: Option<GaloisKeys>,
}

/// Homomorphic-encryption context owned by the aggregation server
pub struct EncryptionContext {
    params: CkksParams,
    ring: RingContext,
    encoder: Encoder,
    public_key: PublicKey,
    galois_keys: Option<GaloisKeys>,
    secret_key: Option<SecretKey>,
    context_id: [u8; 32],
    sampler: Mutex<GaussianSampler>,
}

impl EncryptionContext {
    /// Create a context with fresh keys drawn from OS entropy.
    pub fn create(params: CkksParams) -> Result<Self> {
        let sampler = GaussianSampler::new(params.sigma);
        Self::generate(params, sampler)
    }

    /// Create a context with keys derived from `seed`.
    ///
    /// Reproducible, so only suitable for tests and benchmarks.
    pub fn create_with_seed(params: CkksParams, seed: u64) -> Result<Self> {
        let sampler = GaussianSampler::with_seed(params.sigma, seed);
        Self::generate(params, sampler)
    }

    fn generate(params: CkksParams, mut sampler: GaussianSampler) -> Result<Self> {
        let start = Instant::now();
        let ring = RingContext::new(&params)?;

        let secret_key = SecretKey::generate(&ring, &mut sampler);
        let public_key = PublicKey::generate(&ring, &secret_key, &mut sampler);
        let galois_keys = params
            .galois_keys
            .then(|| GaloisKeys::generate(&ring, &secret_key, &mut sampler));

        let context_id = compute_context_id(&params, ring.all_moduli(), &public_key)?;
        info!(
            n = params.poly_modulus_degree,
            chain = ?params.coeff_mod_bit_sizes,
            galois_keys = galois_keys.as_ref().map_or(0, GaloisKeys::len),
            id = %hex::encode(&context_id[..8]),
            "Created encryption context in {:.2?}",
            start.elapsed()
        );

        Ok(Self {
            encoder: Encoder::new(params.poly_modulus_degree),
            params,
            ring,
            public_key,
            galois_keys,
            secret_key: Some(secret_key),
            context_id,
            sampler: Mutex::new(sampler),
        })
    }

    /// Serialize parameters, public key and Galois keys. The secret key is
    /// never part of the output.
    pub fn export_public(&self) -> Result<Vec<u8>> {
        let snapshot = PublicContextSnapshot {
            magic: CONTEXT_MAGIC,
            version: CONTEXT_VERSION,
            params: self.params.clone(),
            moduli: self.ring.all_moduli().to_vec(),
            public_key: self.public_key.clone(),
            galois_keys: self.galois_keys.clone(),
        };
        let bytes = bincode::serialize(&snapshot)?;
        debug!(bytes = bytes.len(), "Exported public context");
        Ok(bytes)
    }

    /// Rebuild a public-only context from `export_public` output.
    pub fn from_public_bytes(bytes: &[u8]) -> Result<Self> {
        let snapshot: PublicContextSnapshot = bincode::deserialize(bytes)
            .map_err(|e| FedAggError::Deserialization(format!("public context: {}", e)))?;

        if snapshot.magic != CONTEXT_MAGIC {
            return Err(FedAggError::Deserialization("not a public context".into()));
        }
        if snapshot.version != CONTEXT_VERSION {
            return Err(FedAggError::Deserialization(format!(
                "unsupported public context version {}",
                snapshot.version
            )));
        }

        let params = snapshot.params;
        let ring = RingContext::new(&params)?;
        if snapshot.moduli != ring.all_moduli() {
            return Err(FedAggError::Deserialization(
                "modulus chain does not match parameters".into(),
            ));
        }
        if !snapshot.public_key.is_well_formed(&ring) {
            return Err(FedAggError::Deserialization("malformed public key".into()));
        }
        if let Some(keys) = &snapshot.galois_keys {
            let valid = keys.keys.iter().all(|(&g, key)| {
                crate::ckks::galois::is_valid_galois_element(g, ring.dimension())
                    && key.is_well_formed(&ring)
            });
            if !valid {
                return Err(FedAggError::Deserialization("malformed Galois keys".into()));
            }
        }

        let context_id = compute_context_id(&params, ring.all_moduli(), &snapshot.public_key)?;
        Ok(Self {
            encoder: Encoder::new(params.poly_modulus_degree),
            sampler: Mutex::new(GaussianSampler::new(params.sigma)),
            params,
            ring,
            public_key: snapshot.public_key,
            galois_keys: snapshot.galois_keys,
            secret_key: None,
            context_id,
        })
    }

    /// Write the public snapshot to `path`.
    pub fn save_public(&self, path: impl AsRef<Path>) -> Result<usize> {
        let bytes = self.export_public()?;
        fs::write(path.as_ref(), &bytes)?;
        info!(
            "Public context saved to {} ({:.2} MB)",
            path.as_ref().display(),
            bytes.len() as f64 / (1024.0 * 1024.0)
        );
        Ok(bytes.len())
    }

    /// Load a public-only context from `path`.
    pub fn load_public(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        Self::from_public_bytes(&bytes)
    }

    pub fn params(&self) -> &CkksParams {
        &self.params
    }

    pub fn ring(&self) -> &RingContext {
        &self.ring
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn galois_keys(&self) -> Option<&GaloisKeys> {
        self.galois_keys.as_ref()
    }

    pub fn has_secret_key(&self) -> bool {
        self.secret_key.is_some()
    }

    pub(crate) fn secret_key(&self) -> Option<&SecretKey> {
        self.secret_key.as_ref()
    }

    /// SHA-256 over parameters, modulus chain and public key
    pub fn context_id(&self) -> &[u8; 32] {
        &self.context_id
    }

    pub fn slot_count(&self) -> usize {
        self.ring.slots()
    }

    pub fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(&self.ring, self.galois_keys.as_ref())
    }

    /// Absolute per-slot error bound for a fresh encrypt/decrypt round trip.
    pub fn decryption_tolerance(&self) -> f64 {
        64.0 * self.params.sigma * self.params.poly_modulus_degree as f64
            / self.params.global_scale
    }

    /// Run `f` with the context's encryption randomness.
    pub(crate) fn with_sampler<T>(&self, f: impl FnOnce(&mut GaussianSampler) -> T) -> T {
        let mut guard = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("params", &self.params)
            .field("context_id", &hex::encode(self.context_id))
            .field("has_secret_key", &self.has_secret_key())
            .finish()
    }
}

fn compute_context_id(params: &CkksParams, moduli: &[u64], pk: &PublicKey) -> Result<[u8; 32]> {
    let mut hasher = Sha256::new();
    hasher.update(b"ckks-fedagg/context/v1");
    hasher.update(bincode::serialize(params)?);
    hasher.update(bincode::serialize(moduli)?);
    hasher.update(bincode::serialize(pk)?);
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_params() -> CkksParams {
        CkksParams {
            poly_modulus_degree: 4096,
            coeff_mod_bit_sizes: vec![40, 28, 40],
            global_scale: 2f64.powi(28),
            ..CkksParams::secure_128_n8192()
        }
    }

    #[test]
    fn test_create_rejects_invalid_params() {
        let mut params = small_params();
        params.coeff_mod_bit_sizes = vec![60, 60, 60];
        assert!(matches!(
            EncryptionContext::create(params),
            Err(FedAggError::Configuration(_))
        ));
    }

    #[test]
    fn test_export_import_preserves_identity() {
        let ctx = EncryptionContext::create_with_seed(small_params(), 5).unwrap();
        let bytes = ctx.export_public().unwrap();
        let public = EncryptionContext::from_public_bytes(&bytes).unwrap();

        assert!(ctx.has_secret_key());
        assert!(!public.has_secret_key());
        assert_eq!(public.params(), ctx.params());
        assert_eq!(public.context_id(), ctx.context_id());
        assert_eq!(public.public_key(), ctx.public_key());
    }

    #[test]
    fn test_seeded_contexts_are_reproducible() {
        let a = EncryptionContext::create_with_seed(small_params(), 9).unwrap();
        let b = EncryptionContext::create_with_seed(small_params(), 9).unwrap();
        let c = EncryptionContext::create_with_seed(small_params(), 10).unwrap();
        assert_eq!(a.context_id(), b.context_id());
        assert_ne!(a.context_id(), c.context_id());
    }

    #[test]
    fn test_rejects_garbage_snapshot() {
        assert!(matches!(
            EncryptionContext::from_public_bytes(b"definitely not a context"),
            Err(FedAggError::Deserialization(_))
        ));

        let ctx = EncryptionContext::create_with_seed(small_params(), 5).unwrap();
        let mut bytes = ctx.export_public().unwrap();
        bytes[0] ^= 0xff;
        assert!(EncryptionContext::from_public_bytes(&bytes).is_err());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let ctx = EncryptionContext::create_with_seed(small_params(), 5).unwrap();
        let rendered = format!("{:?}", ctx);
        assert!(rendered.contains("has_secret_key: true"));
        assert!(!rendered.contains("SecretKey"));
    }
}
