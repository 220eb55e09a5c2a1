//! Ciphertext codec: flat `f64` vectors to ciphertexts and back, plus the
//! byte format ciphertexts travel in.
//!
//! Wire format (bincode): magic `CKKS`, a format version, then the ciphertext
//! with its context identifier, logical length, scale and RNS blocks. Bytes
//! read from the network are fully validated against the receiving context
//! before any arithmetic touches them.

use serde::{Deserialize, Serialize};

use crate::ckks::encryptor::{decrypt_coeffs, encrypt_coeffs};
use crate::ckks::Ciphertext;
use crate::context::EncryptionContext;
use crate::error::{FedAggError, Result};

/// Leading bytes of a serialized ciphertext
pub const CIPHERTEXT_MAGIC: [u8; 4] = *b"CKKS";
/// Ciphertext wire format version
pub const WIRE_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct WireCiphertext {
    magic: [u8; 4],
    version: u16,
    ciphertext: Ciphertext,
}

/// Number of RLWE blocks needed for a vector of `len` values
pub fn block_count(len: usize, slots: usize) -> usize {
    len.div_ceil(slots).max(1)
}

/// Largest magnitude a value may have and still encode at the context scale.
///
/// Every slot below this bound keeps its scaled coefficients under half the
/// first data prime, so any mean of such vectors encrypts again.
pub fn magnitude_bound(ctx: &EncryptionContext) -> f64 {
    ctx.ring().data_moduli()[0] as f64 / 2.0 / ctx.params().global_scale
}

/// Encrypt a vector under the context's public key.
///
/// Works with public-only contexts. Long vectors are split across blocks of
/// `slot_count()` values.
pub fn encrypt(ctx: &EncryptionContext, values: &[f64]) -> Result<Ciphertext> {
    let ring = ctx.ring();
    let slots = ctx.slot_count();
    let scale = ctx.params().global_scale;
    let bound = ring.data_moduli()[0] as f64 / 2.0;

    let blocks = (0..block_count(values.len(), slots))
        .map(|b| {
            let end = ((b + 1) * slots).min(values.len());
            let chunk = &values[(b * slots).min(end)..end];
            let coeffs = ctx.encoder().encode(chunk, scale, bound)?;
            Ok(ctx.with_sampler(|sampler| {
                encrypt_coeffs(ring, ctx.public_key(), &coeffs, sampler)
            }))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Ciphertext {
        blocks,
        len: values.len(),
        scale,
        context_id: *ctx.context_id(),
    })
}

/// Decrypt to the original vector, up to CKKS approximation error.
///
/// Fails with `MissingSecretKey` on a public-only context.
pub fn decrypt(ctx: &EncryptionContext, ct: &Ciphertext) -> Result<Vec<f64>> {
    let sk = ctx.secret_key().ok_or(FedAggError::MissingSecretKey)?;
    if ct.context_id() != ctx.context_id() {
        return Err(FedAggError::Incompatible(
            "ciphertext was produced under another context".into(),
        ));
    }

    let mut values = Vec::with_capacity(ct.blocks().len() * ctx.slot_count());
    for block in ct.blocks() {
        let coeffs = decrypt_coeffs(ctx.ring(), sk, block);
        values.extend(ctx.encoder().decode(&coeffs, ct.scale()));
    }
    values.truncate(ct.len());
    Ok(values)
}

/// Serialize a ciphertext to its wire bytes.
pub fn serialize(ct: &Ciphertext) -> Result<Vec<u8>> {
    let wire = WireCiphertext {
        magic: CIPHERTEXT_MAGIC,
        version: WIRE_VERSION,
        ciphertext: ct.clone(),
    };
    Ok(bincode::serialize(&wire)?)
}

/// Parse wire bytes into a ciphertext bound to `ctx`.
///
/// Any structural problem, or a ciphertext made under another context, is a
/// `Deserialization` error.
pub fn deserialize(ctx: &EncryptionContext, bytes: &[u8]) -> Result<Ciphertext> {
    let wire: WireCiphertext =
        bincode::deserialize(bytes).map_err(|e| deser_err(format!("malformed ciphertext: {}", e)))?;

    if wire.magic != CIPHERTEXT_MAGIC {
        return Err(deser_err("missing ciphertext magic"));
    }
    if wire.version != WIRE_VERSION {
        return Err(deser_err(format!("unsupported wire version {}", wire.version)));
    }

    let ct = wire.ciphertext;
    validate(ctx, &ct)?;
    Ok(ct)
}

fn validate(ctx: &EncryptionContext, ct: &Ciphertext) -> Result<()> {
    if ct.context_id() != ctx.context_id() {
        return Err(deser_err("ciphertext belongs to a different context"));
    }
    if !ct.scale().is_finite() || ct.scale() <= 0.0 {
        return Err(deser_err(format!("invalid scale {}", ct.scale())));
    }

    let expected_blocks = block_count(ct.len(), ctx.slot_count());
    if ct.blocks().len() != expected_blocks {
        return Err(deser_err(format!(
            "{} blocks for {} values, expected {}",
            ct.blocks().len(),
            ct.len(),
            expected_blocks
        )));
    }

    let n = ctx.ring().dimension();
    let data = ctx.ring().data_moduli();
    let moduli = ct.moduli();
    if moduli.is_empty() || moduli.len() > data.len() || moduli != &data[..moduli.len()] {
        return Err(deser_err("modulus chain is not a prefix of the context chain"));
    }

    let well_formed = ct.blocks().iter().all(|b| {
        [&b.c0, &b.c1].iter().all(|p| {
            !p.is_ntt() && p.moduli() == moduli && p.is_well_formed(n)
        })
    });
    if !well_formed {
        return Err(deser_err("ciphertext polynomials are malformed"));
    }
    Ok(())
}

fn deser_err(msg: impl Into<String>) -> FedAggError {
    FedAggError::Deserialization(msg.into())
}
