//! Aggregator configuration, loaded from JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{FedAggError, Result};
use crate::params::CkksParams;

/// Default file the public context is published to
pub const DEFAULT_PUBLIC_CONTEXT_PATH: &str = "ckks_context.bin";

/// How a round's ciphertexts are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    /// Decrypt every update, average in plaintext, re-encrypt the mean.
    /// The server sees individual updates.
    #[default]
    DecryptThenAverage,
    /// Sum ciphertexts and scale by 1/n without decrypting anything.
    /// Consumes one prime of the chain.
    Homomorphic,
}

/// Treatment of clients that send plaintext arrays instead of ciphertexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyPolicy {
    #[default]
    Skip,
    Accept,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    pub mode: AggregationMode,
    pub legacy_policy: LegacyPolicy,
    /// Decode client updates on the rayon pool
    pub parallel: bool,
}

impl Default for AggregationSettings {
    fn default() -> Self {
        Self {
            mode: AggregationMode::default(),
            legacy_policy: LegacyPolicy::default(),
            parallel: true,
        }
    }
}

/// Server-side configuration of the secure aggregation strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub encryption: CkksParams,
    pub aggregation: AggregationSettings,
    /// Where the public context snapshot is written before round 1
    pub public_context_path: PathBuf,
    /// Fixed key-generation seed. Never set this in a deployment.
    pub seed: Option<u64>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            encryption: CkksParams::default(),
            aggregation: AggregationSettings::default(),
            public_context_path: PathBuf::from(DEFAULT_PUBLIC_CONTEXT_PATH),
            seed: None,
        }
    }
}

impl AggregatorConfig {
    /// Read a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            FedAggError::Configuration(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.encryption.validate()?;
        if self.aggregation.mode == AggregationMode::Homomorphic
            && self.encryption.data_modulus_count() < 2
        {
            return Err(FedAggError::Configuration(
                "homomorphic averaging needs at least two data primes".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AggregatorConfig::default();
        assert_eq!(config.aggregation.mode, AggregationMode::DecryptThenAverage);
        assert_eq!(config.aggregation.legacy_policy, LegacyPolicy::Skip);
        assert!(config.aggregation.parallel);
        assert_eq!(config.public_context_path, PathBuf::from("ckks_context.bin"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "aggregation": { "mode": "homomorphic" }, "seed": 7 }"#;
        let config: AggregatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.aggregation.mode, AggregationMode::Homomorphic);
        assert!(config.aggregation.parallel);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.encryption, CkksParams::default());
    }

    #[test]
    fn test_from_json_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "encryption": {{ "poly_modulus_degree": 3000, "coeff_mod_bit_sizes": [60, 40, 60],
                 "global_scale": 1099511627776.0, "sigma": 3.2, "security_level": "Bits128",
                 "galois_keys": false }} }}"#
        )
        .unwrap();
        assert!(matches!(
            AggregatorConfig::from_json_file(file.path()),
            Err(FedAggError::Configuration(_))
        ));
    }

    #[test]
    fn test_homomorphic_needs_two_data_primes() {
        let mut config = AggregatorConfig::default();
        config.aggregation.mode = AggregationMode::Homomorphic;
        config.encryption.coeff_mod_bit_sizes = vec![60, 60];
        assert!(config.validate().is_err());
    }
}
