//! ckks-fedagg: CKKS secure aggregation for federated learning rounds
//!
//! The server owns an [`EncryptionContext`] and publishes its public half to
//! clients. Each round, clients send model updates as CKKS ciphertexts; the
//! [`SecureAggregator`] turns them into one encrypted global update and the
//! [`EvaluationAggregator`] folds evaluation reports into a sample-weighted
//! loss and accuracy kept in a caller-owned [`MetricsStore`].
//!
//! Key components:
//! - `math`: RNS polynomial arithmetic over NTT-friendly primes
//! - `ckks`: encoder, keys, key switching and the linear evaluator
//! - `codec`: vector encryption and the ciphertext wire format
//! - `aggregation`: round envelopes, aggregators and the strategy facade

pub mod aggregation;
pub mod ckks;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod math;
pub mod params;

pub use aggregation::{
    AggregationResult, ClientFailure, ClientUpdate, EvaluationAggregator, EvaluationReport,
    FitRes, MetricsMap, MetricsStore, Parameters, SecureAggregator, SecureFedAvg,
};
pub use ckks::Ciphertext;
pub use config::{AggregationMode, AggregationSettings, AggregatorConfig, LegacyPolicy};
pub use context::EncryptionContext;
pub use error::{FedAggError, Result};
pub use params::{CkksParams, SecurityLevel};
