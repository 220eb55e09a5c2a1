//! Message types exchanged with the round orchestrator.
//!
//! These mirror the generic envelopes of a federated-learning transport:
//! a `Parameters` blob list tagged with a tensor type, per-client fit and
//! evaluation results, and scalar metric maps. Update payloads are decided
//! at this boundary into an explicit [`ClientUpdate`] variant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FedAggError, Result};

/// Tensor type of envelopes whose tensors are serialized ciphertexts
pub const TENSOR_TYPE_CKKS: &str = "ckks.ciphertext.v1";
/// Tensor type of plaintext fallback envelopes (bincode `Vec<f64>` per tensor)
pub const TENSOR_TYPE_LEGACY: &str = "legacy.f64";

/// Identity the orchestrator assigns to a client
pub type ClientId = String;

/// Metric name to scalar value
pub type MetricsMap = BTreeMap<String, Scalar>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<usize> for Scalar {
    fn from(v: usize) -> Self {
        Scalar::Int(v as i64)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Str(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StatusCode {
    #[default]
    Ok,
    GetPropertiesNotImplemented,
    GetParametersNotImplemented,
    FitNotImplemented,
    EvaluateNotImplemented,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Generic parameter envelope: opaque tensors plus a type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    pub tensors: Vec<Vec<u8>>,
    pub tensor_type: String,
}

impl Parameters {
    /// Envelope of serialized ciphertexts, one per model layer
    pub fn from_ciphertexts(tensors: Vec<Vec<u8>>) -> Self {
        Self {
            tensors,
            tensor_type: TENSOR_TYPE_CKKS.to_string(),
        }
    }

    /// Plaintext fallback envelope
    pub fn from_legacy_arrays(arrays: &[Vec<f64>]) -> Result<Self> {
        let tensors = arrays
            .iter()
            .map(|a| bincode::serialize(a))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self {
            tensors,
            tensor_type: TENSOR_TYPE_LEGACY.to_string(),
        })
    }

    /// Whether the tensor type is one this core knows how to read
    pub fn is_recognized(&self) -> bool {
        self.tensor_type == TENSOR_TYPE_CKKS || self.tensor_type == TENSOR_TYPE_LEGACY
    }

    /// Decide each tensor's payload kind from the envelope tag.
    pub fn decode_updates(&self) -> Result<Vec<ClientUpdate>> {
        match self.tensor_type.as_str() {
            TENSOR_TYPE_CKKS => Ok(self
                .tensors
                .iter()
                .map(|t| ClientUpdate::Ciphertext(t.clone()))
                .collect()),
            TENSOR_TYPE_LEGACY => self
                .tensors
                .iter()
                .map(|t| {
                    bincode::deserialize::<Vec<f64>>(t)
                        .map(ClientUpdate::LegacyArray)
                        .map_err(|e| FedAggError::Deserialization(format!("legacy array: {}", e)))
                })
                .collect(),
            other => Err(FedAggError::UnrecognizedEnvelope(format!(
                "tensor type {:?}",
                other
            ))),
        }
    }
}

/// One tensor of one client's update
#[derive(Debug, Clone, PartialEq)]
pub enum ClientUpdate {
    /// Wire bytes of a ciphertext
    Ciphertext(Vec<u8>),
    /// Plain values from a client that did not encrypt
    LegacyArray(Vec<f64>),
}

/// A client's answer to a fit instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitRes {
    pub status: Status,
    pub parameters: Parameters,
    pub num_examples: u64,
    #[serde(default)]
    pub metrics: MetricsMap,
}

/// Loss and accuracy measured in one phase on one client
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub loss: f64,
    pub accuracy: f64,
    pub num_examples: u64,
}

/// A client's answer to an evaluate instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub status: Status,
    pub loss: f64,
    pub accuracy: f64,
    pub num_examples: u64,
    /// Figures on the client's training split, when reported
    #[serde(default)]
    pub train: Option<PhaseMetrics>,
    /// Figures on the client's held-out split, when reported
    #[serde(default)]
    pub test: Option<PhaseMetrics>,
}

impl EvaluationReport {
    pub fn new(loss: f64, accuracy: f64, num_examples: u64) -> Self {
        Self {
            status: Status::ok(),
            loss,
            accuracy,
            num_examples,
            train: None,
            test: None,
        }
    }

    pub fn with_phases(mut self, train: Option<PhaseMetrics>, test: Option<PhaseMetrics>) -> Self {
        self.train = train;
        self.test = test;
        self
    }
}

/// A client the orchestrator could not get a result from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFailure {
    pub client_id: ClientId,
    pub reason: String,
}

/// The new global update for a round
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationResult {
    pub parameters: Parameters,
    pub metrics: MetricsMap,
}
