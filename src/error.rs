//! Error types for the secure aggregation engine

use thiserror::Error;

/// All errors raised by context management, the codec and the aggregators
#[derive(Error, Debug)]
pub enum FedAggError {
    /// Scheme parameters rejected at context creation
    #[error("Invalid encryption parameters: {0}")]
    Configuration(String),

    /// Decryption attempted with a public-only context
    #[error("Context holds no secret key")]
    MissingSecretKey,

    /// Bytes are not a valid ciphertext or context for this server
    #[error("Deserialization failed: {0}")]
    Deserialization(String),

    /// No usable client contribution in a round
    #[error("Round {round} has no usable contributions")]
    EmptyRound {
        /// Round the orchestrator was aggregating
        round: u64,
    },

    /// The update collection is not the parameter envelope this core expects
    #[error("Unrecognized parameter envelope: {0}")]
    UnrecognizedEnvelope(String),

    /// Values cannot be encoded under the current scale and modulus chain
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Ciphertexts or keys do not belong together
    #[error("Incompatible operands: {0}")]
    Incompatible(String),

    /// Rotation requested without the matching Galois key
    #[error("No Galois key for element {0}")]
    MissingGaloisKey(usize),

    /// Metrics appended for a round that does not follow the last one
    #[error("Round {round} is not after last recorded round {last}")]
    RoundOutOfOrder {
        /// Round being appended
        round: u64,
        /// Last round already in the series
        last: u64,
    },

    /// Wire or file encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bincode::Error> for FedAggError {
    fn from(e: bincode::Error) -> Self {
        FedAggError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for FedAggError {
    fn from(e: serde_json::Error) -> Self {
        FedAggError::Serialization(e.to_string())
    }
}

/// Result type for all fallible operations in this crate
pub type Result<T> = std::result::Result<T, FedAggError>;
