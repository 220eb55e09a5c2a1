//! Round-level aggregation: client envelopes, secure model averaging,
//! weighted evaluation and the metrics store.

pub mod envelope;
pub mod evaluation;
pub mod metrics;
pub mod secure;
pub mod strategy;

pub use envelope::{
    AggregationResult, ClientFailure, ClientId, ClientUpdate, EvaluationReport, FitRes,
    MetricsMap, Parameters, PhaseMetrics, Scalar, Status, StatusCode, TENSOR_TYPE_CKKS,
    TENSOR_TYPE_LEGACY,
};
pub use evaluation::{EvaluationAggregator, WeightedAccumulator};
pub use metrics::{MetricsStore, Phase, RoundRecord, RoundSeries};
pub use secure::SecureAggregator;
pub use strategy::SecureFedAvg;
