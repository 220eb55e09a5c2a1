//! Federated-averaging strategy the round orchestrator drives.

use tracing::info;

use super::envelope::{ClientFailure, ClientId, EvaluationReport, FitRes, MetricsMap, Parameters};
use super::evaluation::EvaluationAggregator;
use super::metrics::MetricsStore;
use super::secure::SecureAggregator;
use crate::config::AggregatorConfig;
use crate::context::EncryptionContext;
use crate::error::Result;

/// Owns the server context and answers fit and evaluate rounds.
pub struct SecureFedAvg {
    config: AggregatorConfig,
    ctx: EncryptionContext,
    evaluation: EvaluationAggregator,
}

impl SecureFedAvg {
    /// Create the encryption context and publish its public snapshot to
    /// `config.public_context_path`.
    pub fn from_config(config: AggregatorConfig) -> Result<Self> {
        config.validate()?;
        let ctx = match config.seed {
            Some(seed) => EncryptionContext::create_with_seed(config.encryption.clone(), seed)?,
            None => EncryptionContext::create(config.encryption.clone())?,
        };
        ctx.save_public(&config.public_context_path)?;
        Self::with_context(config, ctx)
    }

    /// Use an existing context without publishing anything.
    pub fn with_context(config: AggregatorConfig, ctx: EncryptionContext) -> Result<Self> {
        SecureAggregator::check(&ctx, &config.aggregation)?;
        info!(mode = ?config.aggregation.mode, "Secure FedAvg strategy ready");
        Ok(Self {
            config,
            ctx,
            evaluation: EvaluationAggregator::new(),
        })
    }

    pub fn context(&self) -> &EncryptionContext {
        &self.ctx
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn aggregate_fit(
        &self,
        round: u64,
        results: &[(ClientId, FitRes)],
        failures: &[ClientFailure],
    ) -> (Option<Parameters>, MetricsMap) {
        SecureAggregator::prechecked(&self.ctx, self.config.aggregation)
            .aggregate_fit(round, results, failures)
    }

    pub fn aggregate_evaluate(
        &self,
        round: u64,
        reports: &[(ClientId, EvaluationReport)],
        failures: &[ClientFailure],
        store: &mut MetricsStore,
    ) -> Result<(f64, MetricsMap)> {
        self.evaluation
            .aggregate_evaluate(round, reports, failures, store)
    }
}
