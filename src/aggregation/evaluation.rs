//! Sample-weighted evaluation aggregation.

use tracing::{debug, info, warn};

use super::envelope::{ClientFailure, ClientId, EvaluationReport, MetricsMap, PhaseMetrics, Scalar};
use super::metrics::{MetricsStore, Phase};
use crate::error::Result;

/// Running sums of example-weighted loss and accuracy for one round
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedAccumulator {
    loss: f64,
    accuracy: f64,
    examples: u64,
}

impl WeightedAccumulator {
    /// Fold one report in. Returns `false`, leaving the sums unchanged, when
    /// the example count would overflow.
    #[must_use]
    pub fn add(&mut self, loss: f64, accuracy: f64, examples: u64) -> bool {
        let Some(total) = self.examples.checked_add(examples) else {
            return false;
        };
        self.loss += loss * examples as f64;
        self.accuracy += accuracy * examples as f64;
        self.examples = total;
        true
    }

    pub fn examples(&self) -> u64 {
        self.examples
    }

    /// Weighted mean `(loss, accuracy)`, or `None` when no examples were seen
    pub fn mean(&self) -> Option<(f64, f64)> {
        (self.examples > 0).then(|| {
            let n = self.examples as f64;
            (self.loss / n, self.accuracy / n)
        })
    }
}

fn is_usable(m: &PhaseMetrics) -> bool {
    m.loss.is_finite() && m.accuracy.is_finite()
}

/// Combines a round's evaluation reports into one global figure.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationAggregator;

impl EvaluationAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Weighted loss and accuracy for `round`, appended to `store`.
    ///
    /// With no examples the result is `(0.0, {accuracy: 0.0})` and the
    /// global series is left untouched. Train and test series are fed from
    /// the per-phase figures clients supply, and only when they supply some,
    /// whether or not the headline figures had examples. A report whose
    /// example count would overflow the round total is skipped.
    pub fn aggregate_evaluate(
        &self,
        round: u64,
        reports: &[(ClientId, EvaluationReport)],
        failures: &[ClientFailure],
        store: &mut MetricsStore,
    ) -> Result<(f64, MetricsMap)> {
        store.check_round(round)?;
        if !failures.is_empty() {
            debug!(round, failures = failures.len(), "Evaluation failures reported");
        }

        let mut global = WeightedAccumulator::default();
        let mut train = WeightedAccumulator::default();
        let mut test = WeightedAccumulator::default();

        for (id, report) in reports {
            if !report.status.is_ok() {
                warn!(round, client = %id, status = ?report.status.code, "Skipping evaluation report");
                continue;
            }
            if !report.loss.is_finite() || !report.accuracy.is_finite() {
                warn!(round, client = %id, loss = report.loss, accuracy = report.accuracy, "Skipping non-finite evaluation report");
                continue;
            }
            if !global.add(report.loss, report.accuracy, report.num_examples) {
                warn!(round, client = %id, examples = report.num_examples, "Skipping evaluation report with overflowing example count");
                continue;
            }
            for (name, phase, acc) in [
                ("train", &report.train, &mut train),
                ("test", &report.test, &mut test),
            ] {
                if let Some(m) = phase.as_ref().filter(|m| is_usable(m)) {
                    if !acc.add(m.loss, m.accuracy, m.num_examples) {
                        warn!(round, client = %id, phase = name, examples = m.num_examples, "Skipping phase figures with overflowing example count");
                    }
                }
            }
        }

        let mut metrics = MetricsMap::new();
        let headline = global.mean();
        if let Some((loss, accuracy)) = headline {
            store.append(Phase::Global, round, loss, accuracy)?;
        }
        metrics.insert("accuracy".into(), Scalar::from(headline.map_or(0.0, |(_, a)| a)));

        for (phase, acc, prefix) in [(Phase::Train, &train, "train"), (Phase::Test, &test, "test")] {
            if let Some((l, a)) = acc.mean() {
                store.append(phase, round, l, a)?;
                metrics.insert(format!("{}_loss", prefix), Scalar::from(l));
                metrics.insert(format!("{}_accuracy", prefix), Scalar::from(a));
            }
        }

        let Some((loss, accuracy)) = headline else {
            info!(round, "No evaluation examples this round");
            return Ok((0.0, metrics));
        };

        info!(
            round,
            loss,
            accuracy,
            examples = global.examples(),
            "Aggregated evaluation"
        );
        Ok((loss, metrics))
    }
}
