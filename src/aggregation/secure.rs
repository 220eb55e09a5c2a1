//! Secure aggregation of client model updates.
//!
//! Each client sends one ciphertext per model layer. The aggregator decodes
//! every client independently, drops the ones that fail, and averages the
//! rest either in plaintext after decryption or directly on ciphertexts,
//! depending on [`AggregationMode`]. Updates whose layer shapes differ from
//! the shape most clients sent are skipped as well.

use ndarray::Array1;
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::envelope::{
    AggregationResult, ClientFailure, ClientId, ClientUpdate, FitRes, MetricsMap, Parameters,
    Scalar,
};
use crate::ckks::{Ciphertext, SCALE_TOLERANCE};
use crate::codec;
use crate::config::{AggregationMode, AggregationSettings, LegacyPolicy};
use crate::context::EncryptionContext;
use crate::error::{FedAggError, Result};

/// One client's decoded update, one entry per layer
enum Contribution {
    Plain(Vec<Array1<f64>>),
    Encrypted(Vec<Ciphertext>),
}

/// Shape every contribution of a round must share
#[derive(Debug)]
struct Layout {
    lengths: Vec<usize>,
    levels: Option<usize>,
    scale: Option<f64>,
}

impl Contribution {
    fn layout(&self) -> Layout {
        match self {
            Contribution::Plain(arrays) => Layout {
                lengths: arrays.iter().map(Array1::len).collect(),
                levels: None,
                scale: None,
            },
            Contribution::Encrypted(cts) => Layout {
                lengths: cts.iter().map(Ciphertext::len).collect(),
                levels: cts.first().map(Ciphertext::level_count),
                scale: cts.first().map(Ciphertext::scale),
            },
        }
    }
}

impl Layout {
    fn accepts(&self, other: &Layout) -> bool {
        let scales_match = match (self.scale, other.scale) {
            (Some(a), Some(b)) => ((a - b) / a).abs() <= SCALE_TOLERANCE,
            (None, None) => true,
            _ => false,
        };
        self.lengths == other.lengths && self.levels == other.levels && scales_match
    }
}

/// Combines a round's client updates into one global update.
pub struct SecureAggregator<'a> {
    ctx: &'a EncryptionContext,
    settings: AggregationSettings,
}

impl<'a> SecureAggregator<'a> {
    /// Bind an aggregator to the server context.
    ///
    /// Decrypt-then-average needs the secret key; homomorphic averaging
    /// needs a chain with at least two data primes.
    pub fn new(ctx: &'a EncryptionContext, settings: AggregationSettings) -> Result<Self> {
        Self::check(ctx, &settings)?;
        Ok(Self { ctx, settings })
    }

    /// Aggregator for settings already accepted by [`SecureAggregator::check`]
    pub(crate) fn prechecked(ctx: &'a EncryptionContext, settings: AggregationSettings) -> Self {
        Self { ctx, settings }
    }

    pub(crate) fn check(ctx: &EncryptionContext, settings: &AggregationSettings) -> Result<()> {
        match settings.mode {
            AggregationMode::DecryptThenAverage if !ctx.has_secret_key() => {
                return Err(FedAggError::MissingSecretKey);
            }
            AggregationMode::Homomorphic if ctx.params().data_modulus_count() < 2 => {
                return Err(FedAggError::Configuration(
                    "homomorphic averaging needs at least two data primes".into(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    pub fn settings(&self) -> &AggregationSettings {
        &self.settings
    }

    /// Aggregate one round, never failing the process.
    ///
    /// Returns `None` for the update when nothing usable arrived. The metrics
    /// map always carries `clients_aggregated` and `clients_skipped`.
    pub fn aggregate_fit(
        &self,
        round: u64,
        results: &[(ClientId, FitRes)],
        failures: &[ClientFailure],
    ) -> (Option<Parameters>, MetricsMap) {
        for failure in failures {
            debug!(round, client = %failure.client_id, reason = %failure.reason, "Client failed before aggregation");
        }

        match self.try_aggregate(round, results) {
            Ok(result) => (Some(result.parameters), result.metrics),
            Err(e) => {
                warn!(round, error = %e, "No global update this round");
                (None, fit_metrics(0, results.len()))
            }
        }
    }

    /// Aggregate one round, reporting why no update could be produced.
    pub fn try_aggregate(
        &self,
        round: u64,
        results: &[(ClientId, FitRes)],
    ) -> Result<AggregationResult> {
        let start = Instant::now();
        if results.is_empty() {
            return Err(FedAggError::EmptyRound { round });
        }

        let candidates: Vec<&(ClientId, FitRes)> = results
            .iter()
            .filter(|(id, fit)| {
                if !fit.status.is_ok() {
                    warn!(round, client = %id, status = ?fit.status.code, "Skipping client with failed status");
                }
                fit.status.is_ok()
            })
            .collect();

        if !candidates.is_empty() && candidates.iter().all(|(_, fit)| !fit.parameters.is_recognized())
        {
            return Err(FedAggError::UnrecognizedEnvelope(format!(
                "round {}: no client sent a known tensor type",
                round
            )));
        }

        let decoded: Vec<(&ClientId, Result<Contribution>)> = if self.settings.parallel {
            candidates
                .par_iter()
                .map(|(id, fit)| (id, self.decode_client(&fit.parameters)))
                .collect()
        } else {
            candidates
                .iter()
                .map(|(id, fit)| (id, self.decode_client(&fit.parameters)))
                .collect()
        };

        let mut contributions = Vec::with_capacity(decoded.len());
        for (id, outcome) in decoded {
            match outcome {
                Ok(c) => contributions.push((id, c)),
                Err(e) => warn!(round, client = %id, error = %e, "Skipping client update"),
            }
        }

        let layouts: Vec<Layout> = contributions.iter().map(|(_, c)| c.layout()).collect();
        let Some(expected) = majority_layout(&layouts) else {
            return Err(FedAggError::EmptyRound { round });
        };

        let mut accepted = Vec::with_capacity(contributions.len());
        for ((id, contribution), this) in contributions.into_iter().zip(&layouts) {
            if !expected.accepts(this) {
                warn!(round, client = %id, expected = ?expected.lengths, got = ?this.lengths, "Skipping client update with mismatched layout");
                continue;
            }
            debug!(round, client = %id, "Accepted client update");
            accepted.push(contribution);
        }

        if accepted.is_empty() {
            return Err(FedAggError::EmptyRound { round });
        }

        let tensors = match self.settings.mode {
            AggregationMode::DecryptThenAverage => self.average_plain(&accepted)?,
            AggregationMode::Homomorphic => self.average_encrypted(&accepted)?,
        };

        let aggregated = accepted.len();
        info!(
            round,
            clients = aggregated,
            skipped = results.len() - aggregated,
            layers = tensors.len(),
            mode = ?self.settings.mode,
            "Aggregated round in {:.2?}",
            start.elapsed()
        );

        Ok(AggregationResult {
            parameters: Parameters::from_ciphertexts(tensors),
            metrics: fit_metrics(aggregated, results.len() - aggregated),
        })
    }

    fn decode_client(&self, parameters: &Parameters) -> Result<Contribution> {
        let updates = parameters.decode_updates()?;
        match self.settings.mode {
            AggregationMode::DecryptThenAverage => updates
                .into_iter()
                .map(|u| self.decode_plain(u))
                .collect::<Result<Vec<_>>>()
                .map(Contribution::Plain),
            AggregationMode::Homomorphic => updates
                .into_iter()
                .map(|u| self.decode_encrypted(u))
                .collect::<Result<Vec<_>>>()
                .map(Contribution::Encrypted),
        }
    }

    fn decode_plain(&self, update: ClientUpdate) -> Result<Array1<f64>> {
        match update {
            ClientUpdate::Ciphertext(bytes) => {
                let ct = codec::deserialize(self.ctx, &bytes)?;
                let values = codec::decrypt(self.ctx, &ct)?;
                self.check_range(&values)?;
                Ok(Array1::from(values))
            }
            ClientUpdate::LegacyArray(values) => {
                self.check_legacy(&values)?;
                self.check_range(&values)?;
                Ok(Array1::from(values))
            }
        }
    }

    fn decode_encrypted(&self, update: ClientUpdate) -> Result<Ciphertext> {
        match update {
            ClientUpdate::Ciphertext(bytes) => {
                let ct = codec::deserialize(self.ctx, &bytes)?;
                let full = self.ctx.ring().data_moduli().len();
                if ct.level_count() != full {
                    return Err(FedAggError::Incompatible(format!(
                        "update is at level {} of {}, fresh ciphertexts are required",
                        ct.level_count(),
                        full
                    )));
                }
                Ok(ct)
            }
            ClientUpdate::LegacyArray(values) => {
                self.check_legacy(&values)?;
                codec::encrypt(self.ctx, &values)
            }
        }
    }

    fn check_legacy(&self, values: &[f64]) -> Result<()> {
        if self.settings.legacy_policy == LegacyPolicy::Skip {
            return Err(FedAggError::UnrecognizedEnvelope(
                "plaintext updates are not accepted".into(),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FedAggError::Encoding("plaintext update has non-finite values".into()));
        }
        Ok(())
    }

    /// Decrypted values must be finite and small enough to encrypt again.
    fn check_range(&self, values: &[f64]) -> Result<()> {
        let bound = codec::magnitude_bound(self.ctx);
        match values.iter().find(|v| !v.is_finite() || v.abs() >= bound) {
            Some(v) => Err(FedAggError::Encoding(format!(
                "update value {:e} is outside the encodable range (|v| < {:e})",
                v, bound
            ))),
            None => Ok(()),
        }
    }

    /// Unweighted elementwise mean per layer, re-encrypted.
    fn average_plain(&self, accepted: &[Contribution]) -> Result<Vec<Vec<u8>>> {
        let plains: Vec<&Vec<Array1<f64>>> = accepted
            .iter()
            .filter_map(|c| match c {
                Contribution::Plain(p) => Some(p),
                Contribution::Encrypted(_) => None,
            })
            .collect();
        let n = plains.len() as f64;
        let layer_count = plains.first().map_or(0, |p| p.len());

        (0..layer_count)
            .map(|layer| {
                let len = plains[0][layer].len();
                let sum = plains
                    .iter()
                    .fold(Array1::<f64>::zeros(len), |acc, p| acc + &p[layer]);
                let mean = sum / n;
                let ct = codec::encrypt(self.ctx, &mean.to_vec())?;
                codec::serialize(&ct)
            })
            .collect()
    }

    /// Homomorphic sum per layer, multiplied by 1/n and rescaled.
    fn average_encrypted(&self, accepted: &[Contribution]) -> Result<Vec<Vec<u8>>> {
        let cts: Vec<&Vec<Ciphertext>> = accepted
            .iter()
            .filter_map(|c| match c {
                Contribution::Encrypted(e) => Some(e),
                Contribution::Plain(_) => None,
            })
            .collect();
        let evaluator = self.ctx.evaluator();
        let inv_n = 1.0 / cts.len() as f64;
        let layer_count = cts.first().map_or(0, |c| c.len());

        (0..layer_count)
            .map(|layer| {
                let mut acc = cts[0][layer].clone();
                for client in &cts[1..] {
                    evaluator.add_inplace(&mut acc, &client[layer])?;
                }
                let mean = evaluator.multiply_const_and_rescale(&acc, inv_n)?;
                codec::serialize(&mean)
            })
            .collect()
    }
}

/// Layout shared by the most contributions, the earliest one on ties
fn majority_layout(layouts: &[Layout]) -> Option<&Layout> {
    let mut best: Option<(&Layout, usize)> = None;
    for candidate in layouts {
        let votes = layouts.iter().filter(|l| candidate.accepts(l)).count();
        if best.map_or(true, |(_, most)| votes > most) {
            best = Some((candidate, votes));
        }
    }
    best.map(|(layout, _)| layout)
}

fn fit_metrics(aggregated: usize, skipped: usize) -> MetricsMap {
    let mut metrics = MetricsMap::new();
    metrics.insert("clients_aggregated".into(), Scalar::from(aggregated));
    metrics.insert("clients_skipped".into(), Scalar::from(skipped));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::envelope::{Status, StatusCode};
    use crate::params::CkksParams;

    fn context() -> EncryptionContext {
        let params = CkksParams {
            poly_modulus_degree: 4096,
            coeff_mod_bit_sizes: vec![40, 28, 40],
            global_scale: 2f64.powi(28),
            ..CkksParams::secure_128_n8192()
        };
        EncryptionContext::create_with_seed(params, 31).unwrap()
    }

    fn fit(ctx: &EncryptionContext, layers: &[&[f64]]) -> FitRes {
        let tensors = layers
            .iter()
            .map(|v| codec::serialize(&codec::encrypt(ctx, v).unwrap()).unwrap())
            .collect();
        FitRes {
            status: Status::ok(),
            parameters: Parameters::from_ciphertexts(tensors),
            num_examples: 10,
            metrics: MetricsMap::new(),
        }
    }

    fn mean_of(ctx: &EncryptionContext, params: &Parameters) -> Vec<Vec<f64>> {
        params
            .tensors
            .iter()
            .map(|t| codec::decrypt(ctx, &codec::deserialize(ctx, t).unwrap()).unwrap())
            .collect()
    }

    #[test]
    fn test_per_layer_mean() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[1.0, 2.0], &[10.0]])),
            ("b".to_string(), fit(&ctx, &[&[3.0, 4.0], &[20.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert_eq!(layers.len(), 2);
        assert!((layers[0][0] - 2.0).abs() < 1e-3);
        assert!((layers[0][1] - 3.0).abs() < 1e-3);
        assert!((layers[1][0] - 15.0).abs() < 1e-3);
        assert_eq!(result.metrics["clients_aggregated"], Scalar::Int(2));
    }

    #[test]
    fn test_minority_layout_is_skipped() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[1.0, 1.0]])),
            ("b".to_string(), fit(&ctx, &[&[9.0, 9.0, 9.0]])),
            ("c".to_string(), fit(&ctx, &[&[3.0, 3.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert_eq!(layers[0].len(), 2);
        assert!((layers[0][0] - 2.0).abs() < 1e-3);
        assert_eq!(result.metrics["clients_skipped"], Scalar::Int(1));
    }

    fn raw(bytes: Vec<u8>) -> FitRes {
        FitRes {
            status: Status::ok(),
            parameters: Parameters::from_ciphertexts(vec![bytes]),
            num_examples: 10,
            metrics: MetricsMap::new(),
        }
    }

    #[test]
    fn test_odd_first_client_does_not_fix_layout() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let results = vec![
            ("odd".to_string(), fit(&ctx, &[&[100.0]])),
            ("a".to_string(), fit(&ctx, &[&[1.0, 1.0]])),
            ("b".to_string(), fit(&ctx, &[&[3.0, 3.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert_eq!(layers[0].len(), 2);
        assert!((layers[0][0] - 2.0).abs() < 1e-3, "{}", layers[0][0]);
        assert!((layers[0][1] - 2.0).abs() < 1e-3, "{}", layers[0][1]);
        assert_eq!(result.metrics["clients_aggregated"], Scalar::Int(2));
        assert_eq!(result.metrics["clients_skipped"], Scalar::Int(1));
    }

    #[test]
    fn test_layout_tie_goes_to_earliest() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[4.0]])),
            ("b".to_string(), fit(&ctx, &[&[1.0, 1.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert_eq!(layers[0].len(), 1);
        assert!((layers[0][0] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_out_of_range_decryption_is_skipped() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let mut tampered = codec::encrypt(&ctx, &[5.0, 5.0]).unwrap();
        tampered.scale = 1.0;
        let results = vec![
            ("bad".to_string(), raw(codec::serialize(&tampered).unwrap())),
            ("a".to_string(), fit(&ctx, &[&[1.0, 1.0]])),
            ("b".to_string(), fit(&ctx, &[&[3.0, 3.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert!((layers[0][0] - 2.0).abs() < 1e-3, "{}", layers[0][0]);
        assert!((layers[0][1] - 2.0).abs() < 1e-3, "{}", layers[0][1]);
        assert_eq!(result.metrics["clients_skipped"], Scalar::Int(1));
    }

    #[test]
    fn test_oversized_legacy_value_is_skipped() {
        let ctx = context();
        let agg = SecureAggregator::new(
            &ctx,
            AggregationSettings {
                legacy_policy: LegacyPolicy::Accept,
                ..AggregationSettings::default()
            },
        )
        .unwrap();
        let huge = codec::magnitude_bound(&ctx) * 4.0;
        let legacy = FitRes {
            parameters: Parameters::from_legacy_arrays(&[vec![huge]]).unwrap(),
            ..fit(&ctx, &[])
        };
        let results = vec![
            ("legacy".to_string(), legacy),
            ("a".to_string(), fit(&ctx, &[&[7.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        assert!((mean_of(&ctx, &result.parameters)[0][0] - 7.0).abs() < 1e-3);
        assert_eq!(result.metrics["clients_skipped"], Scalar::Int(1));
    }

    #[test]
    fn test_failed_status_is_skipped() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let mut failed = fit(&ctx, &[&[100.0]]);
        failed.status = Status {
            code: StatusCode::FitNotImplemented,
            message: "no trainer".into(),
        };
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[4.0]])),
            ("b".to_string(), failed),
        ];

        let result = agg.try_aggregate(2, &results).unwrap();
        let layers = mean_of(&ctx, &result.parameters);
        assert!((layers[0][0] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_legacy_policy() {
        let ctx = context();
        let legacy = FitRes {
            parameters: Parameters::from_legacy_arrays(&[vec![5.0]]).unwrap(),
            ..fit(&ctx, &[])
        };
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[1.0]])),
            ("b".to_string(), legacy),
        ];

        let skip = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let result = skip.try_aggregate(1, &results).unwrap();
        assert!((mean_of(&ctx, &result.parameters)[0][0] - 1.0).abs() < 1e-3);

        let accept = SecureAggregator::new(
            &ctx,
            AggregationSettings {
                legacy_policy: LegacyPolicy::Accept,
                ..AggregationSettings::default()
            },
        )
        .unwrap();
        let result = accept.try_aggregate(1, &results).unwrap();
        assert!((mean_of(&ctx, &result.parameters)[0][0] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_unrecognized_envelope() {
        let ctx = context();
        let agg = SecureAggregator::new(&ctx, AggregationSettings::default()).unwrap();
        let mut res = fit(&ctx, &[&[1.0]]);
        res.parameters.tensor_type = "numpy.ndarray".into();
        let results = vec![("a".to_string(), res)];

        assert!(matches!(
            agg.try_aggregate(1, &results),
            Err(FedAggError::UnrecognizedEnvelope(_))
        ));
        let (params, metrics) = agg.aggregate_fit(1, &results, &[]);
        assert!(params.is_none());
        assert_eq!(metrics["clients_skipped"], Scalar::Int(1));
    }

    #[test]
    fn test_homomorphic_mean_sequential() {
        let ctx = context();
        let settings = AggregationSettings {
            mode: AggregationMode::Homomorphic,
            parallel: false,
            ..AggregationSettings::default()
        };
        let agg = SecureAggregator::new(&ctx, settings).unwrap();
        let results = vec![
            ("a".to_string(), fit(&ctx, &[&[1.0, -1.0]])),
            ("b".to_string(), fit(&ctx, &[&[2.0, -2.0]])),
            ("c".to_string(), fit(&ctx, &[&[6.0, -6.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let ct = codec::deserialize(&ctx, &result.parameters.tensors[0]).unwrap();
        assert_eq!(ct.level_count(), 1);
        let mean = codec::decrypt(&ctx, &ct).unwrap();
        assert!((mean[0] - 3.0).abs() < 1e-3, "{}", mean[0]);
        assert!((mean[1] + 3.0).abs() < 1e-3, "{}", mean[1]);
    }

    #[test]
    fn test_homomorphic_rejects_rescaled_update() {
        let ctx = context();
        let settings = AggregationSettings {
            mode: AggregationMode::Homomorphic,
            parallel: false,
            ..AggregationSettings::default()
        };
        let agg = SecureAggregator::new(&ctx, settings).unwrap();
        let fresh = codec::encrypt(&ctx, &[8.0, -8.0]).unwrap();
        let lowered = ctx.evaluator().rescale(&fresh).unwrap();
        assert_eq!(lowered.level_count(), 1);
        let results = vec![
            ("low".to_string(), raw(codec::serialize(&lowered).unwrap())),
            ("a".to_string(), fit(&ctx, &[&[1.0, -1.0]])),
            ("b".to_string(), fit(&ctx, &[&[3.0, -3.0]])),
        ];

        let result = agg.try_aggregate(1, &results).unwrap();
        let ct = codec::deserialize(&ctx, &result.parameters.tensors[0]).unwrap();
        assert_eq!(ct.level_count(), 1);
        let mean = codec::decrypt(&ctx, &ct).unwrap();
        assert!((mean[0] - 2.0).abs() < 1e-3, "{}", mean[0]);
        assert!((mean[1] + 2.0).abs() < 1e-3, "{}", mean[1]);
        assert_eq!(result.metrics["clients_skipped"], Scalar::Int(1));
    }

    #[test]
    fn test_decrypt_mode_requires_secret_key() {
        let ctx = context();
        let public = EncryptionContext::from_public_bytes(&ctx.export_public().unwrap()).unwrap();
        assert!(matches!(
            SecureAggregator::new(&public, AggregationSettings::default()),
            Err(FedAggError::MissingSecretKey)
        ));
        let homomorphic = AggregationSettings {
            mode: AggregationMode::Homomorphic,
            ..AggregationSettings::default()
        };
        assert!(SecureAggregator::new(&public, homomorphic).is_ok());
    }
}
