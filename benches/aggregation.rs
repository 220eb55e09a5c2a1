use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ckks_fedagg::aggregation::{FitRes, MetricsMap, Parameters, Status};
use ckks_fedagg::codec;
use ckks_fedagg::config::{AggregationMode, AggregationSettings};
use ckks_fedagg::params::CkksParams;
use ckks_fedagg::{EncryptionContext, SecureAggregator};

fn bench_context() -> EncryptionContext {
    EncryptionContext::create_with_seed(CkksParams::secure_128_n8192(), 42).unwrap()
}

fn model_update(len: usize, offset: f64) -> Vec<f64> {
    (0..len).map(|i| ((i as f64) * 0.001 + offset).sin()).collect()
}

fn encrypt_benchmark(c: &mut Criterion) {
    let ctx = bench_context();
    let mut group = c.benchmark_group("encrypt");

    for len in [1024, 4096, 16384] {
        let values = model_update(len, 0.0);
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, _| {
            b.iter(|| codec::encrypt(&ctx, &values).unwrap());
        });
    }

    group.finish();
}

fn aggregate_benchmark(c: &mut Criterion) {
    let ctx = bench_context();
    let mut group = c.benchmark_group("aggregate_fit");
    group.sample_size(10);

    for clients in [2, 8] {
        let results: Vec<(String, FitRes)> = (0..clients)
            .map(|i| {
                let ct = codec::encrypt(&ctx, &model_update(4096, i as f64)).unwrap();
                let fit = FitRes {
                    status: Status::ok(),
                    parameters: Parameters::from_ciphertexts(vec![codec::serialize(&ct).unwrap()]),
                    num_examples: 100,
                    metrics: MetricsMap::new(),
                };
                (format!("client-{}", i), fit)
            })
            .collect();

        for (name, mode, parallel) in [
            ("decrypt_parallel", AggregationMode::DecryptThenAverage, true),
            ("decrypt_sequential", AggregationMode::DecryptThenAverage, false),
            ("homomorphic", AggregationMode::Homomorphic, true),
        ] {
            let settings = AggregationSettings {
                mode,
                parallel,
                ..AggregationSettings::default()
            };
            let aggregator = SecureAggregator::new(&ctx, settings).unwrap();
            group.bench_with_input(
                BenchmarkId::new(name, format!("{}_clients", clients)),
                &clients,
                |b, _| {
                    b.iter(|| aggregator.try_aggregate(1, &results).unwrap());
                },
            );
        }
    }

    group.finish();
}

criterion_group!(benches, encrypt_benchmark, aggregate_benchmark);
criterion_main!(benches);
