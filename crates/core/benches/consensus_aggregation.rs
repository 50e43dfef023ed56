// Consensus Aggregation Benchmarks
// Critical path: cynic_core/src/consensus.rs (aggregate, detect_unnameable)
// Measures: weight-mean aggregation and dissent computation cost as the
// committee and dimension-coverage size grow.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cynic_core::consensus::aggregate;
use cynic_shared::{Dimension, DogVote};
use std::collections::BTreeMap;

fn build_votes(dog_count: usize, dims_per_dog: usize) -> Vec<DogVote> {
    let all_dims: Vec<Dimension> = Dimension::ALL
        .into_iter()
        .filter(|d| *d != Dimension::TheUnnameable)
        .collect();

    (0..dog_count)
        .map(|i| {
            let mut scores = BTreeMap::new();
            for j in 0..dims_per_dog {
                let dim = all_dims[(i + j) % all_dims.len()];
                scores.insert(dim, 0.3 + (j as f64 * 0.01) % 0.3);
            }
            DogVote::new(format!("dog.bench.{i}"), scores, 0.5, 0.0, 5).unwrap()
        })
        .collect()
}

fn aggregate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("consensus_aggregate");

    for dog_count in &[2, 11, 50] {
        let votes = build_votes(*dog_count, 10);
        group.bench_with_input(BenchmarkId::from_parameter(dog_count), &votes, |b, votes| {
            b.iter(|| {
                let result = aggregate(black_box(votes), black_box(11));
                black_box(result);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, aggregate_benchmark);
criterion_main!(benches);
