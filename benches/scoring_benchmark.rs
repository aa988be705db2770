//! Benchmarks for RFM scoring and value tiering on large populations
//!
//! Run with: cargo bench --bench scoring_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::prelude::*;
use rand::SeedableRng;

use custval::pipeline::{score_customers, CustomerMetrics, SegmentRuleTable, ValueBucketer};

/// Synthetic RFM metrics with skewed frequency and spend
fn generate_metrics(customers: usize, seed: u64) -> Vec<CustomerMetrics> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    (0..customers)
        .map(|i| {
            let activity = rng.gen::<f64>();
            let frequency = 1 + (activity * activity * activity * 40.0) as u32;
            CustomerMetrics {
                customer_id: format!("C{:06}", i),
                recency: rng.gen_range(0..730),
                frequency,
                monetary: f64::from(frequency) * (5.0 + rng.gen::<f64>() * 95.0),
            }
        })
        .collect()
}

fn benchmark_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("rfm_scoring");
    let rules = SegmentRuleTable::default();

    for customers in [1_000, 10_000, 50_000] {
        let metrics = generate_metrics(customers, 42);
        group.throughput(Throughput::Elements(customers as u64));

        group.bench_with_input(BenchmarkId::new("score_customers", customers), &metrics, |b, metrics| {
            b.iter(|| {
                let _ = score_customers(black_box(metrics), black_box(5), black_box(&rules));
            });
        });
    }

    group.finish();
}

fn benchmark_bucketing(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_tiers");
    let labels: Vec<String> = ["D", "C", "B", "A"].iter().map(|s| s.to_string()).collect();
    let plain = ValueBucketer::new(labels.clone()).expect("labels are not empty");
    let split = ValueBucketer::new(labels)
        .expect("labels are not empty")
        .with_top_tier_split(true);

    for customers in [10_000, 100_000] {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let values: Vec<f64> = (0..customers)
            .map(|_| {
                let v = rng.gen::<f64>();
                v * v * 5_000.0
            })
            .collect();
        group.throughput(Throughput::Elements(customers as u64));

        group.bench_with_input(BenchmarkId::new("quartiles", customers), &values, |b, values| {
            b.iter(|| {
                let _ = plain.assign(black_box(values));
            });
        });

        group.bench_with_input(BenchmarkId::new("split_top", customers), &values, |b, values| {
            b.iter(|| {
                let _ = split.assign(black_box(values));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_scoring, benchmark_bucketing);
criterion_main!(benches);
