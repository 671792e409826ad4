use criterion::{Criterion, criterion_group, criterion_main};
use domain::{FeePolicy, Money};
use rust_decimal_macros::dec;
use std::hint::black_box;

fn bench_compute_fees(c: &mut Criterion) {
    let policy = FeePolicy::default();

    c.bench_function("domain/compute_fees", |b| {
        b.iter(|| policy.compute_fees(black_box(Money::from_units(125000))))
    });
}

fn bench_compute_fees_fractional_rate(c: &mut Criterion) {
    let policy = FeePolicy::new(dec!(0.0725), Money::from_units(1500)).unwrap();

    c.bench_function("domain/compute_fees_fractional_rate", |b| {
        b.iter(|| policy.compute_fees(black_box(Money::new(dec!(987654.32)))))
    });
}

criterion_group!(benches, bench_compute_fees, bench_compute_fees_fractional_rate);
criterion_main!(benches);
