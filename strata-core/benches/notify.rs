//! Notification Benchmarks
//!
//! Measures the cost of pushing one change through store graphs of
//! different shapes:
//!
//! 1. **Fan-out**: one atom with many plain listeners.
//! 2. **Diamond**: one atom feeding `width` computed stores that are joined
//!    by a single computed store. The join must recompute once per change
//!    however wide the diamond is.
//! 3. **Chain**: a linear chain of computed stores.
//!
//! ```bash
//! cargo bench --bench notify
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use strata_core::prelude::*;

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for listeners in [1usize, 16, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, &listeners| {
            let runtime = Runtime::new();
            let source = runtime.atom(0u64);
            let _subscriptions: Vec<_> = (0..listeners)
                .map(|_| source.listen(|value, _| {
                    black_box(value);
                }))
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
        });
    }
    group.finish();
}

fn bench_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("diamond");
    for width in [2usize, 8, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let runtime = Runtime::new();
            let source = runtime.atom(0u64);
            let branches: Vec<_> = (0..width as u64)
                .map(|offset| computed(source.clone(), move |value| value + offset))
                .collect();
            let join = computed(branches, |values| values.iter().sum::<u64>());
            let _subscription = join.listen(|value, _| {
                black_box(value);
            });

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
        });
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    c.bench_function("chain_16", |b| {
        let runtime = Runtime::new();
        let source = runtime.atom(0u64);
        let mut tail = computed(source.clone(), |value| value + 1);
        for _ in 1..16 {
            tail = computed(tail.clone(), |value| value + 1);
        }
        let _subscription = tail.listen(|value, _| {
            black_box(value);
        });

        let mut next = 0u64;
        b.iter(|| {
            next += 1;
            source.set(black_box(next));
        });
    });
}

criterion_group!(benches, bench_fan_out, bench_diamond, bench_chain);
criterion_main!(benches);
