use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use ripple_core::reactive::{batch, Computed, Effect, Signal};

fn signal_write_benchmark(c: &mut Criterion) {
    let signal: Signal<i32> = Signal::new(0);

    c.bench_function("signal_write", |b| {
        let mut i = 0;
        b.iter(|| {
            signal.set(black_box(i));
            i += 1;
        });
    });
}

fn computed_chain_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 10, 100] {
        let source: Signal<i64> = Signal::new(0);
        let mut tail = {
            let source = source.clone();
            Computed::new(move || source.get() + 1)
        };
        for _ in 1..depth {
            let previous = tail.clone();
            tail = Computed::new(move || previous.get() + 1);
        }
        let sink = tail.clone();
        let _effect = Effect::new(move || {
            black_box(sink.get());
        });

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            let mut i = 0;
            b.iter(|| {
                source.set(black_box(i));
                i += 1;
            });
        });
    }

    group.finish();
}

fn diamond_fan_in_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_in");

    for width in [2, 16, 128] {
        let source: Signal<i64> = Signal::new(0);
        let branches: Vec<Computed<i64>> = (0..width)
            .map(|k| {
                let source = source.clone();
                Computed::new(move || source.get() * k)
            })
            .collect();
        let total = Computed::new(move || branches.iter().map(Computed::get).sum::<i64>());
        let _effect = Effect::new(move || {
            black_box(total.get());
        });

        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            let mut i = 0;
            b.iter(|| {
                source.set(black_box(i));
                i += 1;
            });
        });
    }

    group.finish();
}

fn batched_writes_benchmark(c: &mut Criterion) {
    let signals: Vec<Signal<i32>> = (0..32).map(Signal::new).collect();
    let readers = signals.clone();
    let _effect = Effect::new(move || {
        black_box(readers.iter().map(Signal::get).sum::<i32>());
    });

    c.bench_function("batched_writes_32", |b| {
        let mut i = 0;
        b.iter(|| {
            batch(|| {
                for signal in &signals {
                    signal.set(black_box(i));
                }
            });
            i += 1;
        });
    });
}

criterion_group!(
    benches,
    signal_write_benchmark,
    computed_chain_benchmark,
    diamond_fan_in_benchmark,
    batched_writes_benchmark
);
criterion_main!(benches);
