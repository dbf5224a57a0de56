// Copyright 2026 the timer-sched authors. MIT license.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use timer_core::{create_scheduler, Variant};

fn bench_dense_start(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_start");
    for variant in Variant::ALL {
        group.bench_function(variant.to_string(), |b| {
            b.iter(|| {
                let mut sched = create_scheduler(variant);
                for d in 0..2_000u32 {
                    black_box(sched.start(d % 5_000, Box::new(|_| {})));
                }
                black_box(sched.size())
            });
        });
    }
    group.finish();
}

fn bench_dense_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("dense_cancel");
    for variant in Variant::ALL {
        group.bench_function(variant.to_string(), |b| {
            b.iter_batched(
                || {
                    let mut sched = create_scheduler(variant);
                    let ids: Vec<_> = (0..2_000u32)
                        .map(|d| sched.start(d % 5_000, Box::new(|_| {})))
                        .collect();
                    (sched, ids)
                },
                |(mut sched, ids)| {
                    for id in ids {
                        black_box(sched.cancel(id));
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_tick_driven_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick_driven_drain");
    for variant in Variant::ALL {
        group.bench_function(variant.to_string(), |b| {
            b.iter_batched(
                || {
                    let mut sched = create_scheduler(variant);
                    let now = timer_core::clock::current_time_ms();
                    for d in 0..2_000u32 {
                        sched.start(d % 5_000, Box::new(|_| {}));
                    }
                    (sched, now)
                },
                |(mut sched, now)| {
                    for step in 0..6_000i64 {
                        black_box(sched.tick(now + step));
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_dense_start,
    bench_dense_cancel,
    bench_tick_driven_drain
);
criterion_main!(benches);
