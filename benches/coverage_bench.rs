//! Benchmarks for coverage arithmetic and index commits
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use rover::archive::{Coverage, DayPartition, Interval, StreamKey, StreamPattern, MICROS_PER_DAY};
use rover::{IndexConfig, Reconciler, StreamIndex};
use std::sync::Arc;

const JAN_1_2016: i64 = 1_451_606_400_000_000;

/// `count` one-minute intervals separated by one-minute gaps
fn fragmented(count: i64) -> Vec<Interval> {
    (0..count)
        .map(|i| {
            let start = JAN_1_2016 + i * 120_000_000;
            Interval::new(start, start + 60_000_000)
        })
        .collect()
}

fn bench_coverage(c: &mut Criterion) {
    let mut group = c.benchmark_group("coverage");

    for size in [100, 1000, 10000] {
        let intervals = fragmented(size);

        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("insert_{}", size), |b| {
            b.iter(|| Coverage::from_intervals(black_box(intervals.iter().copied())))
        });

        let coverage = Coverage::from_intervals(intervals.iter().copied());
        let requested = Interval::new(JAN_1_2016, JAN_1_2016 + size * 120_000_000);

        group.bench_function(format!("missing_{}", size), |b| {
            b.iter(|| coverage.missing(black_box(&requested)))
        });

        group.bench_function(format!("bridge_{}", size), |b| {
            b.iter(|| {
                let mut merged = coverage.clone();
                merged.insert(black_box(requested));
                merged
            })
        });
    }

    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("index");
    let key = StreamKey::new("IU", "ANMO", "00", "BHZ");
    let path = DayPartition::containing(key.clone(), JAN_1_2016)
        .unwrap()
        .relative_path();

    group.bench_function("commit_adjacent_100", |b| {
        b.iter(|| {
            let index = StreamIndex::open_in_memory(IndexConfig::default()).unwrap();
            for i in 0..100 {
                let start = JAN_1_2016 + i * 1_000_000;
                index
                    .commit(&key, Interval::new(start, start + 1_000_000), &path)
                    .unwrap();
            }
            index
        })
    });

    group.bench_function("plan_100_streams", |b| {
        let index = StreamIndex::open_in_memory(IndexConfig::default()).unwrap();
        for sta in 0..100 {
            let key = StreamKey::new("IU", format!("S{:03}", sta), "00", "BHZ");
            let path = DayPartition::containing(key.clone(), JAN_1_2016)
                .unwrap()
                .relative_path();
            for interval in fragmented(50) {
                index.commit(&key, interval, &path).unwrap();
            }
        }
        let reconciler = Reconciler::new(Arc::new(index));
        let pattern = StreamPattern::all();
        let day = Interval::new(JAN_1_2016, JAN_1_2016 + MICROS_PER_DAY);

        b.iter(|| reconciler.plan(black_box(&pattern), day, &[]).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_coverage, bench_index);
criterion_main!(benches);
