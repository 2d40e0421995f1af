//! Benchmarks for delta-parameter reintegration.
//!
//! Run with: cargo bench -p jobkit-core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

use jobkit_core::{Args, DeltaParameters, DeltaValue, Kwargs};

fn delta_with(entries: usize) -> DeltaParameters {
    (0..entries)
        .map(|i| {
            let value = if i % 2 == 0 {
                DeltaValue::Pending
            } else {
                DeltaValue::Fixed(json!(i))
            };
            (format!("param_{i}"), value)
        })
        .collect()
}

fn bench_reintegrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("reintegrate");

    for entries in [1usize, 8, 64] {
        let delta = delta_with(entries);
        let args: Args = (0..entries).map(|i| json!(i)).collect();

        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, _| {
            b.iter(|| {
                let out = delta
                    .reintegrate(black_box(args.clone()), Kwargs::new())
                    .expect("enough positional arguments");
                black_box(out)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_reintegrate);
criterion_main!(benches);
