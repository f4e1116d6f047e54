//! Benchmarks for index planning: joins, group-by and rolling windows.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sheaf::prelude::*;

const ROWS: [usize; 3] = [1_000, 10_000, 100_000];
const KEY_SPACE: i64 = 512;

fn keyed_frame(rows: usize, seed: u64) -> Frame {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let keys: Vec<i64> = (0..rows).map(|_| rng.gen_range(0..KEY_SPACE)).collect();
    let vals: Vec<f64> = (0..rows).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Frame::from_pairs([("k", Array::from(keys))])
        .with_columns([Column::new("v", vals)])
        .expect("bench frame")
}

fn join_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning/join");
    group.sample_size(20);
    for rows in ROWS {
        let left = keyed_frame(rows, 0x5EED);
        let right = keyed_frame(rows / 2, 0xF00D)
            .rename(Renames::List(vec!["k".into(), "w".into()]))
            .expect("rename");
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("left", rows), &rows, |b, _| {
            b.iter(|| {
                let joined = left
                    .join(&right, JoinOptions::on(["k"]).eager(true))
                    .expect("left join");
                black_box(joined.height());
            });
        });
        group.bench_with_input(BenchmarkId::new("outer", rows), &rows, |b, _| {
            b.iter(|| {
                let joined = left
                    .join(
                        &right,
                        JoinOptions::on(["k"]).how(JoinHow::Outer).eager(true),
                    )
                    .expect("outer join");
                black_box(joined.height());
            });
        });
    }
    group.finish();
}

fn groupby_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning/groupby");
    group.sample_size(20);
    for rows in ROWS {
        let frame = keyed_frame(rows, 0xBEEF)
            .select(["v", "k"])
            .expect("reorder");
        group.throughput(Throughput::Elements(rows as u64));
        for sort in [false, true] {
            let id = BenchmarkId::new(if sort { "sorted" } else { "first_seen" }, rows);
            group.bench_with_input(id, &rows, |b, _| {
                b.iter(|| {
                    let out = frame
                        .groupby(GroupByOptions::keys(["k"]).sort(sort))
                        .and_then(|g| g.agg(Vec::<ColumnExpr>::new(), &[AggSpec::new("v", AggMethod::Mean)]))
                        .and_then(|f| f.eval())
                        .expect("groupby");
                    black_box(out.height());
                });
            });
        }
    }
    group.finish();
}

fn rolling_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning/rolling");
    group.sample_size(20);
    for rows in ROWS {
        let frame = keyed_frame(rows, 0xCAFE).select(["v"]).expect("select");
        group.throughput(Throughput::Elements(rows as u64));
        for window in [8usize, 256] {
            group.bench_with_input(BenchmarkId::new(format!("fixed_{window}"), rows), &rows, |b, _| {
                b.iter(|| {
                    let out = frame
                        .rolling(RollingOptions::fixed(window))
                        .and_then(|r| r.agg(AggMethod::Std, AggOptions::default()))
                        .and_then(|f| f.eval())
                        .expect("rolling");
                    black_box(out.height());
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, join_planning, groupby_planning, rolling_planning);
criterion_main!(benches);
