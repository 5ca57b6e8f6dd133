//! Performance benchmarks for ferry-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ferry_core::{compare_packed, merge, Hlc, HlcClock, Value};

fn bench_clock_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock");

    group.bench_function("send", |b| {
        let mut clock = HlcClock::new("bench-node");
        b.iter(|| black_box(clock.send()))
    });

    group.bench_function("receive", |b| {
        let mut clock = HlcClock::new("bench-node");
        let remote = Hlc::new(ferry_core::wall_clock_ms() + 5, 3, "remote-node");
        b.iter(|| black_box(clock.receive(black_box(&remote), None)))
    });

    group.bench_function("pack", |b| {
        let hlc = Hlc::new(1_704_067_200_000, 42, "bench-node");
        b.iter(|| black_box(hlc.pack()))
    });

    group.bench_function("parse", |b| {
        let packed = Hlc::new(1_704_067_200_000, 42, "bench-node").pack();
        b.iter(|| black_box(Hlc::parse(black_box(&packed))))
    });

    group.finish();
}

fn bench_compare_packed(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare_packed");

    let a = Hlc::new(1_704_067_200_000, 1, "node-a").pack();
    let b_ts = Hlc::new(1_704_067_200_000, 2, "node-b").pack();

    group.bench_function("valid_pair", |bench| {
        bench.iter(|| black_box(compare_packed(black_box(&a), black_box(&b_ts))))
    });

    group.bench_function("invalid_operand", |bench| {
        bench.iter(|| black_box(compare_packed(black_box("not a clock"), black_box(&a))))
    });

    group.finish();
}

fn bench_merge_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    let current = Hlc::new(1_704_067_200_000, 5, "node-a").pack();
    let newer = Hlc::new(1_704_067_200_001, 0, "node-b").pack();
    let stale = Hlc::new(1_704_067_100_000, 0, "node-b").pack();

    group.bench_function("incoming_wins", |b| {
        b.iter(|| black_box(merge::decide(black_box(&newer), Some(black_box(&current)))))
    });

    group.bench_function("incoming_stale", |b| {
        b.iter(|| black_box(merge::decide(black_box(&stale), Some(black_box(&current)))))
    });

    group.finish();
}

fn bench_value_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("value_codec");

    for (name, value) in [
        ("text", Value::from("a moderately sized text value")),
        ("int", Value::Int(-1_234_567)),
        ("real", Value::Real(std::f64::consts::PI)),
        (
            "json",
            Value::Json(serde_json::json!({"tags": ["a", "b", "c"], "count": 3})),
        ),
    ] {
        group.bench_with_input(BenchmarkId::new("encode", name), &value, |b, value| {
            b.iter(|| black_box(value.encode()))
        });
        let (data_type, raw) = value.encode();
        group.bench_with_input(
            BenchmarkId::new("decode", name),
            &(data_type, raw),
            |b, (data_type, raw)| b.iter(|| black_box(Value::decode(data_type, raw))),
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_clock_operations,
    bench_compare_packed,
    bench_merge_decision,
    bench_value_codec
);
criterion_main!(benches);
