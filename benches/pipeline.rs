//! Throughput of the parallel pipeline across worker counts, against the
//! serial fallback -- benchmarking the thing the ring exists to speed up,
//! not the micro-operations underneath it.

use std::io::Cursor;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use pgzip::config::{Config, Format};
use pgzip::pipeline::compress;

fn corpus(len: usize) -> Vec<u8> {
    // Moderately compressible, not degenerate -- a repeating phrase rather
    // than all-zero or fully random input, so the deflate engine does real
    // work on every block instead of hitting a fast path on either end.
    b"the quick brown fox jumps over the lazy dog "
        .iter()
        .cycle()
        .take(len)
        .copied()
        .collect()
}

fn bench_worker_counts(c: &mut Criterion) {
    let input = corpus(8 * 1024 * 1024);
    let mut group = c.benchmark_group("compress_gzip");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for workers in [1usize, 2, 4, 8] {
        let cfg = Config { workers, format: Format::Gzip, level: 6, ..Config::default() };
        group.bench_with_input(BenchmarkId::from_parameter(workers), &cfg, |b, cfg| {
            b.iter(|| {
                let mut out = Vec::with_capacity(input.len());
                compress(cfg, Cursor::new(&input), &mut out).unwrap();
            });
        });
    }
    group.finish();
}

fn bench_dict_on_vs_off(c: &mut Criterion) {
    let input = corpus(4 * 1024 * 1024);
    let mut group = c.benchmark_group("compress_dict");
    group.throughput(Throughput::Bytes(input.len() as u64));

    for dict in [false, true] {
        let cfg = Config { workers: 4, dict, format: Format::Gzip, ..Config::default() };
        group.bench_with_input(BenchmarkId::from_parameter(dict), &cfg, |b, cfg| {
            b.iter(|| {
                let mut out = Vec::with_capacity(input.len());
                compress(cfg, Cursor::new(&input), &mut out).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_worker_counts, bench_dict_on_vs_off);
criterion_main!(benches);
