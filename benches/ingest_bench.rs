//! Ingest-path microbenchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use promgres::labels::Labels;

fn label_pairs(count: usize) -> Vec<(String, String)> {
    let mut pairs = vec![(
        "__name__".to_string(),
        "http_requests_total".to_string(),
    )];
    // Reverse order on purpose: canonicalization has to sort.
    for i in (0..count).rev() {
        pairs.push((format!("label_{i:02}"), format!("value_{i}")));
    }
    pairs
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for count in [2usize, 8, 16] {
        let pairs = label_pairs(count);
        group.throughput(Throughput::Elements(count as u64 + 1));
        group.bench_with_input(BenchmarkId::from_parameter(count), &pairs, |b, pairs| {
            b.iter(|| Labels::new(black_box(pairs.clone())).unwrap());
        });
    }
    group.finish();
}

fn bench_fingerprint_lookup_key(c: &mut Criterion) {
    let labels = Labels::new(label_pairs(8)).unwrap();
    c.bench_function("fingerprint_as_key", |b| {
        b.iter(|| black_box(labels.fingerprint()).len());
    });
}

criterion_group!(benches, bench_canonicalize, bench_fingerprint_lookup_key);
criterion_main!(benches);
