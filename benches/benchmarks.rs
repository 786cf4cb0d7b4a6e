//! Benchmarks for core query-engine operations

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use lodestone::service::{similarity, SimilarityMode};
use lodestone::split::{TokenTextSplitter, WhitespaceTokenizer};

/// Generate sample text for benchmarking
fn generate_text(words: usize) -> String {
    (0..words)
        .map(|i| format!("word{}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Benchmark similarity scoring (core of vector retrieval)
fn bench_similarity(c: &mut Criterion) {
    let dims = 1536; // OpenAI embedding size
    let a: Vec<f32> = (0..dims).map(|i| (i as f32) / 1000.0).collect();
    let b: Vec<f32> = (0..dims).map(|i| ((dims - i) as f32) / 1000.0).collect();

    c.bench_function("cosine_1536d", |bencher| {
        bencher.iter(|| {
            black_box(similarity(
                black_box(&a),
                black_box(&b),
                SimilarityMode::Cosine,
            ))
        });
    });

    c.bench_function("euclidean_1536d", |bencher| {
        bencher.iter(|| {
            black_box(similarity(
                black_box(&a),
                black_box(&b),
                SimilarityMode::Euclidean,
            ))
        });
    });
}

/// Benchmark token-aware splitting at several input sizes
fn bench_splitter(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_with_overlaps");
    for words in [100usize, 1000, 5000] {
        let text = generate_text(words);
        let splitter = TokenTextSplitter::new(256, 20, Arc::new(WhitespaceTokenizer)).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |bencher, text| {
            bencher.iter(|| {
                let splits = splitter.split_with_overlaps(black_box(text), None).unwrap();
                black_box(splits)
            });
        });
    }
    group.finish();
}

/// Benchmark truncation
fn bench_truncate(c: &mut Criterion) {
    let text = generate_text(2000);
    let splitter = TokenTextSplitter::new(256, 20, Arc::new(WhitespaceTokenizer)).unwrap();

    c.bench_function("truncate_2000w", |bencher| {
        bencher.iter(|| {
            let out = splitter.truncate(black_box(&text)).unwrap();
            black_box(out)
        });
    });
}

criterion_group!(benches, bench_similarity, bench_splitter, bench_truncate);
criterion_main!(benches);
