//! Benchmark suite for `embedstore-core` top-k search.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use embedstore_core::{DistanceMetric, EmbeddingStore, StoreConfig};
use rand::{Rng, SeedableRng};
use tempfile::tempdir;

const DIMENSION: usize = 128;

fn generate_vector(seed: u64) -> Vec<f32> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..DIMENSION).map(|_| rng.gen::<f32>() * 2.0 - 1.0).collect()
}

fn build_store(num_rows: usize) -> (tempfile::TempDir, EmbeddingStore) {
    let dir = tempdir().unwrap();
    let config = StoreConfig {
        vector_capacity: 4 + num_rows * DIMENSION * 4,
        offset_map_capacity: 4 + num_rows * 4,
        payload_capacity: 4 + num_rows * 16,
        ..StoreConfig::default()
    };
    let mut store = EmbeddingStore::create(dir.path(), DIMENSION, &config, false).unwrap();
    for i in 0..num_rows {
        store.add(&generate_vector(i as u64), b"row").unwrap();
    }
    (dir, store)
}

fn bench_top_k_by_store_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("top_k_by_store_size");
    for &num_rows in &[1_000usize, 10_000, 50_000] {
        let (_dir, store) = build_store(num_rows);
        let query = generate_vector(0);
        group.bench_with_input(BenchmarkId::from_parameter(num_rows), &num_rows, |b, _| {
            b.iter(|| black_box(store.top_k(&query, 10, DistanceMetric::Cosine, 0.0, None)));
        });
    }
    group.finish();
}

fn bench_top_k_by_worker_count(c: &mut Criterion) {
    let (_dir, store) = build_store(20_000);
    let query = generate_vector(0);

    let mut group = c.benchmark_group("top_k_by_worker_count");
    for &workers in &[1usize, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, &workers| {
            b.iter(|| black_box(store.top_k(&query, 10, DistanceMetric::Cosine, 0.0, Some(workers))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_top_k_by_store_size, bench_top_k_by_worker_count);
criterion_main!(benches);
