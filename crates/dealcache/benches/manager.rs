// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Benchmarks for key generation and layered lookups.

#![allow(missing_docs, reason = "Benchmark code")]

use std::{hint::black_box, time::Instant};

use criterion::{Criterion, criterion_group, criterion_main};
use dealcache::{CacheKey, CacheManager, KeyDescriptor, MemoryConfig};
use dealcache_memory::MemoryCache;
use serde_json::json;
use tokio::runtime::Runtime;

fn rt() -> Runtime {
    Runtime::new().expect("failed to create runtime")
}

fn bench_keys(c: &mut Criterion) {
    let mut group = c.benchmark_group("keys");

    group.bench_function("plain", |b| {
        let descriptor = KeyDescriptor::new("deals", "product", "12345");
        b.iter(|| black_box(CacheKey::generate(black_box(&descriptor))));
    });

    group.bench_function("with_params", |b| {
        let descriptor = KeyDescriptor::new("deals", "search", "laptops").with_params(json!({
            "page": 3,
            "sort": "discount",
            "filters": {"brand": ["acme", "globex"], "minDiscount": 20, "inStock": true},
        }));
        b.iter(|| black_box(CacheKey::generate(black_box(&descriptor))));
    });

    group.finish();
}

fn bench_lookups(c: &mut Criterion) {
    let rt = rt();
    let mut group = c.benchmark_group("lookups");

    group.bench_function("memory_tier_hit", |b| {
        let cache = MemoryCache::with_max_size(1000);
        for i in 0..1000 {
            cache.set(format!("deals:product:{i}"), json!({"id": i}), None);
        }

        b.iter(|| {
            for i in 0..1000 {
                black_box(cache.get(&format!("deals:product:{i}")));
            }
        });
    });

    group.bench_function("manager_hit", |b| {
        let cache = CacheManager::builder()
            .memory(MemoryConfig {
                max_size: 1000,
                ttl_secs: 300,
            })
            .build();
        rt.block_on(async {
            for i in 0..1000 {
                cache.set(&format!("deals:product:{i}"), json!({"id": i}), None).await;
            }
        });

        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for i in 0..iters {
                    black_box(cache.get(&format!("deals:product:{}", i % 1000)).await);
                }
                start.elapsed()
            })
        });
    });

    group.bench_function("manager_miss", |b| {
        let cache = CacheManager::builder().build();

        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = Instant::now();
                for i in 0..iters {
                    black_box(cache.get(&format!("missing:{i}")).await);
                }
                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_keys, bench_lookups);
criterion_main!(benches);
