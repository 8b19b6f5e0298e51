// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Wires every tier together the way an API server would at startup.
//!
//! Set `DEALCACHE_REDIS_URL` to use a real Redis; without it the distributed tier is off.

use std::{sync::Arc, time::Duration};

use dealcache::{
    CacheConfig, CacheManager, Clock, KeyDescriptor, MetricsTracker,
    batch::{BatchOptions, ProductBatch},
    rate_limit::{RateLimitConfig, RateLimiter},
    store::{DealViews, MemoryProductStore, ProductRecord, TOP_DISCOUNTS_VIEW},
};
use serde_json::json;
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_target(false).init();

    let mut config = CacheConfig::from_env()?;
    config.materialized.refresh_interval_secs = 1;

    let metrics = MetricsTracker::new();
    let cache = CacheManager::builder().config(&config).metrics(metrics.clone()).build();
    let store = Arc::new(MemoryProductStore::new());

    cache.materialized().inner().register(DealViews::new(Arc::clone(&store)).with_limit(5));
    let refresh = cache.materialized().inner().spawn();

    let batch = ProductBatch::new(Arc::clone(&store), cache.clone())
        .with_options(BatchOptions {
            batch_size: 10,
            ..BatchOptions::default()
        })
        .with_list_patterns(["deals:search:*"])?;

    let clock = Clock::system();
    let records = (1..=30)
        .map(|n| ProductRecord {
            id: n.to_string(),
            title: format!("Deal #{n}"),
            category: ["tv", "audio", "laptops"][n % 3].to_string(),
            price: 100.0 - f64::from(u32::try_from(n).unwrap_or(0)),
            original_price: 120.0,
            updated_at: clock.utc_now(),
        })
        .collect();
    let inserted = batch.bulk_insert(records).await;
    println!("inserted {} products in {} ms", inserted.processed, inserted.duration_ms());

    let limiter = RateLimiter::new(RateLimitConfig::default().provider("keepa", 3));
    let search_key = cache.generate_key(&KeyDescriptor::new("deals", "search", "tv").with_params(json!({"page": 1})));
    for attempt in 1..=5 {
        let result = cache
            .get_or_compute(
                search_key.as_str(),
                || async {
                    limiter.acquire("keepa").await?;
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Ok::<_, dealcache::Error>(json!({"results": ["1", "4", "7"]}))
                },
                Some(Duration::from_secs(60)),
            )
            .await?;
        println!("search attempt {attempt}: hit = {}", result.hit);
    }

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    let top = cache.get(TOP_DISCOUNTS_VIEW).await;
    println!("top discounts served from {:?}", top.layer);

    println!("quota: {:?}", limiter.get_all_rate_limit_info().await);
    println!("stats: {}", serde_json::to_string_pretty(&cache.stats())?);
    println!("health: {}", serde_json::to_string_pretty(&cache.health().await)?);
    println!("latency: {:?}", metrics.report());
    println!("targets met: {}", metrics.check_targets().all_passed);

    refresh.shutdown().await;
    Ok(())
}
