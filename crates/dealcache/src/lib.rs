// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Multi-tier caching for a deal-aggregation service.
//!
//! [`CacheManager`] layers three tiers behind one façade:
//! - L1, an in-process LRU map with per-entry TTL ([`dealcache_memory::MemoryCache`])
//! - L2, an optional Redis tier that degrades to a no-op when unreachable
//!   ([`dealcache_redis::RedisCache`])
//! - L3, precomputed views refreshed ahead of expiry ([`dealcache_refresh::MaterializedCache`])
//!
//! Reads go top-down and promote lower-tier hits upward. Writes go to every tier.
//! [`CacheManager::get_or_compute`] runs at most one producer per key at a time.
//!
//! Around the manager sit a daily-quota [`RateLimiter`](rate_limit::RateLimiter) for
//! paid upstream APIs, a [`BatchProcessor`](batch::BatchProcessor) for chunked bulk
//! work and a [`MetricsTracker`] that checks latency and hit-rate targets.
//!
//! # Examples
//!
//! ```
//! use dealcache::{CacheManager, KeyDescriptor};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let cache = CacheManager::builder().build();
//!
//! let key = cache.generate_key(
//!     &KeyDescriptor::new("deals", "search", "laptops").with_params(json!({"page": 2, "sort": "discount"})),
//! );
//! assert!(key.as_str().starts_with("deals:search:laptops:"));
//!
//! cache.set(key.as_str(), json!(["deal-1", "deal-2"]), None).await;
//! assert!(cache.get(key.as_str()).await.hit);
//!
//! assert_eq!(cache.invalidate_pattern("deals:search:*").await?, 1);
//! # Ok::<(), dealcache::Error>(())
//! # });
//! ```
//!
//! # Features
//!
//! - `metrics`: emits OpenTelemetry instruments through
//!   [`CacheManagerBuilder::meter`].
//! - `test-util`: enables `dealcache_tier::ClockControl` and `dealcache_tier::testing`.

pub mod batch;
mod builder;
mod config;
mod error;
mod guard;
mod key;
mod manager;
pub mod metrics;
pub mod rate_limit;
pub mod store;
mod telemetry;

pub use builder::CacheManagerBuilder;
pub use config::{CacheConfig, MemoryConfig};
pub use dealcache_tier::{CacheEntry, CacheTier, Clock, KeyPattern, Layer, TierHealth, TierState, TierStats};
pub use error::{Error, Result, SharedError};
pub use guard::TierGuard;
pub use key::{CacheKey, KeyDescriptor};
pub use manager::{CacheManager, CacheStats, Computed, HealthReport, HealthStatus, Lookup};
pub use metrics::{MetricsTracker, Sample};
