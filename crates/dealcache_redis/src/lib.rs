// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The distributed tier (L2), backed by Redis.
//!
//! [`RedisCache`] implements [`dealcache_tier::CacheTier`] on top of a lazily opened
//! Redis connection. Every command is bounded by a timeout and faults are returned as
//! tier errors for the cache manager to absorb.
//!
//! # Example
//!
//! ```no_run
//! use dealcache_redis::{RedisCache, RedisConfig};
//! use dealcache_tier::CacheTier;
//!
//! # async fn example() {
//! let l2: RedisCache<serde_json::Value> = RedisCache::new(RedisConfig::enabled("redis://127.0.0.1:6379"));
//!
//! match l2.get("deals:product:1").await {
//!     Ok(Some(entry)) => println!("hit: {}", entry.value()),
//!     Ok(None) => println!("miss"),
//!     Err(error) => println!("distributed tier degraded: {error}"),
//! }
//! # }
//! ```

mod config;
mod envelope;
mod tier;

pub use config::RedisConfig;
pub use tier::RedisCache;
