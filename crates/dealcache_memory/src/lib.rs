// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! The in-process memory tier (L1).
//!
//! [`MemoryCache`] is a bounded map ordered by access: the least recently used entry is
//! evicted when a new key arrives at capacity, and expired entries are dropped lazily
//! when read. It implements [`dealcache_tier::CacheTier`] and never fails.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use dealcache_memory::MemoryCache;
//!
//! let cache = MemoryCache::builder().max_size(100).ttl(Duration::from_secs(30)).build();
//!
//! cache.set("deals:product:1", "widget".to_string(), None);
//! assert_eq!(cache.get("deals:product:1").as_deref(), Some("widget"));
//! ```

mod builder;
mod lru;
mod tier;

pub use builder::{DEFAULT_MAX_SIZE, DEFAULT_TTL, MemoryCacheBuilder};
pub use tier::MemoryCache;
