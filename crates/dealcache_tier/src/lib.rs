// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Core tier abstractions for the dealcache storage backends.
//!
//! This crate defines the [`CacheTier`] trait implemented by every storage tier, along with
//! [`CacheEntry`] for values carrying their expiry, [`KeyPattern`] for wildcard invalidation,
//! [`TierStats`] and [`TierHealth`] for observability, and the [`Clock`] every tier reads time from.
//!
//! # Implementing a Cache Tier
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::RwLock;
//!
//! use dealcache_tier::{CacheEntry, CacheTier, KeyPattern, Layer, Result, TierStats};
//!
//! struct SimpleTier(RwLock<HashMap<String, CacheEntry<u32>>>);
//!
//! impl CacheTier<u32> for SimpleTier {
//!     fn layer(&self) -> Layer {
//!         Layer::Memory
//!     }
//!
//!     async fn get(&self, key: &str) -> Result<Option<CacheEntry<u32>>> {
//!         Ok(self.0.read().unwrap().get(key).cloned())
//!     }
//!
//!     async fn insert(&self, key: &str, entry: CacheEntry<u32>) -> Result<()> {
//!         self.0.write().unwrap().insert(key.to_string(), entry);
//!         Ok(())
//!     }
//!
//!     async fn invalidate(&self, key: &str) -> Result<bool> {
//!         Ok(self.0.write().unwrap().remove(key).is_some())
//!     }
//!
//!     async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
//!         let mut map = self.0.write().unwrap();
//!         let before = map.len();
//!         map.retain(|key, _| !pattern.matches(key));
//!         Ok((before - map.len()) as u64)
//!     }
//!
//!     async fn clear(&self) -> Result<()> {
//!         self.0.write().unwrap().clear();
//!         Ok(())
//!     }
//!
//!     fn stats(&self) -> TierStats {
//!         TierStats::default()
//!     }
//! }
//! ```

mod clock;
mod entry;
pub mod error;
mod health;
mod layer;
mod pattern;
mod stats;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod tier;

#[cfg(any(feature = "test-util", test))]
#[doc(inline)]
pub use clock::ClockControl;
#[doc(inline)]
pub use clock::Clock;
#[doc(inline)]
pub use entry::CacheEntry;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use health::{TierHealth, TierState};
#[doc(inline)]
pub use layer::Layer;
#[doc(inline)]
pub use pattern::{KeyPattern, PatternError};
#[doc(inline)]
pub use stats::{StatsCounter, TierStats, hit_rate};
#[doc(inline)]
pub use tier::CacheTier;
