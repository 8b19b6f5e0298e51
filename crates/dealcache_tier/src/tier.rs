// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for cache storage backends.

use std::sync::Arc;

use crate::{CacheEntry, KeyPattern, Layer, Result, TierHealth, TierStats};

/// Trait for cache tier implementations.
///
/// Keys are opaque strings; tiers never interpret their structure beyond
/// [`KeyPattern`] matching. Every operation is fallible so that remote tiers can
/// report faults; the cache manager absorbs those faults and degrades to misses.
///
/// Only [`health`](Self::health), [`len`](Self::len) and [`is_empty`](Self::is_empty)
/// have default implementations.
pub trait CacheTier<V>: Send + Sync {
    /// Which tier this is.
    fn layer(&self) -> Layer;

    /// Gets a live entry. Expired entries are reported as `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry<V>>>> + Send;

    /// Stores an entry, replacing any previous value for the key.
    fn insert(&self, key: &str, entry: CacheEntry<V>) -> impl Future<Output = Result<()>> + Send;

    /// Removes a key, returning whether it was present.
    fn invalidate(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Removes every key matching the pattern, returning how many were removed.
    fn invalidate_pattern(&self, pattern: &KeyPattern) -> impl Future<Output = Result<u64>> + Send;

    /// Removes every entry owned by this tier.
    fn clear(&self) -> impl Future<Output = Result<()>> + Send;

    /// Returns a snapshot of the tier's counters.
    fn stats(&self) -> TierStats;

    /// Probes the tier.
    ///
    /// Defaults to available for tiers that cannot fail.
    fn health(&self) -> impl Future<Output = TierHealth> + Send {
        let layer = self.layer();
        async move { TierHealth::available(layer) }
    }

    /// Returns the number of entries, if supported.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the tier holds no entries, if supported.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}

impl<V, T> CacheTier<V> for Arc<T>
where
    T: CacheTier<V>,
{
    fn layer(&self) -> Layer {
        (**self).layer()
    }

    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry<V>>>> + Send {
        (**self).get(key)
    }

    fn insert(&self, key: &str, entry: CacheEntry<V>) -> impl Future<Output = Result<()>> + Send {
        (**self).insert(key, entry)
    }

    fn invalidate(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).invalidate(key)
    }

    fn invalidate_pattern(&self, pattern: &KeyPattern) -> impl Future<Output = Result<u64>> + Send {
        (**self).invalidate_pattern(pattern)
    }

    fn clear(&self) -> impl Future<Output = Result<()>> + Send {
        (**self).clear()
    }

    fn stats(&self) -> TierStats {
        (**self).stats()
    }

    fn health(&self) -> impl Future<Output = TierHealth> + Send {
        (**self).health()
    }

    fn len(&self) -> Option<u64> {
        (**self).len()
    }
}
