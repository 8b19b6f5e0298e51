// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bounded LRU memory tier.

use std::sync::Arc;
use std::time::Duration;

use dealcache_tier::{CacheEntry, CacheTier, Clock, KeyPattern, Layer, Result, StatsCounter, TierStats};
use parking_lot::Mutex;

use crate::builder::MemoryCacheBuilder;
use crate::lru::LruList;

/// A bounded, access-ordered in-process cache with lazy TTL expiry.
///
/// Reading or writing a key makes it the most recently used. Writing a new key
/// while the cache is full first evicts the least recently used entry. Expired
/// entries are removed when they are next read.
///
/// The cache is cheap to clone; clones share storage. Operations never await while
/// holding the internal lock.
///
/// # Examples
///
/// ```
/// use dealcache_memory::MemoryCache;
///
/// let cache = MemoryCache::builder().max_size(2).build();
/// cache.set("k1", 1, None);
/// cache.set("k2", 2, None);
/// let _ = cache.get("k1");
/// cache.set("k3", 3, None);
///
/// assert!(cache.has("k1"));
/// assert!(!cache.has("k2"));
/// assert_eq!(cache.stats().evictions, 1);
/// ```
#[derive(Debug)]
pub struct MemoryCache<V> {
    inner: Arc<Inner<V>>,
}

#[derive(Debug)]
struct Inner<V> {
    name: String,
    max_size: usize,
    ttl: Duration,
    clock: Clock,
    entries: Mutex<LruList<CacheEntry<V>>>,
    stats: StatsCounter,
}

impl<V> Clone for MemoryCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for MemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryCache<V> {
    /// Creates a cache with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a cache holding at most `max_size` entries.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self::builder().max_size(max_size).build()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> MemoryCacheBuilder<V> {
        MemoryCacheBuilder::new()
    }

    pub(crate) fn from_builder(builder: MemoryCacheBuilder<V>) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(LruList::with_capacity(builder.max_size)),
                name: builder.name,
                max_size: builder.max_size,
                ttl: builder.ttl,
                clock: builder.clock,
                stats: StatsCounter::new(),
            }),
        }
    }

    /// The cache name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.max_size
    }

    /// TTL applied by `set` when none is given.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.inner.ttl
    }

    /// Stores a value for `ttl`, or for the default TTL when `None`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let entry = CacheEntry::new(value, self.inner.clock.system_time(), ttl.unwrap_or(self.inner.ttl));
        self.insert_entry(key.into(), entry);
    }

    /// Stores a prepared entry, keeping its expiry.
    pub fn insert_entry(&self, key: String, entry: CacheEntry<V>) {
        let entry = entry.with_layer(Layer::Memory);
        let mut entries = self.inner.entries.lock();
        if !entries.contains(&key) && entries.len() >= self.inner.max_size && entries.pop_lru().is_some() {
            self.inner.stats.evicted(1);
        }
        entries.insert(key, entry);
    }

    /// Returns `true` if a live entry exists.
    ///
    /// Does not change recency or statistics. An expired entry is dropped.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        let now = self.inner.clock.system_time();
        let mut entries = self.inner.entries.lock();
        match entries.peek(key).map(|entry| entry.is_expired_at(now)) {
            Some(false) => true,
            Some(true) => {
                entries.remove(key);
                false
            }
            None => false,
        }
    }

    /// Removes a key, returning whether it was present.
    pub fn delete(&self, key: &str) -> bool {
        self.inner.entries.lock().remove(key).is_some()
    }

    /// Removes every key matching `pattern`, returning how many were removed.
    pub fn delete_pattern(&self, pattern: &KeyPattern) -> u64 {
        if pattern.is_exact() {
            return u64::from(self.delete(pattern.as_str()));
        }
        self.inner.entries.lock().remove_where(|key, _| pattern.matches(key))
    }

    /// Removes every entry. Counters are kept.
    pub fn clear(&self) {
        self.inner.entries.lock().clear();
    }

    /// Drops every expired entry, returning how many were dropped.
    pub fn purge_expired(&self) -> u64 {
        let now = self.inner.clock.system_time();
        let purged = self.inner.entries.lock().remove_where(|_, entry| entry.is_expired_at(now));
        self.inner.stats.expired(purged);
        purged
    }

    /// Number of entries currently held, expired ones included until they are touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Returns `true` when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> TierStats {
        self.inner.stats.snapshot(self.len() as u64)
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }
}

impl<V: Clone> MemoryCache<V> {
    /// Returns the value for `key` and marks it most recently used.
    ///
    /// An expired entry is removed and counted as a miss.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_entry(key).map(CacheEntry::into_value)
    }

    /// Like [`get`](Self::get) but returns the entry with its timestamps.
    #[must_use]
    pub fn get_entry(&self, key: &str) -> Option<CacheEntry<V>> {
        let now = self.inner.clock.system_time();
        let mut entries = self.inner.entries.lock();

        let expired = match entries.peek(key) {
            None => {
                self.inner.stats.miss();
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            entries.remove(key);
            self.inner.stats.expired(1);
            self.inner.stats.miss();
            return None;
        }

        self.inner.stats.hit();
        entries.get(key).cloned()
    }
}

impl<V> CacheTier<V> for MemoryCache<V>
where
    V: Clone + Send + Sync,
{
    fn layer(&self) -> Layer {
        Layer::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        Ok(self.get_entry(key))
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        self.insert_entry(key.to_string(), entry);
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        Ok(self.delete(key))
    }

    async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
        Ok(self.delete_pattern(pattern))
    }

    async fn clear(&self) -> Result<()> {
        Self::clear(self);
        Ok(())
    }

    fn stats(&self) -> TierStats {
        Self::stats(self)
    }

    fn len(&self) -> Option<u64> {
        Some(Self::len(self) as u64)
    }
}

#[cfg(test)]
mod tests {
    use dealcache_tier::ClockControl;
    use futures::executor::block_on;

    use super::*;

    static_assertions::assert_impl_all!(MemoryCache<String>: Send, Sync, Clone);

    fn controlled(max_size: usize) -> (ClockControl, MemoryCache<i32>) {
        let control = ClockControl::new();
        let cache = MemoryCache::builder()
            .max_size(max_size)
            .ttl(Duration::from_secs(10))
            .clock(control.to_clock())
            .build();
        (control, cache)
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let (_control, cache) = controlled(3);
        cache.set("k1", 1, None);
        cache.set("k2", 2, None);
        cache.set("k3", 3, None);
        assert_eq!(cache.get("k1"), Some(1));

        cache.set("k4", 4, None);

        assert!(!cache.has("k2"));
        assert!(cache.has("k1"));
        assert!(cache.has("k3"));
        assert!(cache.has("k4"));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn updating_existing_key_never_evicts() {
        let (_control, cache) = controlled(2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 10, None);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a"), Some(10));
    }

    #[test]
    fn set_refreshes_recency() {
        let (_control, cache) = controlled(2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        cache.set("a", 3, None);
        cache.set("c", 4, None);

        assert!(cache.has("a"));
        assert!(!cache.has("b"));
    }

    #[test]
    fn expired_get_is_miss_and_removes() {
        let (control, cache) = controlled(10);
        cache.set("k", 1, Some(Duration::from_secs(1)));
        assert_eq!(cache.get("k"), Some(1));

        control.advance(Duration::from_millis(1100));

        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.expirations), (1, 1, 1));
    }

    #[test]
    fn has_does_not_touch_stats_or_recency() {
        let (_control, cache) = controlled(2);
        cache.set("a", 1, None);
        cache.set("b", 2, None);
        assert!(cache.has("a"));
        cache.set("c", 3, None);

        assert!(!cache.has("a"), "has must not promote");
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (0, 0));
    }

    #[test]
    fn has_drops_expired_entry() {
        let (control, cache) = controlled(2);
        cache.set("a", 1, Some(Duration::from_secs(1)));
        control.advance(Duration::from_secs(1));
        assert!(!cache.has("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn delete_pattern_removes_matching_only() {
        let (_control, cache) = controlled(10);
        cache.set("deals:product:1", 1, None);
        cache.set("deals:product:2", 2, None);
        cache.set("deals:search:laptops", 3, None);

        let removed = cache.delete_pattern(&KeyPattern::parse("deals:product:*").unwrap());

        assert_eq!(removed, 2);
        assert!(cache.has("deals:search:laptops"));
        assert_eq!(cache.delete_pattern(&KeyPattern::exact("deals:search:laptops")), 1);
    }

    #[test]
    fn purge_expired_counts_expirations() {
        let (control, cache) = controlled(10);
        cache.set("short", 1, Some(Duration::from_secs(1)));
        cache.set("long", 2, Some(Duration::from_secs(60)));
        control.advance(Duration::from_secs(5));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.get("long"), Some(2));
    }

    #[test]
    fn insert_entry_keeps_expiry() {
        let (control, cache) = controlled(10);
        let clock = control.to_clock();
        let entry = CacheEntry::new(5, clock.system_time(), Duration::from_secs(2)).with_layer(Layer::Distributed);
        cache.insert_entry("p".to_string(), entry.clone());

        let stored = cache.get_entry("p").unwrap();
        assert_eq!(stored.expires_at(), entry.expires_at());
        assert_eq!(stored.layer(), Layer::Memory);
    }

    #[test]
    fn tier_contract_is_infallible() {
        let (_control, tier) = controlled(4);
        block_on(async {
            CacheTier::insert(&tier, "x", CacheEntry::new(1, Clock::system().system_time(), Duration::from_secs(60)))
                .await
                .unwrap();
            assert!(CacheTier::get(&tier, "x").await.unwrap().is_some());
            assert!(CacheTier::invalidate(&tier, "x").await.unwrap());
            assert!(!CacheTier::invalidate(&tier, "x").await.unwrap());
            CacheTier::clear(&tier).await.unwrap();
            assert_eq!(CacheTier::len(&tier), Some(0));
            assert_eq!(tier.layer(), Layer::Memory);
        });
    }

    #[test]
    fn clones_share_storage() {
        let (_control, cache) = controlled(4);
        let other = cache.clone();
        cache.set("shared", 1, None);
        assert_eq!(other.get("shared"), Some(1));
    }
}
