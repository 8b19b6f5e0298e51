// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

use dashmap::DashMap;
use dealcache_redis::RedisCache;
use dealcache_tier::Clock;

/// Persists daily request counters.
///
/// Counters expire on their own, so a new day starts from zero without any cleanup.
pub trait QuotaStore: Send + Sync {
    /// Increments `key`, sets it to expire at `expire_at`, and returns the new count.
    fn increment(&self, key: &str, expire_at: SystemTime) -> impl Future<Output = dealcache_tier::Result<u64>> + Send;

    /// Reads `key`; a missing or expired counter reads as zero.
    fn count(&self, key: &str) -> impl Future<Output = dealcache_tier::Result<u64>> + Send;
}

/// Process-local [`QuotaStore`].
#[derive(Debug, Default)]
pub struct MemoryQuotaStore {
    clock: Clock,
    counters: DashMap<String, Counter>,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    value: u64,
    expire_at: SystemTime,
}

impl MemoryQuotaStore {
    /// An empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty store reading expiry from `clock`.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            clock,
            counters: DashMap::new(),
        }
    }

    /// Drops expired counters, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.system_time();
        let before = self.counters.len();
        self.counters.retain(|_, counter| counter.expire_at > now);
        before - self.counters.len()
    }
}

impl QuotaStore for MemoryQuotaStore {
    async fn increment(&self, key: &str, expire_at: SystemTime) -> dealcache_tier::Result<u64> {
        let now = self.clock.system_time();
        let mut counter = self.counters.entry(key.to_string()).or_insert(Counter { value: 0, expire_at });
        if counter.expire_at <= now {
            counter.value = 0;
        }
        counter.value += 1;
        counter.expire_at = expire_at;
        Ok(counter.value)
    }

    async fn count(&self, key: &str) -> dealcache_tier::Result<u64> {
        let now = self.clock.system_time();
        Ok(self
            .counters
            .get(key)
            .filter(|counter| counter.expire_at > now)
            .map_or(0, |counter| counter.value))
    }
}

impl<V> QuotaStore for RedisCache<V>
where
    V: Send + Sync,
{
    fn increment(&self, key: &str, expire_at: SystemTime) -> impl Future<Output = dealcache_tier::Result<u64>> + Send {
        Self::increment(self, key, expire_at)
    }

    fn count(&self, key: &str) -> impl Future<Output = dealcache_tier::Result<u64>> + Send {
        self.counter(key)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dealcache_tier::ClockControl;

    use super::*;

    #[tokio::test]
    async fn counts_until_expiry() {
        let control = ClockControl::new();
        let store = MemoryQuotaStore::with_clock(control.to_clock());
        let expire_at = control.to_clock().system_time() + Duration::from_secs(10);

        assert_eq!(store.increment("k", expire_at).await.unwrap(), 1);
        assert_eq!(store.increment("k", expire_at).await.unwrap(), 2);
        assert_eq!(store.count("k").await.unwrap(), 2);
        assert_eq!(store.count("other").await.unwrap(), 0);

        control.advance(Duration::from_secs(10));
        assert_eq!(store.count("k").await.unwrap(), 0);

        let later = control.to_clock().system_time() + Duration::from_secs(10);
        assert_eq!(store.increment("k", later).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let control = ClockControl::new();
        let store = MemoryQuotaStore::with_clock(control.to_clock());
        let now = control.to_clock().system_time();

        store.increment("short", now + Duration::from_secs(1)).await.unwrap();
        store.increment("long", now + Duration::from_secs(100)).await.unwrap();
        control.advance(Duration::from_secs(2));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.count("long").await.unwrap(), 1);
    }
}
