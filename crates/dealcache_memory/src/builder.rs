// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring memory tiers.

use std::marker::PhantomData;
use std::time::Duration;

use dealcache_tier::Clock;

use crate::tier::MemoryCache;

/// Default number of entries held before LRU eviction starts.
pub const DEFAULT_MAX_SIZE: usize = 1_000;

/// Default lifetime of entries written without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Builder for [`MemoryCache`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dealcache_memory::MemoryCache;
///
/// let cache = MemoryCache::<String>::builder()
///     .max_size(500)
///     .ttl(Duration::from_secs(60))
///     .name("deals-l1")
///     .build();
///
/// assert_eq!(cache.capacity(), 500);
/// assert_eq!(cache.default_ttl(), Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct MemoryCacheBuilder<V> {
    pub(crate) max_size: usize,
    pub(crate) ttl: Duration,
    pub(crate) clock: Clock,
    pub(crate) name: String,
    _phantom: PhantomData<V>,
}

impl<V> Default for MemoryCacheBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> MemoryCacheBuilder<V> {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl: DEFAULT_TTL,
            clock: Clock::system(),
            name: "memory".to_string(),
            _phantom: PhantomData,
        }
    }

    /// Sets the maximum number of entries. Values below 1 are raised to 1.
    #[must_use]
    pub fn max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size.max(1);
        self
    }

    /// Sets the TTL applied when `set` is called without one.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the clock used for expiry.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets a name for the cache, used in diagnostics.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> MemoryCache<V> {
        MemoryCache::from_builder(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_max_size_is_raised_to_one() {
        let cache = MemoryCacheBuilder::<u8>::new().max_size(0).build();
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn defaults_apply() {
        let cache = MemoryCacheBuilder::<u8>::default().build();
        assert_eq!(cache.capacity(), DEFAULT_MAX_SIZE);
        assert_eq!(cache.default_ttl(), DEFAULT_TTL);
        assert_eq!(cache.name(), "memory");
    }
}
