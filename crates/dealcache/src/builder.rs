// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use dealcache_memory::MemoryCache;
use dealcache_redis::RedisCache;
use dealcache_refresh::MaterializedCache;
use dealcache_tier::{Clock, StatsCounter};
use keyflight::FlightGroup;
use serde_json::Value;

use crate::{
    CacheConfig, CacheManager, MemoryConfig, TierGuard,
    manager::Inner,
    metrics::MetricsTracker,
    telemetry::CacheTelemetry,
};

/// Builder for [`CacheManager`].
///
/// Starts with a default memory tier and with the distributed and materialized tiers
/// disabled. Replacing a tier changes the builder's type parameter, so any
/// [`CacheTier`](dealcache_tier::CacheTier) can stand in for L2 or L3.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dealcache::{CacheManager, MemoryConfig};
///
/// let cache = CacheManager::builder()
///     .memory(MemoryConfig { max_size: 200, ttl_secs: 60 })
///     .default_ttl(Duration::from_secs(120))
///     .build();
///
/// assert_eq!(cache.memory().capacity(), 200);
/// assert_eq!(cache.default_ttl(), Duration::from_secs(120));
/// ```
#[derive(Debug)]
pub struct CacheManagerBuilder<R = RedisCache<Value>, M = MaterializedCache<Value>> {
    memory: MemoryConfig,
    clock: Clock,
    default_ttl: Option<Duration>,
    distributed: R,
    materialized: M,
    metrics: Option<MetricsTracker>,
    telemetry: CacheTelemetry,
}

impl CacheManagerBuilder {
    pub(crate) fn new() -> Self {
        Self {
            memory: MemoryConfig::default(),
            clock: Clock::system(),
            default_ttl: None,
            distributed: RedisCache::disabled(),
            materialized: MaterializedCache::disabled(),
            metrics: None,
            telemetry: CacheTelemetry::default(),
        }
    }

    /// Applies every section of `config`, building L2 and L3 on the builder's clock.
    ///
    /// Set the clock first when using a controlled one.
    #[must_use]
    pub fn config(mut self, config: &CacheConfig) -> Self {
        self.memory = config.memory.clone();
        self.default_ttl = Some(config.default_ttl());
        self.distributed = RedisCache::with_clock(config.redis.clone(), self.clock.clone());
        self.materialized = MaterializedCache::with_clock(config.materialized.clone(), self.clock.clone());
        self
    }
}

impl<R, M> CacheManagerBuilder<R, M> {
    /// Sizes the memory tier.
    #[must_use]
    pub fn memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }

    /// Sets the clock for the memory tier, write timestamps and latency samples.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the TTL used when callers pass none. Defaults to the memory tier's TTL.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Replaces the distributed tier.
    #[must_use]
    pub fn distributed<R2>(self, distributed: R2) -> CacheManagerBuilder<R2, M> {
        CacheManagerBuilder {
            memory: self.memory,
            clock: self.clock,
            default_ttl: self.default_ttl,
            distributed,
            materialized: self.materialized,
            metrics: self.metrics,
            telemetry: self.telemetry,
        }
    }

    /// Replaces the materialized tier.
    #[must_use]
    pub fn materialized<M2>(self, materialized: M2) -> CacheManagerBuilder<R, M2> {
        CacheManagerBuilder {
            memory: self.memory,
            clock: self.clock,
            default_ttl: self.default_ttl,
            distributed: self.distributed,
            materialized,
            metrics: self.metrics,
            telemetry: self.telemetry,
        }
    }

    /// Feeds a latency sample per lookup into `tracker`.
    #[must_use]
    pub fn metrics(mut self, tracker: MetricsTracker) -> Self {
        self.metrics = Some(tracker);
        self
    }

    /// Emits OpenTelemetry counters, latency histograms and size gauges on `meter`.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter(mut self, meter: &opentelemetry::metrics::Meter) -> Self {
        self.telemetry = CacheTelemetry::with_meter(meter);
        self
    }

    /// Builds the manager.
    #[must_use]
    pub fn build(self) -> CacheManager<R, M> {
        let memory_ttl = self.memory.ttl();
        let l1 = MemoryCache::builder()
            .max_size(self.memory.max_size)
            .ttl(memory_ttl)
            .clock(self.clock.clone())
            .name("dealcache-l1")
            .build();

        CacheManager::from_inner(Inner {
            l1,
            l2: TierGuard::with_telemetry(self.distributed, self.telemetry.clone()),
            l3: TierGuard::with_telemetry(self.materialized, self.telemetry.clone()),
            clock: self.clock,
            default_ttl: self.default_ttl.unwrap_or(memory_ttl),
            flights: FlightGroup::new(),
            telemetry: self.telemetry,
            metrics: self.metrics,
            requests: StatsCounter::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use dealcache_tier::{CacheTier, Layer, TierState};
    use opentelemetry::{KeyValue, metrics::MeterProvider};
    use serde_json::json;

    use super::*;
    use crate::telemetry::{attributes, testing::MetricTester};

    #[tokio::test]
    async fn defaults_disable_lower_tiers() {
        let cache = CacheManager::builder().build();

        assert!(!cache.distributed().inner().is_enabled());
        assert!(!cache.materialized().inner().is_enabled());
        assert_eq!(cache.default_ttl(), dealcache_memory::DEFAULT_TTL);

        let health = cache.health().await;
        assert_eq!(health.l2.state, TierState::Disabled);
        assert_eq!(health.l3.state, TierState::Disabled);
    }

    #[test]
    fn config_sizes_every_tier() {
        let mut config = CacheConfig::default();
        config.memory.max_size = 64;
        config.default_ttl_secs = 42;
        config.materialized.refresh_interval_secs = 60;

        let cache = CacheManager::from_config(&config);

        assert_eq!(cache.memory().capacity(), 64);
        assert_eq!(cache.default_ttl(), Duration::from_secs(42));
        assert_eq!(cache.materialized().inner().config().refresh_interval(), Duration::from_secs(60));
        assert_eq!(cache.distributed().inner().layer(), Layer::Distributed);
    }

    #[tokio::test]
    async fn meter_instruments_manager_operations() {
        let tester = MetricTester::new();
        let cache = CacheManager::builder()
            .meter(&tester.meter_provider().meter("dealcache"))
            .build();

        cache.set("deals:product:1", json!(1), None).await;
        let _ = cache.get("deals:product:1").await;
        let _ = cache.stats();

        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::CACHE_ACTIVITY, "cache.inserted"),
            KeyValue::new(attributes::CACHE_ACTIVITY, "cache.hit"),
            KeyValue::new(attributes::CACHE_LAYER, "l1"),
        ]);
    }
}
