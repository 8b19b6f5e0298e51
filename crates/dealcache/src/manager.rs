// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use dealcache_memory::MemoryCache;
use dealcache_redis::RedisCache;
use dealcache_refresh::MaterializedCache;
use dealcache_tier::{CacheEntry, CacheTier, Clock, KeyPattern, Layer, StatsCounter, TierHealth, TierState, TierStats};
use futures::future::join_all;
use keyflight::FlightGroup;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    CacheConfig, CacheKey, Error, KeyDescriptor, Result, TierGuard,
    builder::CacheManagerBuilder,
    key::endpoint_of,
    metrics::{MetricsTracker, Sample},
    telemetry::{CacheActivity, CacheOperation, CacheTelemetry},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of [`CacheManager::get`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    /// Whether any tier held the key.
    pub hit: bool,
    /// The cached value.
    pub data: Option<Value>,
    /// Tier that answered.
    pub layer: Option<Layer>,
}

impl Lookup {
    fn hit(data: Value, layer: Layer) -> Self {
        Self {
            hit: true,
            data: Some(data),
            layer: Some(layer),
        }
    }

    fn miss() -> Self {
        Self {
            hit: false,
            data: None,
            layer: None,
        }
    }
}

/// Outcome of [`CacheManager::get_or_compute`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Computed<T = Value> {
    /// `true` when the value came from cache rather than the producer.
    pub hit: bool,
    /// The value.
    pub data: T,
}

/// Counters of every tier plus their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Memory tier.
    pub l1: TierStats,
    /// Distributed tier.
    pub l2: TierStats,
    /// Materialized tier.
    pub l3: TierStats,
    /// Per request: a hit in any tier counts once, a full miss counts once.
    /// Evictions, expirations and sizes are summed over the tiers.
    pub overall: TierStats,
}

/// Overall health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every enabled tier answers.
    Healthy,
    /// An enabled optional tier is unavailable. Requests are still served.
    Degraded,
}

/// Liveness summary for a health-check route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Memory tier.
    pub l1: TierHealth,
    /// Distributed tier.
    pub l2: TierHealth,
    /// Materialized tier.
    pub l3: TierHealth,
    /// When the report was taken.
    pub timestamp: DateTime<Utc>,
}

/// The façade over the memory, distributed and materialized tiers.
///
/// Reads probe L1, then L2, then L3, and copy a lower-tier hit into every faster tier
/// it skipped, keeping the entry's remaining lifetime. Writes go to every tier. Faults
/// in L2 and L3 are absorbed by a [`TierGuard`], so they cost latency, never
/// availability. Cloning yields another handle to the same caches.
///
/// # Examples
///
/// ```
/// use dealcache::CacheManager;
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let cache = CacheManager::builder().build();
///
/// let first = cache
///     .get_or_compute("deals:product:42", || async { Ok::<_, std::io::Error>(json!({"price": 19.99})) }, None)
///     .await
///     .unwrap();
/// assert!(!first.hit);
///
/// let lookup = cache.get("deals:product:42").await;
/// assert!(lookup.hit);
/// assert_eq!(lookup.data, Some(json!({"price": 19.99})));
/// # });
/// ```
#[derive(Debug)]
pub struct CacheManager<R = RedisCache<Value>, M = MaterializedCache<Value>> {
    inner: Arc<Inner<R, M>>,
}

#[derive(Debug)]
pub(crate) struct Inner<R, M> {
    pub(crate) l1: MemoryCache<Value>,
    pub(crate) l2: TierGuard<R>,
    pub(crate) l3: TierGuard<M>,
    pub(crate) clock: Clock,
    pub(crate) default_ttl: Duration,
    pub(crate) flights: FlightGroup<String, Result<Computed>>,
    pub(crate) telemetry: CacheTelemetry,
    pub(crate) metrics: Option<MetricsTracker>,
    pub(crate) requests: StatsCounter,
}

impl<R, M> Clone for CacheManager<R, M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl CacheManager {
    /// Starts a builder with a default memory tier and disabled L2 and L3.
    #[must_use]
    pub fn builder() -> CacheManagerBuilder {
        CacheManagerBuilder::new()
    }

    /// Builds every tier from configuration on the system clock.
    ///
    /// The distributed tier connects lazily, so this never fails. Call
    /// [`MaterializedCache::spawn`] on [`materialized`](Self::materialized) to start the
    /// refresh loop.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::builder().config(config).build()
    }
}

impl<R, M> CacheManager<R, M> {
    pub(crate) fn from_inner(inner: Inner<R, M>) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Builds the key for a descriptor.
    #[must_use]
    pub fn generate_key(&self, descriptor: &KeyDescriptor) -> CacheKey {
        CacheKey::generate(descriptor)
    }

    /// The memory tier.
    #[must_use]
    pub fn memory(&self) -> &MemoryCache<Value> {
        &self.inner.l1
    }

    /// The guarded distributed tier.
    #[must_use]
    pub fn distributed(&self) -> &TierGuard<R> {
        &self.inner.l2
    }

    /// The guarded materialized tier.
    #[must_use]
    pub fn materialized(&self) -> &TierGuard<M> {
        &self.inner.l3
    }

    /// The attached latency tracker.
    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsTracker> {
        self.inner.metrics.as_ref()
    }

    /// TTL used when callers pass none.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }
}

impl<R, M> CacheManager<R, M>
where
    R: CacheTier<Value>,
    M: CacheTier<Value>,
{
    /// Looks `key` up in L1, L2 and L3, in that order.
    pub async fn get(&self, key: &str) -> Lookup {
        let started = self.inner.clock.instant();
        let lookup = self.lookup(key).await;
        self.observe(key, started, lookup.hit, lookup.layer);
        lookup
    }

    async fn lookup(&self, key: &str) -> Lookup {
        let telemetry = &self.inner.telemetry;

        if let Some(value) = self.inner.l1.get(key) {
            telemetry.record(Some(Layer::Memory), CacheOperation::Get, CacheActivity::Hit, None);
            return Lookup::hit(value, Layer::Memory);
        }

        if let Some(entry) = self.inner.l2.get::<Value>(key).await {
            telemetry.record(Some(Layer::Distributed), CacheOperation::Get, CacheActivity::Hit, None);
            self.inner.l1.insert_entry(key.to_string(), entry.clone());
            telemetry.record(Some(Layer::Memory), CacheOperation::Set, CacheActivity::Promoted, None);
            return Lookup::hit(entry.into_value(), Layer::Distributed);
        }

        if let Some(entry) = self.inner.l3.get::<Value>(key).await {
            telemetry.record(Some(Layer::Materialized), CacheOperation::Get, CacheActivity::Hit, None);
            self.inner.l1.insert_entry(key.to_string(), entry.clone());
            self.inner.l2.insert(key, entry.clone()).await;
            telemetry.record(None, CacheOperation::Set, CacheActivity::Promoted, None);
            return Lookup::hit(entry.into_value(), Layer::Materialized);
        }

        telemetry.record(None, CacheOperation::Get, CacheActivity::Miss, None);
        Lookup::miss()
    }

    /// Writes `value` to every tier for `ttl`, or the default TTL.
    ///
    /// L2 and L3 are written concurrently. Once this resolves, a `get` sees the value
    /// at least in L1.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.inner.default_ttl);
        let entry = CacheEntry::new(value, self.inner.clock.system_time(), ttl);

        self.inner.l1.insert_entry(key.to_string(), entry.clone());
        futures::join!(self.inner.l2.insert(key, entry.clone()), self.inner.l3.insert(key, entry));
        self.inner
            .telemetry
            .record(None, CacheOperation::Set, CacheActivity::Inserted, None);
    }

    /// Returns the cached value, or runs `producer` once and caches its output.
    ///
    /// Concurrent calls for the same missing key share one run of a producer; the others
    /// wait for it and receive its output. A producer error reaches every waiter of that
    /// run and is not cached, so the next call starts afresh. If the caller running the
    /// producer is dropped or panics, a waiting caller runs its own producer instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compute`] when the producer fails.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &str, producer: F, ttl: Option<Duration>) -> Result<Computed>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Value, E>>,
        E: Into<BoxError>,
    {
        let started = self.inner.clock.instant();

        let lookup = self.lookup(key).await;
        if let Some(data) = lookup.data {
            self.observe(key, started, true, lookup.layer);
            return Ok(Computed { hit: true, data });
        }

        let result = self
            .inner
            .flights
            .work(key.to_string(), move || async move {
                // An earlier flight may have finished between the miss and joining.
                if self.inner.l1.has(key)
                    && let Some(data) = self.inner.l1.get(key)
                {
                    return Ok(Computed { hit: true, data });
                }

                let computing = self.inner.clock.instant();
                match producer().await {
                    Ok(value) => {
                        self.set(key, value.clone(), ttl).await;
                        self.inner.telemetry.record(
                            None,
                            CacheOperation::Compute,
                            CacheActivity::Computed,
                            Some(self.inner.clock.instant().saturating_duration_since(computing)),
                        );
                        Ok(Computed { hit: false, data: value })
                    }
                    Err(error) => {
                        let error = Error::compute(key, error);
                        tracing::error!(cache.key = key, error = %error, "cache producer failed");
                        self.inner
                            .telemetry
                            .record(None, CacheOperation::Compute, CacheActivity::Error, None);
                        Err(error)
                    }
                }
            })
            .await;

        let hit = result.as_ref().is_ok_and(|computed| computed.hit);
        self.observe(key, started, hit, hit.then_some(Layer::Memory));
        result
    }

    /// [`get`](Self::get) decoding the value as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when the cached value is not a `T`.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)
            .await
            .data
            .map(|value| serde_json::from_value(value).map_err(|e| Error::serialization(key, e)))
            .transpose()
    }

    /// [`set`](Self::set) encoding `value` as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] when `value` cannot be encoded.
    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(value).map_err(|e| Error::serialization(key, e))?;
        self.set(key, value, ttl).await;
        Ok(())
    }

    /// [`get_or_compute`](Self::get_or_compute) for typed values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Compute`] when the producer fails and [`Error::Serialization`]
    /// when the cached value is not a `T`.
    pub async fn get_or_compute_as<T, F, Fut, E>(&self, key: &str, producer: F, ttl: Option<Duration>) -> Result<Computed<T>>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let computed = self
            .get_or_compute(
                key,
                move || async move {
                    let value = producer().await.map_err(Into::<BoxError>::into)?;
                    serde_json::to_value(value).map_err(BoxError::from)
                },
                ttl,
            )
            .await?;

        Ok(Computed {
            hit: computed.hit,
            data: serde_json::from_value(computed.data).map_err(|e| Error::serialization(key, e))?,
        })
    }

    /// Looks up several keys concurrently, returning values in input order.
    pub async fn get_multiple<K: AsRef<str>>(&self, keys: &[K]) -> Vec<Option<Value>> {
        join_all(keys.iter().map(|key| self.get(key.as_ref())))
            .await
            .into_iter()
            .map(|lookup| lookup.data)
            .collect()
    }

    /// Writes several entries concurrently with one TTL.
    pub async fn set_multiple<K, I>(&self, entries: I, ttl: Option<Duration>)
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let entries: Vec<(K, Value)> = entries.into_iter().collect();
        join_all(entries.into_iter().map(|(key, value)| async move { self.set(key.as_ref(), value, ttl).await })).await;
    }

    /// Removes `key` from every tier, returning whether any tier held it.
    pub async fn delete(&self, key: &str) -> bool {
        let l1 = self.inner.l1.delete(key);
        let (l2, l3) = futures::join!(self.inner.l2.invalidate::<Value>(key), self.inner.l3.invalidate::<Value>(key));
        self.inner
            .telemetry
            .record(None, CacheOperation::Delete, CacheActivity::Invalidated, None);
        l1 || l2 || l3
    }

    /// Removes keys matching a pattern with at most one `*` from every tier.
    ///
    /// Returns the sum of the per-tier counts, so a key held by two tiers counts twice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] when the pattern has more than one `*`.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let pattern = KeyPattern::parse(pattern)?;

        let l1 = self.inner.l1.delete_pattern(&pattern);
        let (l2, l3) = futures::join!(
            self.inner.l2.invalidate_pattern::<Value>(&pattern),
            self.inner.l3.invalidate_pattern::<Value>(&pattern)
        );
        let removed = l1 + l2 + l3;

        tracing::debug!(cache.pattern = pattern.as_str(), l1, l2, l3, "cache pattern invalidated");
        self.inner
            .telemetry
            .record(None, CacheOperation::Invalidate, CacheActivity::Invalidated, None);
        Ok(removed)
    }

    /// Empties every tier.
    pub async fn clear(&self) {
        self.inner.l1.clear();
        futures::join!(self.inner.l2.clear::<Value>(), self.inner.l3.clear::<Value>());
        self.inner
            .telemetry
            .record(None, CacheOperation::Clear, CacheActivity::Invalidated, None);
    }

    /// Counters of every tier.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let l1 = self.inner.l1.stats();
        let l2 = self.inner.l2.stats::<Value>();
        let l3 = self.inner.l3.stats::<Value>();

        for (layer, stats) in [(Layer::Memory, &l1), (Layer::Distributed, &l2), (Layer::Materialized, &l3)] {
            self.inner.telemetry.record_size(layer, stats.current_size);
        }

        let requests = self.inner.requests.snapshot(0);
        let overall = TierStats::new(
            requests.hits,
            requests.misses,
            l1.evictions + l2.evictions + l3.evictions,
            l1.expirations + l2.expirations + l3.expirations,
            l1.current_size + l2.current_size + l3.current_size,
        );
        CacheStats { l1, l2, l3, overall }
    }

    /// Probes every tier.
    ///
    /// The status is [`HealthStatus::Degraded`] when L2 or L3 is enabled but
    /// unavailable. The memory tier cannot fail.
    pub async fn health(&self) -> HealthReport {
        let (l2, l3) = futures::join!(self.inner.l2.health::<Value>(), self.inner.l3.health::<Value>());
        let status = if [&l2, &l3].iter().any(|h| h.state == TierState::Unavailable) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            l1: TierHealth::available(Layer::Memory),
            l2,
            l3,
            timestamp: self.inner.clock.utc_now(),
        }
    }

    fn observe(&self, key: &str, started: std::time::Instant, hit: bool, layer: Option<Layer>) {
        if hit {
            self.inner.requests.hit();
        } else {
            self.inner.requests.miss();
        }
        if let Some(metrics) = &self.inner.metrics {
            let elapsed = self.inner.clock.instant().saturating_duration_since(started);
            metrics.record(Sample::new(endpoint_of(key), elapsed, hit, layer));
        }
    }
}
