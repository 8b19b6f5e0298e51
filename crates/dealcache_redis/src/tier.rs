// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Redis-backed distributed tier.

use std::{
    marker::PhantomData,
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use dealcache_tier::{CacheEntry, CacheTier, Clock, Error, KeyPattern, Layer, Result, StatsCounter, TierHealth, TierState, TierStats};
use parking_lot::Mutex;
use redis::{Client, RedisError, RedisResult, aio::ConnectionManager};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::Mutex as AsyncMutex;

use crate::{RedisConfig, envelope};

const LAYER: Layer = Layer::Distributed;

/// The distributed tier.
///
/// Construction never fails and never touches the network. The connection is opened by
/// the first operation that needs it; after a failed attempt no new attempt is made until
/// the configured reconnect backoff has elapsed, and operations fail fast in between.
///
/// Every command runs under the configured timeout, so a slow or dead Redis costs at most
/// one timeout per operation. Errors are returned to the caller; the cache manager turns
/// them into misses.
///
/// A disabled tier (see [`RedisCache::disabled`]) answers every read with a miss and
/// every write with `Ok`, and reports [`TierState::Disabled`].
pub struct RedisCache<V> {
    inner: Arc<Inner>,
    _value: PhantomData<fn() -> V>,
}

struct Inner {
    config: RedisConfig,
    client: Option<Client>,
    clock: Clock,
    connection: AsyncMutex<Connection>,
    stats: StatsCounter,
    last_error: Mutex<Option<String>>,
}

enum Connection {
    Idle,
    Ready(ConnectionManager),
    Failed { at: Instant },
}

impl<V> std::fmt::Debug for RedisCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.inner.config.url)
            .field("key_prefix", &self.inner.config.key_prefix)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<V> Clone for RedisCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _value: PhantomData,
        }
    }
}

impl<V> RedisCache<V> {
    /// Creates the tier from configuration.
    ///
    /// An invalid URL does not fail construction: the tier starts unavailable and
    /// reports the parse error through [`health`](CacheTier::health).
    #[must_use]
    pub fn new(config: RedisConfig) -> Self {
        Self::with_clock(config, Clock::system())
    }

    /// Creates the tier with a specific clock.
    #[must_use]
    pub fn with_clock(config: RedisConfig, clock: Clock) -> Self {
        let mut last_error = None;
        let client = if config.enabled {
            match Client::open(config.url.as_str()) {
                Ok(client) => Some(client),
                Err(error) => {
                    tracing::warn!(cache.layer = LAYER.as_str(), error = %error, "invalid redis url, distributed tier unavailable");
                    last_error = Some(error.to_string());
                    None
                }
            }
        } else {
            None
        };

        Self {
            inner: Arc::new(Inner {
                config,
                client,
                clock,
                connection: AsyncMutex::new(Connection::Idle),
                stats: StatsCounter::new(),
                last_error: Mutex::new(last_error),
            }),
            _value: PhantomData,
        }
    }

    /// A tier that is switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(RedisConfig::default())
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &RedisConfig {
        &self.inner.config
    }

    /// Returns `true` when the tier is switched on by configuration.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.config.enabled
    }

    /// Current state as of the last operation, without probing the server.
    #[must_use]
    pub fn state(&self) -> TierState {
        if !self.inner.config.enabled {
            TierState::Disabled
        } else if self.inner.last_error.lock().is_some() {
            TierState::Unavailable
        } else {
            TierState::Available
        }
    }

    /// The most recent failure, cleared by the next successful command.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// Increments a counter and sets it to expire at `expire_at`, atomically.
    ///
    /// Returns the value after the increment.
    ///
    /// # Errors
    ///
    /// Returns an error when the tier is disabled or Redis fails or times out.
    pub async fn increment(&self, key: &str, expire_at: SystemTime) -> Result<u64> {
        let full_key = self.full_key(key);
        let expire_secs = envelope::to_millis(expire_at) / 1_000;
        let op_timeout = self.inner.config.op_timeout();

        self.run(op_timeout, move |mut conn| async move {
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .cmd("INCR")
                .arg(&full_key)
                .cmd("EXPIREAT")
                .arg(&full_key)
                .arg(expire_secs)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok(count)
        })
        .await
    }

    /// Reads a counter written by [`increment`](Self::increment). Missing counters read as zero.
    ///
    /// # Errors
    ///
    /// Returns an error when the tier is disabled or Redis fails or times out.
    pub async fn counter(&self, key: &str) -> Result<u64> {
        let full_key = self.full_key(key);
        let op_timeout = self.inner.config.op_timeout();

        self.run(op_timeout, move |mut conn| async move {
            let value: Option<u64> = redis::cmd("GET").arg(&full_key).query_async(&mut conn).await?;
            Ok(value.unwrap_or(0))
        })
        .await
    }

    fn full_key(&self, key: &str) -> String {
        let prefix = &self.inner.config.key_prefix;
        let mut full = String::with_capacity(prefix.len() + key.len());
        full.push_str(prefix);
        full.push_str(key);
        full
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let Some(client) = &self.inner.client else {
            let reason = self.last_error().unwrap_or_else(|| "distributed tier is disabled".to_string());
            return Err(Error::Unavailable { layer: LAYER, reason });
        };

        let mut connection = self.inner.connection.lock().await;
        match &*connection {
            Connection::Ready(conn) => return Ok(conn.clone()),
            Connection::Failed { at } if self.inner.clock.instant().saturating_duration_since(*at) < self.inner.config.reconnect_backoff() => {
                return Err(Error::Unavailable {
                    layer: LAYER,
                    reason: "waiting to reconnect".to_string(),
                });
            }
            Connection::Failed { .. } | Connection::Idle => {}
        }

        let connect_timeout = self.inner.config.connect_timeout();
        let result = match tokio::time::timeout(connect_timeout, ConnectionManager::new(client.clone())).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(error)) => Err(Error::backend(LAYER, error)),
            Err(_elapsed) => Err(Error::Timeout {
                layer: LAYER,
                after: connect_timeout,
            }),
        };

        match result {
            Ok(conn) => {
                tracing::info!(cache.layer = LAYER.as_str(), url = %self.inner.config.url, "distributed tier connected");
                *connection = Connection::Ready(conn.clone());
                Ok(conn)
            }
            Err(error) => {
                tracing::warn!(cache.layer = LAYER.as_str(), error = %error, "distributed tier connection failed");
                *connection = Connection::Failed {
                    at: self.inner.clock.instant(),
                };
                *self.inner.last_error.lock() = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Runs one Redis interaction under `budget`, tracking connection health.
    async fn run<T, F, Fut>(&self, budget: Duration, op: F) -> Result<T>
    where
        F: FnOnce(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match tokio::time::timeout(budget, op(conn)).await {
            Ok(Ok(value)) => {
                *self.inner.last_error.lock() = None;
                Ok(value)
            }
            Ok(Err(error)) => {
                self.on_redis_error(&error).await;
                Err(Error::backend(LAYER, error))
            }
            Err(_elapsed) => {
                let error = Error::Timeout { layer: LAYER, after: budget };
                *self.inner.last_error.lock() = Some(error.to_string());
                Err(error)
            }
        }
    }

    async fn on_redis_error(&self, error: &RedisError) {
        *self.inner.last_error.lock() = Some(error.to_string());
        if error.is_connection_dropped() || error.is_connection_refusal() || error.is_io_error() {
            *self.inner.connection.lock().await = Connection::Failed {
                at: self.inner.clock.instant(),
            };
        }
    }

    async fn scan_delete(&self, glob: String) -> Result<u64> {
        let scan_count = self.inner.config.scan_count;
        self.run(self.inner.config.scan_timeout(), move |mut conn| async move {
            let mut cursor: u64 = 0;
            let mut deleted: u64 = 0;
            loop {
                let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&glob)
                    .arg("COUNT")
                    .arg(scan_count)
                    .query_async(&mut conn)
                    .await?;

                if !keys.is_empty() {
                    let removed: u64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                    deleted += removed;
                }

                cursor = next;
                if cursor == 0 {
                    break Ok(deleted);
                }
            }
        })
        .await
    }
}

impl<V> CacheTier<V> for RedisCache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn layer(&self) -> Layer {
        LAYER
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry<V>>> {
        if !self.is_enabled() {
            return Ok(None);
        }

        let full_key = self.full_key(key);
        let raw: Option<String> = self
            .run(self.inner.config.op_timeout(), move |mut conn| async move {
                redis::cmd("GET").arg(&full_key).query_async(&mut conn).await
            })
            .await?;

        let Some(raw) = raw else {
            self.inner.stats.miss();
            return Ok(None);
        };

        let entry: CacheEntry<V> = envelope::decode(&raw).map_err(|e| Error::serialization(LAYER, e))?;
        if entry.is_expired_at(self.inner.clock.system_time()) {
            self.inner.stats.expired(1);
            self.inner.stats.miss();
            return Ok(None);
        }

        self.inner.stats.hit();
        Ok(Some(entry.with_layer(LAYER)))
    }

    async fn insert(&self, key: &str, entry: CacheEntry<V>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let Some(ttl) = entry.remaining_ttl(self.inner.clock.system_time()) else {
            return Ok(());
        };

        let payload = envelope::encode(&entry).map_err(|e| Error::serialization(LAYER, e))?;
        let full_key = self.full_key(key);
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);

        self.run(self.inner.config.op_timeout(), move |mut conn| async move {
            redis::cmd("SET")
                .arg(&full_key)
                .arg(payload)
                .arg("PX")
                .arg(ttl_ms)
                .query_async::<()>(&mut conn)
                .await
        })
        .await
    }

    async fn invalidate(&self, key: &str) -> Result<bool> {
        if !self.is_enabled() {
            return Ok(false);
        }

        let full_key = self.full_key(key);
        let removed: u64 = self
            .run(self.inner.config.op_timeout(), move |mut conn| async move {
                redis::cmd("DEL").arg(&full_key).query_async(&mut conn).await
            })
            .await?;
        Ok(removed > 0)
    }

    async fn invalidate_pattern(&self, pattern: &KeyPattern) -> Result<u64> {
        if !self.is_enabled() {
            return Ok(0);
        }
        if pattern.is_exact() {
            return CacheTier::<V>::invalidate(self, pattern.as_str()).await.map(u64::from);
        }
        self.scan_delete(pattern.to_redis_glob(&self.inner.config.key_prefix)).await
    }

    async fn clear(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let everything = KeyPattern::parse("*")?;
        let removed = self.scan_delete(everything.to_redis_glob(&self.inner.config.key_prefix)).await?;
        tracing::info!(cache.layer = LAYER.as_str(), removed, "distributed tier cleared");
        Ok(())
    }

    fn stats(&self) -> TierStats {
        self.inner.stats.snapshot(0)
    }

    async fn health(&self) -> TierHealth {
        if !self.is_enabled() {
            return TierHealth::disabled(LAYER);
        }

        let ping = self
            .run(self.inner.config.op_timeout(), |mut conn| async move {
                redis::cmd("PING").query_async::<String>(&mut conn).await
            })
            .await;

        match ping {
            Ok(_) => TierHealth::available(LAYER),
            Err(error) => TierHealth::unavailable(LAYER, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> RedisConfig {
        RedisConfig {
            connect_timeout_ms: 500,
            reconnect_backoff_ms: 60_000,
            ..RedisConfig::enabled("redis://127.0.0.1:1")
        }
    }

    #[test]
    fn full_key_prepends_prefix() {
        let cache = RedisCache::<u32>::new(RedisConfig::enabled("redis://localhost").with_key_prefix("app:"));
        assert_eq!(cache.full_key("deals:product:1"), "app:deals:product:1");
    }

    #[test]
    fn invalid_url_starts_unavailable() {
        let cache = RedisCache::<u32>::new(RedisConfig::enabled("not a url"));
        assert_eq!(cache.state(), TierState::Unavailable);
        assert!(cache.last_error().is_some());
    }

    #[tokio::test]
    async fn disabled_tier_is_a_clean_miss() {
        let cache = RedisCache::<u32>::disabled();
        let entry = CacheEntry::new(1, SystemTime::now(), Duration::from_secs(60));

        cache.insert("k", entry).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.invalidate("k").await.unwrap());
        assert_eq!(cache.invalidate_pattern(&KeyPattern::parse("k*").unwrap()).await.unwrap(), 0);
        cache.clear().await.unwrap();

        assert_eq!(cache.health().await, TierHealth::disabled(Layer::Distributed));
        assert_eq!(cache.state(), TierState::Disabled);
        assert!(cache.counter("quota").await.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_fails_then_backs_off() {
        let cache = RedisCache::<u32>::new(unreachable_config());

        let first = cache.get("k").await.unwrap_err();
        assert!(matches!(first, Error::Backend { .. } | Error::Timeout { .. }), "got {first:?}");
        assert_eq!(cache.state(), TierState::Unavailable);

        // Within the backoff window no reconnect is attempted.
        let second = cache.get("k").await.unwrap_err();
        assert!(matches!(second, Error::Unavailable { .. }), "got {second:?}");

        let health = cache.health().await;
        assert_eq!(health.state, TierState::Unavailable);
    }

    #[tokio::test]
    async fn expired_entries_are_not_written() {
        let cache = RedisCache::<u32>::new(unreachable_config());
        let stale = CacheEntry::new(1, SystemTime::UNIX_EPOCH, Duration::from_secs(1));

        // Would fail to connect if it tried.
        cache.insert("k", stale).await.unwrap();
        assert_eq!(cache.state(), TierState::Available);
    }
}
