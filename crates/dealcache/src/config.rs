// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{str::FromStr, time::Duration};

use dealcache_memory::{DEFAULT_MAX_SIZE, DEFAULT_TTL};
use dealcache_redis::RedisConfig;
use dealcache_refresh::RefreshConfig;
use serde::Deserialize;

use crate::{Error, Result};

/// Configuration of the memory tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoryConfig {
    /// Maximum number of entries.
    pub max_size: usize,
    /// Default TTL in seconds.
    pub ttl_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl MemoryConfig {
    /// Default TTL of the memory tier.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Configuration for every tier of a [`CacheManager`](crate::CacheManager).
///
/// Deserializes from camelCase JSON with every field optional, or can be read from
/// `DEALCACHE_*` environment variables with [`CacheConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Memory tier.
    pub memory: MemoryConfig,
    /// Distributed tier. Disabled unless a URL is configured.
    pub redis: RedisConfig,
    /// Materialized-view tier.
    pub materialized: RefreshConfig,
    /// TTL applied by `set` and `get_or_compute` when the caller passes none.
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            redis: RedisConfig::default(),
            materialized: RefreshConfig::default(),
            default_ttl_secs: DEFAULT_TTL.as_secs(),
        }
    }
}

impl CacheConfig {
    /// Default TTL for writes without an explicit TTL.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Reads overrides from the process environment.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `DEALCACHE_REDIS_URL` | `redis.url`; also enables the tier |
    /// | `DEALCACHE_REDIS_ENABLED` | `redis.enabled` |
    /// | `DEALCACHE_REDIS_PREFIX` | `redis.key_prefix` |
    /// | `DEALCACHE_L1_MAX_SIZE` | `memory.max_size` |
    /// | `DEALCACHE_L1_TTL_SECS` | `memory.ttl_secs` |
    /// | `DEALCACHE_L3_ENABLED` | `materialized.enabled` |
    /// | `DEALCACHE_L3_REFRESH_SECS` | `materialized.refresh_interval_secs` |
    /// | `DEALCACHE_DEFAULT_TTL_SECS` | `default_ttl_secs` |
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable holds an unparsable value.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a variable holds an unparsable value.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("DEALCACHE_REDIS_URL").filter(|url| !url.is_empty()) {
            config.redis.url = url;
            config.redis.enabled = true;
        }
        if let Some(enabled) = parse(&lookup, "DEALCACHE_REDIS_ENABLED")? {
            config.redis.enabled = enabled;
        }
        if let Some(prefix) = lookup("DEALCACHE_REDIS_PREFIX") {
            config.redis.key_prefix = prefix;
        }
        if let Some(max_size) = parse(&lookup, "DEALCACHE_L1_MAX_SIZE")? {
            config.memory.max_size = max_size;
        }
        if let Some(ttl) = parse(&lookup, "DEALCACHE_L1_TTL_SECS")? {
            config.memory.ttl_secs = ttl;
        }
        if let Some(enabled) = parse(&lookup, "DEALCACHE_L3_ENABLED")? {
            config.materialized.enabled = enabled;
        }
        if let Some(interval) = parse(&lookup, "DEALCACHE_L3_REFRESH_SECS")? {
            config.materialized.refresh_interval_secs = interval;
        }
        if let Some(ttl) = parse(&lookup, "DEALCACHE_DEFAULT_TTL_SECS")? {
            config.default_ttl_secs = ttl;
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>> {
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| Error::Config {
                name: name.to_string(),
                value,
            })
        })
        .transpose()
}
