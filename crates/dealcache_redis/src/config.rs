// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::Deserialize;

/// Configuration of the distributed tier.
///
/// All fields have defaults, so a partial document deserializes:
///
/// ```
/// use dealcache_redis::RedisConfig;
///
/// let config: RedisConfig = serde_json::from_str(r#"{ "url": "redis://cache:6379", "enabled": true }"#).unwrap();
/// assert!(config.enabled);
/// assert_eq!(config.key_prefix, "dealcache:");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisConfig {
    /// Connection URL, for example `redis://127.0.0.1:6379/0`.
    pub url: String,
    /// Turns the tier on. A disabled tier is a permanent clean miss.
    pub enabled: bool,
    /// TTL in seconds applied when an entry is written without one.
    pub ttl_secs: u64,
    /// Namespace prepended to every key.
    pub key_prefix: String,
    /// Budget for a single command, in milliseconds.
    pub op_timeout_ms: u64,
    /// Budget for opening a connection, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Budget for a whole `SCAN` walk, in milliseconds.
    pub scan_timeout_ms: u64,
    /// Minimum wait between connection attempts after a failure, in milliseconds.
    pub reconnect_backoff_ms: u64,
    /// `COUNT` hint passed to `SCAN`.
    pub scan_count: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            enabled: false,
            ttl_secs: 3_600,
            key_prefix: "dealcache:".to_string(),
            op_timeout_ms: 250,
            connect_timeout_ms: 1_000,
            scan_timeout_ms: 5_000,
            reconnect_backoff_ms: 5_000,
            scan_count: 200,
        }
    }
}

impl RedisConfig {
    /// An enabled configuration for the given URL.
    #[must_use]
    pub fn enabled(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Default entry TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Per-command timeout.
    #[must_use]
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Connection timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Timeout for a full `SCAN` walk.
    #[must_use]
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    /// Wait between reconnect attempts.
    #[must_use]
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}
