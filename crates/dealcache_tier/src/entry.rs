// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    ops::Deref,
    time::{Duration, SystemTime},
};

use crate::Layer;

/// A cached value with the moment it was stored and the moment it expires.
///
/// Every entry carries an expiry: there is no way to build one without a TTL.
/// The layer tag records which tier produced the entry.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use dealcache_tier::{CacheEntry, Layer};
///
/// let now = SystemTime::now();
/// let entry = CacheEntry::new("deal", now, Duration::from_secs(60));
///
/// assert_eq!(*entry, "deal");
/// assert_eq!(entry.layer(), Layer::Memory);
/// assert!(!entry.is_expired_at(now));
/// assert_eq!(entry.remaining_ttl(now), Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry<V> {
    value: V,
    stored_at: SystemTime,
    expires_at: SystemTime,
    layer: Layer,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stored at `stored_at` that expires `ttl` later.
    ///
    /// The layer defaults to [`Layer::Memory`]; tiers retag entries they return.
    #[must_use]
    pub fn new(value: V, stored_at: SystemTime, ttl: Duration) -> Self {
        let expires_at = stored_at.checked_add(ttl).unwrap_or(stored_at);
        Self {
            value,
            stored_at,
            expires_at,
            layer: Layer::Memory,
        }
    }

    /// Rebuilds an entry from previously persisted timestamps.
    #[must_use]
    pub fn from_parts(value: V, stored_at: SystemTime, expires_at: SystemTime) -> Self {
        Self {
            value,
            stored_at,
            expires_at: expires_at.max(stored_at),
            layer: Layer::Memory,
        }
    }

    /// Returns the entry tagged with the given layer.
    #[must_use]
    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    /// Returns a reference to the cached value.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry and returns the value.
    #[must_use]
    pub fn into_value(self) -> V {
        self.value
    }

    /// When the entry was written.
    #[must_use]
    pub fn stored_at(&self) -> SystemTime {
        self.stored_at
    }

    /// When the entry stops being served.
    #[must_use]
    pub fn expires_at(&self) -> SystemTime {
        self.expires_at
    }

    /// The tier this entry was read from.
    #[must_use]
    pub fn layer(&self) -> Layer {
        self.layer
    }

    /// The full lifetime the entry was stored with.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.expires_at.duration_since(self.stored_at).unwrap_or_default()
    }

    /// Returns `true` once `now` has reached the expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Returns the time left before expiry, or `None` if already expired.
    #[must_use]
    pub fn remaining_ttl(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at.duration_since(now).ok().filter(|left| !left.is_zero())
    }

    /// Maps the value, keeping timestamps and layer.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            stored_at: self.stored_at,
            expires_at: self.expires_at,
            layer: self.layer,
        }
    }
}

impl<V> Deref for CacheEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}
