// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Daily request quotas for paid upstream providers.
//!
//! The limiter is a gate: callers consult it before an external call and it never
//! performs the call itself. Counters live in a [`QuotaStore`] under
//! `ratelimit:<provider>:<YYYY-MM-DD>` and expire at the next UTC midnight, so a
//! window never spans two days. If the store fails the limiter lets the request
//! through and logs a warning.

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use dealcache_tier::Clock;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

mod quota;
mod usage;

pub use quota::{MemoryQuotaStore, QuotaStore};
pub use usage::{MILESTONES, TracingUsageLog, UsageEvent, UsageLog};

/// Daily quota of one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderQuota {
    /// Provider name, e.g. `keepa`.
    pub name: String,
    /// Requests allowed per UTC day.
    pub daily_limit: u64,
}

impl ProviderQuota {
    /// Creates a quota.
    #[must_use]
    pub fn new(name: impl Into<String>, daily_limit: u64) -> Self {
        Self {
            name: name.into(),
            daily_limit,
        }
    }
}

/// Quotas known to a [`RateLimiter`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// One entry per provider.
    pub providers: Vec<ProviderQuota>,
}

impl RateLimitConfig {
    /// Adds a provider.
    #[must_use]
    pub fn provider(mut self, name: impl Into<String>, daily_limit: u64) -> Self {
        self.providers.push(ProviderQuota::new(name, daily_limit));
        self
    }
}

/// A provider's counter for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitWindow {
    /// Provider name.
    pub provider: String,
    /// UTC day, `YYYY-MM-DD`.
    pub day_key: String,
    /// Requests recorded in this window.
    pub request_count: u64,
    /// Daily quota.
    pub daily_limit: u64,
    /// Next UTC midnight.
    pub resets_at: DateTime<Utc>,
}

/// Remaining quota of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    /// Provider name.
    pub provider: String,
    /// UTC day, `YYYY-MM-DD`.
    pub day_key: String,
    /// Requests recorded today.
    pub used: u64,
    /// `max(0, daily_limit - used)`.
    pub remaining: u64,
    /// Daily quota.
    pub daily_limit: u64,
    /// Next UTC midnight.
    pub resets_at: DateTime<Utc>,
}

impl RateLimitInfo {
    /// Returns `true` when no request is left today.
    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.remaining == 0
    }
}

/// A provider's quota is spent for today.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider `{provider}` used its daily quota of {limit}; retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    /// Provider name.
    pub provider: String,
    /// Daily quota.
    pub limit: u64,
    /// Time until the window resets.
    pub retry_after: Duration,
    /// Next UTC midnight.
    pub resets_at: DateTime<Utc>,
}

/// Gates calls to paid providers by daily quota.
///
/// Cloning yields another handle to the same limiter.
///
/// # Examples
///
/// ```
/// use dealcache::rate_limit::{RateLimitConfig, RateLimiter};
///
/// # futures::executor::block_on(async {
/// let limiter = RateLimiter::new(RateLimitConfig::default().provider("keepa", 2));
///
/// limiter.acquire("keepa").await.unwrap();
/// limiter.acquire("keepa").await.unwrap();
///
/// let error = limiter.acquire("keepa").await.unwrap_err();
/// assert_eq!(error.as_rate_limited().map(|e| e.limit), Some(2));
/// # });
/// ```
#[derive(Debug)]
pub struct RateLimiter<Q = MemoryQuotaStore, L = TracingUsageLog> {
    inner: Arc<Inner<Q, L>>,
}

#[derive(Debug)]
struct Inner<Q, L> {
    quotas: HashMap<String, u64>,
    store: Q,
    usage: L,
    clock: Clock,
}

impl<Q, L> Clone for RateLimiter<Q, L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl RateLimiter {
    /// A limiter counting in process memory and auditing to `tracing`.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self::builder(config).build()
    }

    /// Starts a builder with the in-memory store and tracing audit log.
    #[must_use]
    pub fn builder(config: RateLimitConfig) -> RateLimiterBuilder {
        RateLimiterBuilder {
            config,
            store: MemoryQuotaStore::new(),
            usage: TracingUsageLog,
            clock: Clock::system(),
        }
    }
}

/// Builder for [`RateLimiter`].
#[derive(Debug)]
pub struct RateLimiterBuilder<Q = MemoryQuotaStore, L = TracingUsageLog> {
    config: RateLimitConfig,
    store: Q,
    usage: L,
    clock: Clock,
}

impl<Q, L> RateLimiterBuilder<Q, L> {
    /// Uses another counter store, such as a [`RedisCache`](dealcache_redis::RedisCache).
    #[must_use]
    pub fn store<Q2: QuotaStore>(self, store: Q2) -> RateLimiterBuilder<Q2, L> {
        RateLimiterBuilder {
            config: self.config,
            store,
            usage: self.usage,
            clock: self.clock,
        }
    }

    /// Uses another audit log.
    #[must_use]
    pub fn usage_log<L2: UsageLog>(self, usage: L2) -> RateLimiterBuilder<Q, L2> {
        RateLimiterBuilder {
            config: self.config,
            store: self.store,
            usage,
            clock: self.clock,
        }
    }

    /// Reads the current day from `clock`.
    #[must_use]
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the limiter.
    #[must_use]
    pub fn build(self) -> RateLimiter<Q, L> {
        let quotas = self
            .config
            .providers
            .into_iter()
            .map(|quota| (quota.name, quota.daily_limit))
            .collect();

        RateLimiter {
            inner: Arc::new(Inner {
                quotas,
                store: self.store,
                usage: self.usage,
                clock: self.clock,
            }),
        }
    }
}

/// The UTC day containing `now` and the midnight that ends it.
fn day_window(now: DateTime<Utc>) -> (String, DateTime<Utc>) {
    let today = now.date_naive();
    let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(NaiveDate::MAX);
    (today.format("%Y-%m-%d").to_string(), tomorrow.and_time(NaiveTime::MIN).and_utc())
}

fn counter_key(provider: &str, day_key: &str) -> String {
    format!("ratelimit:{provider}:{day_key}")
}

impl<Q, L> RateLimiter<Q, L>
where
    Q: QuotaStore,
    L: UsageLog,
{
    /// Configured provider names, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.quotas.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    fn quota(&self, provider: &str) -> Result<u64> {
        self.inner
            .quotas
            .get(provider)
            .copied()
            .ok_or_else(|| Error::UnknownProvider(provider.to_string()))
    }

    /// Counts one request against today's window.
    ///
    /// Crossing 50, 75, 90 or 100 percent of the quota writes a [`UsageEvent`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProvider`] for providers without a quota.
    pub async fn record_request(&self, provider: &str) -> Result<RateLimitWindow> {
        let daily_limit = self.quota(provider)?;
        let now = self.inner.clock.utc_now();
        let (day_key, resets_at) = day_window(now);
        let key = counter_key(provider, &day_key);

        let request_count = match self.inner.store.increment(&key, resets_at.into()).await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(provider, error = %error, "quota store unavailable; request not counted");
                0
            }
        };

        for milestone in usage::crossed(request_count.saturating_sub(1), request_count, daily_limit) {
            let event = UsageEvent {
                provider: provider.to_string(),
                day_key: day_key.clone(),
                request_count,
                daily_limit,
                milestone,
                recorded_at: now,
            };
            if let Err(error) = self.inner.usage.record(event).await {
                tracing::warn!(provider, milestone, error = %error, "usage audit failed");
            }
        }

        Ok(RateLimitWindow {
            provider: provider.to_string(),
            day_key,
            request_count,
            daily_limit,
            resets_at,
        })
    }

    /// Reports today's remaining quota.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProvider`] for providers without a quota.
    pub async fn get_rate_limit_info(&self, provider: &str) -> Result<RateLimitInfo> {
        let daily_limit = self.quota(provider)?;
        let (day_key, resets_at) = day_window(self.inner.clock.utc_now());

        let used = match self.inner.store.count(&counter_key(provider, &day_key)).await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(provider, error = %error, "quota store unavailable; assuming unused quota");
                0
            }
        };

        Ok(RateLimitInfo {
            provider: provider.to_string(),
            day_key,
            used,
            remaining: daily_limit.saturating_sub(used),
            daily_limit,
            resets_at,
        })
    }

    /// Reports every configured provider, sorted by name.
    pub async fn get_all_rate_limit_info(&self) -> Vec<RateLimitInfo> {
        let mut all = Vec::with_capacity(self.inner.quotas.len());
        for provider in self.providers() {
            if let Ok(info) = self.get_rate_limit_info(&provider).await {
                all.push(info);
            }
        }
        all
    }

    /// Checks that a request is allowed right now.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimited`] with the time until midnight UTC when the quota
    /// is spent, or [`Error::UnknownProvider`] for providers without a quota.
    pub async fn check_limit(&self, provider: &str) -> Result<RateLimitInfo> {
        let info = self.get_rate_limit_info(provider).await?;
        if !info.is_limited() {
            return Ok(info);
        }

        let retry_after = (info.resets_at - self.inner.clock.utc_now()).to_std().unwrap_or(Duration::ZERO);
        tracing::debug!(provider, limit = info.daily_limit, ?retry_after, "provider rate limited");
        Err(Error::RateLimited(RateLimitExceeded {
            provider: info.provider,
            limit: info.daily_limit,
            retry_after,
            resets_at: info.resets_at,
        }))
    }

    /// Checks the quota and, when allowed, records the request.
    ///
    /// Concurrent callers may overshoot the quota by the number of racing requests.
    ///
    /// # Errors
    ///
    /// As [`check_limit`](Self::check_limit).
    pub async fn acquire(&self, provider: &str) -> Result<RateLimitWindow> {
        self.check_limit(provider).await?;
        self.record_request(provider).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn day_window_ends_at_next_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 59).unwrap();
        let (day, resets_at) = day_window(now);
        assert_eq!(day, "2026-12-31");
        assert_eq!(resets_at, Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn midnight_belongs_to_the_new_day() {
        let (day, resets_at) = day_window(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(day, "2026-03-01");
        assert_eq!(resets_at, Utc.with_ymd_and_hms(2026, 3, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn counter_key_format() {
        assert_eq!(counter_key("keepa", "2026-03-01"), "ratelimit:keepa:2026-03-01");
    }

    #[tokio::test]
    async fn unknown_provider_is_rejected() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(matches!(limiter.record_request("nobody").await, Err(Error::UnknownProvider(p)) if p == "nobody"));
        assert!(matches!(limiter.check_limit("nobody").await, Err(Error::UnknownProvider(_))));
    }

    #[tokio::test]
    async fn remaining_never_negative() {
        let limiter = RateLimiter::new(RateLimitConfig::default().provider("p", 1));
        limiter.record_request("p").await.unwrap();
        limiter.record_request("p").await.unwrap();

        let info = limiter.get_rate_limit_info("p").await.unwrap();
        assert_eq!(info.used, 2);
        assert_eq!(info.remaining, 0);
        assert!(info.is_limited());
    }
}
