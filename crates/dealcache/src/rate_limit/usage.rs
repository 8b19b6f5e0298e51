// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::StoreError;

/// Percentages of a daily quota that are audited.
pub const MILESTONES: [u8; 4] = [50, 75, 90, 100];

/// A provider crossed a usage milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    /// Provider name.
    pub provider: String,
    /// UTC day, `YYYY-MM-DD`.
    pub day_key: String,
    /// Requests recorded so far today.
    pub request_count: u64,
    /// Daily quota.
    pub daily_limit: u64,
    /// Milestone that was crossed, in percent.
    pub milestone: u8,
    /// When the crossing request was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Audit sink for provider usage.
///
/// Called best-effort: failures are logged by the limiter and never reach callers.
pub trait UsageLog: Send + Sync {
    /// Persists one event.
    fn record(&self, event: UsageEvent) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// [`UsageLog`] writing events to `tracing` at `INFO`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingUsageLog;

impl UsageLog for TracingUsageLog {
    async fn record(&self, event: UsageEvent) -> Result<(), StoreError> {
        tracing::info!(
            provider = %event.provider,
            day = %event.day_key,
            count = event.request_count,
            limit = event.daily_limit,
            milestone = event.milestone,
            "provider usage milestone reached"
        );
        Ok(())
    }
}

/// Milestones crossed by moving from `before` to `after` requests.
pub(crate) fn crossed(before: u64, after: u64, daily_limit: u64) -> impl Iterator<Item = u8> {
    MILESTONES.into_iter().filter(move |&percent| {
        let threshold = milestone_threshold(daily_limit, u64::from(percent));
        threshold > 0 && before < threshold && after >= threshold
    })
}

/// `ceil(daily_limit * percent / 100)` without overflowing for large limits.
fn milestone_threshold(daily_limit: u64, percent: u64) -> u64 {
    (daily_limit / 100) * percent + ((daily_limit % 100) * percent).div_ceil(100)
}
