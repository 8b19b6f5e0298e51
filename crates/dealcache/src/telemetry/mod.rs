// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured events for cache operations, with optional OpenTelemetry instruments.
//!
//! Every manager operation emits a `cache.event` tracing event carrying the tier,
//! operation, activity and duration. With the `metrics` feature the same events also
//! feed a counter and a duration histogram, and tier sizes feed a gauge.

use std::time::Duration;

use dealcache_tier::Layer;
use tracing::Level;

pub(crate) mod attributes;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    Set,
    Compute,
    Delete,
    Invalidate,
    Clear,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::Set => "cache.set",
            Self::Compute => "cache.compute",
            Self::Delete => "cache.delete",
            Self::Invalidate => "cache.invalidate",
            Self::Clear => "cache.clear",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    Hit,
    Miss,
    Promoted,
    Inserted,
    Computed,
    Invalidated,
    Degraded,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hit => "cache.hit",
            Self::Miss => "cache.miss",
            Self::Promoted => "cache.promoted",
            Self::Inserted => "cache.inserted",
            Self::Computed => "cache.computed",
            Self::Invalidated => "cache.invalidated",
            Self::Degraded => "cache.degraded",
            Self::Error => "cache.error",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Hit | Self::Miss => Level::DEBUG,
            Self::Promoted | Self::Inserted | Self::Computed | Self::Invalidated => Level::INFO,
            Self::Degraded => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }
}

/// Records cache events as logs and, when configured, as metrics.
#[derive(Debug, Clone, Default)]
pub(crate) struct CacheTelemetry {
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<metrics::Instruments>,
}

impl CacheTelemetry {
    #[cfg(any(feature = "metrics", test))]
    pub fn with_meter(meter: &opentelemetry::metrics::Meter) -> Self {
        Self {
            instruments: Some(metrics::Instruments::new(meter)),
        }
    }

    pub fn record(&self, layer: Option<Layer>, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.instruments {
            instruments.record(layer, operation, activity, duration);
        }

        emit(layer, operation, activity, duration);
    }

    #[cfg_attr(not(any(feature = "metrics", test)), expect(unused_variables, reason = "only feeds the size gauge"))]
    pub fn record_size(&self, layer: Layer, size: u64) {
        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.instruments {
            instruments.record_size(layer, size);
        }
    }
}

fn emit(layer: Option<Layer>, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
    let layer = layer.map_or("all", Layer::as_str);
    let op = operation.as_str();
    let ev = activity.as_str();
    let duration_ns = duration.map(|d| d.as_nanos());

    // The level of a tracing event must be a constant.
    macro_rules! emit_event {
        ($level:ident) => {
            tracing::$level!(
                cache.layer = layer,
                cache.operation = op,
                cache.activity = ev,
                cache.duration_ns = ?duration_ns,
                "cache.event"
            )
        };
    }

    match activity.level() {
        Level::ERROR => emit_event!(error),
        Level::WARN => emit_event!(warn),
        Level::INFO => emit_event!(info),
        _ => emit_event!(debug),
    }
}
