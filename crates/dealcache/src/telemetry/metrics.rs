// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use dealcache_tier::Layer;
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter},
};

use crate::telemetry::{CacheActivity, CacheOperation, attributes};

const EVENT_COUNT_NAME: &str = "dealcache.event.count";
const OPERATION_DURATION_NAME: &str = "dealcache.operation.duration";
const SIZE_NAME: &str = "dealcache.size";

#[derive(Debug, Clone)]
pub(crate) struct Instruments {
    events: Counter<u64>,
    duration: Histogram<f64>,
    size: Gauge<u64>,
}

impl Instruments {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events: meter
                .u64_counter(EVENT_COUNT_NAME)
                .with_description("Cache events")
                .with_unit("{event}")
                .build(),
            duration: meter
                .f64_histogram(OPERATION_DURATION_NAME)
                .with_description("Cache operation duration")
                .with_unit("s")
                .build(),
            size: meter
                .u64_gauge(SIZE_NAME)
                .with_description("Number of entries in a tier")
                .with_unit("{entry}")
                .build(),
        }
    }

    pub fn record(&self, layer: Option<Layer>, operation: CacheOperation, activity: CacheActivity, duration: Option<Duration>) {
        let attrs = [
            KeyValue::new(attributes::CACHE_LAYER, layer.map_or("all", Layer::as_str)),
            KeyValue::new(attributes::CACHE_OPERATION, operation.as_str()),
            KeyValue::new(attributes::CACHE_ACTIVITY, activity.as_str()),
        ];

        self.events.add(1, &attrs);
        if let Some(duration) = duration {
            self.duration.record(duration.as_secs_f64(), &attrs);
        }
    }

    pub fn record_size(&self, layer: Layer, size: u64) {
        self.size.record(size, &[KeyValue::new(attributes::CACHE_LAYER, layer.as_str())]);
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::metrics::MeterProvider;

    use super::*;
    use crate::telemetry::{CacheTelemetry, testing::MetricTester};

    #[test]
    fn events_carry_layer_operation_and_activity() {
        let tester = MetricTester::new();
        let telemetry = CacheTelemetry::with_meter(&tester.meter_provider().meter("dealcache"));

        telemetry.record(
            Some(Layer::Memory),
            CacheOperation::Get,
            CacheActivity::Hit,
            Some(Duration::from_micros(40)),
        );

        tester.assert_attributes_contain(&[
            KeyValue::new(attributes::CACHE_LAYER, "l1"),
            KeyValue::new(attributes::CACHE_OPERATION, "cache.get"),
            KeyValue::new(attributes::CACHE_ACTIVITY, "cache.hit"),
        ]);
    }

    #[test]
    fn size_gauge_is_labelled_by_layer() {
        let tester = MetricTester::new();
        let telemetry = CacheTelemetry::with_meter(&tester.meter_provider().meter("dealcache"));

        telemetry.record_size(Layer::Materialized, 7);

        tester.assert_attributes_contain(&[KeyValue::new(attributes::CACHE_LAYER, "l3")]);
    }
}
