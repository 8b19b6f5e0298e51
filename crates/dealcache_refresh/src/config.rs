// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde::Deserialize;

/// Configuration of the materialized-view tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshConfig {
    /// Turns the tier on.
    pub enabled: bool,
    /// Seconds between refresh passes.
    pub refresh_interval_secs: u64,
    /// TTL of stored views in seconds. Defaults to twice the interval and is never
    /// shorter than one interval.
    pub ttl_secs: Option<u64>,
    /// Upper bound on stored views.
    pub max_entries: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_interval_secs: 300,
            ttl_secs: None,
            max_entries: 10_000,
        }
    }
}

impl RefreshConfig {
    /// A disabled configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Time between refresh passes, at least one second.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    /// Lifetime of stored views.
    #[must_use]
    pub fn view_ttl(&self) -> Duration {
        let interval = self.refresh_interval();
        self.ttl_secs
            .map_or(interval * 2, |secs| Duration::from_secs(secs).max(interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_defaults_to_twice_interval() {
        let config = RefreshConfig {
            refresh_interval_secs: 60,
            ..RefreshConfig::default()
        };
        assert_eq!(config.view_ttl(), Duration::from_secs(120));
    }

    #[test]
    fn ttl_never_shorter_than_interval() {
        let config = RefreshConfig {
            refresh_interval_secs: 60,
            ttl_secs: Some(10),
            ..RefreshConfig::default()
        };
        assert_eq!(config.view_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn zero_interval_is_raised() {
        let config: RefreshConfig = serde_json::from_str(r#"{"refreshIntervalSecs": 0}"#).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert!(config.enabled);
    }
}
