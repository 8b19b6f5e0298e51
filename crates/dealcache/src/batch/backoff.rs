// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt::Debug, time::Duration};

use super::BatchOptions;

/// Width of the jitter band relative to the delay.
const JITTER_FACTOR: f64 = 0.5;

/// Source of randomness for jitter.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Fixed(f64),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Fixed(_) => write!(f, "Fixed"),
        }
    }
}

impl Rnd {
    fn next_f64(&self) -> f64 {
        match self {
            Self::Real => fastrand::f64(),
            #[cfg(test)]
            Self::Fixed(value) => *value,
        }
    }
}

/// Exponential delays between retries of a failed chunk.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
    rnd: Rnd,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(&BatchOptions::default())
    }
}

impl Backoff {
    pub fn new(options: &BatchOptions) -> Self {
        Self {
            base_delay: options.base_delay(),
            max_delay: options.max_delay(),
            jitter: options.jitter,
            rnd: Rnd::default(),
        }
    }

    #[cfg(test)]
    pub fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// Delay before retry number `attempt + 1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let delay = duration_mul_pow2(self.base_delay, attempt);
        let delay = if self.jitter { apply_jitter(delay, &self.rnd) } else { delay };
        delay.min(self.max_delay)
    }
}

fn duration_mul_pow2(base: Duration, attempt: u32) -> Duration {
    1_u32
        .checked_shl(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}

/// Spreads `delay` uniformly over `[0.75 * delay, 1.25 * delay]`.
fn apply_jitter(delay: Duration, rnd: &Rnd) -> Duration {
    let ms = delay.as_secs_f64() * 1000.0;
    let offset = (ms * JITTER_FACTOR) / 2.0;
    let random_delay = (ms * JITTER_FACTOR).mul_add(rnd.next_f64(), -offset);

    secs_to_duration_saturating((ms + random_delay) / 1000.0)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backoff(jitter: bool) -> Backoff {
        Backoff::new(&BatchOptions {
            jitter,
            ..BatchOptions::default()
        })
    }

    #[test]
    fn doubles_until_clamped() {
        let backoff = backoff(false);
        let delays: Vec<u128> = (0..8).map(|attempt| backoff.delay(attempt).as_millis()).collect();
        assert_eq!(delays, [100, 200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[test]
    fn huge_attempts_saturate() {
        assert_eq!(backoff(false).delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_in_band() {
        let low = backoff(true).with_rnd(Rnd::Fixed(0.0));
        let high = backoff(true).with_rnd(Rnd::Fixed(1.0));

        assert!((low.delay(1).as_secs_f64() - 0.15).abs() < 1e-6);
        assert!((high.delay(1).as_secs_f64() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn zero_base_never_waits() {
        let backoff = Backoff::new(&BatchOptions {
            base_delay_ms: 0,
            ..BatchOptions::default()
        });
        assert_eq!(backoff.delay(3), Duration::ZERO);
    }
}
