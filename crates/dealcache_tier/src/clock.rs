// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Time source shared by every tier.

use std::time::{Instant, SystemTime};

#[cfg(any(feature = "test-util", test))]
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
#[cfg(any(feature = "test-util", test))]
use parking_lot::Mutex;

/// Provides the current time to tiers, rate windows and refresh loops.
///
/// Production code uses [`Clock::system`]. Tests build a clock from a
/// [`ClockControl`] so that expiry and day boundaries can be reached without sleeping.
///
/// # Examples
///
/// ```
/// use dealcache_tier::Clock;
///
/// let clock = Clock::system();
/// let earlier = clock.system_time();
/// assert!(clock.system_time() >= earlier);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Clock(ClockState);

#[derive(Debug, Clone, Default)]
enum ClockState {
    #[default]
    System,
    #[cfg(any(feature = "test-util", test))]
    Controlled(ClockControl),
}

impl Clock {
    /// Creates a clock that reads the operating system time.
    #[must_use]
    pub fn system() -> Self {
        Self(ClockState::System)
    }

    /// Creates a clock frozen at the current system time.
    ///
    /// Equivalent to `ClockControl::new().to_clock()`.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen() -> Self {
        ClockControl::new().to_clock()
    }

    /// Creates a clock frozen at the given time.
    #[cfg(any(feature = "test-util", test))]
    #[must_use]
    pub fn new_frozen_at(time: impl Into<SystemTime>) -> Self {
        ClockControl::new_at(time).to_clock()
    }

    /// Returns the current wall-clock time.
    #[must_use]
    pub fn system_time(&self) -> SystemTime {
        match &self.0 {
            ClockState::System => SystemTime::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockState::Controlled(control) => control.system_time(),
        }
    }

    /// Returns the current wall-clock time as a UTC timestamp.
    #[must_use]
    pub fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Returns a monotonic instant, used for latency measurements.
    #[must_use]
    pub fn instant(&self) -> Instant {
        match &self.0 {
            ClockState::System => Instant::now(),
            #[cfg(any(feature = "test-util", test))]
            ClockState::Controlled(control) => control.instant(),
        }
    }
}

/// Manual control over the time observed by a [`Clock`].
///
/// Every clock created from the same control observes the same time. Time only moves
/// when [`advance`](Self::advance) or [`advance_to`](Self::advance_to) is called.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use dealcache_tier::ClockControl;
///
/// let control = ClockControl::new();
/// let clock = control.to_clock();
/// let before = clock.system_time();
///
/// control.advance(Duration::from_secs(5));
/// assert_eq!(clock.system_time(), before + Duration::from_secs(5));
/// ```
#[cfg(any(feature = "test-util", test))]
#[derive(Debug, Clone)]
pub struct ClockControl {
    state: Arc<Mutex<State>>,
}

#[cfg(any(feature = "test-util", test))]
#[derive(Debug)]
struct State {
    system_time: SystemTime,
    instant: Instant,
}

#[cfg(any(feature = "test-util", test))]
impl Default for ClockControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(feature = "test-util", test))]
impl ClockControl {
    /// Creates a control starting at the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                system_time: SystemTime::now(),
                instant: Instant::now(),
            })),
        }
    }

    /// Creates a control starting at the given time.
    #[must_use]
    pub fn new_at(time: impl Into<SystemTime>) -> Self {
        let this = Self::new();
        this.state.lock().system_time = time.into();
        this
    }

    /// Returns a clock that observes this control.
    #[must_use]
    pub fn to_clock(&self) -> Clock {
        Clock(ClockState::Controlled(self.clone()))
    }

    /// Moves time forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock();
        state.system_time += duration;
        state.instant += duration;
    }

    /// Moves time forward by the given number of milliseconds.
    pub fn advance_millis(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Moves time to the given wall-clock time.
    ///
    /// Moving backwards only affects the wall clock; instants stay monotonic.
    pub fn advance_to(&self, time: impl Into<SystemTime>) {
        let time = time.into();
        let mut state = self.state.lock();
        if let Ok(forward) = time.duration_since(state.system_time) {
            state.instant += forward;
        }
        state.system_time = time;
    }

    fn system_time(&self) -> SystemTime {
        self.state.lock().system_time
    }

    fn instant(&self) -> Instant {
        self.state.lock().instant
    }
}

#[cfg(any(feature = "test-util", test))]
impl From<ClockControl> for Clock {
    fn from(control: ClockControl) -> Self {
        control.to_clock()
    }
}

#[cfg(any(feature = "test-util", test))]
impl From<&ClockControl> for Clock {
    fn from(control: &ClockControl) -> Self {
        control.to_clock()
    }
}
