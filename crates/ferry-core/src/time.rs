//! Simulated time
//!
//! - [`SimTime`]: seconds since the start of a run
//! - [`Clock`]: time abstraction so routing code never reads wall time

use std::cell::Cell;
use std::fmt;
use std::ops::Add;

use serde::{Deserialize, Serialize};

/// A point in simulated time, in seconds since the start of the run
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// Start of a run
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a time from seconds
    pub const fn from_secs(secs: f64) -> Self {
        Self(secs)
    }

    /// Seconds since the start of the run
    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// Seconds elapsed since `earlier`, zero if `earlier` is in the future
    pub fn since(self, earlier: SimTime) -> f64 {
        (self.0 - earlier.0).max(0.0)
    }

    /// The later of two times
    pub fn max(self, other: SimTime) -> SimTime {
        if other.0 > self.0 { other } else { self }
    }

    /// Total order, usable as a sort key
    pub fn total_cmp(&self, other: &SimTime) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for SimTime {
    type Output = SimTime;

    fn add(self, secs: f64) -> SimTime {
        SimTime(self.0 + secs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0)
    }
}

/// Monotonic time source
pub trait Clock {
    /// Current simulated time
    fn now(&self) -> SimTime;
}

/// Clock advanced explicitly by the event loop
///
/// Attempts to move it backwards are ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<SimTime>,
}

impl ManualClock {
    /// Create a clock at the start of the run
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward to `t`
    ///
    /// Returns `false` if `t` lies in the past and the clock was left alone.
    pub fn advance_to(&self, t: SimTime) -> bool {
        if t < self.now.get() {
            return false;
        }
        self.now.set(t);
        true
    }

    /// Move the clock forward by `secs`
    pub fn advance_by(&self, secs: f64) {
        self.now.set(self.now.get() + secs.max(0.0));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SimTime {
        self.now.get()
    }
}
