//! Virtual time for the simulation.
//!
//! `SimTime` is a nanosecond-resolution timestamp on the simulated
//! timeline. It is owned by the environment and advances only when a
//! movement is dequeued; nothing in the simulator reads the wall clock.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A point on the simulated timeline, in nanoseconds since the Unix epoch.
///
/// Nanosecond resolution matters: the movement queue forbids two movements
/// at the same instant, and the models stagger bursts of movements by 1 ns
/// to stay within that rule.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SimTime(i64);

impl SimTime {
    /// The Unix epoch, the conventional scenario start.
    pub const UNIX_EPOCH: SimTime = SimTime(0);

    /// Build a timestamp from nanoseconds since the Unix epoch.
    pub fn from_nanos(nanos: i64) -> Self {
        SimTime(nanos)
    }

    /// Build a timestamp from whole seconds since the Unix epoch.
    pub fn from_unix_secs(secs: i64) -> Self {
        SimTime(secs * 1_000_000_000)
    }

    /// Nanoseconds since the Unix epoch.
    pub fn nanos(&self) -> i64 {
        self.0
    }

    /// Elapsed simulated time since `earlier`, saturating to zero.
    pub fn duration_since(&self, earlier: SimTime) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0).max(0) as u64)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0 + rhs.as_nanos() as i64)
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.as_nanos() as i64;
    }
}

impl Sub<SimTime> for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Duration {
        self.duration_since(rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.div_euclid(1_000_000_000);
        let nanos = self.0.rem_euclid(1_000_000_000);
        write!(f, "{secs}.{nanos:09}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_duration_advances_nanos() {
        let t = SimTime::UNIX_EPOCH + Duration::from_millis(200);
        assert_eq!(t.nanos(), 200_000_000);

        let t = t + Duration::from_nanos(1);
        assert_eq!(t.nanos(), 200_000_001);
    }

    #[test]
    fn duration_since_saturates() {
        let early = SimTime::from_unix_secs(1);
        let late = SimTime::from_unix_secs(5);

        assert_eq!(late.duration_since(early), Duration::from_secs(4));
        assert_eq!(early.duration_since(late), Duration::ZERO);
    }

    #[test]
    fn ordering_follows_nanos() {
        let a = SimTime::from_nanos(100);
        let b = SimTime::from_nanos(101);
        assert!(a < b);
    }

    #[test]
    fn display_is_seconds_with_nano_precision() {
        let t = SimTime::from_unix_secs(11) + Duration::from_nanos(2);
        assert_eq!(t.to_string(), "11.000000002s");
    }
}
