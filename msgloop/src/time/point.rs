use crate::time::{TimeDelta, clock_now};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A point on the process monotonic clock, in nanoseconds from an arbitrary
/// epoch.
///
/// Not comparable across processes or reboots. Arithmetic saturates at
/// [`TimePoint::min`] and [`TimePoint::max`], so `now() + TimeDelta::max()`
/// is `TimePoint::max()`.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimePoint(i64);

impl TimePoint {
    /// Reads the current clock source.
    pub fn now() -> Self {
        clock_now()
    }

    pub const fn min() -> Self {
        TimePoint(i64::MIN)
    }

    pub const fn max() -> Self {
        TimePoint(i64::MAX)
    }

    pub const fn from_epoch_delta(delta: TimeDelta) -> Self {
        TimePoint(delta.to_nanoseconds())
    }

    pub const fn to_epoch_delta(self) -> TimeDelta {
        TimeDelta::from_nanoseconds(self.0)
    }
}

impl Sub for TimePoint {
    type Output = TimeDelta;

    fn sub(self, rhs: TimePoint) -> TimeDelta {
        TimeDelta::from_nanoseconds(self.0.saturating_sub(rhs.0))
    }
}

impl Add<TimeDelta> for TimePoint {
    type Output = TimePoint;

    fn add(self, rhs: TimeDelta) -> TimePoint {
        TimePoint(self.0.saturating_add(rhs.to_nanoseconds()))
    }
}

impl AddAssign<TimeDelta> for TimePoint {
    fn add_assign(&mut self, rhs: TimeDelta) {
        *self = *self + rhs;
    }
}

impl Sub<TimeDelta> for TimePoint {
    type Output = TimePoint;

    fn sub(self, rhs: TimeDelta) -> TimePoint {
        TimePoint(self.0.saturating_sub(rhs.to_nanoseconds()))
    }
}

impl SubAssign<TimeDelta> for TimePoint {
    fn sub_assign(&mut self, rhs: TimeDelta) {
        *self = *self - rhs;
    }
}

impl fmt::Display for TimePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            p if p == TimePoint::max() => f.write_str("TimePoint::max"),
            p if p == TimePoint::min() => f.write_str("TimePoint::min"),
            TimePoint(ns) => write!(f, "{}ns", ns),
        }
    }
}
