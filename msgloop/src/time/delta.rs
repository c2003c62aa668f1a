use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use std::time::Duration;

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A signed duration with nanosecond resolution.
///
/// Integer conversions (`to_milliseconds`, ...) truncate toward zero. All
/// arithmetic saturates at [`TimeDelta::min`] and [`TimeDelta::max`].
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeDelta(i64);

impl TimeDelta {
    pub const fn zero() -> Self {
        TimeDelta(0)
    }

    pub const fn min() -> Self {
        TimeDelta(i64::MIN)
    }

    pub const fn max() -> Self {
        TimeDelta(i64::MAX)
    }

    pub const fn from_nanoseconds(nanos: i64) -> Self {
        TimeDelta(nanos)
    }

    pub const fn from_microseconds(micros: i64) -> Self {
        TimeDelta(micros.saturating_mul(NANOS_PER_MICRO))
    }

    pub const fn from_milliseconds(millis: i64) -> Self {
        TimeDelta(millis.saturating_mul(NANOS_PER_MILLI))
    }

    pub const fn from_seconds(secs: i64) -> Self {
        TimeDelta(secs.saturating_mul(NANOS_PER_SEC))
    }

    // `as` saturates on out of range floats and maps NaN to zero.
    pub fn from_seconds_f64(secs: f64) -> Self {
        TimeDelta((secs * NANOS_PER_SEC as f64) as i64)
    }

    pub fn from_milliseconds_f64(millis: f64) -> Self {
        TimeDelta((millis * NANOS_PER_MILLI as f64) as i64)
    }

    pub fn from_microseconds_f64(micros: f64) -> Self {
        TimeDelta((micros * NANOS_PER_MICRO as f64) as i64)
    }

    pub const fn to_nanoseconds(self) -> i64 {
        self.0
    }

    pub const fn to_microseconds(self) -> i64 {
        self.0 / NANOS_PER_MICRO
    }

    pub const fn to_milliseconds(self) -> i64 {
        self.0 / NANOS_PER_MILLI
    }

    pub const fn to_seconds(self) -> i64 {
        self.0 / NANOS_PER_SEC
    }

    pub fn to_seconds_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    pub fn to_milliseconds_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_MILLI as f64
    }

    pub fn to_microseconds_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_MICRO as f64
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Converts to a [`Duration`], clamping negative deltas to zero.
    pub fn to_duration(self) -> Duration {
        if self.0 <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.0 as u64)
        }
    }

    /// Converts to a `timespec`, normalized so `tv_nsec` is in `0..1e9`.
    pub fn to_timespec(self) -> libc::timespec {
        libc::timespec {
            tv_sec: self.0.div_euclid(NANOS_PER_SEC) as libc::time_t,
            tv_nsec: self.0.rem_euclid(NANOS_PER_SEC) as libc::c_long,
        }
    }

    pub fn from_timespec(ts: libc::timespec) -> Self {
        TimeDelta::from_seconds(ts.tv_sec as i64) + TimeDelta(ts.tv_nsec as i64)
    }
}

impl From<Duration> for TimeDelta {
    fn from(d: Duration) -> Self {
        TimeDelta(i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Add for TimeDelta {
    type Output = TimeDelta;

    fn add(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TimeDelta {
    fn add_assign(&mut self, rhs: TimeDelta) {
        *self = *self + rhs;
    }
}

impl Sub for TimeDelta {
    type Output = TimeDelta;

    fn sub(self, rhs: TimeDelta) -> TimeDelta {
        TimeDelta(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for TimeDelta {
    fn sub_assign(&mut self, rhs: TimeDelta) {
        *self = *self - rhs;
    }
}

impl Neg for TimeDelta {
    type Output = TimeDelta;

    fn neg(self) -> TimeDelta {
        TimeDelta(self.0.saturating_neg())
    }
}

impl Mul<i64> for TimeDelta {
    type Output = TimeDelta;

    fn mul(self, rhs: i64) -> TimeDelta {
        TimeDelta(self.0.saturating_mul(rhs))
    }
}

impl Div<i64> for TimeDelta {
    type Output = TimeDelta;

    #[track_caller]
    fn div(self, rhs: i64) -> TimeDelta {
        TimeDelta(self.0.saturating_div(rhs))
    }
}

impl fmt::Display for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}
