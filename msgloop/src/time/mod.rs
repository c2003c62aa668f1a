//! Monotonic time points and signed durations, with a process-wide pluggable
//! clock source.

use parking_lot::RwLock;

mod delta;
pub use delta::TimeDelta;

mod point;
pub use point::TimePoint;

/// Signature of a replacement clock, see [`set_clock_source`].
pub type ClockSource = fn() -> TimePoint;

static CLOCK_SOURCE: RwLock<Option<ClockSource>> = parking_lot::const_rwlock(None);

/// Replaces the clock read by [`TimePoint::now`] for the whole process.
///
/// Passing `None` restores the monotonic system clock. Timers already armed
/// by a running loop are not re-armed, so tests should swap the source before
/// any loop is started.
pub fn set_clock_source(source: Option<ClockSource>) {
    *CLOCK_SOURCE.write() = source;
}

pub(crate) fn clock_now() -> TimePoint {
    match *CLOCK_SOURCE.read() {
        Some(source) => source(),
        None => monotonic_now(),
    }
}

// Same clock the timerfd backend arms against.
#[cfg(unix)]
fn monotonic_now() -> TimePoint {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    // CLOCK_MONOTONIC with a valid pointer cannot fail.
    let ret = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    debug_assert_eq!(ret, 0, "clock_gettime(CLOCK_MONOTONIC) failed");

    TimePoint::from_epoch_delta(TimeDelta::from_timespec(ts))
}

#[cfg(not(unix))]
fn monotonic_now() -> TimePoint {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);

    TimePoint::from_epoch_delta(TimeDelta::from(epoch.elapsed()))
}
