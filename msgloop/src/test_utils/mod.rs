use crate::task::Task;
use crate::time::{TimeDelta, TimePoint};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// Exports
mod spy;
pub(crate) use spy::SpyWakeable;

/// A fixed time point, `ms` milliseconds after the clock epoch.
pub(crate) fn at_ms(ms: i64) -> TimePoint {
    TimePoint::from_epoch_delta(TimeDelta::from_milliseconds(ms))
}

pub(crate) fn noop_task() -> Task {
    Box::new(|| {})
}

pub(crate) fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
    let counter = Arc::clone(counter);
    Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

/// Appends `tag` to `log` when run, to assert on execution order.
pub(crate) fn recording_task<T>(log: &Arc<Mutex<Vec<T>>>, tag: T) -> Task
where
    T: Send + 'static,
{
    let log = Arc::clone(log);
    Box::new(move || log.lock().push(tag))
}

/// Flips to true when the task closure is dropped, run or not.
pub(crate) struct DropFlag(pub(crate) Arc<std::sync::atomic::AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}
