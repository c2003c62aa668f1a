use crate::runtime::Wakeable;
use crate::time::TimePoint;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Records every `wake_up` it receives instead of touching a timer.
#[derive(Debug, Default)]
pub(crate) struct SpyWakeable {
    calls: Mutex<Vec<TimePoint>>,
}

impl SpyWakeable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn as_weak(self: &Arc<Self>) -> Weak<dyn Wakeable> {
        let weak: Weak<SpyWakeable> = Arc::downgrade(self);
        weak
    }

    pub(crate) fn get_calls(&self) -> Vec<TimePoint> {
        self.calls.lock().clone()
    }

    pub(crate) fn num_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn last_call(&self) -> Option<TimePoint> {
        self.calls.lock().last().copied()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl Wakeable for SpyWakeable {
    fn wake_up(&self, time_point: TimePoint) {
        self.calls.lock().push(time_point);
    }
}
