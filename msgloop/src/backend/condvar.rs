use crate::backend::{Backend, PlatformTimer, TimerState, TimerStateCell};
use crate::errors::LoopError;
use crate::runtime::Wakeable;
use crate::time::TimePoint;
use parking_lot::{Condvar, Mutex};
use std::io;

#[derive(Debug)]
struct Deadline {
    fire_at: TimePoint,
    terminated: bool,
}

/// Portable backend: the loop thread sleeps on a condition variable until
/// the armed deadline passes.
#[derive(Debug)]
pub(crate) struct CondvarBackend {
    deadline: Mutex<Deadline>,
    cond: Condvar,
    state: TimerStateCell,
}

impl CondvarBackend {
    pub(crate) fn new() -> Self {
        Self {
            deadline: Mutex::new(Deadline {
                fire_at: TimePoint::max(),
                terminated: false,
            }),
            cond: Condvar::new(),
            state: TimerStateCell::new(),
        }
    }

    // Blocks until the deadline passes. Returns false once terminated.
    fn wait(&self) -> bool {
        let mut deadline = self.deadline.lock();

        loop {
            if deadline.terminated {
                return false;
            }

            let now = TimePoint::now();
            if deadline.fire_at <= now {
                return true;
            }

            if deadline.fire_at == TimePoint::max() {
                self.cond.wait(&mut deadline);
            } else {
                let timeout = (deadline.fire_at - now).to_duration();
                self.cond.wait_for(&mut deadline, timeout);
            }
        }
    }
}

impl PlatformTimer for CondvarBackend {
    fn arm(&self, fire_at: TimePoint) -> io::Result<()> {
        let mut deadline = self.deadline.lock();

        // Termination pins the deadline to "now" so a late re-arm cannot
        // push it back.
        deadline.fire_at = if deadline.terminated {
            TimePoint::min()
        } else {
            fire_at
        };
        self.state.armed(deadline.fire_at == TimePoint::max());
        self.cond.notify_one();
        Ok(())
    }

    fn drain(&self) -> io::Result<bool> {
        let mut deadline = self.deadline.lock();

        if deadline.fire_at > TimePoint::now() {
            return Ok(false);
        }

        deadline.fire_at = TimePoint::max();
        Ok(true)
    }
}

impl Wakeable for CondvarBackend {
    fn wake_up(&self, time_point: TimePoint) {
        // Cannot fail, there is no kernel object behind this timer.
        let _ = self.arm(time_point);
    }
}

impl Backend for CondvarBackend {
    fn run(&self, on_wake: &mut dyn FnMut()) -> Result<(), LoopError> {
        while self.wait() {
            self.state.fired();

            if !self.drain()? {
                self.state.spurious();
                continue;
            }

            self.state.draining();
            on_wake();
            self.state.drained();
        }

        Ok(())
    }

    fn terminate(&self) {
        let mut deadline = self.deadline.lock();
        deadline.terminated = true;
        deadline.fire_at = TimePoint::min();
        self.cond.notify_one();
    }

    fn timer_state(&self) -> TimerState {
        self.state.get()
    }
}
