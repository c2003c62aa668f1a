//! Blocking primitives for handing results between loop threads.
//!
//! These are meant for tests and for the odd rendezvous at startup or
//! shutdown. Never block a loop thread on one of them while it still has
//! tasks to run.

use crate::time::TimeDelta;
use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// An event that releases exactly one waiter per signal, then resets itself.
#[derive(Debug, Default)]
pub struct AutoResetWaitableEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl AutoResetWaitableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *self.signaled.lock() = true;
        self.cond.notify_one();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    /// Blocks until signalled and consumes the signal.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
        *signaled = false;
    }

    /// Like [`AutoResetWaitableEvent::wait`], giving up after `timeout`.
    ///
    /// Returns `true` if it timed out. Negative timeouts behave like zero.
    pub fn wait_with_timeout(&self, timeout: TimeDelta) -> bool {
        let deadline = Instant::now() + timeout.to_duration();
        let mut signaled = self.signaled.lock();

        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                // A signal can land right at the deadline.
                break;
            }
        }

        let timed_out = !*signaled;
        *signaled = false;
        timed_out
    }

    pub fn is_signaled_for_test(&self) -> bool {
        *self.signaled.lock()
    }
}

/// An event that, once signalled, releases every waiter until reset.
#[derive(Debug, Default)]
pub struct ManualResetWaitableEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl ManualResetWaitableEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        *self.signaled.lock() = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }

    pub fn wait(&self) {
        let mut signaled = self.signaled.lock();
        while !*signaled {
            self.cond.wait(&mut signaled);
        }
    }

    /// Returns `true` if it timed out.
    pub fn wait_with_timeout(&self, timeout: TimeDelta) -> bool {
        let deadline = Instant::now() + timeout.to_duration();
        let mut signaled = self.signaled.lock();

        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }

        !*signaled
    }

    pub fn is_signaled_for_test(&self) -> bool {
        *self.signaled.lock()
    }
}

/// Releases waiters once `count_down` was called `count` times.
#[derive(Debug)]
pub struct CountDownLatch {
    count: Mutex<usize>,
    cond: Condvar,
}

impl CountDownLatch {
    pub fn new(count: usize) -> Self {
        Self {
            count: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    /// Extra calls past zero are ignored.
    pub fn count_down(&self) {
        let mut count = self.count.lock();
        if *count == 0 {
            return;
        }

        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    pub fn wait(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.cond.wait(&mut count);
        }
    }
}
