use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of the timer behind a backend.
///
/// `arm` moves to `Armed` (or `Idle` when disarmed), the wait returning moves
/// to `Firing`, consuming the expiration moves to `Draining` and the end of
/// the drained batch goes back to `Idle`. The timer is always cancelled
/// before a batch runs and re-armed by the registry while it runs, so a
/// concurrent `arm` during `Draining` is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TimerState {
    Idle = 0,
    Armed = 1,
    Firing = 2,
    Draining = 3,
}

impl TimerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => TimerState::Idle,
            1 => TimerState::Armed,
            2 => TimerState::Firing,
            3 => TimerState::Draining,
            _ => unreachable!("invalid timer state {}", v),
        }
    }
}

#[derive(Debug)]
pub(crate) struct TimerStateCell(AtomicU8);

impl TimerStateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TimerState::Idle as u8))
    }

    pub(crate) fn get(&self) -> TimerState {
        TimerState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Called for every re-arm, from any thread.
    pub(crate) fn armed(&self, disarmed: bool) {
        let next = if disarmed {
            TimerState::Idle
        } else {
            TimerState::Armed
        };
        self.0.store(next as u8, Ordering::Release);
    }

    pub(crate) fn fired(&self) {
        self.0.store(TimerState::Firing as u8, Ordering::Release);
    }

    /// The expiration was consumed. Returns false, leaving the state alone,
    /// if an `arm` raced in since the wait returned.
    pub(crate) fn draining(&self) -> bool {
        self.transition(TimerState::Firing, TimerState::Draining)
    }

    /// The wake turned out to be spurious.
    pub(crate) fn spurious(&self) {
        self.transition(TimerState::Firing, TimerState::Idle);
    }

    /// The batch finished. Keeps `Armed`/`Idle` if the registry re-armed
    /// during the batch.
    pub(crate) fn drained(&self) {
        self.transition(TimerState::Draining, TimerState::Idle);
    }

    fn transition(&self, from: TimerState, to: TimerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
