//! Platform wait primitives a message loop sleeps on.

use crate::errors::LoopError;
use crate::runtime::Wakeable;
use crate::time::TimePoint;
use std::fmt;
use std::io;
use std::sync::{Arc, Weak};

mod condvar;
pub(crate) use condvar::CondvarBackend;

mod state;
pub(crate) use state::{TimerState, TimerStateCell};

#[cfg(target_os = "linux")]
mod timerfd;
#[cfg(target_os = "linux")]
pub(crate) use timerfd::TimerFdBackend;

/// Which wait primitive a loop uses.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `TimerFd` when the kernel supports it, `Condvar` otherwise.
    #[default]
    Auto,

    /// A `timerfd` waited on through `io_uring`. Linux only.
    TimerFd,

    /// A mutex and condition variable. Works everywhere.
    Condvar,
}

/// One-shot timer a backend waits on.
pub(crate) trait PlatformTimer {
    /// Fires at `deadline`, replacing any previous deadline.
    /// [`TimePoint::max`] disarms, past deadlines fire immediately.
    fn arm(&self, deadline: TimePoint) -> io::Result<()>;

    /// Consumes a pending expiration. Returns false if the timer had not
    /// actually fired, so spurious wakes do not spin the loop.
    fn drain(&self) -> io::Result<bool>;
}

/// The blocking half of a message loop.
///
/// `wake_up` (from [`Wakeable`]) re-arms the timer from any thread; `run`
/// blocks the loop thread until `terminate` is observed.
pub(crate) trait Backend: Wakeable + fmt::Debug {
    /// Waits for the timer and calls `on_wake` after each real expiration.
    /// The timer is cancelled before `on_wake` runs.
    fn run(&self, on_wake: &mut dyn FnMut()) -> Result<(), LoopError>;

    /// Makes `run` return as soon as possible. Idempotent.
    fn terminate(&self);

    fn timer_state(&self) -> TimerState;
}

/// Builds the backend for `kind`, along with the weak handle the registry
/// wakes it through.
pub(crate) fn create(kind: BackendKind) -> Result<(Arc<dyn Backend>, Weak<dyn Wakeable>), LoopError> {
    match kind {
        BackendKind::Condvar => Ok(into_handles(CondvarBackend::new())),

        #[cfg(target_os = "linux")]
        BackendKind::TimerFd => Ok(into_handles(TimerFdBackend::try_new()?)),

        #[cfg(not(target_os = "linux"))]
        BackendKind::TimerFd => Err(LoopError::BackendUnavailable(kind)),

        #[cfg(target_os = "linux")]
        BackendKind::Auto => match TimerFdBackend::try_new() {
            Ok(backend) => Ok(into_handles(backend)),
            Err(e) => {
                tracing::warn!(error = %e, "timerfd backend unavailable, falling back to condvar");
                Ok(into_handles(CondvarBackend::new()))
            }
        },

        #[cfg(not(target_os = "linux"))]
        BackendKind::Auto => Ok(into_handles(CondvarBackend::new())),
    }
}

fn into_handles<B>(backend: B) -> (Arc<dyn Backend>, Weak<dyn Wakeable>)
where
    B: Backend + 'static,
{
    let backend = Arc::new(backend);
    let wakeable: Weak<B> = Arc::downgrade(&backend);
    (backend, wakeable)
}
