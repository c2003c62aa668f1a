use crate::backend::{Backend, PlatformTimer, TimerState, TimerStateCell};
use crate::errors::LoopError;
use crate::runtime::Wakeable;
use crate::time::{TimeDelta, TimePoint};
use io_uring::{IoUring, opcode, types};
use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// The only SQE we ever submit: a poll on the timerfd.
const TIMER_POLL_TOKEN: u64 = 0x7469_6d65;

/// Two entries is plenty, at most one poll is in flight.
const RING_ENTRIES: u32 = 2;

/// A non-blocking `CLOCK_MONOTONIC` timerfd used as a one-shot timer.
#[derive(Debug)]
pub(crate) struct TimerFd {
    fd: OwnedFd,
}

impl TimerFd {
    pub(crate) fn try_new() -> io::Result<Self> {
        let fd = unsafe {
            libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC)
        };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // Safety: `fd` was just created and nothing else owns it.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    fn settime(&self, value: libc::timespec) -> io::Result<()> {
        let spec = libc::itimerspec {
            it_interval: TimeDelta::zero().to_timespec(),
            it_value: value,
        };

        let ret = unsafe {
            libc::timerfd_settime(self.fd.as_raw_fd(), 0, &spec, std::ptr::null_mut())
        };

        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for TimerFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl PlatformTimer for TimerFd {
    // Relative arming keeps a swapped clock source consistent with the
    // kernel's monotonic clock.
    fn arm(&self, deadline: TimePoint) -> io::Result<()> {
        if deadline == TimePoint::max() {
            // An all-zero `it_value` disarms.
            return self.settime(TimeDelta::zero().to_timespec());
        }

        let delay = deadline - TimePoint::now();
        let delay = if delay <= TimeDelta::zero() {
            TimeDelta::from_nanoseconds(1)
        } else {
            delay
        };

        self.settime(delay.to_timespec())
    }

    fn drain(&self) -> io::Result<bool> {
        let mut expirations: u64 = 0;

        let ret = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut expirations as *mut u64 as *mut libc::c_void,
                mem::size_of::<u64>(),
            )
        };

        if ret == mem::size_of::<u64>() as isize {
            return Ok(true);
        }

        if ret < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                // Re-armed, or not expired yet.
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(false),
                _ => Err(err),
            };
        }

        Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short read of {} bytes from timerfd", ret),
        ))
    }
}

struct WaitRing(IoUring);

// Safety: the ring is only ever driven by the thread inside `run`, the mutex
// just makes the backend shareable with producers that arm the timerfd.
unsafe impl Send for WaitRing {}

/// Linux backend: the loop thread blocks in `io_uring_enter` on a poll of a
/// timerfd, and producers re-arm the timerfd with `timerfd_settime`.
pub(crate) struct TimerFdBackend {
    timer: TimerFd,
    ring: Mutex<WaitRing>,

    // Arming and terminating serialize on this flag, so a producer re-arm
    // cannot undo the immediate expiry `terminate` asked for.
    terminated: Mutex<bool>,

    // `timerfd_settime` failures from `wake_up`, reported by `run`.
    arm_error: Mutex<Option<io::Error>>,

    state: TimerStateCell,
}

impl TimerFdBackend {
    pub(crate) fn try_new() -> Result<Self, LoopError> {
        let timer = TimerFd::try_new()?;
        let ring = IoUring::new(RING_ENTRIES)?;

        Ok(Self {
            timer,
            ring: Mutex::new(WaitRing(ring)),
            terminated: Mutex::new(false),
            arm_error: Mutex::new(None),
            state: TimerStateCell::new(),
        })
    }

    fn is_terminated(&self) -> bool {
        *self.terminated.lock()
    }

    fn arm_locked(&self, terminated: bool, deadline: TimePoint) -> io::Result<()> {
        let deadline = if terminated { TimePoint::min() } else { deadline };
        self.timer.arm(deadline)?;
        self.state.armed(deadline == TimePoint::max());
        Ok(())
    }

    // Waits for the poll on the timerfd to complete.
    fn wait(&self, ring: &mut IoUring, poll_in_flight: &mut bool) -> Result<(), LoopError> {
        if !*poll_in_flight {
            let entry = opcode::PollAdd::new(
                types::Fd(self.timer.as_raw_fd()),
                libc::POLLIN as u32,
            )
            .build()
            .user_data(TIMER_POLL_TOKEN);

            // Safety: the entry only references the timerfd, which outlives
            // the ring.
            unsafe { ring.submission().push(&entry) }.map_err(io::Error::other)?;
            *poll_in_flight = true;
        }

        loop {
            match ring.submit_and_wait(1) {
                Ok(_) => break,
                Err(e) if e.raw_os_error() == Some(libc::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        for cqe in ring.completion() {
            if cqe.user_data() != TIMER_POLL_TOKEN {
                return Err(LoopError::UnexpectedWake);
            }

            *poll_in_flight = false;

            if cqe.result() < 0 {
                return Err(io::Error::from_raw_os_error(-cqe.result()).into());
            }
        }

        Ok(())
    }
}

impl Wakeable for TimerFdBackend {
    fn wake_up(&self, time_point: TimePoint) {
        let terminated = self.terminated.lock();

        if let Err(e) = self.arm_locked(*terminated, time_point) {
            tracing::error!(error = %e, "failed to arm timerfd");
            self.arm_error.lock().get_or_insert(e);
        }
    }
}

impl Backend for TimerFdBackend {
    fn run(&self, on_wake: &mut dyn FnMut()) -> Result<(), LoopError> {
        let mut ring = self.ring.lock();
        let mut poll_in_flight = false;

        while !self.is_terminated() {
            self.wait(&mut ring.0, &mut poll_in_flight)?;

            if let Some(e) = self.arm_error.lock().take() {
                return Err(e.into());
            }

            if poll_in_flight {
                continue;
            }

            self.state.fired();

            if !self.timer.drain()? {
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
        let mut terminated = self.terminated.lock();
        *terminated = true;

        if let Err(e) = self.arm_locked(true, TimePoint::min()) {
            tracing::error!(error = %e, "failed to arm timerfd for termination");
        }
    }

    fn timer_state(&self) -> TimerState {
        self.state.get()
    }
}

impl fmt::Debug for TimerFdBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerFdBackend")
            .field("timer", &self.timer)
            .field("terminated", &self.is_terminated())
            .field("state", &self.state.get())
            .finish_non_exhaustive()
    }
}
