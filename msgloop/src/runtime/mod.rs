use crate::time::TimePoint;
use std::sync::Arc;

// Public API
mod builder;
pub use builder::Builder;

pub(crate) use builder::{LoopConfig, ThreadNameFn};

mod checker;
pub use checker::TaskRunnerChecker;

mod loop_impl;
pub use loop_impl::MessageLoopImpl;

pub mod registry;
pub use registry::MessageLoopTaskQueues;

mod runner;
pub use runner::TaskRunner;

mod thread;
pub use thread::Thread;

/// Interrupts a sleeping wait primitive.
///
/// The registry calls `wake_up` with the earliest time any task visible to a
/// queue is due, or [`TimePoint::max`] when nothing is pending. The latest
/// call always wins: implementations re-arm to exactly `time_point`, they do
/// not keep the minimum themselves. Calls come from any thread, with the
/// registry lock held, so implementations must not call back into the
/// registry.
pub trait Wakeable: Send + Sync {
    fn wake_up(&self, time_point: TimePoint);
}

/// Callback run once after every batch of tasks a loop drains.
pub type TaskObserver = Arc<dyn Fn() + Send + Sync + 'static>;
