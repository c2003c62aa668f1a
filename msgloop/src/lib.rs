//! Cross-thread, priority-aware message loops.
//!
//! Every thread may own one [`MessageLoop`]. Other threads post closures to
//! it through a [`TaskRunner`], either right away or for a point in time.
//! Queues of different loops can be merged so that one thread services
//! both, which is how platform and raster work get folded onto a single
//! thread.
//!
//! ```no_run
//! use msgloop::{MessageLoop, TaskRunner};
//!
//! MessageLoop::ensure_initialized_for_current_thread()?;
//! let runner = MessageLoop::current().task_runner();
//!
//! TaskRunner::run_now_or_post_task(&runner, || println!("inline"));
//! runner.post_task(|| MessageLoop::current().terminate());
//!
//! MessageLoop::current().run()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod backend;
pub use backend::BackendKind;

mod context;
pub use context::MessageLoop;

mod errors;
pub use errors::LoopError;

pub mod runtime;
pub use runtime::{
    Builder, MessageLoopImpl, MessageLoopTaskQueues, TaskObserver, TaskRunner,
    TaskRunnerChecker, Thread, Wakeable,
};

pub mod sync;

pub mod task;
pub use task::{DelayedTask, Task, TaskQueueId, TaskSource, TaskSourceGrade};

pub mod time;
pub use time::{TimeDelta, TimePoint, set_clock_source};

mod utils;

#[cfg(test)]
mod test_utils;
