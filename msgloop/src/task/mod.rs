// Public API
pub mod id;
pub use self::id::TaskQueueId;

mod record;
pub use self::record::{DelayedTask, TaskSourceGrade};

mod source;
pub use self::source::TaskSource;

/// A unit of work posted to a task queue. Runs at most once, on the thread
/// servicing the queue.
pub type Task = Box<dyn FnOnce() + Send + 'static>;
