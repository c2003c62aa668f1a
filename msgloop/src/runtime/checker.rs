use crate::context::MessageLoop;
use crate::runtime::MessageLoopTaskQueues;
use crate::task::TaskQueueId;
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Remembers which queue the creating thread was running, to assert later
/// that code still runs there.
///
/// Advisory only: merges and unmerges after construction are not tracked,
/// so it backs `debug_assert!`s rather than correctness.
#[derive(Debug)]
pub struct TaskRunnerChecker {
    initialized_queue_id: TaskQueueId,
    subsumed_queue_ids: BTreeSet<TaskQueueId>,
    task_queues: Arc<MessageLoopTaskQueues>,
}

impl TaskRunnerChecker {
    /// Captures the current thread's queue, creating the thread's loop if it
    /// does not have one yet.
    pub fn new() -> Result<Self> {
        MessageLoop::ensure_initialized_for_current_thread()?;

        let current = MessageLoop::current();
        let task_queues = Arc::clone(current.loop_impl().task_queues());
        let initialized_queue_id = current.task_queue_id();
        let subsumed_queue_ids = task_queues.get_subsumed_task_queue_id(initialized_queue_id);

        Ok(Self {
            initialized_queue_id,
            subsumed_queue_ids,
            task_queues,
        })
    }

    pub fn initialized_queue_id(&self) -> TaskQueueId {
        self.initialized_queue_id
    }

    /// Whether the current thread runs the captured queue, or one of the
    /// queues it owned at construction.
    ///
    /// # Panics
    ///
    /// Panics if the current thread has no message loop.
    #[track_caller]
    pub fn runs_on_creation_task_runner(&self) -> bool {
        let current = MessageLoop::current_task_queue_id();

        if !self.task_queues.contains(current) {
            return false;
        }

        std::iter::once(&self.initialized_queue_id)
            .chain(self.subsumed_queue_ids.iter())
            .filter(|id| self.task_queues.contains(**id))
            .any(|id| self.task_queues.runs_on_the_same_thread(current, *id))
    }

    /// Equal ids, or one owning the other, in the process-wide registry.
    pub fn runs_on_the_same_thread(queue_a: TaskQueueId, queue_b: TaskQueueId) -> bool {
        MessageLoopTaskQueues::instance().runs_on_the_same_thread(queue_a, queue_b)
    }
}
