use crate::context::MessageLoop;
use crate::runtime::MessageLoopImpl;
use crate::task::{TaskQueueId, TaskSourceGrade};
use crate::time::{TimeDelta, TimePoint};
use std::fmt;
use std::sync::Arc;

/// A cheap, cloneable handle producers use to post work to one loop.
///
/// Runners keep their loop (and its task queue) alive: the queue is only
/// disposed once the loop's thread and every runner have let go of it.
#[derive(Clone)]
pub struct TaskRunner {
    loop_impl: Arc<MessageLoopImpl>,
}

impl TaskRunner {
    pub(crate) fn new(loop_impl: Arc<MessageLoopImpl>) -> Self {
        Self { loop_impl }
    }

    /// Runs `task` as soon as the loop gets to it.
    pub fn post_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_task_for_time(task, TimePoint::now());
    }

    /// Runs `task` no earlier than `target_time`.
    pub fn post_task_for_time<F>(&self, task: F, target_time: TimePoint)
    where
        F: FnOnce() + Send + 'static,
    {
        self.loop_impl.post_task(Box::new(task), target_time);
    }

    /// Runs `task` no earlier than `delay` from now.
    pub fn post_delayed_task<F>(&self, task: F, delay: TimeDelta)
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_task_for_time(task, TimePoint::now() + delay);
    }

    /// Like [`TaskRunner::post_task_for_time`], with an explicit priority
    /// class.
    pub fn post_task_with_grade<F>(&self, task: F, target_time: TimePoint, grade: TaskSourceGrade)
    where
        F: FnOnce() + Send + 'static,
    {
        self.loop_impl
            .post_task_with_grade(Box::new(task), target_time, grade);
    }

    pub fn task_queue_id(&self) -> TaskQueueId {
        self.loop_impl.task_queue_id()
    }

    /// Whether tasks posted here run on the calling thread, directly or
    /// through a queue merge. False on threads without a message loop.
    pub fn runs_tasks_on_current_thread(&self) -> bool {
        let Some(current) = MessageLoop::try_current_task_queue_id() else {
            return false;
        };

        let target = self.task_queue_id();
        if current == target {
            return true;
        }

        // A loop built against another registry never shares a thread with
        // ours.
        let task_queues = self.loop_impl.task_queues();
        task_queues.contains(current) && task_queues.runs_on_the_same_thread(current, target)
    }

    /// Runs `task` right away when already on `runner`'s thread, posts it
    /// otherwise.
    pub fn run_now_or_post_task<F>(runner: &TaskRunner, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if runner.runs_tasks_on_current_thread() {
            task();
        } else {
            runner.post_task(task);
        }
    }

    /// Like [`TaskRunner::run_now_or_post_task`], but when `task` runs inline
    /// an empty task is posted behind it so the loop's task observers still
    /// fire.
    pub fn run_now_and_flush_messages<F>(runner: &TaskRunner, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if runner.runs_tasks_on_current_thread() {
            task();
            runner.post_task(|| {});
        } else {
            runner.post_task(task);
        }
    }

    pub(crate) fn loop_impl(&self) -> &Arc<MessageLoopImpl> {
        &self.loop_impl
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("task_queue_id", &self.task_queue_id())
            .finish()
    }
}
