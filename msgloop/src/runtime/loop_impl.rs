use crate::backend::{self, Backend, TimerState};
use crate::errors::LoopError;
use crate::runtime::{LoopConfig, MessageLoopTaskQueues, TaskObserver, Wakeable};
use crate::task::{Task, TaskQueueId, TaskSourceGrade};
use crate::time::TimePoint;
use crate::utils::ScopeGuard;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushType {
    Single,
    All,
}

/// The loop behind one task queue: posts tasks into the registry and drains
/// them on the thread it was created on.
///
/// `Created → Running → Terminated`. A loop runs at most once. Dropping the
/// last handle disposes its queue, along with any task still pending.
pub struct MessageLoopImpl {
    task_queues: Arc<MessageLoopTaskQueues>,
    queue_id: TaskQueueId,
    backend: Arc<dyn Backend>,

    // The thread allowed to run the loop and touch its observers.
    owner: ThreadId,

    terminated: AtomicBool,
    running: AtomicBool,
}

impl MessageLoopImpl {
    pub(crate) fn try_new(cfg: &LoopConfig) -> Result<Arc<Self>, LoopError> {
        let (backend, wakeable) = backend::create(cfg.backend)?;

        let task_queues = Arc::clone(&cfg.task_queues);
        let queue_id = task_queues.create_task_queue();
        task_queues.set_wakeable(queue_id, wakeable);

        tracing::debug!(task_queue_id = %queue_id, ?backend, "created message loop");

        Ok(Arc::new(Self {
            task_queues,
            queue_id,
            backend,
            owner: thread::current().id(),
            terminated: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }))
    }

    pub fn task_queue_id(&self) -> TaskQueueId {
        self.queue_id
    }

    pub fn task_queues(&self) -> &Arc<MessageLoopTaskQueues> {
        &self.task_queues
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Queues `task` for `target_time`. Once the loop is terminated the task
    /// is dropped on the spot instead.
    pub fn post_task(&self, task: Task, target_time: TimePoint) {
        self.post_task_with_grade(task, target_time, TaskSourceGrade::Unspecified);
    }

    pub fn post_task_with_grade(&self, task: Task, target_time: TimePoint, grade: TaskSourceGrade) {
        if self.is_terminated() {
            tracing::trace!(task_queue_id = %self.queue_id, "dropped task posted after termination");
            return;
        }

        self.task_queues
            .register_task(self.queue_id, task, target_time, grade);
    }

    /// Runs the loop on the current thread until [`do_terminate`] is
    /// observed or the wait primitive fails.
    ///
    /// On the way out the loop is marked terminated, due tasks are drained a
    /// last time and everything still pending is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called from another thread than the one the loop was
    /// created on, or while the loop is already running.
    ///
    /// [`do_terminate`]: MessageLoopImpl::do_terminate
    #[track_caller]
    pub fn do_run(&self) -> Result<(), LoopError> {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "message loop for task queue {} must run on the thread that created it",
            self.queue_id
        );
        assert!(
            !self.running.swap(true, Ordering::AcqRel),
            "message loop for task queue {} is already running",
            self.queue_id
        );
        let _running = ScopeGuard::new(|| self.running.store(false, Ordering::Release));

        if self.is_terminated() {
            // Loops only run once.
            return Ok(());
        }

        tracing::debug!(task_queue_id = %self.queue_id, "message loop running");

        let res = self.backend.run(&mut || self.run_expired_tasks_now());

        self.terminated.store(true, Ordering::Release);

        if let Err(e) = &res {
            tracing::error!(task_queue_id = %self.queue_id, error = %e, "message loop stopped");
        }

        self.run_expired_tasks_now();
        self.task_queues.dispose_tasks(self.queue_id);

        tracing::debug!(task_queue_id = %self.queue_id, "message loop terminated");
        res
    }

    /// Requests termination from any thread. Idempotent.
    pub fn do_terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.backend.terminate();
    }

    /// Drains every task due now, then notifies observers once.
    pub fn run_expired_tasks_now(&self) {
        self.flush_tasks(FlushType::All);
    }

    /// Runs at most one due task, for embedders pumping the loop by hand.
    pub fn run_single_expired_task_now(&self) {
        self.flush_tasks(FlushType::Single);
    }

    #[track_caller]
    pub fn add_task_observer(&self, key: isize, callback: TaskObserver) {
        self.debug_assert_owner_thread();
        self.task_queues
            .add_task_observer(self.queue_id, key, callback);
    }

    #[track_caller]
    pub fn remove_task_observer(&self, key: isize) -> bool {
        self.debug_assert_owner_thread();
        self.task_queues.remove_task_observer(self.queue_id, key)
    }

    pub(crate) fn timer_state(&self) -> TimerState {
        self.backend.timer_state()
    }

    fn flush_tasks(&self, kind: FlushType) {
        // Sampled once per batch. Tasks posted while draining run on the
        // next wake.
        let now = TimePoint::now();
        let mut ran = 0usize;

        while let Some(task) = self.task_queues.get_next_task_to_run(self.queue_id, now) {
            task();
            ran += 1;

            if kind == FlushType::Single {
                break;
            }
        }

        if ran == 0 {
            return;
        }

        for observer in self.task_queues.get_observers_to_notify(self.queue_id) {
            observer();
        }
    }

    #[track_caller]
    fn debug_assert_owner_thread(&self) {
        debug_assert_eq!(
            thread::current().id(),
            self.owner,
            "task observers of queue {} are only touched from the loop thread",
            self.queue_id
        );
    }
}

impl Wakeable for MessageLoopImpl {
    fn wake_up(&self, time_point: TimePoint) {
        self.backend.wake_up(time_point);
    }
}

impl Drop for MessageLoopImpl {
    fn drop(&mut self) {
        self.backend.terminate();
        self.task_queues.dispose(self.queue_id);
    }
}

impl fmt::Debug for MessageLoopImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoopImpl")
            .field("queue_id", &self.queue_id)
            .field("backend", &self.backend)
            .field("terminated", &self.is_terminated())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
