use crate::errors::LoopError;
use crate::runtime::{LoopConfig, MessageLoopImpl, TaskObserver, TaskRunner};
use crate::task::TaskQueueId;
use anyhow::Result;
use std::cell::OnceCell;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::thread_local;

thread_local! {
    static CURRENT_LOOP: OnceCell<MessageLoop> = const { OnceCell::new() };
}

/// The message loop bound to the current thread.
///
/// Every thread has at most one, created explicitly with
/// [`MessageLoop::ensure_initialized_for_current_thread`] or
/// [`Builder::try_init_current_thread`](crate::Builder::try_init_current_thread),
/// and kept until the thread exits. Handles are cheap clones but stay on
/// their thread; hand out [`MessageLoop::task_runner`] to other threads.
#[derive(Clone)]
pub struct MessageLoop {
    task_runner: TaskRunner,

    // Thread-bound.
    _not_send: PhantomData<Rc<()>>,
}

impl MessageLoop {
    fn new(loop_impl: Arc<MessageLoopImpl>) -> Self {
        Self {
            task_runner: TaskRunner::new(loop_impl),
            _not_send: PhantomData,
        }
    }

    /// Creates this thread's loop with the default configuration, unless it
    /// already exists.
    pub fn ensure_initialized_for_current_thread() -> Result<()> {
        if Self::is_initialized_for_current_thread() {
            return Ok(());
        }

        try_init_current_thread(&LoopConfig::default())?;
        Ok(())
    }

    pub fn is_initialized_for_current_thread() -> bool {
        CURRENT_LOOP.with(|slot| slot.get().is_some())
    }

    /// This thread's loop.
    ///
    /// # Panics
    ///
    /// Panics if the thread has no loop yet.
    #[track_caller]
    pub fn current() -> MessageLoop {
        match Self::try_current() {
            Some(current) => current,
            None => panic!(
                "MessageLoop::ensure_initialized_for_current_thread was not called on this thread"
            ),
        }
    }

    pub fn try_current() -> Option<MessageLoop> {
        CURRENT_LOOP.with(|slot| slot.get().cloned())
    }

    /// # Panics
    ///
    /// Panics if the thread has no loop yet.
    #[track_caller]
    pub fn current_task_queue_id() -> TaskQueueId {
        Self::current().task_queue_id()
    }

    pub fn try_current_task_queue_id() -> Option<TaskQueueId> {
        CURRENT_LOOP.with(|slot| slot.get().map(MessageLoop::task_queue_id))
    }

    /// Blocks the thread running tasks until [`MessageLoop::terminate`].
    ///
    /// Returns the platform error that stopped the loop, if any. Panics
    /// raised by tasks propagate out of this call.
    pub fn run(&self) -> Result<(), LoopError> {
        self.loop_impl().do_run()
    }

    /// Asks the loop to stop. Tasks posted afterwards are dropped.
    pub fn terminate(&self) {
        self.loop_impl().do_terminate();
    }

    pub fn task_runner(&self) -> TaskRunner {
        self.task_runner.clone()
    }

    pub fn task_queue_id(&self) -> TaskQueueId {
        self.task_runner.task_queue_id()
    }

    /// Registers `callback` to run once after every drained batch of tasks.
    /// Re-using `key` replaces the previous callback.
    pub fn add_task_observer<F>(&self, key: isize, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: TaskObserver = Arc::new(callback);
        self.loop_impl().add_task_observer(key, callback);
    }

    pub fn remove_task_observer(&self, key: isize) -> bool {
        self.loop_impl().remove_task_observer(key)
    }

    /// Drains due tasks without blocking, for threads that pump the loop
    /// themselves.
    pub fn run_expired_tasks_now(&self) {
        self.loop_impl().run_expired_tasks_now();
    }

    pub fn run_single_expired_task_now(&self) {
        self.loop_impl().run_single_expired_task_now();
    }

    pub(crate) fn loop_impl(&self) -> &Arc<MessageLoopImpl> {
        self.task_runner.loop_impl()
    }
}

impl fmt::Debug for MessageLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageLoop")
            .field("loop_impl", self.loop_impl())
            .finish()
    }
}

/// Binds a new loop built from `cfg` to the current thread.
pub(crate) fn try_init_current_thread(cfg: &LoopConfig) -> Result<MessageLoop, LoopError> {
    if MessageLoop::is_initialized_for_current_thread() {
        return Err(LoopError::AlreadyInitialized);
    }

    let message_loop = MessageLoop::new(MessageLoopImpl::try_new(cfg)?);

    CURRENT_LOOP.with(|slot| {
        slot.set(message_loop.clone())
            .map_err(|_| LoopError::AlreadyInitialized)
    })?;

    Ok(message_loop)
}
