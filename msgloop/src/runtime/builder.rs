use crate::backend::BackendKind;
use crate::context::{self, MessageLoop};
use crate::errors::LoopError;
use crate::runtime::{MessageLoopTaskQueues, Thread};
use crate::utils::thread::set_current_thread_name;
use anyhow::Result;
use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl ThreadNameFn {
    pub(crate) fn name(&self) -> String {
        (self.0)()
    }
}

fn default_thread_name_fn() -> ThreadNameFn {
    // Shared by every builder so spawned loop threads get distinct names.
    static LOOP_COUNT: AtomicUsize = AtomicUsize::new(0);

    ThreadNameFn(Arc::new(|| {
        let id = LOOP_COUNT.fetch_add(1, Ordering::Relaxed);
        format!("msgloop-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Configures and creates message loops, either on the current thread or on
/// a dedicated one.
///
/// ```no_run
/// use msgloop::{Builder, TimeDelta};
///
/// let thread = Builder::new().thread_name("io").try_spawn()?;
/// thread
///     .task_runner()
///     .post_delayed_task(|| println!("later"), TimeDelta::from_milliseconds(5));
/// thread.join()?;
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Wait primitive the loop sleeps on.
    backend: BackendKind,

    /// Name fn for the loop thread. Unset means spawned threads get
    /// "msgloop-{N}" and the current thread keeps its name.
    thread_name: Option<ThreadNameFn>,

    /// Stack size used for spawned loop threads.
    thread_stack_size: Option<usize>,

    /// Registry the loop's queue lives in. Defaults to the process-wide one.
    task_queues: Option<Arc<MessageLoopTaskQueues>>,
}

impl Builder {
    pub fn new() -> Builder {
        Self {
            backend: BackendKind::default(),
            thread_name: None,
            thread_stack_size: None,
            task_queues: None,
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Sets the name of the loop thread.
    ///
    /// Thread names are truncated beyond 15 bytes according to pthread
    /// limitations.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = Some(ThreadNameFn(Arc::new(move || val.clone())));
        self
    }

    /// Sets a function used to generate the name of the loop thread.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = Some(ThreadNameFn(Arc::new(f)));
        self
    }

    /// Sets the stack size (in bytes) of spawned loop threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(val > 0, "thread_stack_size must be greater than 0");
        self.thread_stack_size = Some(val);
        self
    }

    /// Creates the loop's queue in `task_queues` instead of
    /// [`MessageLoopTaskQueues::instance`].
    pub fn task_queues(mut self, task_queues: Arc<MessageLoopTaskQueues>) -> Self {
        self.task_queues = Some(task_queues);
        self
    }

    /// Binds a new loop to the current thread.
    ///
    /// Fails if the thread already has one.
    pub fn try_init_current_thread(self) -> Result<MessageLoop> {
        let cfg: LoopConfig = self.try_into()?;

        if MessageLoop::is_initialized_for_current_thread() {
            return Err(LoopError::AlreadyInitialized.into());
        }

        // There is no way to rename the current thread through `std::thread`.
        if let Some(thread_name) = &cfg.thread_name {
            set_current_thread_name(thread_name)?;
        }

        Ok(context::try_init_current_thread(&cfg)?)
    }

    /// Spawns a thread running a new loop. Returns once the loop exists, so
    /// its runner accepts tasks right away.
    pub fn try_spawn(self) -> Result<Thread> {
        let cfg: LoopConfig = self.try_into()?;
        Thread::try_spawn(cfg)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

// Export the builder as a LoopConfig object consumed by loops and their
// threads.
#[derive(Debug, Clone)]
pub(crate) struct LoopConfig {
    pub(crate) backend: BackendKind,
    pub(crate) thread_name: Option<ThreadNameFn>,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) task_queues: Arc<MessageLoopTaskQueues>,
}

impl LoopConfig {
    fn validate(&self) -> Result<()> {
        if self.backend == BackendKind::TimerFd && !cfg!(target_os = "linux") {
            return Err(LoopError::BackendUnavailable(self.backend).into());
        }

        Ok(())
    }

    pub(crate) fn spawned_thread_name(&self) -> String {
        self.thread_name
            .clone()
            .unwrap_or_else(default_thread_name_fn)
            .name()
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        LoopConfig {
            backend: BackendKind::default(),
            thread_name: None,
            thread_stack_size: None,
            task_queues: MessageLoopTaskQueues::instance(),
        }
    }
}

impl TryFrom<Builder> for LoopConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let cfg = LoopConfig {
            backend: builder.backend,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            task_queues: builder
                .task_queues
                .unwrap_or_else(MessageLoopTaskQueues::instance),
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
