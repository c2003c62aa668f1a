use crate::context::{self, MessageLoop};
use crate::errors::LoopError;
use crate::runtime::{LoopConfig, TaskRunner};
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::mpsc;
use std::thread;

/// An OS thread dedicated to running one message loop.
///
/// The loop runs until [`Thread::join`], which posts a terminate task and
/// waits for the thread to exit. Dropping the handle joins as well.
pub struct Thread {
    name: String,
    task_runner: TaskRunner,
    handle: Option<thread::JoinHandle<()>>,
}

impl Thread {
    pub(crate) fn try_spawn(cfg: LoopConfig) -> Result<Self> {
        let name = cfg.spawned_thread_name();
        let (tx, rx) = mpsc::sync_channel::<Result<TaskRunner, LoopError>>(1);

        let mut builder = thread::Builder::new().name(name.clone());

        if let Some(stack_size) = cfg.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let thread_name = name.clone();
        let handle = builder.spawn(move || {
            let message_loop = match context::try_init_current_thread(&cfg) {
                Ok(message_loop) => message_loop,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };

            if tx.send(Ok(message_loop.task_runner())).is_err() {
                // Spawner gave up waiting.
                return;
            }
            drop(tx);

            run_until_terminated(&thread_name, &message_loop);
        })?;

        let task_runner = match rx.recv() {
            Ok(Ok(task_runner)) => task_runner,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = handle.join();
                return Err(anyhow!("message loop thread {} exited before starting", name));
            }
        };

        tracing::debug!(thread = %name, task_queue_id = %task_runner.task_queue_id(), "spawned message loop thread");

        Ok(Self {
            name,
            task_runner,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn task_runner(&self) -> TaskRunner {
        self.task_runner.clone()
    }

    /// Terminates the loop once every task posted before this call ran, and
    /// waits for the thread to exit.
    pub fn join(mut self) -> Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.task_runner
            .post_task(|| MessageLoop::current().terminate());

        handle
            .join()
            .map_err(|_| anyhow!("message loop thread {} panicked", self.name))
    }
}

fn run_until_terminated(name: &str, message_loop: &MessageLoop) {
    if let Err(e) = message_loop.run() {
        tracing::error!(thread = %name, error = %e, "message loop exited with error");
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if let Err(e) = self.join_inner() {
            tracing::error!(thread = %self.name, error = %e, "failed to join message loop thread");
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("task_runner", &self.task_runner)
            .field("joined", &self.handle.is_none())
            .finish()
    }
}
