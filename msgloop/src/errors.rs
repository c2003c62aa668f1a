use crate::backend::BackendKind;
use std::io;

/// Errors surfaced by a running message loop and by loop construction.
///
/// Programming errors (unknown queue ids, unbalanced pause/resume, running a
/// loop from the wrong thread) are not represented here; they panic.
#[derive(thiserror::Error, Debug)]
pub enum LoopError {
    /// The platform wait primitive or timer failed.
    #[error("FATAL: platform wait primitive failed: {0}")]
    Platform(#[from] io::Error),

    /// The wait primitive woke up for a reason the backend does not know.
    #[error("FATAL: unexpected wake reason from the platform wait primitive")]
    UnexpectedWake,

    #[error("Backend {0:?} is not available on this platform")]
    BackendUnavailable(BackendKind),

    #[error("A message loop is already initialized on this thread")]
    AlreadyInitialized,

    /// A catch-all for any other type of unexpected error.
    #[error("An unexpected error occurred: {0}")]
    Other(#[from] anyhow::Error),
}

impl LoopError {
    /// Fatal errors stop the loop, which cannot trust its wait
    /// primitive anymore.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LoopError::Platform(_) | LoopError::UnexpectedWake)
    }

    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            LoopError::Platform(e) => e.raw_os_error(),
            _ => None,
        }
    }
}
