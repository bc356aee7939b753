//! Coroutine error taxonomy
//!
//! Recoverable failures are surfaced as [`CoroutineError`]. Violations of the
//! switch protocol are not errors at all: they go through [`fatal!`], which
//! never returns.

use crate::engine::CoroutineId;
use crate::host::Exception;
use std::fmt;
use thiserror::Error;

/// Errors returned by coroutine operations
#[derive(Debug, Error)]
pub enum CoroutineError {
    /// The entry passed at construction cannot be called
    #[error("Coroutine function must be callable, {0}")]
    InvalidCallable(String),

    /// The coroutine was never constructed or has already finished
    #[error("Coroutine is not available")]
    NotAvailable,

    /// The coroutine is not alive
    #[error("Coroutine is not alive")]
    NotAlive,

    /// The target is the coroutine that is executing right now
    #[error("Coroutine is running")]
    Running,

    /// The target is suspended further down the resume chain
    #[error("Coroutine is in progress")]
    InProgress,

    /// Yield was called with no coroutine to return to
    #[error("Coroutine has nowhere to go")]
    NowhereToGo,

    /// More than one argument was passed to an already started coroutine
    #[error("Only one argument allowed when resuming a coroutine which is alive")]
    TooManyArguments,

    /// Cross exceptions may not be thrown into the active scheduler
    #[error("Break scheduler coroutine is not allowed")]
    SchedulerProtected,

    /// The main coroutine cannot be killed
    #[error("Kill main coroutine is not allowed")]
    MainProtected,

    /// The value given to `throw` is not an exception
    #[error("Instance of {0} is not throwable")]
    NotThrowable(String),

    /// A scheduler is already active
    #[error("Scheduler is already running")]
    SchedulerRunning,

    /// The caller is not the active scheduler
    #[error("Coroutine {0} is not the scheduler")]
    NotScheduler(CoroutineId),

    /// The engine could not map a native stack
    #[error("Allocate native stack failed: {0}")]
    StackAllocation(#[from] std::io::Error),

    /// A managed exception surfaced through a switch
    #[error("{0}")]
    Thrown(Exception),
}

impl CoroutineError {
    /// The managed exception carried by this error, if any
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            CoroutineError::Thrown(exception) => Some(exception),
            _ => None,
        }
    }

    /// Consume the error, yielding the managed exception if it carries one
    pub fn into_exception(self) -> Option<Exception> {
        match self {
            CoroutineError::Thrown(exception) => Some(exception),
            _ => None,
        }
    }
}

impl From<Exception> for CoroutineError {
    fn from(exception: Exception) -> Self {
        CoroutineError::Thrown(exception)
    }
}

/// Result alias for coroutine operations
pub type Result<T> = std::result::Result<T, CoroutineError>;

/// Report an internal-consistency violation and stop the thread.
///
/// The release profile aborts on panic, so this is process-fatal there.
#[cold]
#[inline(never)]
pub(crate) fn fatal_error(args: fmt::Arguments<'_>) -> ! {
    tracing::error!(target: "spindle::fatal", "{}", args);
    panic!("fatal: {}", args)
}

/// Abort on a broken switch-protocol invariant
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::error::fatal_error(format_args!($($arg)*))
    };
}
