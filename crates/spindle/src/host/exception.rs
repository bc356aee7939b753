//! Managed exceptions
//!
//! Exceptions are reference-counted and carry a cause chain through
//! `previous`. The cross-coroutine classes (`CrossException`,
//! `TermException`, `KillException`) are subclasses of `CoroutineException`;
//! `KillException` cannot be caught by managed code.

use super::globals;
use crate::engine::CoroutineId;
use crate::error::CoroutineError;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Class of a managed exception
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExceptionClass {
    /// Engine-level error
    Error,
    /// Base class of user exceptions
    Exception,
    /// Failure reported by the coroutine layer
    CoroutineException,
    /// Generic exception thrown across coroutines
    CrossException,
    /// Graceful termination request
    Terminate,
    /// Forced termination, uncatchable
    Kill,
    /// User-defined exception class
    Custom(Rc<str>),
}

impl ExceptionClass {
    pub fn name(&self) -> &str {
        match self {
            ExceptionClass::Error => "Error",
            ExceptionClass::Exception => "Exception",
            ExceptionClass::CoroutineException => "CoroutineException",
            ExceptionClass::CrossException => "CrossException",
            ExceptionClass::Terminate => "TermException",
            ExceptionClass::Kill => "KillException",
            ExceptionClass::Custom(name) => name,
        }
    }
}

impl fmt::Display for ExceptionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A managed exception object
#[derive(Clone)]
pub struct Exception {
    inner: Rc<ExceptionData>,
}

struct ExceptionData {
    class: ExceptionClass,
    message: String,
    code: i64,
    previous: RefCell<Option<Exception>>,
    coroutine: Cell<Option<CoroutineId>>,
    trace: Vec<String>,
}

impl Exception {
    /// Construct an exception, capturing the current activation stack
    pub fn new(class: ExceptionClass, message: impl Into<String>, code: i64) -> Self {
        Self {
            inner: Rc::new(ExceptionData {
                class,
                message: message.into(),
                code,
                previous: RefCell::new(None),
                coroutine: Cell::new(None),
                trace: globals::backtrace(),
            }),
        }
    }

    /// Build the exception an `exit(status)` request raises inside a
    /// coroutine: a termination for non-zero statuses, a silent kill otherwise.
    pub fn exit(status: i32) -> Self {
        if status != 0 {
            Self::new(
                ExceptionClass::Terminate,
                format!("Exited with code {}", status),
                i64::from(status),
            )
        } else {
            Self::new(ExceptionClass::Kill, "", 0)
        }
    }

    pub fn class(&self) -> &ExceptionClass {
        &self.inner.class
    }

    pub fn message(&self) -> &str {
        &self.inner.message
    }

    pub fn code(&self) -> i64 {
        self.inner.code
    }

    /// Activation frames at construction, innermost first
    pub fn trace(&self) -> &[String] {
        &self.inner.trace
    }

    pub fn is_kill(&self) -> bool {
        self.inner.class == ExceptionClass::Kill
    }

    pub fn is_uncatchable(&self) -> bool {
        self.is_kill()
    }

    /// Coroutine the exception was thrown from, for delivered cross exceptions
    pub fn coroutine(&self) -> Option<CoroutineId> {
        self.inner.coroutine.get()
    }

    pub(crate) fn set_coroutine(&self, id: CoroutineId) {
        self.inner.coroutine.set(Some(id));
    }

    pub fn previous(&self) -> Option<Exception> {
        self.inner.previous.borrow().clone()
    }

    /// Append `previous` at the end of the cause chain.
    ///
    /// Linking an exception that is already part of the chain is a no-op.
    pub fn set_previous(&self, previous: Exception) {
        if self.chain().any(|e| e.ptr_eq(&previous)) || previous.chain().any(|e| e.ptr_eq(self)) {
            return;
        }
        let mut last = self.clone();
        while let Some(next) = last.previous() {
            last = next;
        }
        *last.inner.previous.borrow_mut() = Some(previous);
    }

    /// This exception followed by its causes
    pub fn chain(&self) -> impl Iterator<Item = Exception> {
        std::iter::successors(Some(self.clone()), |e| e.previous())
    }

    pub fn ptr_eq(&self, other: &Exception) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inner.message.is_empty() {
            write!(f, "{}", self.inner.class)
        } else {
            write!(f, "{}: {}", self.inner.class, self.inner.message)
        }
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("class", &self.inner.class)
            .field("message", &self.inner.message)
            .field("code", &self.inner.code)
            .field("previous", &self.previous())
            .finish()
    }
}

impl From<CoroutineError> for Exception {
    fn from(error: CoroutineError) -> Self {
        match error {
            CoroutineError::Thrown(exception) => exception,
            other => Exception::new(ExceptionClass::CoroutineException, other.to_string(), 0),
        }
    }
}
