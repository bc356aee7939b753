//! Managed host model
//!
//! The slice of a managed language runtime the coroutine layer consumes:
//! values, callables, exceptions with cause chains, the per-thread
//! interpreter globals and the uncaught-exception reporting path.

mod callable;
mod exception;
pub mod globals;
mod report;
mod value;

pub use callable::Callable;
pub use exception::{Exception, ExceptionClass};
pub use globals::{ActivationStack, ErrorHandling, IterationContext};
pub use report::{format_uncaught, take_diagnostics};
pub use value::Value;

pub(crate) use report::report_uncaught;
