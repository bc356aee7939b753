//! Spindle: managed coroutines
//!
//! Stackful coroutines for an embedded managed runtime. Each coroutine owns a
//! native stack (via `corosensei`) and an execution context holding its share
//! of the interpreter globals: activation stack, pending exception, error
//! handling mode, output buffers and iteration state. Switching saves the
//! outgoing context and installs the incoming one.
//!
//! On top of that the crate provides:
//! - **Ownership chain**: a resume pushes the resumer; yield and finish pop it
//! - **Data transfer**: values and argument lists cross every switch
//! - **Cross exceptions**: `throw`, `term` and `kill` aimed at another coroutine
//! - **Scheduler role**: where main yields to when it has nowhere else to go
//! - **Readonly latch**: forbids switches and creation during teardown
//!
//! State is per thread; coroutines never migrate between threads.
//!
//! ```rust,ignore
//! use spindle::{Callable, Coroutine, Value};
//!
//! let doubler = Coroutine::new(Callable::new("doubler", |args| {
//!     let x = args[0].as_int().unwrap_or(0);
//!     let y = Coroutine::yield_(x * 2)?.as_int().unwrap_or(0);
//!     Ok(Value::Int(x + y))
//! }))?;
//! assert_eq!(doubler.resume_value(Value::Int(3))?, Value::Int(6));
//! assert_eq!(doubler.resume_value(Value::Int(4))?, Value::Int(7));
//! ```

#![warn(rust_2018_idioms)]

#[macro_use]
mod error;

pub mod coroutine;
pub mod defaults;
pub mod engine;
pub mod host;
pub mod options;
pub mod runtime;

pub use coroutine::{Coroutine, CoroutineInfo, SwitchGuard, Transfer};
pub use engine::{CoroutineFlags, CoroutineId, CoroutineState};
pub use error::{CoroutineError, Result};
pub use host::{Callable, Exception, ExceptionClass, Value};
pub use options::{ContextCapabilities, ExceptionSeverity, RuntimeOptions};
