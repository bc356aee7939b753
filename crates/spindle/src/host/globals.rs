//! Interpreter globals
//!
//! The per-thread interpreter state that managed code runs against. Exactly
//! one execution context is installed here at a time; the coroutine layer
//! moves these fields in and out on every switch.
//!
//! Values held here may own coroutine handles, so anything replaced or
//! removed is dropped only after the borrow ends.

use super::callable::Callable;
use super::exception::{Exception, ExceptionClass};
use super::report;
use super::value::Value;
use crate::defaults::DEFAULT_STACK_PAGE_SIZE;
use std::cell::RefCell;
use std::io::Write;

/// Bytes reserved for one activation record
pub const FRAME_SLOT_SIZE: usize = 64;

thread_local! {
    static GLOBALS: RefCell<Globals> = RefCell::new(Globals::default());
}

/// Growable activation-stack region, allocated page by page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationStack {
    /// Function names of the live activations, outermost first
    frames: Vec<String>,

    /// Page size in bytes
    page_size: usize,

    /// Pages currently reserved
    pages: usize,
}

impl ActivationStack {
    pub fn new(page_size: usize) -> Self {
        Self {
            frames: Vec::new(),
            page_size,
            pages: 1,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    fn push(&mut self, function: &str) {
        let needed = (self.frames.len() + 1) * FRAME_SLOT_SIZE;
        if needed > self.pages * self.page_size {
            self.pages += 1;
        }
        self.frames.push(function.to_string());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Function names, innermost first
    pub fn backtrace(&self) -> Vec<String> {
        self.frames.iter().rev().cloned().collect()
    }
}

impl Default for ActivationStack {
    fn default() -> Self {
        Self::new(DEFAULT_STACK_PAGE_SIZE)
    }
}

/// How engine warnings raised by managed code are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// Report to the diagnostics log unless silenced
    #[default]
    Detailed,
    /// Drop warnings
    Suppress,
    /// Turn warnings into `Error` exceptions
    Throw,
}

/// State of an in-flight `walk`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationContext {
    pub position: usize,
    pub length: usize,
}

#[derive(Default)]
pub(crate) struct Globals {
    pub(crate) activation: ActivationStack,
    pub(crate) exception: Option<Exception>,
    pub(crate) error_handling: ErrorHandling,
    pub(crate) silence: u32,
    pub(crate) output: Vec<String>,
    pub(crate) iteration: Option<IterationContext>,
    exception_handler: Option<Callable>,
}

pub(crate) fn with<R>(f: impl FnOnce(&mut Globals) -> R) -> R {
    GLOBALS.with(|globals| f(&mut globals.borrow_mut()))
}

fn try_with<R>(f: impl FnOnce(&mut Globals) -> R) -> Option<R> {
    GLOBALS
        .try_with(|globals| globals.try_borrow_mut().ok().map(|mut g| f(&mut g)))
        .ok()
        .flatten()
}

/// Run `f` inside a new activation frame
pub fn call<R>(function: &str, f: impl FnOnce() -> R) -> R {
    with(|g| g.activation.push(function));
    let result = f();
    with(|g| g.activation.pop());
    result
}

/// Name of the innermost activation
pub fn frame() -> Option<String> {
    with(|g| g.activation.frames.last().cloned())
}

/// Current activation stack, innermost first
pub fn backtrace() -> Vec<String> {
    try_with(|g| g.activation.backtrace()).unwrap_or_default()
}

/// Page geometry of the installed activation stack: (page size, pages)
pub fn stack_pages() -> (usize, usize) {
    with(|g| (g.activation.page_size, g.activation.pages))
}

/// Write to the innermost output buffer, or to stdout when none is open
pub fn echo(text: &str) {
    let unbuffered = with(|g| match g.output.last_mut() {
        Some(buffer) => {
            buffer.push_str(text);
            false
        }
        None => true,
    });
    if unbuffered {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }
}

pub fn ob_start() {
    with(|g| g.output.push(String::new()));
}

/// Close the innermost output buffer and return its contents
pub fn ob_get_clean() -> Option<String> {
    with(|g| g.output.pop())
}

pub fn ob_get_level() -> usize {
    with(|g| g.output.len())
}

/// Discard every open output buffer, returning how many were open
pub(crate) fn discard_output() -> usize {
    let buffers = with(|g| std::mem::take(&mut g.output));
    buffers.len()
}

/// Run `f` with warnings silenced
pub fn silence<R>(f: impl FnOnce() -> R) -> R {
    with(|g| g.silence += 1);
    let result = f();
    with(|g| g.silence = g.silence.saturating_sub(1));
    result
}

pub fn is_silenced() -> bool {
    with(|g| g.silence > 0)
}

/// Raise an engine warning according to the installed error-handling mode
pub fn warn(message: &str) -> Result<(), Exception> {
    let (mode, silenced) = with(|g| (g.error_handling, g.silence > 0));
    match mode {
        ErrorHandling::Throw => Err(Exception::new(ExceptionClass::Error, message, 0)),
        ErrorHandling::Suppress => Ok(()),
        ErrorHandling::Detailed => {
            if !silenced {
                report::diagnostic(format!("Warning: {}", message));
            }
            Ok(())
        }
    }
}

pub fn error_handling() -> ErrorHandling {
    with(|g| g.error_handling)
}

/// Install an error-handling mode, returning the previous one
pub fn set_error_handling(mode: ErrorHandling) -> ErrorHandling {
    with(|g| std::mem::replace(&mut g.error_handling, mode))
}

/// Visit `items` in order; `walk_position` reports the index being visited
pub fn walk(
    items: &[Value],
    mut f: impl FnMut(&Value) -> Result<(), Exception>,
) -> Result<(), Exception> {
    let outer = with(|g| {
        g.iteration.replace(IterationContext {
            position: 0,
            length: items.len(),
        })
    });
    let mut result = Ok(());
    for (position, item) in items.iter().enumerate() {
        with(|g| {
            if let Some(iteration) = g.iteration.as_mut() {
                iteration.position = position;
            }
        });
        result = f(item);
        if result.is_err() {
            break;
        }
    }
    with(|g| g.iteration = outer);
    result
}

pub fn walk_position() -> Option<usize> {
    with(|g| g.iteration.map(|iteration| iteration.position))
}

/// Park an exception as pending, returning the one it replaced
pub fn set_exception(exception: Exception) -> Option<Exception> {
    with(|g| g.exception.replace(exception))
}

pub fn take_exception() -> Option<Exception> {
    with(|g| g.exception.take())
}

pub fn has_exception() -> bool {
    with(|g| g.exception.is_some())
}

/// Install the handler for uncaught exceptions, returning the previous one
pub fn set_exception_handler(handler: Option<Callable>) -> Option<Callable> {
    with(|g| std::mem::replace(&mut g.exception_handler, handler))
}

pub(crate) fn exception_handler() -> Option<Callable> {
    with(|g| g.exception_handler.clone())
}
