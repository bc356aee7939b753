//! Execution context save/restore
//!
//! The engine only switches native stacks. Everything managed code sees
//! lives in the interpreter globals, so every switch moves the outgoing
//! coroutine's share of those globals into its context and installs the
//! incoming one's. Both halves run back to back with no managed code in
//! between.

use super::object::Inner;
use super::transfer::Transfer;
use crate::engine::CoroutineFlags;
use crate::host::globals;
use crate::host::{ActivationStack, Callable, ErrorHandling, Exception, IterationContext};
use crate::options::ContextCapabilities;
use std::cell::RefCell;
use std::mem;

/// Saved interpreter state of one coroutine
#[derive(Default)]
pub(crate) struct ExecutionContext {
    /// Activation stack region (holds a placeholder while installed)
    activation: ActivationStack,

    /// Page size the activation stack was allocated with
    page_size: usize,

    /// Pending native exception
    exception: Option<Exception>,

    error_handling: ErrorHandling,

    /// Error-suppression depth
    silence: u32,

    /// Output-buffer stack, only kept when non-empty
    output: Option<Vec<String>>,

    /// In-flight `walk` state
    iteration: Option<IterationContext>,

    /// Entry callable, taken by the trampoline on first run
    callable: Option<Callable>,

    /// Transfer slot for payloads addressed to this coroutine
    transfer: Option<Transfer>,

    closed: bool,
}

impl ExecutionContext {
    pub(crate) fn new(page_size: usize) -> Self {
        Self {
            activation: ActivationStack::new(page_size),
            page_size,
            ..Self::default()
        }
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages reserved by the saved activation stack
    pub(crate) fn stack_pages(&self) -> usize {
        self.activation.pages()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Move the installed interpreter state into this context
    pub(crate) fn save(&mut self, caps: ContextCapabilities) {
        globals::with(|g| {
            self.activation = mem::take(&mut g.activation);
            self.exception = g.exception.take();
            self.error_handling = mem::take(&mut g.error_handling);
            if caps.error_suppression {
                self.silence = mem::take(&mut g.silence);
            }
            if caps.output_buffering && !g.output.is_empty() {
                self.output = Some(mem::take(&mut g.output));
            }
            if caps.iteration_context {
                self.iteration = g.iteration.take();
            }
        });
    }

    /// Install this context's state into the interpreter globals
    pub(crate) fn recover(&mut self, caps: ContextCapabilities) {
        if self.is_closed() {
            fatal!("Execution context recovered after it was closed");
        }
        globals::with(|g| {
            g.activation = mem::take(&mut self.activation);
            g.exception = self.exception.take();
            g.error_handling = mem::take(&mut self.error_handling);
            if caps.error_suppression {
                g.silence = mem::take(&mut self.silence);
            }
            if caps.output_buffering {
                g.output = self.output.take().unwrap_or_default();
            }
            if caps.iteration_context {
                g.iteration = self.iteration.take();
            }
        });
    }

    /// Saved activation frames, innermost first
    pub(crate) fn backtrace(&self) -> Vec<String> {
        self.activation.backtrace()
    }

    pub(crate) fn set_callable(&mut self, callable: Callable) {
        self.callable = Some(callable);
    }

    pub(crate) fn take_callable(&mut self) -> Option<Callable> {
        self.callable.take()
    }

    /// Park a payload, returning any payload that was never collected
    pub(crate) fn park(&mut self, payload: Transfer) -> Option<Transfer> {
        self.transfer.replace(payload)
    }

    pub(crate) fn take_transfer(&mut self) -> Option<Transfer> {
        self.transfer.take()
    }
}

/// Save `from` and install `to` around a native switch.
///
/// A coroutine flagged `NO_STACK` is skipped on its side of the swap.
pub(crate) fn switch(from: &Inner, to: &Inner, caps: ContextCapabilities) {
    if !from.raw.has_flag(CoroutineFlags::NO_STACK) {
        from.context.borrow_mut().save(caps);
    }
    if !to.raw.has_flag(CoroutineFlags::NO_STACK) {
        to.context.borrow_mut().recover(caps);
    }
}

/// Release everything a context owns; later calls are no-ops
pub(crate) fn close(context: &RefCell<ExecutionContext>) {
    let released = {
        let mut ctx = context.borrow_mut();
        if ctx.closed {
            return;
        }
        let page_size = ctx.page_size;
        mem::replace(
            &mut *ctx,
            ExecutionContext {
                page_size,
                closed: true,
                ..ExecutionContext::default()
            },
        )
    };
    drop(released);
}
