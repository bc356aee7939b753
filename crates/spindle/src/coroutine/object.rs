//! Coroutine objects
//!
//! [`Coroutine`] is a reference-counted handle on a primitive coroutine plus
//! its execution context, origin link and pending cross exception. Holders
//! of a handle are application code, the chain of suspended callers and the
//! live registry; a live, non-main coroutine whose last handle goes away is
//! killed before it is reclaimed.

use super::context::ExecutionContext;
use super::cross;
use super::entry;
use super::introspect::CoroutineInfo;
use super::switch;
use super::transfer::Transfer;
use crate::engine::{CoroutineFlags, CoroutineId, CoroutineState, RawCoroutine};
use crate::error::{CoroutineError, Result};
use crate::host::{globals, Exception, Value};
use crate::options::align_stack_page_size;
use crate::runtime;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

pub(crate) struct Inner {
    /// Primitive coroutine
    pub(crate) raw: RawCoroutine,

    /// Saved interpreter state
    pub(crate) context: RefCell<ExecutionContext>,

    /// Foreign exception awaiting delivery at the next resume point
    pub(crate) pending: RefCell<Option<Exception>>,

    /// Kill delivered to this coroutine, raised again on every later switch
    pub(crate) kill: RefCell<Option<Exception>>,

    /// Coroutine that first switched into this one
    pub(crate) origin: RefCell<Weak<Inner>>,
}

/// Handle on a managed coroutine
#[derive(Clone)]
pub struct Coroutine {
    inner: Rc<Inner>,
}

impl Coroutine {
    fn from_parts(raw: RawCoroutine, context: ExecutionContext) -> Self {
        Self {
            inner: Rc::new(Inner {
                raw,
                context: RefCell::new(context),
                pending: RefCell::new(None),
                kill: RefCell::new(None),
                origin: RefCell::new(Weak::new()),
            }),
        }
    }

    /// The thread's main coroutine, created at runtime boot
    pub(crate) fn root(stack_page_size: usize) -> Self {
        Self::from_parts(RawCoroutine::main(), ExecutionContext::new(stack_page_size))
    }

    /// Create a coroutine with default stack sizes
    pub fn new(callable: impl Into<Value>) -> Result<Self> {
        Self::with_stack_sizes(callable, 0, 0)
    }

    /// Create a coroutine running `callable`.
    ///
    /// `stack_page_size` sizes the activation stack pages and
    /// `native_stack_size` the machine stack; zero selects the runtime
    /// defaults and other values are clamped and aligned.
    pub fn with_stack_sizes(
        callable: impl Into<Value>,
        stack_page_size: usize,
        native_stack_size: usize,
    ) -> Result<Self> {
        let callable = match callable.into() {
            Value::Callable(callable) => callable,
            other => {
                return Err(CoroutineError::InvalidCallable(format!(
                    "{} given",
                    other.type_name()
                )))
            }
        };
        let options = Self::creation_options();

        let page_size = align_stack_page_size(stack_page_size, options.default_stack_page_size);
        let raw = RawCoroutine::create(
            entry::managed,
            native_stack_size,
            options.default_native_stack_size,
            CoroutineFlags::ACCEPT_VALUES,
        )?;
        let mut context = ExecutionContext::new(page_size);
        context.set_callable(callable);

        Ok(Self::from_parts(raw, context))
    }

    /// Create a raw coroutine: it never installs an execution context, does
    /// not take part in the managed value protocol and is not registered.
    pub fn raw<F>(entry: F, native_stack_size: usize) -> Result<Self>
    where
        F: FnOnce(Transfer) -> Transfer + 'static,
    {
        let options = Self::creation_options();
        let raw = RawCoroutine::create(
            entry::raw(entry),
            native_stack_size,
            options.default_native_stack_size,
            CoroutineFlags::NO_STACK,
        )?;
        Ok(Self::from_parts(
            raw,
            ExecutionContext::new(options.default_stack_page_size),
        ))
    }

    fn creation_options() -> crate::options::RuntimeOptions {
        let (readonly, options) = runtime::with(|rt| (rt.guards.is_readonly(), rt.options.clone()));
        if readonly {
            fatal!("Coroutine creation is denied while the runtime is readonly");
        }
        options
    }

    /// Create a coroutine and start it with `args`
    pub fn run(callable: impl Into<Value>, args: Vec<Value>) -> Result<Self> {
        let coroutine = Self::new(callable)?;
        coroutine.resume(args)?;
        Ok(coroutine)
    }

    /// Resume with any number of arguments.
    ///
    /// No argument sends "no value" and one argument sends that value. More
    /// than one is only allowed before the first run, where the values become
    /// the entry's arguments.
    pub fn resume(&self, mut args: Vec<Value>) -> Result<Value> {
        let payload = match args.len() {
            0 => Transfer::None,
            1 => Transfer::Value(args.pop().unwrap_or_default()),
            _ => {
                if self.state() != CoroutineState::Ready {
                    return Err(CoroutineError::TooManyArguments);
                }
                Transfer::Call(args)
            }
        };
        switch::resume(self, payload).map(Transfer::into_value)
    }

    /// Resume with a single value
    pub fn resume_value(&self, value: impl Into<Value>) -> Result<Value> {
        self.resume(vec![value.into()])
    }

    /// Resume with an engine payload
    pub fn resume_raw(&self, payload: Transfer) -> Result<Transfer> {
        switch::resume(self, payload)
    }

    /// Yield `value` to the coroutine that resumed the current one and
    /// return the value it is resumed with.
    ///
    /// From the main coroutine this hands control to the active scheduler,
    /// or fails with [`CoroutineError::NowhereToGo`] when there is none.
    pub fn yield_(value: impl Into<Value>) -> Result<Value> {
        switch::suspend(Transfer::from_value(value.into())).map(Transfer::into_value)
    }

    /// Yield an engine payload
    pub fn yield_raw(payload: Transfer) -> Result<Transfer> {
        switch::suspend(payload)
    }

    /// Throw `exception` into this coroutine and run it until it hands
    /// control back; returns what it yielded or returned.
    pub fn throw(&self, exception: impl Into<Value>) -> Result<Value> {
        match exception.into() {
            Value::Exception(exception) => cross::throw(self, exception).map(Transfer::into_value),
            other => Err(CoroutineError::NotThrowable(other.type_name().to_string())),
        }
    }

    /// Ask this coroutine to terminate gracefully
    pub fn term(&self, message: Option<&str>, code: Option<i64>) -> Result<Value> {
        cross::term(self, message, code).map(Transfer::into_value)
    }

    /// Force this coroutine to die
    pub fn kill(&self, message: Option<&str>, code: Option<i64>) -> Result<()> {
        cross::kill(self, message, code)
    }

    pub fn id(&self) -> CoroutineId {
        self.inner.raw.id()
    }

    pub fn state(&self) -> CoroutineState {
        self.inner.raw.state()
    }

    pub fn state_name(&self) -> &'static str {
        self.inner.raw.state().name()
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.raw.elapsed()
    }

    /// Constructed and not finished
    pub fn is_available(&self) -> bool {
        self.inner.raw.is_available()
    }

    /// Started and not finished
    pub fn is_alive(&self) -> bool {
        self.inner.raw.is_alive()
    }

    pub fn is_scheduler(&self) -> bool {
        self.inner.raw.has_flag(CoroutineFlags::SCHEDULER)
    }

    pub fn flags(&self) -> CoroutineFlags {
        self.inner.raw.flags()
    }

    /// Coroutine that regains control when this one yields or finishes
    pub fn previous(&self) -> Option<Coroutine> {
        runtime::with(|rt| {
            if rt.current.ptr_eq(self) {
                return rt.chain.last().cloned();
            }
            let position = rt.chain.iter().position(|c| c.ptr_eq(self))?;
            position.checked_sub(1).map(|i| rt.chain[i].clone())
        })
    }

    /// Coroutine that first switched into this one
    pub fn origin(&self) -> Option<Coroutine> {
        self.inner
            .origin
            .borrow()
            .upgrade()
            .map(|inner| Coroutine { inner })
    }

    pub(crate) fn set_origin_once(&self, origin: &Coroutine) {
        let mut slot = self.inner.origin.borrow_mut();
        if slot.upgrade().is_none() && self.state() == CoroutineState::Ready {
            *slot = Rc::downgrade(&origin.inner);
        }
    }

    /// References held by application code, the chain of suspended callers
    /// and the live registry.
    ///
    /// The runtime's current/main/scheduler slots are not counted, nor is the
    /// handle a suspended caller keeps on itself while it waits.
    pub fn ref_count(&self) -> usize {
        let strong = Rc::strong_count(&self.inner);
        let internal = runtime::with(|rt| {
            let waiting_in_chain = usize::from(rt.chain.iter().any(|c| c.ptr_eq(self)));
            rt.bookkeeping_refs(self) + waiting_in_chain
        });
        strong.saturating_sub(internal)
    }

    /// Activation-stack page size
    pub fn stack_page_size(&self) -> usize {
        self.inner.context.borrow().page_size()
    }

    /// Activation-stack pages reserved so far
    pub fn stack_pages(&self) -> usize {
        if runtime::with(|rt| rt.current.ptr_eq(self)) {
            globals::stack_pages().1
        } else {
            self.inner.context.borrow().stack_pages()
        }
    }

    pub fn native_stack_size(&self) -> usize {
        self.inner.raw.native_stack_size()
    }

    /// Activation frames, innermost first; `limit` 0 means all
    pub fn trace(&self, limit: usize) -> Vec<String> {
        let frames = if !self.is_available() {
            Vec::new()
        } else if runtime::with(|rt| rt.current.ptr_eq(self)) {
            globals::backtrace()
        } else {
            self.inner.context.borrow().backtrace()
        };
        if limit == 0 {
            frames
        } else {
            frames.into_iter().take(limit).collect()
        }
    }

    /// Trace rendered as `#<n> <function>` lines
    pub fn trace_as_string(&self, limit: usize) -> String {
        self.trace(limit)
            .iter()
            .enumerate()
            .map(|(i, function)| format!("#{} {}", i, function))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Trace as a managed list of strings
    pub fn trace_as_list(&self, limit: usize) -> Value {
        Value::from(
            self.trace(limit)
                .into_iter()
                .map(Value::from)
                .collect::<Vec<_>>(),
        )
    }

    /// Introspection snapshot
    pub fn info(&self) -> CoroutineInfo {
        CoroutineInfo::of(self)
    }

    /// Introspection snapshot as JSON
    pub fn dump(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.info())
    }

    /// Coroutine holding control
    pub fn current() -> Coroutine {
        runtime::current()
    }

    /// The thread's main coroutine
    pub fn main() -> Coroutine {
        runtime::with(|rt| rt.main.clone())
    }

    /// The active scheduler
    pub fn scheduler() -> Option<Coroutine> {
        runtime::with(|rt| rt.scheduler.clone())
    }

    /// Number of registered coroutines
    pub fn count() -> usize {
        runtime::with(|rt| rt.registry.len())
    }

    /// Registered coroutines in registration order
    pub fn all() -> Vec<Coroutine> {
        runtime::with(|rt| rt.registry.snapshot())
    }

    /// Look up a registered coroutine
    pub fn get(id: CoroutineId) -> Option<Coroutine> {
        runtime::with(|rt| rt.registry.get(id).cloned())
    }

    pub fn ptr_eq(&self, other: &Coroutine) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }

    pub(crate) fn primitive(&self) -> &RawCoroutine {
        &self.inner.raw
    }

    pub(crate) fn take_pending(&self) -> Option<Exception> {
        self.inner.pending.borrow_mut().take()
    }

    pub(crate) fn set_pending(&self, exception: Exception) -> Option<Exception> {
        self.inner.pending.borrow_mut().replace(exception)
    }

    pub(crate) fn mark_killed(&self, kill: Exception) {
        self.inner.raw.set_flag(CoroutineFlags::KILLED);
        *self.inner.kill.borrow_mut() = Some(kill);
    }

    /// The kill this coroutine already received, if it is unwinding from one
    pub(crate) fn kill_signal(&self) -> Option<Exception> {
        if !self.inner.raw.has_flag(CoroutineFlags::KILLED) {
            return None;
        }
        self.inner.kill.borrow().clone()
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        if Rc::strong_count(&self.inner) != 1 {
            return;
        }
        let raw = &self.inner.raw;
        if raw.native_stack_size() == 0 || !raw.has_flag(CoroutineFlags::ACCEPT_VALUES) {
            return;
        }
        if !raw.is_alive() {
            return;
        }
        if !runtime::is_switchable() {
            tracing::warn!(coroutine = %raw.id(), "live coroutine dropped while switching is unavailable");
            return;
        }

        let victim = self.clone();
        match cross::kill(&victim, None, None) {
            Ok(()) => {}
            // Every switch out of a killed coroutine re-raises its kill.
            Err(CoroutineError::Thrown(e)) if e.is_uncatchable() => {
                tracing::warn!(coroutine = %victim.id(), "live coroutine dropped by a killed coroutine");
            }
            Err(e) => fatal!(
                "Kill coroutine R{} failed when dropping its last reference, reason: {}",
                victim.id(),
                e
            ),
        }
    }
}

impl PartialEq for Coroutine {
    fn eq(&self, other: &Coroutine) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
