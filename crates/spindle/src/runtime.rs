//! Per-thread coroutine runtime
//!
//! Each thread owns one runtime: its main coroutine, the coroutine holding
//! control, the chain of suspended callers, the live registry, the active
//! scheduler and the switch guards. A runtime with default options boots
//! lazily on first use; [`init`] installs explicit options and [`shutdown`]
//! tears it down.
//!
//! Coroutine handles are never dropped while the runtime is borrowed: a drop
//! may force-kill a coroutine, which needs the runtime again.

use crate::coroutine::{context, Coroutine, GuardStack, Registry};
use crate::defaults::{DEFAULT_NATIVE_STACK_SIZE, DEFAULT_STACK_PAGE_SIZE, SHUTDOWN_KILL_MESSAGE};
use crate::engine::CoroutineFlags;
use crate::host::Exception;
use crate::options::{align_native_stack_size, align_stack_page_size, RuntimeOptions};
use std::cell::RefCell;

thread_local! {
    static RUNTIME: RefCell<Runtime> = RefCell::new(Runtime::boot(RuntimeOptions::default()));
}

/// Lifecycle of the thread's runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Running,
    InShutdown,
    Shutdown,
}

pub(crate) struct Runtime {
    /// Options installed at boot
    pub(crate) options: RuntimeOptions,

    pub(crate) status: RuntimeStatus,

    /// Root coroutine of the thread
    pub(crate) main: Coroutine,

    /// Coroutine holding control
    pub(crate) current: Coroutine,

    /// Suspended callers, outermost first; the last one is `current`'s previous
    pub(crate) chain: Vec<Coroutine>,

    /// Live coroutines by id
    pub(crate) registry: Registry,

    /// Active scheduler, if any
    pub(crate) scheduler: Option<Coroutine>,

    /// Active switch guards, including the readonly latch
    pub(crate) guards: GuardStack,

    /// Managed coroutines started and not yet dead, main included
    pub(crate) active_count: usize,

    /// Status recorded by an exit raised in main
    pub(crate) exit_status: Option<i32>,
}

impl Runtime {
    fn boot(options: RuntimeOptions) -> Self {
        let main = Coroutine::root(options.default_stack_page_size);
        let mut registry = Registry::default();
        registry.insert(main.clone());
        tracing::debug!(main = %main.id(), "coroutine runtime booted");

        Self {
            options,
            status: RuntimeStatus::Running,
            current: main.clone(),
            main,
            chain: Vec::new(),
            registry,
            scheduler: None,
            guards: GuardStack::default(),
            active_count: 1,
            exit_status: None,
        }
    }

    /// Handles on `coroutine` held by the current, main and scheduler slots
    pub(crate) fn bookkeeping_refs(&self, coroutine: &Coroutine) -> usize {
        let mut refs = 0;
        if self.current.ptr_eq(coroutine) {
            refs += 1;
        }
        if self.main.ptr_eq(coroutine) {
            refs += 1;
        }
        if self.scheduler.as_ref().is_some_and(|s| s.ptr_eq(coroutine)) {
            refs += 1;
        }
        refs
    }
}

pub(crate) fn with<R>(f: impl FnOnce(&mut Runtime) -> R) -> R {
    RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
}

/// Like [`with`], but yields `None` while the runtime is borrowed or torn down
pub(crate) fn try_with<R>(f: impl FnOnce(&mut Runtime) -> R) -> Option<R> {
    RUNTIME
        .try_with(|runtime| runtime.try_borrow_mut().ok().map(|mut rt| f(&mut rt)))
        .ok()
        .flatten()
}

/// Coroutine holding control
pub(crate) fn current() -> Coroutine {
    with(|rt| rt.current.clone())
}

/// Whether a switch could be dispatched right now
pub(crate) fn is_switchable() -> bool {
    try_with(|rt| !rt.guards.is_readonly()).unwrap_or(false)
}

/// Boot a fresh runtime with `options`.
///
/// Allowed on an untouched runtime (only main, running) or after
/// [`shutdown`].
pub fn init(options: RuntimeOptions) {
    let replaced = RUNTIME.with(|runtime| {
        {
            let rt = runtime.borrow();
            let idle = rt.chain.is_empty() && rt.active_count == 1 && rt.current.ptr_eq(&rt.main);
            if rt.status == RuntimeStatus::InShutdown
                || (rt.status == RuntimeStatus::Running && !idle)
            {
                fatal!("Coroutine runtime cannot be initialized while coroutines are running");
            }
        }
        runtime.replace(Runtime::boot(options))
    });
    replaced.main.primitive().close();
    drop(replaced);
}

/// Kill every live coroutine, engage the readonly latch and close main.
///
/// Must be called from the main coroutine.
pub fn shutdown() {
    let (victims, main) = with(|rt| {
        if rt.status != RuntimeStatus::Running {
            fatal!("Coroutine runtime is not running");
        }
        if !rt.current.ptr_eq(&rt.main) || !rt.chain.is_empty() {
            fatal!("Coroutine runtime can only shut down from the main coroutine");
        }
        rt.status = RuntimeStatus::InShutdown;
        let main = rt.main.clone();
        let victims: Vec<Coroutine> = rt
            .registry
            .snapshot()
            .into_iter()
            .filter(|c| !c.ptr_eq(&main))
            .collect();
        (victims, main)
    });

    for victim in &victims {
        if !victim.is_alive() {
            continue;
        }
        if let Err(e) = victim.kill(Some(SHUTDOWN_KILL_MESSAGE), None) {
            tracing::warn!(coroutine = %victim.id(), "kill on shutdown failed: {}", e);
        }
    }
    drop(victims);

    let (removed, caps) = with(|rt| {
        if rt.scheduler.is_some() {
            fatal!("Scheduler is still running");
        }
        if rt.active_count != 1 {
            fatal!("Unexpected number of coroutines ({}) when shutting down", rt.active_count);
        }
        rt.guards.set_readonly(true);
        (rt.registry.remove(main.id()), rt.options.context)
    });
    drop(removed);

    if !main.primitive().has_flag(CoroutineFlags::NO_STACK) {
        main.inner().context.borrow_mut().save(caps);
    }
    context::close(&main.inner().context);
    main.primitive().close();
    with(|rt| {
        rt.active_count = 0;
        rt.status = RuntimeStatus::Shutdown;
    });
    tracing::debug!(main = %main.id(), "coroutine runtime shut down");
}

pub fn status() -> RuntimeStatus {
    with(|rt| rt.status)
}

pub fn options() -> RuntimeOptions {
    with(|rt| rt.options.clone())
}

/// Set the activation-stack page size for new coroutines, returning the
/// previous one
pub fn set_default_stack_page_size(size: usize) -> usize {
    let aligned = align_stack_page_size(size, DEFAULT_STACK_PAGE_SIZE);
    with(|rt| std::mem::replace(&mut rt.options.default_stack_page_size, aligned))
}

/// Set the native stack size for new coroutines, returning the previous one
pub fn set_default_native_stack_size(size: usize) -> usize {
    let aligned = align_native_stack_size(size, DEFAULT_NATIVE_STACK_SIZE);
    with(|rt| std::mem::replace(&mut rt.options.default_native_stack_size, aligned))
}

/// Engage or release the readonly latch
pub fn set_readonly(enable: bool) {
    with(|rt| rt.guards.set_readonly(enable));
}

pub fn is_readonly() -> bool {
    with(|rt| rt.guards.is_readonly())
}

/// Toggle execution-context switching for the current coroutine.
///
/// Disabling saves the installed state and marks the coroutine `NO_STACK`;
/// enabling clears the flag and installs the saved state again. Returns the
/// previous setting.
pub fn set_context_switching(enable: bool) -> bool {
    let (current, caps) = with(|rt| (rt.current.clone(), rt.options.context));
    let raw = current.primitive();
    let was_enabled = !raw.has_flag(CoroutineFlags::NO_STACK);
    if enable && !was_enabled {
        raw.clear_flag(CoroutineFlags::NO_STACK);
        current.inner().context.borrow_mut().recover(caps);
    } else if !enable && was_enabled {
        current.inner().context.borrow_mut().save(caps);
        raw.set_flag(CoroutineFlags::NO_STACK);
    }
    was_enabled
}

/// Build the exception for an `exit(status)` request.
///
/// Raised in main the status is recorded for [`exit_status`]; raised in a
/// coroutine it ends that coroutine only.
pub fn exit(status: i32) -> Exception {
    with(|rt| {
        if rt.current.ptr_eq(&rt.main) {
            rt.exit_status = Some(status);
        }
    });
    Exception::exit(status)
}

pub fn exit_status() -> Option<i32> {
    with(|rt| rt.exit_status)
}

/// Managed coroutines started and not yet dead, main included
pub fn active_count() -> usize {
    with(|rt| rt.active_count)
}
