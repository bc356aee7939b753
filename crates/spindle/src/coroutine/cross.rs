//! Cross-coroutine exceptions
//!
//! An exception aimed at another coroutine is parked on the target as
//! pending and the target is switched to. When the target regains control
//! inside its yield (or resume) the pending exception is raised there as a
//! fresh local copy, with the original chained behind it so both stack
//! traces survive.
//!
//! A delivered kill sticks: from then on every switch the victim attempts
//! raises the same kill again, so the victim can only unwind and die.

use super::object::Coroutine;
use super::switch::{self, Route};
use super::transfer::Transfer;
use super::SwitchGuard;
use crate::defaults::DEFAULT_CROSS_CODE;
use crate::error::{CoroutineError, Result};
use crate::host::{globals, Exception, ExceptionClass};
use crate::runtime;

/// Throw `exception` into `target` and run it until it hands control back
pub(crate) fn throw(target: &Coroutine, exception: Exception) -> Result<Transfer> {
    check_not_killed()?;
    check_breakable(target)?;

    let current = runtime::current();
    if current.ptr_eq(target) {
        return Err(CoroutineError::Thrown(exception));
    }
    let route = switch::route(target)?;

    exception.set_coroutine(current.id());
    drop(current);
    if let Some(stale) = target.set_pending(exception) {
        tracing::warn!(coroutine = %target.id(), "pending exception replaced: {}", stale);
    }
    switch::dispatch(target, Transfer::None, route)
}

/// Ask `target` to terminate by raising a catchable termination exception
pub(crate) fn term(target: &Coroutine, message: Option<&str>, code: Option<i64>) -> Result<Transfer> {
    let exception = Exception::new(
        ExceptionClass::Terminate,
        message.unwrap_or(""),
        code.unwrap_or(DEFAULT_CROSS_CODE),
    );
    throw(target, exception)
}

/// Kill `target`: raise an uncatchable exception in it, with switches
/// restricted to the killer and the victim until it is dead.
pub(crate) fn kill(target: &Coroutine, message: Option<&str>, code: Option<i64>) -> Result<()> {
    let (is_main, current) = runtime::with(|rt| (rt.main.ptr_eq(target), rt.current.clone()));
    if is_main {
        return Err(CoroutineError::MainProtected);
    }
    check_breakable(target)?;

    let exception = Exception::new(
        ExceptionClass::Kill,
        message.unwrap_or(""),
        code.unwrap_or(DEFAULT_CROSS_CODE),
    );
    if current.ptr_eq(target) {
        return Err(CoroutineError::Thrown(exception));
    }
    // A victim further down the chain would have to be unwound through the
    // coroutines it resumed.
    if switch::route(target)? == Route::Yield {
        return Err(CoroutineError::InProgress);
    }

    let guard = SwitchGuard::Rated {
        killer: current.id(),
        victim: target.id(),
    };
    exception.set_coroutine(current.id());
    drop(current);

    tracing::debug!(coroutine = %target.id(), "killing coroutine");
    runtime::with(|rt| rt.guards.push(guard));
    target.set_pending(exception);
    let outcome = switch::resume(target, Transfer::None);
    runtime::with(|rt| rt.guards.pop());

    if target.is_alive() {
        fatal!("Kill coroutine R{} failed by unknown reason", target.id());
    }
    if !outcome?.is_none() {
        fatal!("Killed coroutine R{} returned a value", target.id());
    }
    Ok(())
}

/// Raise the exception parked on `me`, if any.
///
/// The raised exception is a local copy with the original as its cause. An
/// exception already in flight is chained behind it, unless the new one is
/// a kill, which replaces it.
pub(crate) fn deliver_pending(me: &Coroutine) -> Result<()> {
    let Some(original) = me.take_pending() else {
        return Ok(());
    };

    let local = Exception::new(
        original.class().clone(),
        original.message(),
        original.code(),
    );
    if let Some(source) = original.coroutine() {
        local.set_coroutine(source);
    }
    local.set_previous(original);
    if local.is_uncatchable() && !runtime::with(|rt| rt.main.ptr_eq(me)) {
        me.mark_killed(local.clone());
    }

    if let Some(in_flight) = globals::take_exception() {
        if local.is_kill() {
            drop(in_flight);
        } else {
            local.set_previous(in_flight);
        }
    }
    Err(CoroutineError::Thrown(local))
}

/// Fail with the kill the current coroutine already received, if any
pub(crate) fn check_not_killed() -> Result<()> {
    match runtime::with(|rt| rt.current.kill_signal()) {
        Some(kill) => Err(CoroutineError::Thrown(kill)),
        None => Ok(()),
    }
}

fn check_breakable(target: &Coroutine) -> Result<()> {
    if !target.is_alive() {
        return Err(CoroutineError::NotAlive);
    }
    if runtime::with(|rt| rt.scheduler.as_ref().is_some_and(|s| s.ptr_eq(target))) {
        return Err(CoroutineError::SchedulerProtected);
    }
    Ok(())
}
