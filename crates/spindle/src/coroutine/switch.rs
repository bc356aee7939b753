//! Switch dispatch
//!
//! Every switch follows the same sequence: check the guards, run the
//! transfer protocol, swap execution contexts, update the chain of
//! suspended callers and only then call into the engine. Resuming pushes the
//! resumer onto the chain; yielding and finishing pop it.

use super::context;
use super::cross;
use super::object::Coroutine;
use super::transfer::{self, Transfer};
use crate::engine::{CoroutineFlags, CoroutineState};
use crate::error::{CoroutineError, Result};
use crate::runtime;
use std::mem;

/// How a switch to a given target is carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    /// Push the current coroutine and enter the target
    Resume,
    /// The target is the current coroutine's previous: yield to it
    Yield,
}

/// Decide how the current coroutine may switch to `target`
pub(crate) fn route(target: &Coroutine) -> Result<Route> {
    runtime::with(|rt| {
        if rt.current.ptr_eq(target) {
            return Err(CoroutineError::Running);
        }
        if rt.chain.last().is_some_and(|previous| previous.ptr_eq(target)) {
            return Ok(Route::Yield);
        }
        if rt.chain.iter().any(|c| c.ptr_eq(target)) {
            return Err(CoroutineError::InProgress);
        }
        if !target.is_available() {
            return Err(CoroutineError::NotAvailable);
        }
        Ok(Route::Resume)
    })
}

/// Switch to `target`, returning the payload control comes back with
pub(crate) fn resume(target: &Coroutine, payload: Transfer) -> Result<Transfer> {
    cross::check_not_killed()?;
    let route = route(target)?;
    dispatch(target, payload, route)
}

pub(crate) fn dispatch(target: &Coroutine, payload: Transfer, route: Route) -> Result<Transfer> {
    match route {
        Route::Resume => enter(target, payload),
        Route::Yield => suspend(payload),
    }
}

/// Yield to the current coroutine's previous and wait to be resumed.
///
/// With an empty chain the current coroutine is the root; it can only hand
/// control to an active scheduler.
pub(crate) fn suspend(payload: Transfer) -> Result<Transfer> {
    cross::check_not_killed()?;
    let (current, has_previous, scheduler) = runtime::with(|rt| {
        (
            rt.current.clone(),
            !rt.chain.is_empty(),
            rt.scheduler.clone(),
        )
    });

    if !has_previous {
        drop(current);
        return match scheduler {
            Some(scheduler) => resume(&scheduler, payload),
            None => Err(CoroutineError::NowhereToGo),
        };
    }
    drop(scheduler);

    let carried = hand_back(&current, payload);
    let suspender = current.primitive().suspender();
    drop(current);

    let input = suspender.suspend(carried);

    let me = runtime::current();
    let received = transfer::receive(me.inner(), input);
    cross::deliver_pending(&me)?;
    Ok(received)
}

/// Give control back to the previous coroutine without suspending the
/// native stack; returns what the engine has to carry.
///
/// Used by yields right before the native suspend and by entry trampolines
/// right before they return.
pub(crate) fn hand_back(current: &Coroutine, payload: Transfer) -> Transfer {
    let (previous, caps) = runtime::with(|rt| (rt.chain.last().cloned(), rt.options.context));
    let Some(previous) = previous else {
        fatal!("Coroutine R{} has nowhere to go", current.id());
    };
    admit(current, &previous);

    let carried = transfer::deliver(current.inner(), previous.inner(), payload);
    context::switch(current.inner(), previous.inner(), caps);
    let replaced = runtime::with(|rt| {
        let popped = rt.chain.pop();
        popped.map(|previous| mem::replace(&mut rt.current, previous))
    });
    drop(replaced);

    tracing::trace!(from = %current.id(), to = %previous.id(), "coroutine yield");
    carried
}

fn enter(target: &Coroutine, payload: Transfer) -> Result<Transfer> {
    let (current, caps) = runtime::with(|rt| (rt.current.clone(), rt.options.context));
    admit(&current, target);

    let carried = transfer::deliver(current.inner(), target.inner(), payload);
    target.set_origin_once(&current);
    context::switch(current.inner(), target.inner(), caps);
    let replaced = runtime::with(|rt| {
        rt.chain.push(current.clone());
        mem::replace(&mut rt.current, target.clone())
    });
    drop(replaced);

    tracing::trace!(from = %current.id(), to = %target.id(), "coroutine resume");
    let output = target.primitive().resume(current.primitive(), carried);
    if output.is_error() {
        fatal!("Resume coroutine R{} failed", target.id());
    }
    debug_assert!(runtime::with(|rt| rt.current.ptr_eq(&current)));

    if target.state() == CoroutineState::Dead {
        finalize_dead(target);
    }

    let received = transfer::receive(current.inner(), output);
    cross::deliver_pending(&current)?;
    Ok(received)
}

/// Release what a dead coroutine still owns and drop its registry entry
fn finalize_dead(target: &Coroutine) {
    context::close(&target.inner().context);
    let managed = target.primitive().has_flag(CoroutineFlags::ACCEPT_VALUES);
    let (removed, was_scheduler) = runtime::with(|rt| {
        if managed {
            rt.active_count = rt.active_count.saturating_sub(1);
        }
        let was_scheduler = rt.scheduler.as_ref().is_some_and(|s| s.ptr_eq(target));
        (rt.registry.remove(target.id()), was_scheduler)
    });
    drop(removed);
    if was_scheduler {
        fatal!("Scheduler R{} finished before it was stopped", target.id());
    }
    tracing::debug!(coroutine = %target.id(), "coroutine finished");
}

/// Abort unless every active guard admits switching from `from` to `to`
fn admit(from: &Coroutine, to: &Coroutine) {
    let refusal = runtime::with(|rt| rt.guards.refusal(from.id(), to.id()));
    if let Some(guard) = refusal {
        fatal!(
            "Unexpected coroutine switch from R{} to R{} ({})",
            from.id(),
            to.id(),
            guard
        );
    }
}
