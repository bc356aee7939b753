//! Scheduler role
//!
//! At most one coroutine per runtime holds the scheduler role. It is where
//! the main coroutine yields to when it has no previous, it is protected from
//! cross exceptions, and it is not listed in the registry while it holds the
//! role.

use super::object::Coroutine;
use super::switch::{self, Route};
use super::transfer::Transfer;
use crate::engine::CoroutineFlags;
use crate::error::{CoroutineError, Result};
use crate::host::Value;
use crate::runtime;

/// Promote `candidate` to scheduler and start it.
///
/// Returns once the scheduler yields back or stops itself; the value is
/// whatever it handed back.
pub fn scheduler_run(candidate: &Coroutine) -> Result<Value> {
    if runtime::with(|rt| rt.scheduler.is_some()) {
        return Err(CoroutineError::SchedulerRunning);
    }
    if switch::route(candidate)? != Route::Resume {
        return Err(CoroutineError::InProgress);
    }

    candidate.primitive().set_flag(CoroutineFlags::SCHEDULER);
    let replaced = runtime::with(|rt| rt.scheduler.replace(candidate.clone()));
    drop(replaced);
    tracing::debug!(coroutine = %candidate.id(), "scheduler running");

    let outcome = candidate.resume(Vec::new());

    let (abandoned, removed) = runtime::with(|rt| {
        let holds_role = rt.scheduler.as_ref().is_some_and(|s| s.ptr_eq(candidate));
        // A scheduler that never got going gives up the role.
        let abandoned = if holds_role && !candidate.is_alive() {
            rt.scheduler.take()
        } else {
            None
        };
        (abandoned, rt.registry.remove(candidate.id()))
    });
    if abandoned.is_some() {
        candidate.primitive().clear_flag(CoroutineFlags::SCHEDULER);
    }
    drop(abandoned);
    drop(removed);
    outcome
}

/// Demote the current coroutine from scheduler and yield to whoever resumed
/// it.
///
/// Returns the coroutine that holds control once the former scheduler is
/// resumed again.
pub fn scheduler_stop() -> Result<Coroutine> {
    let current = runtime::current();
    let taken = runtime::with(|rt| {
        if rt.scheduler.as_ref().is_some_and(|s| s.ptr_eq(&current)) {
            Ok(rt.scheduler.take())
        } else {
            Err(CoroutineError::NotScheduler(current.id()))
        }
    })?;
    current.primitive().clear_flag(CoroutineFlags::SCHEDULER);
    tracing::debug!(coroutine = %current.id(), "scheduler stopped");
    drop(taken);
    drop(current);

    switch::suspend(Transfer::None)?;
    Ok(runtime::current())
}
