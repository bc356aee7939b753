//! Entry trampolines
//!
//! The functions the engine runs on a fresh native stack. The managed one
//! registers the coroutine, unpacks the first payload into arguments, calls
//! the entry callable, reports what escaped it and performs the final switch
//! back to the previous coroutine. A killed coroutine finishes with no value.

use super::switch;
use super::transfer::{self, Transfer};
use crate::engine::CoroutineFlags;
use crate::host::{globals, report_uncaught, Value};
use crate::runtime;

pub(crate) fn managed(input: Transfer) -> Transfer {
    let this = runtime::current();
    let id = this.id();
    let replaced = runtime::with(|rt| {
        rt.active_count += 1;
        rt.registry.insert(this.clone())
    });
    drop(replaced);
    tracing::debug!(coroutine = %id, "coroutine started");

    let args = match transfer::receive(this.inner(), input) {
        Transfer::Value(value) => vec![value],
        Transfer::Call(args) => args,
        Transfer::None | Transfer::Error | Transfer::Raw(_) => Vec::new(),
    };
    let callable = this.inner().context.borrow_mut().take_callable();
    drop(this);
    let Some(callable) = callable else {
        fatal!("Coroutine R{} has no entry callable", id);
    };

    let outcome = callable.call(args);
    let this = runtime::current();
    let killed = this.primitive().has_flag(CoroutineFlags::KILLED)
        || matches!(&outcome, Err(exception) if exception.is_kill());

    let retval = if killed {
        drop(outcome);
        tracing::debug!(coroutine = %id, "coroutine killed");
        Value::Null
    } else {
        match outcome {
            Ok(value) => value,
            Err(exception) => {
                let (severity, classic) = runtime::with(|rt| {
                    (
                        rt.options.exception_error_severity,
                        rt.options.classic_error_handler,
                    )
                });
                report_uncaught(id, exception, severity, classic);
                Value::Null
            }
        }
    };

    this.primitive().set_flag(CoroutineFlags::MAIN_FINISHED);
    drop(callable);
    let discarded = globals::discard_output();
    if discarded > 0 {
        tracing::trace!(coroutine = %id, buffers = discarded, "discarded output buffers");
    }
    this.primitive().set_flag(CoroutineFlags::ALL_FINISHED);

    let carried = switch::hand_back(&this, Transfer::from_value(retval));
    drop(this);
    carried
}

/// Wrap a raw entry so it finishes with a proper switch back
pub(crate) fn raw<F>(entry: F) -> impl FnOnce(Transfer) -> Transfer + 'static
where
    F: FnOnce(Transfer) -> Transfer + 'static,
{
    move |input| {
        let input = {
            let this = runtime::current();
            transfer::receive(this.inner(), input)
        };
        let output = entry(input);

        let this = runtime::current();
        let output = if this.primitive().has_flag(CoroutineFlags::KILLED) {
            Transfer::None
        } else {
            output
        };
        this.primitive()
            .set_flag(CoroutineFlags::MAIN_FINISHED | CoroutineFlags::ALL_FINISHED);
        let carried = switch::hand_back(&this, output);
        drop(this);
        carried
    }
}
