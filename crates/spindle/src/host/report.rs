//! Error-reporting path for exceptions nobody caught
//!
//! Reports go to `tracing` and to a per-thread diagnostics log the host can
//! drain with [`take_diagnostics`]. An uncaught coroutine exception never
//! ends the process, whatever its severity.

use super::exception::Exception;
use super::globals;
use super::value::Value;
use crate::engine::CoroutineId;
use crate::options::ExceptionSeverity;
use std::cell::RefCell;
use std::fmt::Write;

thread_local! {
    static DIAGNOSTICS: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Append a line to the diagnostics log
pub(crate) fn diagnostic(message: String) {
    let _ = DIAGNOSTICS.try_with(|log| log.borrow_mut().push(message));
}

/// Drain the diagnostics log
pub fn take_diagnostics() -> Vec<String> {
    DIAGNOSTICS.with(|log| std::mem::take(&mut *log.borrow_mut()))
}

/// Render an uncaught exception with its causes and trace
pub fn format_uncaught(exception: &Exception) -> String {
    let mut out = format!("Uncaught {}", exception);
    for cause in exception.chain().skip(1) {
        let _ = write!(out, "\nCaused by: {}", cause);
    }
    if !exception.trace().is_empty() {
        out.push_str("\nStack trace:");
        for (i, function) in exception.trace().iter().enumerate() {
            let _ = write!(out, "\n#{} {}", i, function);
        }
    }
    out
}

/// Report an exception that escaped the entry of coroutine `id`.
///
/// The user exception handler gets the first chance; if it raises, the new
/// exception is reported with the original chained behind it.
pub(crate) fn report_uncaught(
    id: CoroutineId,
    exception: Exception,
    severity: ExceptionSeverity,
    classic: bool,
) {
    let mut exception = exception;
    if let Some(handler) = globals::exception_handler() {
        match handler.call(vec![Value::Exception(exception.clone())]) {
            Ok(_) => return,
            Err(raised) => {
                if !raised.ptr_eq(&exception) {
                    raised.set_previous(exception);
                }
                exception = raised;
            }
        }
    }

    if severity == ExceptionSeverity::None {
        tracing::trace!(coroutine = %id, "uncaught exception silenced: {}", exception);
        return;
    }

    let message = format_uncaught(&exception);
    let line = if classic {
        message
    } else {
        format!("[{} in R{}] {}", severity.label(), id, message)
    };
    tracing::warn!(coroutine = %id, "{}", line);
    diagnostic(line);
}
