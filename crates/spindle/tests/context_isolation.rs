//! Execution-context isolation tests
//!
//! Each coroutine sees its own activation stack, pending exception, error
//! handling mode, output buffers, silence depth and iteration position.

use spindle::host::globals::{self, ErrorHandling};
use spindle::host::take_diagnostics;
use spindle::{Callable, Coroutine, Exception, ExceptionClass, Value};

// ===== Output Buffering =====

#[test]
fn test_output_buffers_are_per_coroutine() {
    globals::ob_start();
    let co = Coroutine::new(Callable::new("writer", |_| {
        let level = globals::ob_get_level() as i64;
        globals::ob_start();
        globals::echo("inside");
        Coroutine::yield_(Value::Int(level))?;
        Ok(Value::from(globals::ob_get_clean().unwrap_or_default()))
    }))
    .unwrap();

    assert_eq!(co.resume(vec![]).unwrap(), Value::Int(0));
    globals::echo("outside");
    assert_eq!(globals::ob_get_level(), 1);
    assert_eq!(co.resume(vec![]).unwrap(), Value::from("inside"));
    assert_eq!(globals::ob_get_clean().as_deref(), Some("outside"));
}

#[test]
fn test_finished_coroutine_discards_open_buffers() {
    let co = Coroutine::new(Callable::new("leaky", |_| {
        globals::ob_start();
        globals::ob_start();
        globals::echo("lost");
        Ok(Value::Null)
    }))
    .unwrap();
    co.resume(vec![]).unwrap();
    assert_eq!(globals::ob_get_level(), 0);
}

// ===== Error State =====

#[test]
fn test_silence_does_not_leak() {
    take_diagnostics();
    let co = Coroutine::new(Callable::new("loud", |_| {
        let silenced = globals::is_silenced();
        globals::warn("from coroutine")?;
        Ok(Value::Bool(silenced))
    }))
    .unwrap();
    let silenced = globals::silence(|| co.resume(vec![]).unwrap());
    assert_eq!(silenced, Value::Bool(false));
    assert_eq!(take_diagnostics(), vec!["Warning: from coroutine".to_string()]);
}

#[test]
fn test_error_handling_mode_is_per_coroutine() {
    let co = Coroutine::new(Callable::new("strict", |_| {
        globals::set_error_handling(ErrorHandling::Throw);
        Coroutine::yield_(Value::Null)?;
        Ok(Value::Bool(globals::error_handling() == ErrorHandling::Throw))
    }))
    .unwrap();
    co.resume(vec![]).unwrap();
    assert_eq!(globals::error_handling(), ErrorHandling::Detailed);
    assert!(globals::warn("still detailed").is_ok());
    assert_eq!(co.resume(vec![]).unwrap(), Value::Bool(true));
    take_diagnostics();
}

#[test]
fn test_pending_exception_is_per_coroutine() {
    let co = Coroutine::new(Callable::new("holder", |_| {
        globals::set_exception(Exception::new(ExceptionClass::Error, "mine", 0));
        Coroutine::yield_(Value::Null)?;
        Ok(Value::Bool(globals::take_exception().is_some()))
    }))
    .unwrap();
    co.resume(vec![]).unwrap();
    assert!(!globals::has_exception());
    assert_eq!(co.resume(vec![]).unwrap(), Value::Bool(true));
}

// ===== Iteration =====

#[test]
fn test_walk_position_survives_switch() {
    let co = Coroutine::new(Callable::new("inner", |_| {
        loop {
            let position = globals::walk_position().map_or(-1, |p| p as i64);
            Coroutine::yield_(Value::Int(position))?;
        }
    }))
    .unwrap();

    let items = vec![Value::Int(10), Value::Int(20), Value::Int(30)];
    let mut seen = Vec::new();
    globals::walk(&items, |_| {
        let inner = co.resume(vec![]).map_err(Exception::from)?;
        seen.push((inner, globals::walk_position()));
        Ok(())
    })
    .unwrap();

    assert_eq!(
        seen,
        vec![
            (Value::Int(-1), Some(0)),
            (Value::Int(-1), Some(1)),
            (Value::Int(-1), Some(2)),
        ]
    );
    co.kill(None, None).unwrap();
}

// ===== Activation Stack =====

#[test]
fn test_trace_of_suspended_coroutine() {
    let co = Coroutine::new(Callable::new("worker", |_| {
        let frame = globals::frame();
        Coroutine::yield_(Value::from(frame.unwrap_or_default()))?;
        Ok(Value::Null)
    }))
    .unwrap();
    assert!(co.trace(0).is_empty());
    assert_eq!(co.resume(vec![]).unwrap(), Value::from("worker"));
    assert_eq!(co.trace(0), vec!["worker".to_string()]);
    assert_eq!(co.trace_as_string(0), "#0 worker");
    assert_eq!(co.trace_as_list(1), Value::from(vec![Value::from("worker")]));
    assert!(globals::frame().is_none());
    co.resume(vec![]).unwrap();
    assert!(co.trace(0).is_empty());
}

#[test]
fn test_stack_page_size_applies_to_coroutine() {
    let co = Coroutine::with_stack_sizes(
        Callable::new("pages", |_| Ok(Value::Int(globals::stack_pages().0 as i64))),
        16 * 1024,
        0,
    )
    .unwrap();
    assert_eq!(co.resume(vec![]).unwrap(), Value::Int(16 * 1024));
}
