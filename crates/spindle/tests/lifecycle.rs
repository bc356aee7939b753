//! Coroutine lifecycle tests
//!
//! Construction, start, yield/resume round trips, the relationship rules of
//! the resume chain and reference accounting.
//!
//! # Running Tests
//! ```bash
//! cargo test --test lifecycle
//! ```

use spindle::runtime;
use spindle::{Callable, Coroutine, CoroutineError, CoroutineState, Value};

fn int(value: &Value) -> i64 {
    value.as_int().unwrap_or_default()
}

// ===== Start and Finish =====

#[test]
fn test_run_to_completion_with_arguments() {
    let before = Coroutine::count();
    let add = Coroutine::new(Callable::new("add", |args| {
        Ok(Value::Int(args.iter().map(int).sum()))
    }))
    .unwrap();
    assert_eq!(add.state(), CoroutineState::Ready);
    assert!(add.is_available());
    assert!(!add.is_alive());

    let result = add.resume(vec![Value::Int(41), Value::Int(1)]).unwrap();
    assert_eq!(result, Value::Int(42));
    assert_eq!(add.state(), CoroutineState::Dead);
    assert_eq!(add.state_name(), "dead");
    assert!(!add.is_alive());
    assert!(!add.is_available());
    assert_eq!(Coroutine::count(), before);
}

#[test]
fn test_zero_and_single_argument_start() {
    let count = Coroutine::new(Callable::new("count", |args| Ok(Value::Int(args.len() as i64)))).unwrap();
    assert_eq!(count.resume(vec![]).unwrap(), Value::Int(0));

    let echo = Coroutine::new(Callable::new("echo", |mut args| Ok(args.pop().unwrap_or_default()))).unwrap();
    assert_eq!(echo.resume_value("hello").unwrap(), Value::from("hello"));
}

#[test]
fn test_run_starts_immediately() {
    let started = Coroutine::run(
        Callable::new("wait", |_| {
            Coroutine::yield_(Value::Null)?;
            Ok(Value::Null)
        }),
        vec![],
    )
    .unwrap();
    assert_eq!(started.state(), CoroutineState::Waiting);
    started.resume(vec![]).unwrap();
    assert_eq!(started.state(), CoroutineState::Dead);
}

#[test]
fn test_yield_then_resume() {
    let before = Coroutine::count();
    let co = Coroutine::new(Callable::new("step", |_| {
        let got = Coroutine::yield_(Value::Int(1))?;
        Ok(Value::Int(int(&got) + 1))
    }))
    .unwrap();

    assert_eq!(co.resume(vec![]).unwrap(), Value::Int(1));
    assert_eq!(co.state(), CoroutineState::Waiting);
    assert!(co.is_alive());
    assert_eq!(Coroutine::count(), before + 1);
    assert!(Coroutine::get(co.id()).is_some());

    assert_eq!(co.resume_value(Value::Int(10)).unwrap(), Value::Int(11));
    assert!(!co.is_alive());
    assert!(Coroutine::get(co.id()).is_none());
}

#[test]
fn test_generator_style_loop() {
    let numbers = Coroutine::new(Callable::new("numbers", |_| {
        for i in 0..5i64 {
            Coroutine::yield_(Value::Int(i))?;
        }
        Ok(Value::Null)
    }))
    .unwrap();

    let mut seen = Vec::new();
    let mut value = numbers.resume(vec![]).unwrap();
    while numbers.is_alive() {
        seen.push(int(&value));
        value = numbers.resume(vec![]).unwrap();
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_active_count_tracks_started_coroutines() {
    let before = runtime::active_count();
    let co = Coroutine::new(Callable::new("idle", |_| {
        Coroutine::yield_(Value::Null)?;
        Ok(Value::Null)
    }))
    .unwrap();
    assert_eq!(runtime::active_count(), before);
    co.resume(vec![]).unwrap();
    assert_eq!(runtime::active_count(), before + 1);
    co.resume(vec![]).unwrap();
    assert_eq!(runtime::active_count(), before);
}

// ===== Failure Modes =====

#[test]
fn test_non_callable_is_rejected() {
    let err = Coroutine::new(Value::Int(1)).unwrap_err();
    assert!(matches!(err, CoroutineError::InvalidCallable(_)));
    assert_eq!(err.to_string(), "Coroutine function must be callable, int given");
}

#[test]
fn test_resume_finished_is_not_available() {
    let co = Coroutine::new(Callable::new("noop", |_| Ok(Value::Null))).unwrap();
    co.resume(vec![]).unwrap();
    assert!(matches!(co.resume(vec![]), Err(CoroutineError::NotAvailable)));
}

#[test]
fn test_too_many_arguments_after_start() {
    let co = Coroutine::new(Callable::new("wait", |_| {
        Coroutine::yield_(Value::Null)?;
        Ok(Value::Null)
    }))
    .unwrap();
    co.resume(vec![]).unwrap();
    let err = co.resume(vec![Value::Int(1), Value::Int(2)]).unwrap_err();
    assert!(matches!(err, CoroutineError::TooManyArguments));
    co.resume(vec![]).unwrap();
}

#[test]
fn test_yield_from_main_has_nowhere_to_go() {
    let err = Coroutine::yield_(Value::Int(1)).unwrap_err();
    assert!(matches!(err, CoroutineError::NowhereToGo));
    assert_eq!(err.to_string(), "Coroutine has nowhere to go");
}

#[test]
fn test_resume_self_is_running() {
    let co = Coroutine::new(Callable::new("self", |_| {
        match Coroutine::current().resume(vec![]) {
            Err(CoroutineError::Running) => Ok(Value::Bool(true)),
            _ => Ok(Value::Bool(false)),
        }
    }))
    .unwrap();
    assert_eq!(co.resume(vec![]).unwrap(), Value::Bool(true));
}

#[test]
fn test_resume_deeper_in_chain_is_in_progress() {
    let inner = Callable::new("inner", |_| match Coroutine::main().resume(vec![]) {
        Err(CoroutineError::InProgress) => Ok(Value::Bool(true)),
        _ => Ok(Value::Bool(false)),
    });
    let outer = Coroutine::new(Callable::new("outer", move |_| {
        let inner = Coroutine::new(inner.clone())?;
        inner.resume(vec![]).map_err(Into::into)
    }))
    .unwrap();
    assert_eq!(outer.resume(vec![]).unwrap(), Value::Bool(true));
}

// ===== Relationships =====

#[test]
fn test_resuming_previous_acts_as_yield() {
    let inner = Callable::new("inner", |_| {
        let previous = Coroutine::current().previous().expect("resumed by outer");
        let reply = previous.resume_value(Value::Int(5))?;
        Ok(Value::Int(int(&reply) * 2))
    });
    let outer = Coroutine::new(Callable::new("outer", move |_| {
        let inner = Coroutine::new(inner.clone())?;
        let jumped = inner.resume(vec![])?;
        let finished = inner.resume_value(Value::Int(int(&jumped) + 1))?;
        Ok(finished)
    }))
    .unwrap();
    assert_eq!(outer.resume(vec![]).unwrap(), Value::Int(12));
}

#[test]
fn test_previous_and_origin() {
    let co = Coroutine::new(Callable::new("probe", |_| {
        let previous = Coroutine::current().previous();
        let is_main = previous.is_some_and(|p| p.ptr_eq(&Coroutine::main()));
        Coroutine::yield_(Value::Bool(is_main))?;
        Ok(Value::Null)
    }))
    .unwrap();
    assert!(co.origin().is_none());
    assert_eq!(co.resume(vec![]).unwrap(), Value::Bool(true));
    assert!(co.origin().unwrap().ptr_eq(&Coroutine::main()));
    assert!(co.previous().is_none());
    assert!(Coroutine::main().previous().is_none());
    co.resume(vec![]).unwrap();
}

#[test]
fn test_ref_count() {
    let co = Coroutine::new(Callable::new("wait", |_| {
        Coroutine::yield_(Value::Null)?;
        Ok(Value::Null)
    }))
    .unwrap();
    assert_eq!(co.ref_count(), 1);
    co.resume(vec![]).unwrap();
    // handle plus the registry entry
    assert_eq!(co.ref_count(), 2);
    co.resume(vec![]).unwrap();
    assert_eq!(co.ref_count(), 1);
}

#[test]
fn test_stack_sizes() {
    let co = Coroutine::with_stack_sizes(Callable::new("noop", |_| Ok(Value::Null)), 10 * 1024, 0).unwrap();
    assert_eq!(co.stack_page_size(), 12 * 1024);
    assert_eq!(co.native_stack_size(), runtime::options().default_native_stack_size);
}

#[test]
fn test_main_is_always_alive() {
    let main = Coroutine::main();
    assert!(main.is_alive());
    assert!(main.ptr_eq(&Coroutine::current()));
    assert_eq!(main.state(), CoroutineState::Running);
    assert!(Coroutine::all().iter().any(|c| c.ptr_eq(&main)));
}
