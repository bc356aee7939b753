//! Runtime teardown tests
//!
//! Each test runs on its own thread so the torn-down runtime never leaks
//! into another test.

use spindle::runtime::{self, RuntimeStatus};
use spindle::{Callable, Coroutine, RuntimeOptions, Value};
use std::cell::RefCell;
use std::rc::Rc;

fn on_fresh_thread(f: impl FnOnce() + Send + 'static) {
    std::thread::spawn(f).join().expect("test thread panicked");
}

#[test]
fn test_shutdown_kills_live_coroutines() {
    on_fresh_thread(|| {
        let message = Rc::new(RefCell::new(String::new()));
        let seen = message.clone();
        let co = Coroutine::new(Callable::new("sleeper", move |_| {
            match Coroutine::yield_(Value::Null) {
                Ok(_) => Ok(Value::Null),
                Err(e) => {
                    let e = spindle::Exception::from(e);
                    *seen.borrow_mut() = e.message().to_string();
                    Err(e)
                }
            }
        }))
        .unwrap();
        co.resume(vec![]).unwrap();
        assert_eq!(runtime::active_count(), 2);

        runtime::shutdown();
        assert!(!co.is_alive());
        assert_eq!(
            message.borrow().as_str(),
            "Coroutine is forced to kill when the runtime shutdown"
        );
        assert_eq!(runtime::status(), RuntimeStatus::Shutdown);
        assert!(runtime::is_readonly());
        assert_eq!(runtime::active_count(), 0);
        assert_eq!(Coroutine::count(), 0);
    });
}

#[test]
fn test_init_after_shutdown() {
    on_fresh_thread(|| {
        let old_main = Coroutine::main();
        runtime::shutdown();
        assert!(!old_main.is_alive());

        let options = RuntimeOptions::from_json(r#"{"classic_error_handler": true}"#).unwrap();
        runtime::init(options);
        assert_eq!(runtime::status(), RuntimeStatus::Running);
        assert!(runtime::options().classic_error_handler);
        assert!(!Coroutine::main().ptr_eq(&old_main));

        let co = Coroutine::new(Callable::new("again", |_| Ok(Value::Int(1)))).unwrap();
        assert_eq!(co.resume(vec![]).unwrap(), Value::Int(1));
    });
}

#[test]
fn test_classic_report_has_no_prefix() {
    on_fresh_thread(|| {
        runtime::init(RuntimeOptions {
            classic_error_handler: true,
            ..RuntimeOptions::default()
        });
        spindle::host::take_diagnostics();
        let co = Coroutine::new(Callable::new("fails", |_| {
            Err(spindle::Exception::new(spindle::ExceptionClass::Exception, "bad", 0))
        }))
        .unwrap();
        co.resume(vec![]).unwrap();
        let diagnostics = spindle::host::take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].starts_with("Uncaught Exception: bad"));
    });
}
