//! Managed callables

use super::exception::Exception;
use super::globals;
use super::value::Value;
use std::fmt;
use std::rc::Rc;

type Function = dyn Fn(Vec<Value>) -> Result<Value, Exception>;

/// A named, reference-counted managed function
#[derive(Clone)]
pub struct Callable {
    inner: Rc<CallableInner>,
}

struct CallableInner {
    name: String,
    function: Box<Function>,
}

impl Callable {
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Exception> + 'static,
    {
        Self {
            inner: Rc::new(CallableInner {
                name: name.into(),
                function: Box::new(function),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Invoke with a fresh activation frame named after the callable
    pub fn call(&self, args: Vec<Value>) -> Result<Value, Exception> {
        globals::call(&self.inner.name, || (self.inner.function)(args))
    }

    pub fn ptr_eq(&self, other: &Callable) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").field("name", &self.inner.name).finish()
    }
}
