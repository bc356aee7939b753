//! Runtime configuration
//!
//! `RuntimeOptions` is installed once per thread by [`crate::runtime::init`]
//! (or defaulted on first use) and read by the coroutine layer on every
//! construction and every context swap.

use crate::defaults::{
    DEFAULT_NATIVE_STACK_SIZE, DEFAULT_STACK_PAGE_SIZE, MAX_NATIVE_STACK_SIZE,
    MAX_STACK_PAGE_SIZE, MIN_NATIVE_STACK_SIZE, MIN_STACK_PAGE_SIZE, STACK_PAGE_ALIGNMENT,
};
use serde::{Deserialize, Serialize};

/// How uncaught exceptions escaping a coroutine entry are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionSeverity {
    /// Drop them silently
    None,
    /// Report as a warning
    Warning,
    /// Report as a fatal error (still never terminates the process)
    #[default]
    Error,
}

impl ExceptionSeverity {
    /// Label used in the report prefix
    pub fn label(self) -> &'static str {
        match self {
            ExceptionSeverity::None => "Notice",
            ExceptionSeverity::Warning => "Warning",
            ExceptionSeverity::Error => "Fatal error",
        }
    }
}

/// Which optional pieces of interpreter state travel with a coroutine.
///
/// A disabled capability is left in the globals on every switch, i.e. it is
/// shared by all coroutines of the thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextCapabilities {
    /// Swap the output-buffer stack
    pub output_buffering: bool,
    /// Swap the in-flight iteration callback context
    pub iteration_context: bool,
    /// Swap the error-suppression depth
    pub error_suppression: bool,
}

impl Default for ContextCapabilities {
    fn default() -> Self {
        Self {
            output_buffering: true,
            iteration_context: true,
            error_suppression: true,
        }
    }
}

/// Per-thread runtime options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeOptions {
    /// Activation-stack page size for coroutines created with size 0
    pub default_stack_page_size: usize,
    /// Native stack size for coroutines created with size 0
    pub default_native_stack_size: usize,
    /// Reporting level for uncaught coroutine exceptions
    pub exception_error_severity: ExceptionSeverity,
    /// Report uncaught exceptions without the `[<type> in R<id>]` prefix
    pub classic_error_handler: bool,
    /// Context swap capabilities
    pub context: ContextCapabilities,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            default_stack_page_size: DEFAULT_STACK_PAGE_SIZE,
            default_native_stack_size: DEFAULT_NATIVE_STACK_SIZE,
            exception_error_severity: ExceptionSeverity::default(),
            classic_error_handler: false,
            context: ContextCapabilities::default(),
        }
    }
}

impl RuntimeOptions {
    /// Parse options from a JSON document; absent keys keep their defaults
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Clamp and align an activation-stack page size.
///
/// Zero selects `default`; sizes outside the allowed range snap to the
/// nearest bound; everything else is rounded up to the page alignment.
pub fn align_stack_page_size(size: usize, default: usize) -> usize {
    if size == 0 {
        default
    } else if size < MIN_STACK_PAGE_SIZE {
        MIN_STACK_PAGE_SIZE
    } else if size > MAX_STACK_PAGE_SIZE {
        MAX_STACK_PAGE_SIZE
    } else {
        align_up(size, STACK_PAGE_ALIGNMENT)
    }
}

/// Clamp a native stack size to the engine bounds (zero selects `default`)
pub fn align_native_stack_size(size: usize, default: usize) -> usize {
    if size == 0 {
        default
    } else {
        size.clamp(MIN_NATIVE_STACK_SIZE, MAX_NATIVE_STACK_SIZE)
    }
}

fn align_up(size: usize, alignment: usize) -> usize {
    (size + alignment - 1) & !(alignment - 1)
}
