//! Default constants for coroutine and runtime configuration.
//!
//! Centralizes the sizing numbers shared by the engine, the execution
//! context allocator and `RuntimeOptions`.

/// Smallest activation-stack page a coroutine may be given (bytes).
pub const MIN_STACK_PAGE_SIZE: usize = 4 * 1024;

/// Largest activation-stack page a coroutine may be given (bytes).
pub const MAX_STACK_PAGE_SIZE: usize = 16 * 1024 * 1024;

/// Activation-stack pages are rounded up to this alignment (bytes).
pub const STACK_PAGE_ALIGNMENT: usize = 4 * 1024;

/// Activation-stack page size used when a caller passes zero (bytes).
pub const DEFAULT_STACK_PAGE_SIZE: usize = 8 * 1024;

/// Smallest native (machine) stack the engine will map (bytes).
pub const MIN_NATIVE_STACK_SIZE: usize = 64 * 1024;

/// Largest native (machine) stack the engine will map (bytes).
pub const MAX_NATIVE_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Native stack size used when a caller passes zero (bytes).
pub const DEFAULT_NATIVE_STACK_SIZE: usize = 1024 * 1024;

/// Status code carried by kill/term requests that do not name one (`~0`).
pub const DEFAULT_CROSS_CODE: i64 = !0;

/// Message used when shutdown forcibly kills the remaining coroutines.
pub const SHUTDOWN_KILL_MESSAGE: &str = "Coroutine is forced to kill when the runtime shutdown";
