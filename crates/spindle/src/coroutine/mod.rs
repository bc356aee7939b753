//! Managed coroutines
//!
//! The layer on top of the primitive engine: coroutine objects with their
//! saved execution contexts, the switch dispatcher and its guards, the value
//! transfer protocol, cross-coroutine exceptions, the scheduler role and the
//! live registry.

pub(crate) mod context;
mod cross;
mod entry;
mod guard;
mod introspect;
mod object;
mod registry;
mod scheduler;
mod switch;
mod transfer;

pub use guard::SwitchGuard;
pub use introspect::{dump_all, dump_by_id, CoroutineInfo};
pub use object::Coroutine;
pub use scheduler::{scheduler_run, scheduler_stop};
pub use transfer::Transfer;

pub(crate) use guard::GuardStack;
pub(crate) use registry::Registry;
