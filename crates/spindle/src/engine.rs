//! Primitive coroutine engine
//!
//! A thin layer over `corosensei` stackful coroutines. The engine owns the
//! native stack, the `Init → Ready → Running ⇄ Waiting → Dead` state machine
//! and identity allocation; it knows nothing about managed execution state,
//! which the coroutine layer swaps around every call into here.

use crate::coroutine::Transfer;
use crate::error::Result;
use crate::options::align_native_stack_size;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine as NativeCoroutine, CoroutineResult, Yielder};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

type Native = NativeCoroutine<Transfer, Transfer, Transfer, DefaultStack>;
type YielderSlot = Rc<Cell<*const Yielder<Transfer, Transfer>>>;

/// Unique identifier for a coroutine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CoroutineId(u64);

static NEXT_COROUTINE_ID: AtomicU64 = AtomicU64::new(1);

impl CoroutineId {
    /// Generate a new unique CoroutineId
    pub fn new() -> Self {
        CoroutineId(NEXT_COROUTINE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a CoroutineId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        CoroutineId(id)
    }
}

impl Default for CoroutineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a primitive coroutine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoroutineState {
    /// Native stack not mapped yet
    Init,
    /// Constructed, never resumed
    Ready,
    /// Holding the thread of control
    Running,
    /// Suspended, either yielded or waiting on a coroutine it resumed
    Waiting,
    /// Entry function returned
    Dead,
}

impl CoroutineState {
    /// Display name of the state
    pub fn name(self) -> &'static str {
        match self {
            CoroutineState::Init => "init",
            CoroutineState::Ready => "ready",
            CoroutineState::Running => "running",
            CoroutineState::Waiting => "waiting",
            CoroutineState::Dead => "dead",
        }
    }
}

impl fmt::Display for CoroutineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Independent flag bits carried by a coroutine
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CoroutineFlags(u8);

impl CoroutineFlags {
    /// No flags set
    pub const NONE: CoroutineFlags = CoroutineFlags(0);
    /// Promoted to the scheduler role
    pub const SCHEDULER: CoroutineFlags = CoroutineFlags(1 << 0);
    /// Never installs an execution context on switch-in
    pub const NO_STACK: CoroutineFlags = CoroutineFlags(1 << 1);
    /// Understands the data-transfer protocol (managed coroutine)
    pub const ACCEPT_VALUES: CoroutineFlags = CoroutineFlags(1 << 2);
    /// The entry callable returned
    pub const MAIN_FINISHED: CoroutineFlags = CoroutineFlags(1 << 3);
    /// Entry cleanup completed, only the final switch remains
    pub const ALL_FINISHED: CoroutineFlags = CoroutineFlags(1 << 4);
    /// A kill was delivered; the coroutine may only unwind from here
    pub const KILLED: CoroutineFlags = CoroutineFlags(1 << 5);

    /// Whether every bit of `other` is set
    pub fn contains(self, other: CoroutineFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: CoroutineFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: CoroutineFlags) {
        self.0 &= !other.0;
    }

    /// Raw bit pattern
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for CoroutineFlags {
    type Output = CoroutineFlags;

    fn bitor(self, rhs: CoroutineFlags) -> CoroutineFlags {
        CoroutineFlags(self.0 | rhs.0)
    }
}

/// A primitive stackful coroutine
pub struct RawCoroutine {
    /// Unique identifier
    id: CoroutineId,

    /// Current state
    state: Cell<CoroutineState>,

    /// Flag bits
    flags: Cell<CoroutineFlags>,

    /// Native coroutine, taken out for the duration of a resume
    native: RefCell<Option<Native>>,

    /// Yielder of the native coroutine while its entry is on the stack
    yielder: YielderSlot,

    /// Native stack size after alignment (0 for the main coroutine)
    native_stack_size: usize,

    /// When the coroutine was first resumed
    started_at: Cell<Option<Instant>>,

    /// When the entry returned
    finished_at: Cell<Option<Instant>>,
}

impl RawCoroutine {
    /// Allocate a primitive coroutine that runs `entry` on its own stack.
    ///
    /// `native_stack_size` is clamped to the engine bounds; zero selects
    /// `default_native_stack_size`.
    pub fn create<F>(
        entry: F,
        native_stack_size: usize,
        default_native_stack_size: usize,
        flags: CoroutineFlags,
    ) -> Result<Self>
    where
        F: FnOnce(Transfer) -> Transfer + 'static,
    {
        let native_stack_size = align_native_stack_size(native_stack_size, default_native_stack_size);
        let stack = DefaultStack::new(native_stack_size)?;

        let yielder: YielderSlot = Rc::new(Cell::new(ptr::null()));
        let slot = yielder.clone();
        let native = NativeCoroutine::with_stack(stack, move |y: &Yielder<Transfer, Transfer>, input| {
            slot.set(y as *const _);
            let output = entry(input);
            slot.set(ptr::null());
            output
        });

        let id = CoroutineId::new();
        tracing::trace!(coroutine = %id, native_stack_size, "coroutine created");

        Ok(Self {
            id,
            state: Cell::new(CoroutineState::Ready),
            flags: Cell::new(flags),
            native: RefCell::new(Some(native)),
            yielder,
            native_stack_size,
            started_at: Cell::new(None),
            finished_at: Cell::new(None),
        })
    }

    /// The primitive for the thread's root context; it has no native
    /// coroutine of its own and is always running or waiting.
    pub fn main() -> Self {
        Self {
            id: CoroutineId::new(),
            state: Cell::new(CoroutineState::Running),
            flags: Cell::new(CoroutineFlags::ACCEPT_VALUES),
            native: RefCell::new(None),
            yielder: Rc::new(Cell::new(ptr::null())),
            native_stack_size: 0,
            started_at: Cell::new(Some(Instant::now())),
            finished_at: Cell::new(None),
        }
    }

    pub fn id(&self) -> CoroutineId {
        self.id
    }

    pub fn state(&self) -> CoroutineState {
        self.state.get()
    }

    pub fn flags(&self) -> CoroutineFlags {
        self.flags.get()
    }

    pub fn has_flag(&self, flag: CoroutineFlags) -> bool {
        self.flags.get().contains(flag)
    }

    pub fn set_flag(&self, flag: CoroutineFlags) {
        let mut flags = self.flags.get();
        flags.insert(flag);
        self.flags.set(flags);
    }

    pub fn clear_flag(&self, flag: CoroutineFlags) {
        let mut flags = self.flags.get();
        flags.remove(flag);
        self.flags.set(flags);
    }

    pub fn native_stack_size(&self) -> usize {
        self.native_stack_size
    }

    /// Constructed and not finished
    pub fn is_available(&self) -> bool {
        matches!(
            self.state.get(),
            CoroutineState::Ready | CoroutineState::Running | CoroutineState::Waiting
        )
    }

    /// Started and not finished
    pub fn is_alive(&self) -> bool {
        matches!(
            self.state.get(),
            CoroutineState::Running | CoroutineState::Waiting
        )
    }

    /// Time spent since the first resume, frozen once the entry returns
    pub fn elapsed(&self) -> Duration {
        match self.started_at.get() {
            Some(started) => match self.finished_at.get() {
                Some(finished) => finished.duration_since(started),
                None => started.elapsed(),
            },
            None => Duration::ZERO,
        }
    }

    /// Switch from `from` into this coroutine.
    ///
    /// Returns the payload passed to the next suspend, or the entry's return
    /// value once it finishes (check [`RawCoroutine::state`]). Returns
    /// [`Transfer::Error`] without switching if there is nothing to resume.
    pub fn resume(&self, from: &RawCoroutine, payload: Transfer) -> Transfer {
        let taken = self.native.borrow_mut().take();
        let Some(mut native) = taken else {
            return Transfer::Error;
        };

        if self.state.get() == CoroutineState::Ready {
            self.started_at.set(Some(Instant::now()));
        }
        from.state.set(CoroutineState::Waiting);
        self.state.set(CoroutineState::Running);

        let output = match native.resume(payload) {
            CoroutineResult::Yield(output) => {
                *self.native.borrow_mut() = Some(native);
                self.state.set(CoroutineState::Waiting);
                output
            }
            CoroutineResult::Return(output) => {
                self.state.set(CoroutineState::Dead);
                self.finished_at.set(Some(Instant::now()));
                output
            }
        };
        from.state.set(CoroutineState::Running);
        output
    }

    /// Hand control back to whoever resumed this coroutine and wait until
    /// it is resumed again.
    pub fn suspend(&self, payload: Transfer) -> Transfer {
        self.suspender().suspend(payload)
    }

    /// A detached handle for suspending this coroutine, usable after every
    /// owning handle has been released
    pub fn suspender(&self) -> Suspender {
        Suspender {
            id: self.id,
            yielder: self.yielder.clone(),
        }
    }

    /// Release the native stack of a coroutine that is not running
    pub fn close(&self) {
        let native = self.native.borrow_mut().take();
        if self.state.get() != CoroutineState::Dead {
            self.state.set(CoroutineState::Dead);
            self.finished_at.set(Some(Instant::now()));
        }
        drop(native);
    }
}

/// Suspend point of a primitive coroutine
pub struct Suspender {
    id: CoroutineId,
    yielder: YielderSlot,
}

impl Suspender {
    /// Suspend the coroutine this was taken from; must be called on its own
    /// stack
    pub fn suspend(self, payload: Transfer) -> Transfer {
        let yielder = self.yielder.get();
        if yielder.is_null() {
            fatal!("Coroutine R{} cannot suspend outside of its own stack", self.id);
        }
        drop(self);
        // SAFETY: the pointer is published by the entry closure and refers to
        // the yielder owned by this coroutine's native frame; it is cleared
        // before that frame returns, and suspend is only reached from code
        // running on this coroutine's own stack.
        unsafe { (*yielder).suspend(payload) }
    }
}

impl fmt::Debug for RawCoroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCoroutine")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("flags", &self.flags.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coroutine_id_unique() {
        let a = CoroutineId::new();
        let b = CoroutineId::new();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(CoroutineId::from_u64(a.as_u64()), a);
    }

    #[test]
    fn test_flags() {
        let mut flags = CoroutineFlags::ACCEPT_VALUES | CoroutineFlags::NO_STACK;
        assert!(flags.contains(CoroutineFlags::NO_STACK));
        flags.remove(CoroutineFlags::NO_STACK);
        assert!(!flags.contains(CoroutineFlags::NO_STACK));
        assert!(flags.contains(CoroutineFlags::ACCEPT_VALUES));
        flags.insert(CoroutineFlags::SCHEDULER);
        assert_eq!(flags.bits(), 0b101);
    }

    #[test]
    fn test_raw_resume_and_suspend() {
        let main = RawCoroutine::main();
        let raw = Rc::new(RawCoroutine::create(
            |_| Transfer::Raw(7),
            0,
            crate::defaults::DEFAULT_NATIVE_STACK_SIZE,
            CoroutineFlags::NONE,
        )
        .unwrap());
        assert_eq!(raw.state(), CoroutineState::Ready);
        assert!(raw.is_available());
        assert!(!raw.is_alive());

        let output = raw.resume(&main, Transfer::None);
        assert!(matches!(output, Transfer::Raw(7)));
        assert_eq!(raw.state(), CoroutineState::Dead);
        assert_eq!(main.state(), CoroutineState::Running);
        assert!(matches!(raw.resume(&main, Transfer::None), Transfer::Error));
    }

    #[test]
    fn test_suspend_round_trip() {
        let main = RawCoroutine::main();
        let raw = Rc::new_cyclic(|weak: &std::rc::Weak<RawCoroutine>| {
            let weak = weak.clone();
            RawCoroutine::create(
                move |input| {
                    let Transfer::Raw(first) = input else { return Transfer::Error };
                    let this = weak.upgrade().unwrap();
                    let Transfer::Raw(second) = this.suspend(Transfer::Raw(first * 2)) else {
                        return Transfer::Error;
                    };
                    Transfer::Raw(first + second)
                },
                0,
                crate::defaults::DEFAULT_NATIVE_STACK_SIZE,
                CoroutineFlags::NONE,
            )
            .unwrap()
        });

        assert!(matches!(raw.resume(&main, Transfer::Raw(3)), Transfer::Raw(6)));
        assert_eq!(raw.state(), CoroutineState::Waiting);
        assert!(raw.is_alive());
        assert!(matches!(raw.resume(&main, Transfer::Raw(4)), Transfer::Raw(7)));
        assert!(!raw.is_available());
        assert!(raw.elapsed() <= Duration::from_secs(60));
    }

    #[test]
    fn test_native_stack_size_clamped() {
        let raw = RawCoroutine::create(
            |_| Transfer::None,
            1,
            crate::defaults::DEFAULT_NATIVE_STACK_SIZE,
            CoroutineFlags::NONE,
        )
        .unwrap();
        assert_eq!(raw.native_stack_size(), crate::defaults::MIN_NATIVE_STACK_SIZE);
        raw.close();
        assert_eq!(raw.state(), CoroutineState::Dead);
    }
}
