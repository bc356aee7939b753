//! Data-transfer protocol
//!
//! Every payload crossing a switch goes through [`deliver`] on the sending
//! side and [`receive`] on the receiving side. Managed receivers get the
//! payload parked in their execution context's transfer slot, so it never
//! lives in a frame of a stack that is about to be switched out; raw
//! receivers get it directly through the engine.

use super::object::Inner;
use crate::engine::CoroutineFlags;
use crate::host::Value;

/// Payload exchanged across a switch
#[derive(Debug, Default)]
pub enum Transfer {
    /// The "no value" sentinel
    #[default]
    None,
    /// The "error" sentinel returned by a failed engine resume
    Error,
    /// A managed value
    Value(Value),
    /// A pre-built multi-argument call record for a coroutine's first run
    Call(Vec<Value>),
    /// An opaque word passed between raw coroutines and the layer itself
    Raw(usize),
}

impl Transfer {
    /// Whether the payload owns managed values
    pub fn is_managed(&self) -> bool {
        matches!(self, Transfer::Value(_) | Transfer::Call(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Transfer::None)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Transfer::Error)
    }

    /// The managed view of the payload; sentinels and raw words read as null
    pub fn into_value(self) -> Value {
        match self {
            Transfer::Value(value) => value,
            Transfer::Call(args) => Value::from(args),
            Transfer::None | Transfer::Error | Transfer::Raw(_) => Value::Null,
        }
    }

    /// Wrap a managed value, mapping null to the "no value" sentinel
    pub fn from_value(value: Value) -> Self {
        if value.is_null() {
            Transfer::None
        } else {
            Transfer::Value(value)
        }
    }
}

/// Apply the transfer rules for `payload` going from `sender` to `receiver`.
///
/// Returns what the engine itself has to carry across the switch.
pub(crate) fn deliver(sender: &Inner, receiver: &Inner, payload: Transfer) -> Transfer {
    let sender_accepts = sender.raw.has_flag(CoroutineFlags::ACCEPT_VALUES);
    let receiver_accepts = receiver.raw.has_flag(CoroutineFlags::ACCEPT_VALUES);

    if !sender_accepts && payload.is_managed() {
        fatal!(
            "Unexpected managed value transferred from raw coroutine R{} to R{}",
            sender.raw.id(),
            receiver.raw.id()
        );
    }

    if !receiver_accepts {
        if payload.is_managed() {
            tracing::trace!(
                from = %sender.raw.id(),
                to = %receiver.raw.id(),
                "managed value discarded for raw receiver"
            );
            drop(payload);
            return Transfer::None;
        }
        return payload;
    }

    let stale = receiver.context.borrow_mut().park(payload);
    drop(stale);
    Transfer::None
}

/// Collect the payload delivered to `receiver` by the switch that just
/// handed it control.
pub(crate) fn receive(receiver: &Inner, carried: Transfer) -> Transfer {
    if receiver.raw.has_flag(CoroutineFlags::ACCEPT_VALUES) {
        let parked = receiver.context.borrow_mut().take_transfer();
        parked.unwrap_or(carried)
    } else {
        carried
    }
}
