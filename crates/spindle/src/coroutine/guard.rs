//! Switch guards
//!
//! Guards restrict which switches the dispatcher may perform. They form a
//! stack and every active guard must admit a switch; a refused switch is an
//! internal-consistency violation.

use crate::engine::CoroutineId;
use std::fmt;

/// A restriction on coroutine switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchGuard {
    /// Refuse every switch (the readonly latch)
    Deny,
    /// Only admit switches between a killer and its victim
    Rated {
        killer: CoroutineId,
        victim: CoroutineId,
    },
}

impl SwitchGuard {
    /// Whether a switch from `from` to `to` is allowed
    pub fn admits(&self, from: CoroutineId, to: CoroutineId) -> bool {
        match *self {
            SwitchGuard::Deny => false,
            SwitchGuard::Rated { killer, victim } => {
                (from == killer && to == victim) || (from == victim && to == killer)
            }
        }
    }
}

impl fmt::Display for SwitchGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchGuard::Deny => f.write_str("runtime is readonly"),
            SwitchGuard::Rated { killer, victim } => {
                write!(f, "R{} is killing R{}", killer, victim)
            }
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct GuardStack {
    guards: Vec<SwitchGuard>,
}

impl GuardStack {
    pub(crate) fn push(&mut self, guard: SwitchGuard) {
        self.guards.push(guard);
    }

    pub(crate) fn pop(&mut self) -> Option<SwitchGuard> {
        self.guards.pop()
    }

    /// The innermost guard refusing the switch, if any
    pub(crate) fn refusal(&self, from: CoroutineId, to: CoroutineId) -> Option<SwitchGuard> {
        self.guards
            .iter()
            .rev()
            .find(|guard| !guard.admits(from, to))
            .copied()
    }

    pub(crate) fn is_readonly(&self) -> bool {
        self.guards.contains(&SwitchGuard::Deny)
    }

    pub(crate) fn set_readonly(&mut self, enable: bool) {
        if enable {
            if !self.is_readonly() {
                self.guards.push(SwitchGuard::Deny);
            }
        } else {
            self.guards.retain(|guard| *guard != SwitchGuard::Deny);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.guards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (CoroutineId, CoroutineId, CoroutineId) {
        (
            CoroutineId::from_u64(1),
            CoroutineId::from_u64(2),
            CoroutineId::from_u64(3),
        )
    }

    #[test]
    fn test_rated_admits_pair_both_ways() {
        let (k, v, other) = ids();
        let guard = SwitchGuard::Rated { killer: k, victim: v };
        assert!(guard.admits(k, v));
        assert!(guard.admits(v, k));
        assert!(!guard.admits(v, other));
        assert!(!guard.admits(other, k));
    }

    #[test]
    fn test_nested_guards_must_all_admit() {
        let (a, b, c) = ids();
        let mut stack = GuardStack::default();
        stack.push(SwitchGuard::Rated { killer: a, victim: b });
        stack.push(SwitchGuard::Rated { killer: b, victim: c });
        assert_eq!(
            stack.refusal(b, c),
            Some(SwitchGuard::Rated { killer: a, victim: b })
        );
        stack.pop();
        assert_eq!(stack.refusal(b, a), None);
    }

    #[test]
    fn test_readonly_latch() {
        let (a, b, _) = ids();
        let mut stack = GuardStack::default();
        stack.set_readonly(true);
        stack.set_readonly(true);
        assert_eq!(stack.len(), 1);
        assert!(stack.is_readonly());
        assert_eq!(stack.refusal(a, b), Some(SwitchGuard::Deny));
        stack.set_readonly(false);
        assert!(!stack.is_readonly());
        assert_eq!(stack.refusal(a, b), None);
    }

    #[test]
    fn test_display() {
        let (a, b, _) = ids();
        assert_eq!(
            SwitchGuard::Rated { killer: a, victim: b }.to_string(),
            "R1 is killing R2"
        );
    }
}
