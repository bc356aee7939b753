//! Live-coroutine registry
//!
//! Insertion-ordered map from id to coroutine. A coroutine registers itself
//! on first run and is removed by its resumer once it is dead.

use super::object::Coroutine;
use crate::engine::CoroutineId;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

#[derive(Default)]
pub(crate) struct Registry {
    coroutines: IndexMap<CoroutineId, Coroutine, FxBuildHasher>,
}

impl Registry {
    /// Register a coroutine, returning the entry it replaced
    pub(crate) fn insert(&mut self, coroutine: Coroutine) -> Option<Coroutine> {
        self.coroutines.insert(coroutine.id(), coroutine)
    }

    pub(crate) fn remove(&mut self, id: CoroutineId) -> Option<Coroutine> {
        self.coroutines.shift_remove(&id)
    }

    pub(crate) fn get(&self, id: CoroutineId) -> Option<&Coroutine> {
        self.coroutines.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.coroutines.len()
    }

    /// Registered coroutines in registration order
    pub(crate) fn snapshot(&self) -> Vec<Coroutine> {
        self.coroutines.values().cloned().collect()
    }
}
