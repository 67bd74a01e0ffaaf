//! String-keyed dictionaries.
//!
//! `Dict` is the unsynchronized mapping every script value uses. `SyncDict`
//! wraps host-level [`Object`]s behind a mutex and is the one variant safe to
//! share across VM instances.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{object::Object, value::Value};

/// A mutable mapping from string keys to values.
///
/// Iteration order is unspecified; iterators that need determinism snapshot
/// and sort the keys.
#[derive(Debug, Default, Clone)]
pub(crate) struct Dict {
    pub map: AHashMap<String, Value>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: AHashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.map.get(key).copied()
    }

    pub fn insert(&mut self, key: String, value: Value) {
        self.map.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.map.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of the keys, sorted for deterministic iteration.
    pub fn sorted_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.map.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }
}

/// A mutex-protected dictionary of host-level objects.
///
/// Values cross the VM boundary as [`Object`]s, so two VM instances (or a VM
/// and host threads) can share one `SyncDict`. Cloning shares the underlying
/// storage; `copy` duplicates it.
#[derive(Debug, Clone, Default)]
pub struct SyncDict {
    inner: Arc<Mutex<IndexMap<String, Object>>>,
}

impl SyncDict {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Object>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Object> {
        self.lock().get(key).cloned()
    }

    pub fn insert(&self, key: String, value: Object) {
        self.lock().insert(key, value);
    }

    pub fn remove(&self, key: &str) -> Option<Object> {
        self.lock().shift_remove(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// A duplicate with its own storage and lock.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            inner: Arc::new(Mutex::new(self.lock().clone())),
        }
    }

    /// True when both handles share the same storage.
    #[must_use]
    pub fn same_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
