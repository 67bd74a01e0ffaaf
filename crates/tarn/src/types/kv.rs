//! Key/value pairs, ordered pair arrays, and the named-argument view.

use ahash::AHashSet;

use crate::{
    heap::{Heap, HeapData, HeapId},
    value::Value,
};

/// A single `{K, V}` pair.
#[derive(Debug, Clone, Copy)]
pub(crate) struct KeyValue {
    pub key: Value,
    pub value: Value,
}

/// An ordered sequence of pairs permitting duplicate keys.
///
/// Used both for named arguments at call sites and for `(;k=v, ...)`
/// literals.
#[derive(Debug, Default, Clone)]
pub(crate) struct KeyValueArray {
    pub pairs: Vec<KeyValue>,
}

impl KeyValueArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: Value, value: Value) {
        self.pairs.push(KeyValue { key, value });
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A view over one or more [`KeyValueArray`]s that tracks which names the
/// callee has consumed.
///
/// Parameter binding consumes names one by one; whatever is left flows into
/// the named-variadic rest parameter, or raises if there is none.
#[derive(Debug, Default, Clone)]
pub(crate) struct NamedArgs {
    pub sources: Vec<HeapId>,
    consumed: AHashSet<String>,
}

impl NamedArgs {
    pub fn new(sources: Vec<HeapId>) -> Self {
        Self {
            sources,
            consumed: AHashSet::new(),
        }
    }

    /// Looks up `name` without consuming it. Later sources and later
    /// duplicates win, matching "last argument applies".
    pub fn peek(&self, heap: &Heap, name: &str) -> Option<Value> {
        let mut found = None;
        for &source in &self.sources {
            if let HeapData::KeyValueArray(kva) = heap.get(source) {
                for pair in &kva.pairs {
                    if key_text(heap, pair.key).is_some_and(|k| k == name) {
                        found = Some(pair.value);
                    }
                }
            }
        }
        found
    }

    /// Looks up and consumes `name`.
    pub fn take(&mut self, heap: &Heap, name: &str) -> Option<Value> {
        let value = self.peek(heap, name)?;
        self.consumed.insert(name.to_owned());
        Some(value)
    }

    pub fn is_consumed(&self, name: &str) -> bool {
        self.consumed.contains(name)
    }

    /// Unconsumed pairs in source order (duplicates preserved).
    pub fn remaining(&self, heap: &Heap) -> Vec<KeyValue> {
        let mut rest = Vec::new();
        for &source in &self.sources {
            if let HeapData::KeyValueArray(kva) = heap.get(source) {
                for pair in &kva.pairs {
                    let keep = match key_text(heap, pair.key) {
                        Some(name) => !self.consumed.contains(name),
                        None => true,
                    };
                    if keep {
                        rest.push(*pair);
                    }
                }
            }
        }
        rest
    }
}

/// Reads a pair key as text when it is a string.
pub(crate) fn key_text(heap: &Heap, key: Value) -> Option<&str> {
    match key {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => Some(s),
            _ => None,
        },
        _ => None,
    }
}
