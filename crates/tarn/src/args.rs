//! Argument helpers for builtin implementations.
//!
//! The VM normalizes every builtin call into an [`Args`]: expanded positional
//! values plus an optional KeyValueArray of named arguments. The accessors
//! here keep arity checking uniform across the builtin registry.

use crate::{
    errors::{ErrKind, RunResult},
    heap::{Heap, HeapData, HeapId},
    types::kv::key_text,
    value::{Value, is_falsy},
};

/// Arguments delivered to a builtin.
#[derive(Debug, Clone, Default)]
pub(crate) struct Args {
    pub positional: Vec<Value>,
    /// KeyValueArray heap slot holding the named arguments, if any.
    pub named: Option<HeapId>,
}

impl Args {
    pub fn positional(values: Vec<Value>) -> Self {
        Self {
            positional: values,
            named: None,
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    /// Exactly zero positional arguments.
    pub fn check_zero(&self, name: &str) -> RunResult<()> {
        if self.positional.is_empty() {
            Ok(())
        } else {
            Err(ErrKind::wrong_args(name, 0, self.positional.len()))
        }
    }

    /// Exactly one positional argument.
    pub fn one(&self, name: &str) -> RunResult<Value> {
        match self.positional.as_slice() {
            [a] => Ok(*a),
            other => Err(ErrKind::wrong_args(name, 1, other.len())),
        }
    }

    /// Exactly two positional arguments.
    pub fn two(&self, name: &str) -> RunResult<(Value, Value)> {
        match self.positional.as_slice() {
            [a, b] => Ok((*a, *b)),
            other => Err(ErrKind::wrong_args(name, 2, other.len())),
        }
    }

    /// Exactly three positional arguments.
    pub fn three(&self, name: &str) -> RunResult<(Value, Value, Value)> {
        match self.positional.as_slice() {
            [a, b, c] => Ok((*a, *b, *c)),
            other => Err(ErrKind::wrong_args(name, 3, other.len())),
        }
    }

    /// One required and one optional positional argument.
    pub fn one_two(&self, name: &str) -> RunResult<(Value, Option<Value>)> {
        match self.positional.as_slice() {
            [a] => Ok((*a, None)),
            [a, b] => Ok((*a, Some(*b))),
            other => Err(ErrKind::wrong_args(name, "1..2", other.len())),
        }
    }

    /// Two required and one optional positional argument.
    pub fn two_three(&self, name: &str) -> RunResult<(Value, Value, Option<Value>)> {
        match self.positional.as_slice() {
            [a, b] => Ok((*a, *b, None)),
            [a, b, c] => Ok((*a, *b, Some(*c))),
            other => Err(ErrKind::wrong_args(name, "2..3", other.len())),
        }
    }

    /// Looks up a named argument; later duplicates win.
    pub fn named_lookup(&self, heap: &Heap, name: &str) -> Option<Value> {
        let id = self.named?;
        let HeapData::KeyValueArray(kva) = heap.get(id) else {
            return None;
        };
        let mut found = None;
        for pair in &kva.pairs {
            if key_text(heap, pair.key).is_some_and(|k| k == name) {
                found = Some(pair.value);
            }
        }
        found
    }

    /// A named flag with a default.
    pub fn named_bool(&self, heap: &Heap, name: &str, default: bool) -> bool {
        match self.named_lookup(heap, name) {
            Some(value) => !is_falsy(value, heap),
            None => default,
        }
    }

    /// A named integer option with a default.
    pub fn named_int(&self, heap: &Heap, name: &str, default: i64) -> RunResult<i64> {
        match self.named_lookup(heap, name) {
            Some(Value::Int(i)) => Ok(i),
            Some(Value::Uint(u)) => Ok(u as i64),
            Some(other) => Err(ErrKind::type_error(format!(
                "{name}= expects an int, got {}",
                crate::value::type_name(other, heap)
            ))),
            None => Ok(default),
        }
    }
}
