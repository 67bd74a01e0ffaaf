//! Iterator opcodes and the advancing logic for every iterator kind.
//!
//! Base iterators snapshot what they need at construction (dict keys, string
//! byte offsets); transformers advance their inner iterator and may call user
//! functions through the nested dispatch loop.

use super::Vm;
use crate::{
    bytecode::vm::compare::compare_values,
    errors::{ErrKind, RunError, RunResult},
    heap::{HeapData, HeapId},
    object::object_to_value,
    types::{IterOptions, ValueIter},
    value::{Value, close_value, is_falsy, type_name},
};

impl Vm<'_> {
    pub(super) fn exec_iter_init(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        let id = self.make_iter(value, IterOptions::default())?;
        self.push(Value::Ref(id));
        Ok(())
    }

    pub(super) fn exec_iter_next(&mut self, offset: i64) -> RunResult<()> {
        let top = self.peek()?;
        let Value::Ref(id) = top else {
            return Err(RunError::internal("IterNext on a non-iterator"));
        };
        match self.iter_next(id)? {
            Some((key, value)) => {
                self.push(key);
                self.push(value);
            }
            None => {
                self.pop()?;
                self.jump_relative(offset);
            }
        }
        Ok(())
    }

    pub(super) fn exec_iter_close(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        close_value(&mut self.heap, value);
        Ok(())
    }

    /// Builds an iterator over `value`, honoring the `sorted`, `reversed`,
    /// and `step` options.
    pub(crate) fn make_iter(&mut self, value: Value, options: IterOptions) -> RunResult<HeapId> {
        if let Value::Ref(id) = value
            && matches!(self.heap.get(id), HeapData::Iter(_))
        {
            return Ok(id);
        }
        let base = self.make_base_iter(value, options)?;
        let id = self.heap.alloc(HeapData::Iter(base));
        if options.step > 1 {
            let stepped = ValueIter::Step {
                inner: id,
                step: options.step,
                yielded: false,
            };
            return Ok(self.heap.alloc(HeapData::Iter(stepped)));
        }
        Ok(id)
    }

    fn make_base_iter(&mut self, value: Value, options: IterOptions) -> RunResult<ValueIter> {
        let Value::Ref(id) = value else {
            // A callable drives the user iterator protocol.
            if matches!(value, Value::Builtin(_)) {
                return Ok(ValueIter::Callable {
                    func: value,
                    state: Value::Nil,
                });
            }
            return Err(ErrKind::not_iterable(type_name(value, &self.heap)));
        };
        let iter = match self.heap.get(id) {
            HeapData::Array(items) => {
                if options.sorted || options.reversed {
                    let mut items = items.clone();
                    if options.sorted {
                        sort_values(&self.heap, &mut items)?;
                    }
                    if options.reversed {
                        items.reverse();
                    }
                    let copy = self.heap.alloc(HeapData::Array(items));
                    ValueIter::Array { id: copy, index: 0 }
                } else {
                    ValueIter::Array { id, index: 0 }
                }
            }
            HeapData::Str(_) => ValueIter::Str { id, byte: 0, index: 0 },
            HeapData::Bytes(_) => ValueIter::Bytes { id, index: 0 },
            HeapData::KeyValueArray(_) => ValueIter::Kva { id, index: 0 },
            HeapData::Dict(dict) => {
                // Keys snapshot sorted for deterministic order.
                let mut keys = dict.sorted_keys();
                if options.reversed {
                    keys.reverse();
                }
                ValueIter::Dict { id, keys, index: 0 }
            }
            HeapData::SyncDict(dict) => {
                let mut keys = dict.keys();
                keys.sort_unstable();
                if options.reversed {
                    keys.reverse();
                }
                ValueIter::SyncDict { id, keys, index: 0 }
            }
            HeapData::Closure(_) | HeapData::HostFunc(_) | HeapData::Bound(_) | HeapData::Wrapped(_) => {
                ValueIter::Callable {
                    func: value,
                    state: Value::Nil,
                }
            }
            other => return Err(ErrKind::not_iterable(other.type_name())),
        };
        Ok(iter)
    }

    /// Advances an iterator, yielding its next `(key, value)` pair.
    pub(crate) fn iter_next(&mut self, id: HeapId) -> RunResult<Option<(Value, Value)>> {
        let step = self.snapshot_iter(id)?;
        match step {
            IterStep::Array(array_id, index) => {
                let (len, item) = match self.heap.get(array_id) {
                    HeapData::Array(items) => (items.len(), items.get(index).copied()),
                    _ => return Err(RunError::internal("array iterator target changed type")),
                };
                if index >= len {
                    return Ok(None);
                }
                self.advance_index(id)?;
                Ok(item.map(|value| (Value::Int(index as i64), value)))
            }
            IterStep::Str(str_id, byte, index) => {
                let next = match self.heap.get(str_id) {
                    HeapData::Str(s) => s.get(byte..).and_then(|rest| rest.chars().next()),
                    _ => return Err(RunError::internal("string iterator target changed type")),
                };
                let Some(c) = next else { return Ok(None) };
                if let HeapData::Iter(ValueIter::Str { byte, index, .. }) = self.heap.get_mut(id) {
                    *byte += c.len_utf8();
                    *index += 1;
                }
                Ok(Some((Value::Int(index as i64), Value::Char(c))))
            }
            IterStep::Bytes(bytes_id, index) => {
                let byte = match self.heap.get(bytes_id) {
                    HeapData::Bytes(bytes) => bytes.get(index).copied(),
                    _ => return Err(RunError::internal("bytes iterator target changed type")),
                };
                let Some(byte) = byte else { return Ok(None) };
                self.advance_index(id)?;
                Ok(Some((Value::Int(index as i64), Value::Int(i64::from(byte)))))
            }
            IterStep::Kva(kva_id, index) => {
                let pair = match self.heap.get(kva_id) {
                    HeapData::KeyValueArray(kva) => kva.pairs.get(index).copied(),
                    _ => return Err(RunError::internal("pair iterator target changed type")),
                };
                let Some(pair) = pair else { return Ok(None) };
                self.advance_index(id)?;
                Ok(Some((pair.key, pair.value)))
            }
            IterStep::Dict(dict_id, key) => {
                let Some(key) = key else { return Ok(None) };
                let value = match self.heap.get(dict_id) {
                    // Entries removed mid-iteration yield nil.
                    HeapData::Dict(dict) => dict.get(&key).unwrap_or(Value::Nil),
                    _ => return Err(RunError::internal("dict iterator target changed type")),
                };
                self.advance_index(id)?;
                let key = self.heap.alloc_str(key);
                Ok(Some((key, value)))
            }
            IterStep::SyncDict(dict_id, key) => {
                let Some(key) = key else { return Ok(None) };
                let object = match self.heap.get(dict_id) {
                    HeapData::SyncDict(dict) => dict.get(&key),
                    _ => return Err(RunError::internal("syncDict iterator target changed type")),
                };
                self.advance_index(id)?;
                let value = match object {
                    Some(object) => object_to_value(&mut self.heap, &object),
                    None => Value::Nil,
                };
                let key = self.heap.alloc_str(key);
                Ok(Some((key, value)))
            }
            IterStep::Map(inner, func) => match self.iter_next(inner)? {
                Some((key, value)) => {
                    let mapped = self.call_value_nested(func, vec![value], None)?;
                    Ok(Some((key, mapped)))
                }
                None => Ok(None),
            },
            IterStep::Filter(inner, func) => loop {
                match self.iter_next(inner)? {
                    Some((key, value)) => {
                        let keep = self.call_value_nested(func, vec![value], None)?;
                        if !is_falsy(keep, &self.heap) {
                            return Ok(Some((key, value)));
                        }
                    }
                    None => return Ok(None),
                }
            },
            IterStep::Enumerate(inner, count) => match self.iter_next(inner)? {
                Some((_, value)) => {
                    if let HeapData::Iter(ValueIter::Enumerate { count, .. }) = self.heap.get_mut(id) {
                        *count += 1;
                    }
                    Ok(Some((Value::Int(count), value)))
                }
                None => Ok(None),
            },
            IterStep::Zip(a, b, count) => {
                let Some((_, left)) = self.iter_next(a)? else { return Ok(None) };
                let Some((_, right)) = self.iter_next(b)? else { return Ok(None) };
                if let HeapData::Iter(ValueIter::Zip { count, .. }) = self.heap.get_mut(id) {
                    *count += 1;
                }
                let pair = self.heap.alloc_array(vec![left, right]);
                Ok(Some((Value::Int(count), pair)))
            }
            IterStep::Keys(inner) => match self.iter_next(inner)? {
                Some((key, _)) => Ok(Some((key, key))),
                None => Ok(None),
            },
            IterStep::Values(inner) => self.iter_next(inner),
            IterStep::Items(inner) => match self.iter_next(inner)? {
                Some((key, value)) => {
                    let pair = self
                        .heap
                        .alloc_value(HeapData::KeyValue(crate::types::KeyValue { key, value }));
                    Ok(Some((key, pair)))
                }
                None => Ok(None),
            },
            IterStep::Step(inner, step, yielded) => {
                if yielded {
                    for _ in 1..step {
                        if self.iter_next(inner)?.is_none() {
                            return Ok(None);
                        }
                    }
                } else if let HeapData::Iter(ValueIter::Step { yielded, .. }) = self.heap.get_mut(id) {
                    *yielded = true;
                }
                self.iter_next(inner)
            }
            IterStep::Callable(func, state) => {
                let result = self.call_value_nested(func, vec![state], None)?;
                if result.is_nil() {
                    return Ok(None);
                }
                let parts = match result {
                    Value::Ref(rid) => match self.heap.get(rid) {
                        HeapData::Array(items) => items.clone(),
                        _ => return Err(ErrKind::type_error("iterator function must return an array or nil")),
                    },
                    _ => return Err(ErrKind::type_error("iterator function must return an array or nil")),
                };
                let (next_state, key, value) = match parts.as_slice() {
                    [state, value] => (*state, Value::Nil, *value),
                    [state, key, value] | [state, key, value, _] => (*state, *key, *value),
                    _ => return Err(ErrKind::type_error("iterator function must return [state, key, value]")),
                };
                if let HeapData::Iter(ValueIter::Callable { state, .. }) = self.heap.get_mut(id) {
                    *state = next_state;
                }
                Ok(Some((key, value)))
            }
        }
    }

    fn snapshot_iter(&self, id: HeapId) -> RunResult<IterStep> {
        let HeapData::Iter(iter) = self.heap.get(id) else {
            return Err(RunError::internal("iterator slot changed type"));
        };
        Ok(match iter {
            ValueIter::Array { id, index } => IterStep::Array(*id, *index),
            ValueIter::Str { id, byte, index } => IterStep::Str(*id, *byte, *index),
            ValueIter::Bytes { id, index } => IterStep::Bytes(*id, *index),
            ValueIter::Kva { id, index } => IterStep::Kva(*id, *index),
            ValueIter::Dict { id, keys, index } => IterStep::Dict(*id, keys.get(*index).cloned()),
            ValueIter::SyncDict { id, keys, index } => IterStep::SyncDict(*id, keys.get(*index).cloned()),
            ValueIter::Map { inner, func } => IterStep::Map(*inner, *func),
            ValueIter::Filter { inner, func } => IterStep::Filter(*inner, *func),
            ValueIter::Enumerate { inner, count } => IterStep::Enumerate(*inner, *count),
            ValueIter::Zip { a, b, count } => IterStep::Zip(*a, *b, *count),
            ValueIter::Keys { inner } => IterStep::Keys(*inner),
            ValueIter::Values { inner } => IterStep::Values(*inner),
            ValueIter::Items { inner } => IterStep::Items(*inner),
            ValueIter::Step { inner, step, yielded } => IterStep::Step(*inner, *step, *yielded),
            ValueIter::Callable { func, state } => IterStep::Callable(*func, *state),
        })
    }

    fn advance_index(&mut self, id: HeapId) -> RunResult<()> {
        match self.heap.get_mut(id) {
            HeapData::Iter(iter) => {
                match iter {
                    ValueIter::Array { index, .. }
                    | ValueIter::Bytes { index, .. }
                    | ValueIter::Kva { index, .. }
                    | ValueIter::Dict { index, .. }
                    | ValueIter::SyncDict { index, .. } => *index += 1,
                    _ => return Err(RunError::internal("advance on a transformer iterator")),
                }
                Ok(())
            }
            _ => Err(RunError::internal("iterator slot changed type")),
        }
    }

    /// Drains an iterable into its values; used by splat expansion and
    /// `collect`.
    pub(crate) fn collect_values(&mut self, value: Value) -> RunResult<Vec<Value>> {
        if let Value::Ref(id) = value
            && let HeapData::Array(items) = self.heap.get(id)
        {
            return Ok(items.clone());
        }
        let iter = self.make_iter(value, IterOptions::default())?;
        let mut out = Vec::new();
        while let Some((_, item)) = self.iter_next(iter)? {
            out.push(item);
        }
        Ok(out)
    }

}

/// Sorts values by the comparison lattice; incomparable pairs keep their
/// relative order.
pub(crate) fn sort_values(heap: &crate::heap::Heap, values: &mut [Value]) -> RunResult<()> {
    let mut failed = None;
    values.sort_by(|a, b| match compare_values(heap, *a, *b) {
        Ok(Some(ordering)) => ordering,
        Ok(None) => std::cmp::Ordering::Equal,
        Err(err) => {
            failed.get_or_insert(err);
            std::cmp::Ordering::Equal
        }
    });
    match failed {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Snapshot of an iterator's state for one advance, keeping heap borrows
/// short.
enum IterStep {
    Array(HeapId, usize),
    Str(HeapId, usize, usize),
    Bytes(HeapId, usize),
    Kva(HeapId, usize),
    Dict(HeapId, Option<String>),
    SyncDict(HeapId, Option<String>),
    Map(HeapId, Value),
    Filter(HeapId, Value),
    Enumerate(HeapId, i64),
    Zip(HeapId, HeapId, i64),
    Keys(HeapId),
    Values(HeapId),
    Items(HeapId),
    Step(HeapId, usize, bool),
    Callable(Value, Value),
}
