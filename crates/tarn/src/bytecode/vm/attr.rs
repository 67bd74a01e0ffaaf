//! Selector access, indexing, and slicing.

use super::Vm;
use crate::{
    errors::{ErrKind, RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    object::{object_to_value, value_to_object},
    types::{self, BoundMethod, Dict},
    value::{Value, type_name},
};

impl Vm<'_> {
    pub(super) fn exec_selector(&mut self, const_index: u16) -> RunResult<()> {
        let name = self.constant_str(const_index)?;
        let obj = self.pop()?;
        let value = self.select_member(obj, name)?;
        self.push(value);
        Ok(())
    }

    /// `obj.name`: field, getter, bound method, or well-known member.
    pub(crate) fn select_member(&mut self, obj: Value, name: &str) -> RunResult<Value> {
        let Value::Ref(id) = obj else {
            return Err(ErrKind::NotIndexableError.err(format!(
                "'{}' has no members",
                type_name(obj, &self.heap)
            )));
        };
        match self.heap.get(id) {
            HeapData::Dict(dict) => Ok(dict.get(name).unwrap_or(Value::Nil)),
            HeapData::SyncDict(dict) => match dict.get(name) {
                Some(object) => Ok(object_to_value(&mut self.heap, &object)),
                None => Ok(Value::Nil),
            },
            HeapData::Instance(instance) => {
                if let Some(value) = instance.fields.get(name) {
                    return Ok(*value);
                }
                let ty = instance.ty;
                self.select_typed_member(obj, ty, name)
            }
            HeapData::Error(err) => Ok(match name {
                // `Literal` aliases `Name`: both historical surfaces stay.
                "Name" | "Literal" => self.heap.alloc_str(err.name.clone()),
                "Message" => self.heap.alloc_str(err.message.clone()),
                "Cause" => err.cause.unwrap_or(Value::Nil),
                _ => Value::Nil,
            }),
            HeapData::KeyValue(kv) => Ok(match name {
                "K" => kv.key,
                "V" => kv.value,
                _ => Value::Nil,
            }),
            HeapData::KeyValueArray(_) | HeapData::NamedArgs(_) => {
                if name == "dict" {
                    self.pairs_to_dict(id)
                } else {
                    Ok(Value::Nil)
                }
            }
            HeapData::ObjectType(ty) => Ok(ty.methods.get(name).copied().unwrap_or(Value::Nil)),
            HeapData::Regexp(regexp) => Ok(match name {
                "pattern" => self.heap.alloc_str(regexp.source.clone()),
                _ => Value::Nil,
            }),
            HeapData::Reflect(reflect) => {
                let reflect = reflect.clone();
                let key = crate::object::Object::Str(name.to_owned());
                match reflect.lock().index_get(&key) {
                    Some(object) => Ok(object_to_value(&mut self.heap, &object)),
                    None => Ok(Value::Nil),
                }
            }
            other => Err(ErrKind::NotIndexableError.err(format!("'{}' has no members", other.type_name()))),
        }
    }

    /// Getter, then method (bound to the receiver).
    fn select_typed_member(&mut self, obj: Value, type_id: HeapId, name: &str) -> RunResult<Value> {
        let (getter, method) = match self.heap.get(type_id) {
            HeapData::ObjectType(ty) => (ty.getters.get(name).copied(), ty.methods.get(name).copied()),
            _ => (None, None),
        };
        if let Some(getter) = getter {
            return self.call_value_nested(getter, vec![obj], None);
        }
        if let Some(method) = method {
            return Ok(self
                .heap
                .alloc_value(HeapData::Bound(BoundMethod { recv: obj, callee: method })));
        }
        Ok(Value::Nil)
    }

    /// `kva.dict` / `namedArgs.dict`: pairs collapsed into a dict, later
    /// duplicates winning.
    fn pairs_to_dict(&mut self, id: HeapId) -> RunResult<Value> {
        let pairs = match self.heap.get(id) {
            HeapData::KeyValueArray(kva) => kva.pairs.clone(),
            HeapData::NamedArgs(named) => named.remaining(&self.heap),
            _ => Vec::new(),
        };
        let mut dict = Dict::with_capacity(pairs.len());
        for pair in pairs {
            let key = self.key_string(pair.key)?;
            dict.insert(key, pair.value);
        }
        Ok(self.heap.alloc_dict(dict))
    }

    pub(super) fn exec_index_get(&mut self) -> RunResult<()> {
        let index = self.pop()?;
        let obj = self.pop()?;
        let value = self.index_get(obj, index)?;
        self.push(value);
        Ok(())
    }

    pub(crate) fn index_get(&mut self, obj: Value, index: Value) -> RunResult<Value> {
        let Value::Ref(id) = obj else {
            return Err(ErrKind::NotIndexableError.err(format!(
                "'{}' is not indexable",
                type_name(obj, &self.heap)
            )));
        };
        match self.heap.get(id) {
            HeapData::Array(items) => {
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                match types::normalize_index(at, items.len()) {
                    Some(at) => Ok(items[at]),
                    None => Err(ErrKind::index_out_of_bounds(at, items.len())),
                }
            }
            HeapData::Bytes(bytes) => {
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                types::bytes::byte_at(bytes, at).map(|b| Value::Int(i64::from(b)))
            }
            HeapData::Str(s) => {
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                types::str::char_at(s, at).map(Value::Char)
            }
            HeapData::Dict(_) | HeapData::SyncDict(_) | HeapData::Instance(_) | HeapData::Error(_)
            | HeapData::KeyValue(_) | HeapData::Reflect(_) => {
                let key = self.key_string(index)?;
                self.select_member(obj, &key)
            }
            HeapData::KeyValueArray(kva) => {
                if let Some(at) = int_index(index) {
                    let len = kva.len();
                    let pair = types::normalize_index(at, len)
                        .map(|i| kva.pairs[i])
                        .ok_or_else(|| ErrKind::index_out_of_bounds(at, len))?;
                    return Ok(self.heap.alloc_value(HeapData::KeyValue(pair)));
                }
                let key = self.key_string(index)?;
                let mut found = Value::Nil;
                let pairs = match self.heap.get(id) {
                    HeapData::KeyValueArray(kva) => kva.pairs.clone(),
                    _ => Vec::new(),
                };
                for pair in pairs {
                    if self.heap.str_of(pair.key) == Some(key.as_str()) {
                        found = pair.value;
                    }
                }
                Ok(found)
            }
            other => Err(ErrKind::NotIndexableError.err(format!("'{}' is not indexable", other.type_name()))),
        }
    }

    pub(super) fn exec_index_set(&mut self) -> RunResult<()> {
        let value = self.pop()?;
        let index = self.pop()?;
        let obj = self.pop()?;
        self.index_set(obj, index, value)
    }

    pub(crate) fn index_set(&mut self, obj: Value, index: Value, value: Value) -> RunResult<()> {
        let Value::Ref(id) = obj else {
            return Err(ErrKind::NotIndexAssignableError.err(format!(
                "'{}' is not index-assignable",
                type_name(obj, &self.heap)
            )));
        };
        match self.heap.get(id) {
            HeapData::Array(items) => {
                let len = items.len();
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                let at = types::normalize_index(at, len).ok_or_else(|| ErrKind::index_out_of_bounds(at, len))?;
                if let HeapData::Array(items) = self.heap.get_mut(id) {
                    items[at] = value;
                }
                Ok(())
            }
            HeapData::Bytes(_) => {
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                let byte = int_index(value)
                    .ok_or_else(|| ErrKind::type_error("bytes assignment requires an integer value"))?;
                if let HeapData::Bytes(bytes) = self.heap.get_mut(id) {
                    types::bytes::set_byte_at(bytes, at, byte)?;
                }
                Ok(())
            }
            HeapData::Dict(_) => {
                let key = self.key_string(index)?;
                if let HeapData::Dict(dict) = self.heap.get_mut(id) {
                    dict.insert(key, value);
                }
                Ok(())
            }
            HeapData::SyncDict(dict) => {
                let dict = dict.clone();
                let key = self.key_string(index)?;
                let object = value_to_object(&self.heap, value)?;
                dict.insert(key, object);
                Ok(())
            }
            HeapData::Instance(instance) => {
                let ty = instance.ty;
                let key = self.key_string(index)?;
                let setter = match self.heap.get(ty) {
                    HeapData::ObjectType(t) => t.setters.get(&key).copied(),
                    _ => None,
                };
                if let Some(setter) = setter {
                    self.call_value_nested(setter, vec![obj, value], None)?;
                    return Ok(());
                }
                if let HeapData::Instance(instance) = self.heap.get_mut(id) {
                    instance.fields.insert(key, value);
                }
                Ok(())
            }
            HeapData::KeyValueArray(kva) => {
                let len = kva.len();
                let at = int_index(index).ok_or_else(|| invalid_index(index, &self.heap))?;
                let at = types::normalize_index(at, len).ok_or_else(|| ErrKind::index_out_of_bounds(at, len))?;
                let pair = match value {
                    Value::Ref(vid) => match self.heap.get(vid) {
                        HeapData::KeyValue(kv) => *kv,
                        _ => return Err(ErrKind::type_error("keyValueArray elements must be key/value pairs")),
                    },
                    _ => return Err(ErrKind::type_error("keyValueArray elements must be key/value pairs")),
                };
                if let HeapData::KeyValueArray(kva) = self.heap.get_mut(id) {
                    kva.pairs[at] = pair;
                }
                Ok(())
            }
            HeapData::Reflect(reflect) => {
                let reflect = reflect.clone();
                let key = value_to_object(&self.heap, index)?;
                let object = value_to_object(&self.heap, value)?;
                reflect
                    .lock()
                    .index_set(key, object)
                    .map_err(|err| ErrKind::NotIndexAssignableError.err(err))
            }
            other => Err(ErrKind::NotIndexAssignableError.err(format!(
                "'{}' is not index-assignable",
                other.type_name()
            ))),
        }
    }

    pub(super) fn exec_slice(&mut self, flags: u8) -> RunResult<()> {
        let high = if flags & crate::bytecode::op::SLICE_FLAG_HIGH != 0 {
            Some(self.pop()?)
        } else {
            None
        };
        let low = if flags & crate::bytecode::op::SLICE_FLAG_LOW != 0 {
            Some(self.pop()?)
        } else {
            None
        };
        let obj = self.pop()?;
        let low = match low {
            Some(v) => Some(int_index(v).ok_or_else(|| invalid_index(v, &self.heap))?),
            None => None,
        };
        let high = match high {
            Some(v) => Some(int_index(v).ok_or_else(|| invalid_index(v, &self.heap))?),
            None => None,
        };
        let value = self.slice(obj, low, high)?;
        self.push(value);
        Ok(())
    }

    fn slice(&mut self, obj: Value, low: Option<i64>, high: Option<i64>) -> RunResult<Value> {
        let Value::Ref(id) = obj else {
            return Err(ErrKind::type_error(format!(
                "'{}' cannot be sliced",
                type_name(obj, &self.heap)
            )));
        };
        match self.heap.get(id) {
            HeapData::Array(items) => {
                let (from, to) = types::slice_bounds(low, high, items.len())?;
                let sliced = items[from..to].to_vec();
                Ok(self.heap.alloc_array(sliced))
            }
            HeapData::Bytes(bytes) => {
                let sliced = types::bytes::bytes_slice(bytes, low, high)?;
                Ok(self.heap.alloc_value(HeapData::Bytes(sliced)))
            }
            HeapData::Str(s) => {
                let sliced = types::str::str_slice(s, low, high)?;
                Ok(self.heap.alloc_str(sliced))
            }
            other => Err(ErrKind::type_error(format!("'{}' cannot be sliced", other.type_name()))),
        }
    }
}

/// Integer view of an index value.
pub(crate) fn int_index(value: Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(i),
        Value::Uint(u) => i64::try_from(u).ok(),
        _ => None,
    }
}

fn invalid_index(index: Value, heap: &Heap) -> RunError {
    ErrKind::InvalidIndexError.err(format!("invalid index of type '{}'", type_name(index, heap)))
}
