//! The host-facing value type.
//!
//! `Object` is the currency at the embedding boundary: run results, injected
//! globals, host-callable arguments, and `SyncDict` contents. Converting to
//! and from the VM's internal values copies composite structure; aliasing
//! does not cross the boundary.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use indexmap::IndexMap;

use crate::{
    errors::{ErrKind, RunResult},
    heap::{Heap, HeapData, HeapId},
    types::{
        Dict, ErrorObj, HostFunc, HostFuncObj, HostObject, KeyValue, KeyValueArray, Reflect, SyncDict,
        decimal::Decimal,
    },
    value::{MAX_DATA_DEPTH, Value, to_display},
};

/// A host-level value.
#[derive(Debug, Clone)]
pub enum Object {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Array(Vec<Object>),
    Dict(IndexMap<String, Object>),
    KeyValue(Box<Object>, Box<Object>),
    KeyValueArray(Vec<(Object, Object)>),
    /// Shared mutex-protected dictionary; crossing the boundary shares
    /// storage instead of copying.
    SyncDict(SyncDict),
    Error {
        name: String,
        message: String,
    },
    /// A host-implemented callable to inject.
    HostFunc(HostFunc),
    /// A reflective host value to inject.
    Reflect(Arc<Mutex<dyn HostObject>>),
    /// A script value with no host representation (functions, iterators);
    /// carries its rendered form.
    Opaque(String),
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Char(a), Self::Char(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Decimal(a), Self::Decimal(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::KeyValue(ak, av), Self::KeyValue(bk, bv)) => ak == bk && av == bv,
            (Self::KeyValueArray(a), Self::KeyValueArray(b)) => a == b,
            (Self::SyncDict(a), Self::SyncDict(b)) => a.same_storage(b),
            (Self::Error { name: an, message: am }, Self::Error { name: bn, message: bm }) => an == bn && am == bm,
            (Self::HostFunc(a), Self::HostFunc(b)) => Arc::ptr_eq(&a.name, &b.name),
            (Self::Reflect(a), Self::Reflect(b)) => Arc::ptr_eq(a, b),
            (Self::Opaque(a), Self::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Uint(u) => write!(f, "{u}"),
            Self::Float(value) => {
                let mut buffer = ryu::Buffer::new();
                f.write_str(buffer.format(*value))
            }
            Self::Char(c) => write!(f, "{c}"),
            Self::Str(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "bytes{b:?}"),
            Self::Decimal(d) => write!(f, "{d}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Dict(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::KeyValue(key, value) => write!(f, "{key}={value}"),
            Self::KeyValueArray(pairs) => {
                f.write_str("(;")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}={value}")?;
                }
                f.write_str(")")
            }
            Self::SyncDict(dict) => write!(f, "syncDict(len={})", dict.len()),
            Self::Error { name, message } => write!(f, "{name}: {message}"),
            Self::HostFunc(func) => write!(f, "<builtinFunc {}>", func.name),
            Self::Reflect(inner) => {
                let text = inner
                    .lock()
                    .map(|guard| guard.to_display())
                    .unwrap_or_else(|poison| poison.into_inner().to_display());
                f.write_str(&text)
            }
            Self::Opaque(repr) => f.write_str(repr),
        }
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for Object {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl TryFrom<&Object> for i64 {
    type Error = ();

    fn try_from(value: &Object) -> Result<Self, ()> {
        match value {
            Object::Int(i) => Ok(*i),
            _ => Err(()),
        }
    }
}

impl TryFrom<&Object> for String {
    type Error = ();

    fn try_from(value: &Object) -> Result<Self, ()> {
        match value {
            Object::Str(s) => Ok(s.clone()),
            _ => Err(()),
        }
    }
}

/// Converts a run-time value into its host representation.
pub(crate) fn value_to_object(heap: &Heap, value: Value) -> RunResult<Object> {
    value_to_object_at(heap, value, 0)
}

fn value_to_object_at(heap: &Heap, value: Value, depth: usize) -> RunResult<Object> {
    if depth > MAX_DATA_DEPTH {
        return Err(ErrKind::type_error("value nested too deeply to export"));
    }
    let object = match value {
        Value::Nil => Object::Nil,
        Value::Bool(b) => Object::Bool(b),
        Value::Int(i) => Object::Int(i),
        Value::Uint(u) => Object::Uint(u),
        Value::Float(f) => Object::Float(f),
        Value::Char(c) => Object::Char(c),
        Value::Builtin(b) => Object::Opaque(format!("<builtinFunc {}>", b.name())),
        Value::Ref(id) => heap_to_object(heap, id, depth)?,
    };
    Ok(object)
}

fn heap_to_object(heap: &Heap, id: HeapId, depth: usize) -> RunResult<Object> {
    let object = match heap.get(id) {
        HeapData::Str(s) => Object::Str(s.to_string()),
        HeapData::Bytes(b) => Object::Bytes(b.clone()),
        HeapData::Decimal(d) => Object::Decimal(d.clone()),
        HeapData::Array(items) => {
            let items = items.clone();
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(value_to_object_at(heap, item, depth + 1)?);
            }
            Object::Array(out)
        }
        HeapData::Dict(dict) => {
            let mut out = IndexMap::with_capacity(dict.len());
            for key in dict.sorted_keys() {
                let value = dict.get(&key).unwrap_or(Value::Nil);
                out.insert(key, value_to_object_at(heap, value, depth + 1)?);
            }
            Object::Dict(out)
        }
        HeapData::SyncDict(dict) => Object::SyncDict(dict.clone()),
        HeapData::KeyValue(kv) => {
            let (key, value) = (kv.key, kv.value);
            Object::KeyValue(
                Box::new(value_to_object_at(heap, key, depth + 1)?),
                Box::new(value_to_object_at(heap, value, depth + 1)?),
            )
        }
        HeapData::KeyValueArray(kva) => {
            let pairs = kva.pairs.clone();
            let mut out = Vec::with_capacity(pairs.len());
            for pair in pairs {
                out.push((
                    value_to_object_at(heap, pair.key, depth + 1)?,
                    value_to_object_at(heap, pair.value, depth + 1)?,
                ));
            }
            Object::KeyValueArray(out)
        }
        HeapData::NamedArgs(named) => {
            let pairs = named.remaining(heap);
            let mut out = Vec::with_capacity(pairs.len());
            for pair in pairs {
                out.push((
                    value_to_object_at(heap, pair.key, depth + 1)?,
                    value_to_object_at(heap, pair.value, depth + 1)?,
                ));
            }
            Object::KeyValueArray(out)
        }
        HeapData::Error(err) => Object::Error {
            name: err.name.to_string(),
            message: err.message.to_string(),
        },
        HeapData::Instance(instance) => {
            let fields = instance.fields.clone();
            let mut keys: Vec<String> = fields.keys().cloned().collect();
            keys.sort_unstable();
            let mut out = IndexMap::with_capacity(fields.len());
            for key in keys {
                let value = fields.get(&key).copied().unwrap_or(Value::Nil);
                out.insert(key, value_to_object_at(heap, value, depth + 1)?);
            }
            Object::Dict(out)
        }
        HeapData::HostFunc(host) => Object::HostFunc(host.func.clone()),
        HeapData::Reflect(reflect) => Object::Reflect(reflect.share()),
        other => Object::Opaque(
            to_display(heap, Value::Ref(id), true).unwrap_or_else(|_| format!("<{}>", other.type_name())),
        ),
    };
    Ok(object)
}

/// Converts a host value into a run-time value, allocating composites.
pub(crate) fn object_to_value(heap: &mut Heap, object: &Object) -> Value {
    match object {
        Object::Nil => Value::Nil,
        Object::Bool(b) => Value::Bool(*b),
        Object::Int(i) => Value::Int(*i),
        Object::Uint(u) => Value::Uint(*u),
        Object::Float(f) => Value::Float(*f),
        Object::Char(c) => Value::Char(*c),
        Object::Str(s) => heap.alloc_str(s.as_str()),
        Object::Bytes(b) => heap.alloc_value(HeapData::Bytes(b.clone())),
        Object::Decimal(d) => heap.alloc_value(HeapData::Decimal(d.clone())),
        Object::Array(items) => {
            let values: Vec<Value> = items.iter().map(|item| object_to_value(heap, item)).collect();
            heap.alloc_array(values)
        }
        Object::Dict(map) => {
            let mut dict = Dict::with_capacity(map.len());
            for (key, item) in map {
                let value = object_to_value(heap, item);
                dict.insert(key.clone(), value);
            }
            heap.alloc_dict(dict)
        }
        Object::KeyValue(key, value) => {
            let key = object_to_value(heap, key);
            let value = object_to_value(heap, value);
            heap.alloc_value(HeapData::KeyValue(KeyValue { key, value }))
        }
        Object::KeyValueArray(pairs) => {
            let mut kva = KeyValueArray::new();
            for (key, value) in pairs {
                let key = object_to_value(heap, key);
                let value = object_to_value(heap, value);
                kva.push(key, value);
            }
            heap.alloc_value(HeapData::KeyValueArray(kva))
        }
        Object::SyncDict(dict) => heap.alloc_value(HeapData::SyncDict(dict.clone())),
        Object::Error { name, message } => heap.alloc_error(ErrorObj::new(name.as_str(), message.as_str())),
        Object::HostFunc(func) => heap.alloc_value(HeapData::HostFunc(HostFuncObj {
            func: func.clone(),
            methods: None,
        })),
        Object::Reflect(inner) => heap.alloc_value(HeapData::Reflect(Reflect::new(Arc::clone(inner)))),
        Object::Opaque(repr) => heap.alloc_str(repr.as_str()),
    }
}
