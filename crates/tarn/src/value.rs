//! The runtime value and its capability surface.
//!
//! Small values are immediate; composites live in the arena heap behind
//! `Value::Ref`. The free functions here implement the capabilities every
//! variant answers: type name, truthiness, equality, rendering, length, and
//! copying. Operator evaluation and ordering live with the VM
//! (`bytecode::vm::binary` / `compare`), since they can dispatch into user
//! code.

use std::fmt::Write;

use crate::{
    builtins::Builtins,
    errors::{ErrKind, RunResult},
    heap::{Heap, HeapData, HeapId},
    types::decimal::Decimal,
};

/// Guard against runaway recursion through cyclic composites.
pub(crate) const MAX_DATA_DEPTH: usize = 64;

/// A runtime value.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Builtin(Builtins),
    Ref(HeapId),
}

impl Value {
    pub fn is_nil(self) -> bool {
        matches!(self, Self::Nil)
    }
}

/// The script-visible type name.
pub(crate) fn type_name(value: Value, heap: &Heap) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Uint(_) => "uint",
        Value::Float(_) => "float",
        Value::Char(_) => "char",
        Value::Builtin(_) => "builtinFunc",
        Value::Ref(id) => heap.get(id).type_name(),
    }
}

/// Falsiness: nil, false, numeric zero, the NUL char, and empty composites.
pub(crate) fn is_falsy(value: Value, heap: &Heap) -> bool {
    match value {
        Value::Nil => true,
        Value::Bool(b) => !b,
        Value::Int(i) => i == 0,
        Value::Uint(u) => u == 0,
        Value::Float(f) => f == 0.0,
        Value::Char(c) => c == '\0',
        Value::Builtin(_) => false,
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => s.is_empty(),
            HeapData::Bytes(b) => b.is_empty(),
            HeapData::Array(a) => a.is_empty(),
            HeapData::Dict(d) => d.is_empty(),
            HeapData::SyncDict(d) => d.is_empty(),
            HeapData::KeyValueArray(kva) => kva.is_empty(),
            HeapData::Decimal(d) => d.is_zero(),
            _ => false,
        },
    }
}

/// `len` for values that have one.
pub(crate) fn len_of(value: Value, heap: &Heap) -> Option<usize> {
    match value {
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(s) => Some(s.chars().count()),
            HeapData::Bytes(b) => Some(b.len()),
            HeapData::Array(a) => Some(a.len()),
            HeapData::Dict(d) => Some(d.len()),
            HeapData::SyncDict(d) => Some(d.len()),
            HeapData::KeyValueArray(kva) => Some(kva.len()),
            HeapData::Reflect(r) => r.lock().length(),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric view used for widening equality and comparison.
#[derive(Debug, Clone)]
pub(crate) enum Numeric {
    Int(i64),
    Uint(u64),
    Float(f64),
    Decimal(Decimal),
}

/// Extracts the numeric view of a value; chars widen to their code point.
///
/// Bool is deliberately excluded: it coerces in arithmetic but `true != 1`.
pub(crate) fn as_numeric(value: Value, heap: &Heap) -> Option<Numeric> {
    match value {
        Value::Int(i) => Some(Numeric::Int(i)),
        Value::Uint(u) => Some(Numeric::Uint(u)),
        Value::Float(f) => Some(Numeric::Float(f)),
        Value::Char(c) => Some(Numeric::Int(i64::from(u32::from(c)))),
        Value::Ref(id) => match heap.get(id) {
            HeapData::Decimal(d) => Some(Numeric::Decimal(d.clone())),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn numeric_eq(lhs: &Numeric, rhs: &Numeric) -> bool {
    use Numeric::{Decimal as Dec, Float, Int, Uint};
    match (lhs, rhs) {
        (Int(a), Int(b)) => a == b,
        (Uint(a), Uint(b)) => a == b,
        (Float(a), Float(b)) => a == b,
        (Dec(a), Dec(b)) => a == b,
        (Int(a), Uint(b)) | (Uint(b), Int(a)) => *a >= 0 && *a as u64 == *b,
        (Int(a), Float(b)) | (Float(b), Int(a)) => *a as f64 == *b,
        (Uint(a), Float(b)) | (Float(b), Uint(a)) => *a as f64 == *b,
        (Dec(a), Int(b)) | (Int(b), Dec(a)) => *a == Decimal::from_i64(*b),
        (Dec(a), Uint(b)) | (Uint(b), Dec(a)) => *a == Decimal::from_u64(*b),
        (Dec(a), Float(b)) | (Float(b), Dec(a)) => Decimal::from_f64(*b).is_some_and(|d| *a == d),
    }
}

/// Structural equality with numeric widening.
pub(crate) fn eq_values(heap: &Heap, lhs: Value, rhs: Value) -> RunResult<bool> {
    eq_values_at(heap, lhs, rhs, 0)
}

fn eq_values_at(heap: &Heap, lhs: Value, rhs: Value, depth: usize) -> RunResult<bool> {
    if depth > MAX_DATA_DEPTH {
        return Err(ErrKind::type_error("value nested too deeply to compare"));
    }
    if let (Value::Ref(a), Value::Ref(b)) = (lhs, rhs)
        && a == b
    {
        return Ok(true);
    }
    if let (Some(a), Some(b)) = (as_numeric(lhs, heap), as_numeric(rhs, heap)) {
        return Ok(numeric_eq(&a, &b));
    }
    let result = match (lhs, rhs) {
        (Value::Nil, Value::Nil) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Builtin(a), Value::Builtin(b)) => a == b,
        (Value::Ref(a), Value::Ref(b)) => match (heap.get(a), heap.get(b)) {
            (HeapData::Str(a), HeapData::Str(b)) => a == b,
            (HeapData::Bytes(a), HeapData::Bytes(b)) => a == b,
            (HeapData::Array(a), HeapData::Array(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.clone().into_iter().zip(b.clone()) {
                    if !eq_values_at(heap, x, y, depth + 1)? {
                        return Ok(false);
                    }
                }
                true
            }
            (HeapData::Dict(a), HeapData::Dict(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                let pairs: Vec<(String, Value)> = a.map.iter().map(|(k, v)| (k.clone(), *v)).collect();
                for (key, value) in pairs {
                    match b.get(&key) {
                        Some(other) if eq_values_at(heap, value, other, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (HeapData::SyncDict(a), HeapData::SyncDict(b)) => {
                a.same_storage(b) || {
                    if a.len() != b.len() {
                        return Ok(false);
                    }
                    a.keys().iter().all(|k| a.get(k) == b.get(k))
                }
            }
            (HeapData::KeyValue(a), HeapData::KeyValue(b)) => {
                eq_values_at(heap, a.key, b.key, depth + 1)? && eq_values_at(heap, a.value, b.value, depth + 1)?
            }
            (HeapData::KeyValueArray(a), HeapData::KeyValueArray(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (x, y) in a.pairs.clone().into_iter().zip(b.pairs.clone()) {
                    if !eq_values_at(heap, x.key, y.key, depth + 1)?
                        || !eq_values_at(heap, x.value, y.value, depth + 1)?
                    {
                        return Ok(false);
                    }
                }
                true
            }
            (HeapData::Error(a), HeapData::Error(b)) => a.name == b.name && a.message == b.message,
            // Callables, instances, iterators: identity only, handled above.
            _ => false,
        },
        _ => false,
    };
    Ok(result)
}

/// Renders a value in its canonical form.
///
/// `quote_strings` controls whether strings render raw (printing) or quoted
/// (inside composites).
pub(crate) fn to_display(heap: &Heap, value: Value, quote_strings: bool) -> RunResult<String> {
    let mut out = String::new();
    write_value(&mut out, heap, value, quote_strings, 0)?;
    Ok(out)
}

fn write_value(out: &mut String, heap: &Heap, value: Value, quote: bool, depth: usize) -> RunResult<()> {
    if depth > MAX_DATA_DEPTH {
        return Err(ErrKind::type_error("value nested too deeply to render"));
    }
    match value {
        Value::Nil => out.push_str("nil"),
        Value::Bool(b) => out.push_str(if b { "true" } else { "false" }),
        Value::Int(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Uint(u) => {
            let _ = write!(out, "{u}");
        }
        Value::Float(f) => {
            let mut buffer = ryu::Buffer::new();
            out.push_str(buffer.format(f));
        }
        Value::Char(c) => out.push(c),
        Value::Builtin(b) => {
            let _ = write!(out, "<builtinFunc {}>", b.name());
        }
        Value::Ref(id) => write_heap_value(out, heap, id, quote, depth)?,
    }
    Ok(())
}

fn write_heap_value(out: &mut String, heap: &Heap, id: HeapId, quote: bool, depth: usize) -> RunResult<()> {
    match heap.get(id) {
        HeapData::Str(s) => {
            if quote {
                let _ = write!(out, "{s:?}");
            } else {
                out.push_str(s);
            }
        }
        HeapData::Bytes(b) => {
            out.push_str("bytes[");
            for (i, byte) in b.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{byte}");
            }
            out.push(']');
        }
        HeapData::Decimal(d) => {
            let _ = write!(out, "{d}");
        }
        HeapData::Array(items) => {
            let items = items.clone();
            out.push('[');
            for (i, item) in items.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, heap, item, true, depth + 1)?;
            }
            out.push(']');
        }
        HeapData::Dict(dict) => {
            let keys = dict.sorted_keys();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{key}: ");
                let value = dict.get(key).unwrap_or(Value::Nil);
                write_value(out, heap, value, true, depth + 1)?;
            }
            out.push('}');
        }
        HeapData::SyncDict(dict) => {
            let mut keys = dict.keys();
            keys.sort_unstable();
            out.push_str("syncDict{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{key}: ");
                match dict.get(key) {
                    Some(object) => {
                        let _ = write!(out, "{object}");
                    }
                    None => out.push_str("nil"),
                }
            }
            out.push('}');
        }
        HeapData::KeyValue(kv) => {
            let (key, value) = (kv.key, kv.value);
            write_value(out, heap, key, false, depth + 1)?;
            out.push('=');
            write_value(out, heap, value, true, depth + 1)?;
        }
        HeapData::KeyValueArray(kva) => {
            let pairs = kva.pairs.clone();
            out.push_str("(;");
            for (i, pair) in pairs.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, heap, pair.key, false, depth + 1)?;
                out.push('=');
                write_value(out, heap, pair.value, true, depth + 1)?;
            }
            out.push(')');
        }
        HeapData::NamedArgs(named) => {
            let pairs = named.remaining(heap);
            out.push_str("(;");
            for (i, pair) in pairs.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, heap, pair.key, false, depth + 1)?;
                out.push('=');
                write_value(out, heap, pair.value, true, depth + 1)?;
            }
            out.push(')');
        }
        HeapData::Closure(_) | HeapData::Bound(_) | HeapData::Wrapped(_) => out.push_str("<func>"),
        HeapData::HostFunc(host) => {
            let _ = write!(out, "<builtinFunc {}>", host.func.name);
        }
        HeapData::ObjectType(ty) => {
            let _ = write!(out, "<objectType {}>", ty.name);
        }
        HeapData::Instance(instance) => {
            let (ty, fields) = (instance.ty, instance.fields.clone());
            match heap.get(ty) {
                HeapData::ObjectType(t) => out.push_str(&t.name),
                _ => out.push_str("object"),
            }
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{key}: ");
                let value = fields.get(*key).copied().unwrap_or(Value::Nil);
                write_value(out, heap, value, true, depth + 1)?;
            }
            out.push('}');
        }
        HeapData::Error(err) => {
            let _ = write!(out, "{}: {}", err.name, err.message);
        }
        HeapData::Cell(inner) => {
            let inner = *inner;
            write_value(out, heap, inner, quote, depth + 1)?;
        }
        HeapData::Iter(_) => out.push_str("<iterator>"),
        HeapData::Regexp(r) => {
            let _ = write!(out, "<regexp {}>", r.source);
        }
        HeapData::Reflect(r) => out.push_str(&r.lock().to_display()),
    }
    Ok(())
}

/// Shallow copy: composites duplicate their top-level storage, aliasing their
/// elements; primitives are returned as-is.
pub(crate) fn copy_value(heap: &mut Heap, value: Value) -> Value {
    match value {
        Value::Ref(id) => {
            let data = match heap.get(id) {
                HeapData::SyncDict(d) => HeapData::SyncDict(d.duplicate()),
                other => other.clone(),
            };
            heap.alloc_value(data)
        }
        immediate => immediate,
    }
}

/// Deep copy: mutations at any depth of the result never alias the original.
pub(crate) fn deep_copy_value(heap: &mut Heap, value: Value) -> RunResult<Value> {
    deep_copy_at(heap, value, 0)
}

fn deep_copy_at(heap: &mut Heap, value: Value, depth: usize) -> RunResult<Value> {
    if depth > MAX_DATA_DEPTH {
        return Err(ErrKind::type_error("value nested too deeply to copy"));
    }
    let Value::Ref(id) = value else {
        return Ok(value);
    };
    let data = heap.get(id).clone();
    let copied = match data {
        HeapData::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(deep_copy_at(heap, item, depth + 1)?);
            }
            HeapData::Array(out)
        }
        HeapData::Dict(dict) => {
            let mut out = crate::types::Dict::with_capacity(dict.len());
            for (key, item) in dict.map {
                let item = deep_copy_at(heap, item, depth + 1)?;
                out.insert(key, item);
            }
            HeapData::Dict(out)
        }
        HeapData::KeyValue(kv) => {
            let key = deep_copy_at(heap, kv.key, depth + 1)?;
            let value = deep_copy_at(heap, kv.value, depth + 1)?;
            HeapData::KeyValue(crate::types::KeyValue { key, value })
        }
        HeapData::KeyValueArray(kva) => {
            let mut out = crate::types::KeyValueArray::new();
            for pair in kva.pairs {
                let key = deep_copy_at(heap, pair.key, depth + 1)?;
                let value = deep_copy_at(heap, pair.value, depth + 1)?;
                out.push(key, value);
            }
            HeapData::KeyValueArray(out)
        }
        HeapData::Instance(instance) => {
            let mut fields = ahash::AHashMap::with_capacity(instance.fields.len());
            for (key, item) in instance.fields {
                fields.insert(key, deep_copy_at(heap, item, depth + 1)?);
            }
            HeapData::Instance(crate::types::Instance { ty: instance.ty, fields })
        }
        HeapData::SyncDict(d) => HeapData::SyncDict(d.duplicate()),
        other => other,
    };
    Ok(heap.alloc_value(copied))
}

/// `close`: a no-op returning the argument unless the value bridges a host
/// resource.
pub(crate) fn close_value(heap: &mut Heap, value: Value) -> Value {
    if let Value::Ref(id) = value
        && let HeapData::Reflect(r) = heap.get(id)
    {
        r.lock().close();
    }
    value
}
