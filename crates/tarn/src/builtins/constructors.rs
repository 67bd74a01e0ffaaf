//! Value constructors: `int`, `str`, `bytes`, `struct`, and friends.

use std::str::FromStr;

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    heap::HeapData,
    types::{self, ErrorObj, KeyValue, KeyValueArray, ObjectType, Regexp, decimal::Decimal},
    value::{Value, to_display, type_name},
};

fn conversion_error(vm: &Vm<'_>, target: &str, value: Value) -> crate::errors::RunError {
    ErrKind::type_error(format!(
        "cannot convert '{}' to {target}",
        type_name(value, &vm.heap)
    ))
}

pub(super) fn int(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("int")?;
    let result = match value {
        Value::Int(i) => i,
        Value::Uint(u) => i64::try_from(u).map_err(|_| conversion_error(vm, "int", value))?,
        Value::Float(f) => f as i64,
        Value::Char(c) => i64::from(u32::from(c)),
        Value::Bool(b) => i64::from(b),
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Str(s) => i64::from_str(s.trim()).map_err(|_| conversion_error(vm, "int", value))?,
            HeapData::Decimal(d) => d.to_i64().ok_or_else(|| conversion_error(vm, "int", value))?,
            _ => return Err(conversion_error(vm, "int", value)),
        },
        Value::Nil | Value::Builtin(_) => return Err(conversion_error(vm, "int", value)),
    };
    Ok(Value::Int(result))
}

pub(super) fn uint(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("uint")?;
    let result = match value {
        Value::Uint(u) => u,
        Value::Int(i) => u64::try_from(i).map_err(|_| conversion_error(vm, "uint", value))?,
        Value::Float(f) if f >= 0.0 => f as u64,
        Value::Char(c) => u64::from(u32::from(c)),
        Value::Bool(b) => u64::from(b),
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Str(s) => u64::from_str(s.trim()).map_err(|_| conversion_error(vm, "uint", value))?,
            _ => return Err(conversion_error(vm, "uint", value)),
        },
        _ => return Err(conversion_error(vm, "uint", value)),
    };
    Ok(Value::Uint(result))
}

pub(super) fn float(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("float")?;
    let result = match value {
        Value::Float(f) => f,
        Value::Int(i) => i as f64,
        Value::Uint(u) => u as f64,
        Value::Bool(b) => f64::from(u8::from(b)),
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Str(s) => f64::from_str(s.trim()).map_err(|_| conversion_error(vm, "float", value))?,
            HeapData::Decimal(d) => d.to_f64(),
            _ => return Err(conversion_error(vm, "float", value)),
        },
        _ => return Err(conversion_error(vm, "float", value)),
    };
    Ok(Value::Float(result))
}

pub(super) fn decimal(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("decimal")?;
    let result = match value {
        Value::Int(i) => Decimal::from_i64(i),
        Value::Uint(u) => Decimal::from_u64(u),
        Value::Float(f) => Decimal::from_f64(f).ok_or_else(|| conversion_error(vm, "decimal", value))?,
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Decimal(d) => d.clone(),
            HeapData::Str(s) => Decimal::from_str(s).map_err(|_| conversion_error(vm, "decimal", value))?,
            _ => return Err(conversion_error(vm, "decimal", value)),
        },
        _ => return Err(conversion_error(vm, "decimal", value)),
    };
    Ok(vm.heap.alloc_value(HeapData::Decimal(result)))
}

pub(super) fn char_(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("char")?;
    let result = match value {
        Value::Char(c) => c,
        Value::Int(i) => u32::try_from(i)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| conversion_error(vm, "char", value))?,
        Value::Uint(u) => u32::try_from(u)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| conversion_error(vm, "char", value))?,
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Str(s) if s.chars().count() == 1 => s.chars().next().unwrap_or('\0'),
            _ => return Err(conversion_error(vm, "char", value)),
        },
        _ => return Err(conversion_error(vm, "char", value)),
    };
    Ok(Value::Char(result))
}

pub(super) fn str_(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("str")?;
    let text = to_display(&vm.heap, value, false)?;
    Ok(vm.heap.alloc_str(text))
}

pub(super) fn bytes(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    if args.positional.is_empty() {
        return Ok(vm.heap.alloc_value(HeapData::Bytes(Vec::new())));
    }
    let value = args.one("bytes")?;
    let result = match value {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Bytes(b) => b.clone(),
            HeapData::Str(s) => s.as_bytes().to_vec(),
            HeapData::Array(items) => {
                let items = items.clone();
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    let byte = match item {
                        Value::Int(i) => u8::try_from(i).ok(),
                        Value::Uint(u) => u8::try_from(u).ok(),
                        _ => None,
                    };
                    out.push(byte.ok_or_else(|| ErrKind::type_error("bytes() array elements must be bytes"))?);
                }
                out
            }
            _ => return Err(conversion_error(vm, "bytes", value)),
        },
        _ => return Err(conversion_error(vm, "bytes", value)),
    };
    Ok(vm.heap.alloc_value(HeapData::Bytes(result)))
}

/// `chars(s)`: the string's characters as an array.
pub(super) fn chars(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("chars")?;
    let Some(text) = vm.heap.str_of(value) else {
        return Err(conversion_error(vm, "chars", value));
    };
    let items: Vec<Value> = text.chars().map(Value::Char).collect();
    Ok(vm.heap.alloc_array(items))
}

/// `buffer(n)`: a zeroed mutable byte sequence.
pub(super) fn buffer(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("buffer")?;
    let size = match value {
        Value::Int(i) if i >= 0 => i as usize,
        Value::Uint(u) => u as usize,
        _ => return Err(ErrKind::type_error("buffer() expects a non-negative size")),
    };
    Ok(vm.heap.alloc_value(HeapData::Bytes(vec![0; size])))
}

/// `error(msg)` / `error(name, msg)`, with an optional `cause=` named
/// argument.
pub(super) fn error(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (name, message) = match args.positional.as_slice() {
        [message] => ("error".to_owned(), to_display(&vm.heap, *message, false)?),
        [name, message] => (
            to_display(&vm.heap, *name, false)?,
            to_display(&vm.heap, *message, false)?,
        ),
        other => return Err(ErrKind::wrong_args("error", "1..2", other.len())),
    };
    let mut object = ErrorObj::new(name, message);
    object.cause = args.named_lookup(&vm.heap, "cause");
    Ok(vm.heap.alloc_error(object))
}

pub(super) fn key_value(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (key, value) = args.two("keyValue")?;
    Ok(vm.heap.alloc_value(HeapData::KeyValue(KeyValue { key, value })))
}

/// `keyValueArray(...)`: flattens pair, dict, and pair-array arguments into
/// one ordered pair array.
pub(super) fn key_value_array(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let mut kva = KeyValueArray::new();
    for value in &args.positional {
        match *value {
            Value::Ref(id) => match vm.heap.get(id) {
                HeapData::KeyValue(pair) => kva.pairs.push(*pair),
                HeapData::KeyValueArray(other) => kva.pairs.extend(other.pairs.clone()),
                HeapData::Dict(dict) => {
                    let pairs: Vec<(String, Value)> = dict
                        .sorted_keys()
                        .into_iter()
                        .map(|k| {
                            let v = dict.get(&k).unwrap_or(Value::Nil);
                            (k, v)
                        })
                        .collect();
                    for (key, item) in pairs {
                        let key = vm.heap.alloc_str(key);
                        kva.push(key, item);
                    }
                }
                _ => return Err(ErrKind::type_error("keyValueArray() expects pairs, dicts, or pair arrays")),
            },
            _ => return Err(ErrKind::type_error("keyValueArray() expects pairs, dicts, or pair arrays")),
        }
    }
    Ok(vm.heap.alloc_value(HeapData::KeyValueArray(kva)))
}

pub(super) fn regexp(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("regexp")?;
    let Some(pattern) = vm.heap.str_of(value).map(str::to_owned) else {
        return Err(ErrKind::type_error("regexp() expects a pattern string"));
    };
    let compiled = Regexp::compile(&pattern)?;
    Ok(vm.heap.alloc_value(HeapData::Regexp(compiled)))
}

pub(super) fn sync_dict(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("syncDict")?;
    Ok(vm.heap.alloc_value(HeapData::SyncDict(types::SyncDict::new())))
}

/// `struct(name; fields=[...], init=f, methods={...}, getters={...},
/// setters={...})`: declares a user object type.
pub(super) fn struct_(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let name_value = args.one("struct")?;
    let Some(name) = vm.heap.str_of(name_value).map(str::to_owned) else {
        return Err(ErrKind::type_error("struct() expects a type name string"));
    };
    let mut ty = ObjectType::new(name);

    if let Some(fields) = args.named_lookup(&vm.heap, "fields") {
        let names = vm.collect_values(fields)?;
        let mut declared = IndexMap::with_capacity(names.len());
        for field in names {
            let field = vm.key_string(field)?;
            declared.insert(field, Value::Nil);
        }
        ty.fields = declared;
    }
    ty.init = args.named_lookup(&vm.heap, "init");
    ty.methods = named_dict(vm, args, "methods")?;
    ty.getters = named_dict(vm, args, "getters")?;
    ty.setters = named_dict(vm, args, "setters")?;
    Ok(vm.heap.alloc_value(HeapData::ObjectType(ty)))
}

fn named_dict(vm: &Vm<'_>, args: &Args, option: &str) -> RunResult<AHashMap<String, Value>> {
    let Some(value) = args.named_lookup(&vm.heap, option) else {
        return Ok(AHashMap::new());
    };
    match value {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Dict(dict) => Ok(dict.map.clone()),
            other => Err(ErrKind::type_error(format!(
                "struct {option}= expects a dict, got {}",
                other.type_name()
            ))),
        },
        other => Err(ErrKind::type_error(format!(
            "struct {option}= expects a dict, got {}",
            type_name(other, &vm.heap)
        ))),
    }
}
