//! Collection operations: append, delete, copy, len, contains, sort, ...

use crate::{
    args::Args,
    bytecode::vm::{Vm, int_index, sort_values},
    errors::{ErrKind, RunResult},
    heap::HeapData,
    value::{Value, copy_value, deep_copy_value, eq_values, is_falsy, len_of, type_name},
};

/// `append(arr, items...)`: appends in place and returns the array.
pub(super) fn append(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let [target, items @ ..] = args.positional.as_slice() else {
        return Err(ErrKind::wrong_args("append", "1+", 0));
    };
    let Value::Ref(id) = *target else {
        return Err(ErrKind::type_error("append() expects an array or bytes"));
    };
    let items = items.to_vec();
    match vm.heap.get_mut(id) {
        HeapData::Array(existing) => {
            existing.extend(items);
            Ok(*target)
        }
        HeapData::Bytes(existing) => {
            for item in items {
                let byte = match item {
                    Value::Int(i) => u8::try_from(i).ok(),
                    Value::Uint(u) => u8::try_from(u).ok(),
                    _ => None,
                };
                existing.push(byte.ok_or_else(|| ErrKind::type_error("append() to bytes expects byte values"))?);
            }
            Ok(*target)
        }
        other => Err(ErrKind::type_error(format!(
            "append() expects an array or bytes, got {}",
            other.type_name()
        ))),
    }
}

/// `delete(dict, key)` / `delete(array, index)`: removes in place.
pub(super) fn delete(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (target, key) = args.two("delete")?;
    let Value::Ref(id) = target else {
        return Err(ErrKind::type_error("delete() expects a dict or array"));
    };
    match vm.heap.get(id) {
        HeapData::Dict(_) => {
            let key = vm.key_string(key)?;
            if let HeapData::Dict(dict) = vm.heap.get_mut(id) {
                dict.remove(&key);
            }
            Ok(Value::Nil)
        }
        HeapData::SyncDict(dict) => {
            let dict = dict.clone();
            let key = vm.key_string(key)?;
            dict.remove(&key);
            Ok(Value::Nil)
        }
        HeapData::Array(items) => {
            let len = items.len();
            let at = int_index(key)
                .and_then(|i| crate::types::normalize_index(i, len))
                .ok_or_else(|| ErrKind::index_out_of_bounds(-1, len))?;
            if let HeapData::Array(items) = vm.heap.get_mut(id) {
                items.remove(at);
            }
            Ok(Value::Nil)
        }
        other => Err(ErrKind::type_error(format!(
            "delete() expects a dict or array, got {}",
            other.type_name()
        ))),
    }
}

pub(super) fn copy(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("copy")?;
    Ok(copy_value(&mut vm.heap, value))
}

pub(super) fn dcopy(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("dcopy")?;
    deep_copy_value(&mut vm.heap, value)
}

pub(super) fn len(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("len")?;
    match len_of(value, &vm.heap) {
        Some(length) => Ok(Value::Int(length as i64)),
        None => Err(ErrKind::type_error(format!(
            "'{}' has no length",
            type_name(value, &vm.heap)
        ))),
    }
}

pub(super) fn cap(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("cap")?;
    let capacity = match value {
        Value::Ref(id) => match vm.heap.get(id) {
            HeapData::Array(items) => Some(items.capacity()),
            HeapData::Bytes(bytes) => Some(bytes.capacity()),
            _ => None,
        },
        _ => None,
    };
    match capacity {
        Some(capacity) => Ok(Value::Int(capacity as i64)),
        None => Err(ErrKind::type_error(format!(
            "'{}' has no capacity",
            type_name(value, &vm.heap)
        ))),
    }
}

pub(super) fn contains(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (container, item) = args.two("contains")?;
    let Value::Ref(id) = container else {
        return Err(ErrKind::type_error(format!(
            "'{}' cannot contain values",
            type_name(container, &vm.heap)
        )));
    };
    let truth = match vm.heap.get(id) {
        HeapData::Str(s) => {
            let s = s.to_string();
            match item {
                Value::Char(c) => s.contains(c),
                _ => {
                    let needle = vm
                        .heap
                        .str_of(item)
                        .ok_or_else(|| ErrKind::type_error("contains() on a string expects a string"))?;
                    s.contains(needle)
                }
            }
        }
        HeapData::Array(items) => {
            let items = items.clone();
            let mut found = false;
            for candidate in items {
                if eq_values(&vm.heap, candidate, item)? {
                    found = true;
                    break;
                }
            }
            found
        }
        HeapData::Dict(dict) => {
            let dict_keys: Vec<String> = dict.map.keys().cloned().collect();
            let key = vm.key_string(item)?;
            dict_keys.contains(&key)
        }
        HeapData::SyncDict(dict) => {
            let dict = dict.clone();
            let key = vm.key_string(item)?;
            dict.contains_key(&key)
        }
        HeapData::Bytes(bytes) => match item {
            Value::Int(i) => u8::try_from(i).is_ok_and(|b| bytes.contains(&b)),
            Value::Uint(u) => u8::try_from(u).is_ok_and(|b| bytes.contains(&b)),
            _ => false,
        },
        HeapData::KeyValueArray(kva) => {
            let pairs = kva.pairs.clone();
            let key = vm.key_string(item)?;
            pairs
                .iter()
                .any(|pair| vm.heap.str_of(pair.key) == Some(key.as_str()))
        }
        other => {
            return Err(ErrKind::type_error(format!(
                "'{}' cannot contain values",
                other.type_name()
            )));
        }
    };
    Ok(Value::Bool(truth))
}

pub(super) fn repeat(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (value, count) = args.two("repeat")?;
    let count = match count {
        Value::Int(i) if i >= 0 => i as usize,
        Value::Uint(u) => u as usize,
        _ => return Err(ErrKind::type_error("repeat() expects a non-negative count")),
    };
    let Value::Ref(id) = value else {
        return Err(ErrKind::type_error(format!(
            "'{}' cannot be repeated",
            type_name(value, &vm.heap)
        )));
    };
    match vm.heap.get(id) {
        HeapData::Str(s) => {
            let repeated = s.repeat(count);
            Ok(vm.heap.alloc_str(repeated))
        }
        HeapData::Bytes(bytes) => {
            let repeated = bytes.repeat(count);
            Ok(vm.heap.alloc_value(HeapData::Bytes(repeated)))
        }
        HeapData::Array(items) => {
            let mut repeated = Vec::with_capacity(items.len() * count);
            for _ in 0..count {
                repeated.extend_from_slice(items);
            }
            let items = repeated;
            Ok(vm.heap.alloc_array(items))
        }
        other => Err(ErrKind::type_error(format!(
            "'{}' cannot be repeated",
            other.type_name()
        ))),
    }
}

/// `sort(arr)` / `sort(arr, less)`: sorts in place and returns the array.
/// With a comparator, ordering follows `less(a, b)` truthiness.
pub(super) fn sort(vm: &mut Vm<'_>, args: &Args, reverse: bool) -> RunResult<Value> {
    let name = if reverse { "sortReverse" } else { "sort" };
    let (target, less) = args.one_two(name)?;
    let Value::Ref(id) = target else {
        return Err(ErrKind::type_error(format!("{name}() expects an array")));
    };
    let mut items = match vm.heap.get(id) {
        HeapData::Array(items) => items.clone(),
        other => {
            return Err(ErrKind::type_error(format!(
                "{name}() expects an array, got {}",
                other.type_name()
            )));
        }
    };
    match less {
        None => sort_values(&vm.heap, &mut items)?,
        Some(less) => insertion_sort_by(vm, &mut items, less)?,
    }
    if reverse {
        items.reverse();
    }
    if let HeapData::Array(existing) = vm.heap.get_mut(id) {
        *existing = items;
    }
    Ok(target)
}

/// Comparator-driven sort. Insertion sort keeps user-call errors
/// propagatable, and comparator sorts are small in practice.
fn insertion_sort_by(vm: &mut Vm<'_>, items: &mut Vec<Value>, less: Value) -> RunResult<()> {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 {
            let result = vm.call_value_nested(less, vec![items[j], items[j - 1]], None)?;
            if is_falsy(result, &vm.heap) {
                break;
            }
            items.swap(j, j - 1);
            j -= 1;
        }
    }
    Ok(())
}
