//! Type predicates: `isInt`, `isStr`, ..., and `is(T, v)`.

use super::BuiltinFunc;
use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    heap::HeapData,
    value::Value,
};

pub(super) fn predicate(vm: &mut Vm<'_>, func: BuiltinFunc, args: &Args) -> RunResult<Value> {
    let name: &'static str = func.into();
    let value = args.one(name)?;
    let truth = match func {
        BuiltinFunc::IsNil => value.is_nil(),
        BuiltinFunc::IsBool => matches!(value, Value::Bool(_)),
        BuiltinFunc::IsInt => matches!(value, Value::Int(_)),
        BuiltinFunc::IsUint => matches!(value, Value::Uint(_)),
        BuiltinFunc::IsFloat => matches!(value, Value::Float(_)),
        BuiltinFunc::IsChar => matches!(value, Value::Char(_)),
        BuiltinFunc::IsFunction => is_function(vm, value),
        BuiltinFunc::IsCallable => is_callable(vm, value),
        BuiltinFunc::IsIterable => is_iterable(vm, value),
        _ => match value {
            Value::Ref(id) => {
                let data = vm.heap.get(id);
                match func {
                    BuiltinFunc::IsStr => matches!(data, HeapData::Str(_)),
                    BuiltinFunc::IsBytes => matches!(data, HeapData::Bytes(_)),
                    BuiltinFunc::IsDecimal => matches!(data, HeapData::Decimal(_)),
                    BuiltinFunc::IsArray => matches!(data, HeapData::Array(_)),
                    BuiltinFunc::IsDict => matches!(data, HeapData::Dict(_)),
                    BuiltinFunc::IsSyncDict => matches!(data, HeapData::SyncDict(_)),
                    BuiltinFunc::IsError => matches!(data, HeapData::Error(_)),
                    _ => false,
                }
            }
            _ => false,
        },
    };
    Ok(Value::Bool(truth))
}

fn is_function(vm: &Vm<'_>, value: Value) -> bool {
    match value {
        Value::Builtin(_) => true,
        Value::Ref(id) => matches!(
            vm.heap.get(id),
            HeapData::Closure(_) | HeapData::HostFunc(_) | HeapData::Bound(_) | HeapData::Wrapped(_)
        ),
        _ => false,
    }
}

fn is_callable(vm: &Vm<'_>, value: Value) -> bool {
    is_function(vm, value)
        || match value {
            Value::Ref(id) => matches!(
                vm.heap.get(id),
                HeapData::ObjectType(_) | HeapData::Regexp(_) | HeapData::Reflect(_)
            ),
            _ => false,
        }
}

fn is_iterable(vm: &Vm<'_>, value: Value) -> bool {
    is_function(vm, value)
        || match value {
            Value::Ref(id) => matches!(
                vm.heap.get(id),
                HeapData::Array(_)
                    | HeapData::Dict(_)
                    | HeapData::SyncDict(_)
                    | HeapData::Str(_)
                    | HeapData::Bytes(_)
                    | HeapData::KeyValueArray(_)
                    | HeapData::Iter(_)
            ),
            _ => false,
        }
}

/// `is(T, v)`: true when `v` is of type `T` (a user type or a type
/// constructor).
pub(super) fn is(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (ty, value) = args.two("is")?;
    // User object types match their instances.
    if let (Value::Ref(type_id), Value::Ref(value_id)) = (ty, value)
        && matches!(vm.heap.get(type_id), HeapData::ObjectType(_))
    {
        let matches_type = match vm.heap.get(value_id) {
            HeapData::Instance(instance) => instance.ty == type_id,
            _ => false,
        };
        return Ok(Value::Bool(matches_type));
    }
    // Type constructors match by kind name.
    if let Value::Builtin(builtin) = ty {
        let want = match builtin.name() {
            "int" => "int",
            "uint" => "uint",
            "float" => "float",
            "decimal" => "decimal",
            "char" => "char",
            "str" => "str",
            "bytes" => "bytes",
            "keyValue" => "keyValue",
            "keyValueArray" => "keyValueArray",
            "error" => "error",
            "syncDict" => "syncDict",
            other => {
                return Err(ErrKind::type_error(format!("'{other}' is not a type")));
            }
        };
        return Ok(Value::Bool(crate::value::type_name(value, &vm.heap) == want));
    }
    Err(ErrKind::type_error("is() expects a type as its first argument"))
}
