//! Reflection builtins: `typeName`, `typeof`, `globals`.

use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::RunResult,
    heap::HeapData,
    types::Dict,
    value::Value,
};

pub(super) fn type_name(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("typeName")?;
    let name = crate::value::type_name(value, &vm.heap);
    Ok(vm.heap.alloc_str(name))
}

/// `typeof(v)`: the declaring object type for instances, the type name for
/// everything else.
pub(super) fn type_of(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("typeof")?;
    if let Value::Ref(id) = value
        && let HeapData::Instance(instance) = vm.heap.get(id)
    {
        return Ok(Value::Ref(instance.ty));
    }
    let name = crate::value::type_name(value, &vm.heap);
    Ok(vm.heap.alloc_str(name))
}

/// `globals()`: a dict snapshot of the global table.
pub(super) fn globals(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("globals")?;
    let entries: Vec<(String, Value)> = vm
        .global_entries()
        .map(|(name, value)| (name.to_owned(), value))
        .collect();
    let mut dict = Dict::with_capacity(entries.len());
    for (name, value) in entries {
        dict.insert(name, value);
    }
    Ok(vm.heap.alloc_dict(dict))
}
