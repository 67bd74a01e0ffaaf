//! Iterator builtins: construction, lazy transformers, and eager folds.

use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    heap::HeapData,
    types::{IterOptions, ValueIter},
    value::Value,
};

/// `iterator(x; sorted=false, reversed=false, step=1)`.
pub(super) fn iterator(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("iterator")?;
    let options = IterOptions {
        sorted: args.named_bool(&vm.heap, "sorted", false),
        reversed: args.named_bool(&vm.heap, "reversed", false),
        step: usize::try_from(args.named_int(&vm.heap, "step", 1)?)
            .ok()
            .filter(|step| *step >= 1)
            .ok_or_else(|| ErrKind::type_error("step= must be a positive integer"))?,
    };
    let id = vm.make_iter(value, options)?;
    Ok(Value::Ref(id))
}

fn wrap_single(vm: &mut Vm<'_>, args: &Args, name: &str, wrap: impl FnOnce(crate::heap::HeapId) -> ValueIter) -> RunResult<Value> {
    let value = args.one(name)?;
    let inner = vm.make_iter(value, IterOptions::default())?;
    Ok(vm.heap.alloc_value(HeapData::Iter(wrap(inner))))
}

pub(super) fn keys(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    wrap_single(vm, args, "keys", |inner| ValueIter::Keys { inner })
}

pub(super) fn values(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    wrap_single(vm, args, "values", |inner| ValueIter::Values { inner })
}

pub(super) fn items(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    wrap_single(vm, args, "items", |inner| ValueIter::Items { inner })
}

pub(super) fn enumerate(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    wrap_single(vm, args, "enumerate", |inner| ValueIter::Enumerate { inner, count: 0 })
}

pub(super) fn map(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (value, func) = args.two("map")?;
    let inner = vm.make_iter(value, IterOptions::default())?;
    Ok(vm.heap.alloc_value(HeapData::Iter(ValueIter::Map { inner, func })))
}

pub(super) fn filter(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (value, func) = args.two("filter")?;
    let inner = vm.make_iter(value, IterOptions::default())?;
    Ok(vm.heap.alloc_value(HeapData::Iter(ValueIter::Filter { inner, func })))
}

pub(super) fn zip(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (left, right) = args.two("zip")?;
    let a = vm.make_iter(left, IterOptions::default())?;
    let b = vm.make_iter(right, IterOptions::default())?;
    Ok(vm.heap.alloc_value(HeapData::Iter(ValueIter::Zip { a, b, count: 0 })))
}

/// `reduce(x, init, f)`: eager left fold with `f(acc, value)`.
pub(super) fn reduce(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (value, init, func) = args.three("reduce")?;
    let iter = vm.make_iter(value, IterOptions::default())?;
    let mut acc = init;
    while let Some((_, item)) = vm.iter_next(iter)? {
        acc = vm.call_value_nested(func, vec![acc, item], None)?;
    }
    Ok(acc)
}

/// `collect(x)`: drains an iterable into an array of its values.
pub(super) fn collect(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("collect")?;
    let items = vm.collect_values(value)?;
    Ok(vm.heap.alloc_array(items))
}
