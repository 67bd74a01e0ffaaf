//! Call plumbing: `wrap`, `addCallMethod`, `rawCaller`, `cast`,
//! `binaryOperator`.

use crate::{
    args::Args,
    ast::BinOp,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    heap::HeapData,
    types::{Closure, Wrapped},
    value::Value,
};

/// `wrap(f, args...; named...)`: a callable with stored leading arguments.
pub(super) fn wrap(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let [callee, stored @ ..] = args.positional.as_slice() else {
        return Err(ErrKind::wrong_args("wrap", "1+", 0));
    };
    let wrapped = Wrapped {
        callee: *callee,
        args: stored.to_vec(),
        named: args.named,
    };
    Ok(vm.heap.alloc_value(HeapData::Wrapped(wrapped)))
}

/// `addCallMethod(callable, fn)`: registers an overload and returns the
/// callable.
pub(super) fn add_call_method(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (base, overload) = args.two("addCallMethod")?;
    vm.add_call_method(base, overload)?;
    Ok(base)
}

/// `rawCaller(f)`: the base implementation with its method table detached.
pub(super) fn raw_caller(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("rawCaller")?;
    if let Value::Ref(id) = value
        && let HeapData::Closure(closure) = vm.heap.get(id)
        && closure.methods.is_some()
    {
        let bare = Closure::new(closure.func, closure.cells.clone());
        return Ok(vm.heap.alloc_value(HeapData::Closure(bare)));
    }
    Ok(value)
}

/// `cast(T, v)`: conversion through a type constructor.
pub(super) fn cast(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let (ty, value) = args.two("cast")?;
    let Value::Builtin(builtin) = ty else {
        return Err(ErrKind::type_error("cast() expects a type constructor"));
    };
    vm.call_value_nested(Value::Builtin(builtin), vec![value], None)
}

/// `binaryOperator("*")`: the well-known callable for an operator token;
/// created on first use so user code can attach methods to it.
pub(super) fn binary_operator(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("binaryOperator")?;
    let Some(token) = vm.heap.str_of(value).map(str::to_owned) else {
        return Err(ErrKind::type_error("binaryOperator() expects an operator token string"));
    };
    let op = match token.as_str() {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Rem,
        "&" => BinOp::BitAnd,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        other => return Err(ErrKind::type_error(format!("unknown operator token '{other}'"))),
    };
    Ok(vm.operator_callable_entry(op))
}
