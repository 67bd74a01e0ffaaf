//! The script-visible builtin registry.
//!
//! Builtins resolve by name only when no symbol matched, and load through
//! the `LoadBuiltin` opcode as a compact `(tag, index)` pair. Implementations
//! are grouped by concern; every one takes the VM (for the heap, output, and
//! nested calls) and an [`Args`] bundle.

mod calls;
mod collections;
mod constructors;
mod iterators;
mod predicates;
mod print;
mod reflect;

use std::str::FromStr;

use strum::{Display, EnumString, FromRepr, IntoStaticStr};

use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    types::ErrorObj,
    value::Value,
};

/// Encoding tag for builtin functions.
const TAG_FUNC: u8 = 0;
/// Encoding tag for error-kind constructors.
const TAG_ERR: u8 = 1;

/// Every interpreter-native builtin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Builtins {
    Func(BuiltinFunc),
    /// Error-kind constructors (`TypeError(...)`, `NotImplementedError(...)`).
    ErrCtor(ErrKind),
}

impl Builtins {
    /// Resolves a source name; called only after symbol lookup failed.
    pub fn resolve(name: &str) -> Option<Self> {
        if let Ok(func) = BuiltinFunc::from_str(name) {
            return Some(Self::Func(func));
        }
        if let Ok(kind) = ErrKind::from_str(name) {
            return Some(Self::ErrCtor(kind));
        }
        None
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Func(func) => func.into(),
            Self::ErrCtor(kind) => kind.into(),
        }
    }

    /// Packs into the symbol-table index form.
    pub fn encode(self) -> u16 {
        let (tag, index) = match self {
            Self::Func(func) => (TAG_FUNC, func as u8),
            Self::ErrCtor(kind) => (TAG_ERR, kind as u8),
        };
        u16::from_le_bytes([tag, index])
    }

    pub fn decode_parts(encoded: u16) -> (u8, u8) {
        let [tag, index] = encoded.to_le_bytes();
        (tag, index)
    }

    pub fn decode(tag: u8, index: u8) -> Option<Self> {
        match tag {
            TAG_FUNC => BuiltinFunc::from_repr(index).map(Self::Func),
            TAG_ERR => ErrKind::from_repr(index).map(Self::ErrCtor),
            _ => None,
        }
    }
}

/// Builtin functions, named exactly as scripts see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, FromRepr)]
#[strum(serialize_all = "camelCase")]
#[repr(u8)]
pub(crate) enum BuiltinFunc {
    // Type predicates.
    IsInt,
    IsUint,
    IsFloat,
    IsChar,
    IsBool,
    IsStr,
    IsBytes,
    IsDecimal,
    IsArray,
    IsDict,
    IsSyncDict,
    IsError,
    IsFunction,
    IsCallable,
    IsIterable,
    IsNil,
    Is,
    // Constructors.
    Int,
    Uint,
    Float,
    Decimal,
    Char,
    Str,
    Bytes,
    Chars,
    Buffer,
    Error,
    KeyValue,
    KeyValueArray,
    Regexp,
    Struct,
    SyncDict,
    // Collection operations.
    Append,
    Delete,
    Copy,
    Dcopy,
    Len,
    Cap,
    Contains,
    Repeat,
    Sort,
    SortReverse,
    // Iteration.
    Iterator,
    Keys,
    Values,
    Items,
    Enumerate,
    Map,
    Filter,
    Reduce,
    Zip,
    Collect,
    // I/O.
    Print,
    Println,
    Printf,
    Sprintf,
    Write,
    Read,
    Close,
    Flush,
    Obstart,
    Obend,
    // Reflection.
    TypeName,
    Typeof,
    Globals,
    // Call plumbing.
    Wrap,
    AddCallMethod,
    RawCaller,
    Cast,
    BinaryOperator,
}

/// Invokes a builtin.
pub(crate) fn call(vm: &mut Vm<'_>, builtin: Builtins, args: Args) -> RunResult<Value> {
    match builtin {
        Builtins::ErrCtor(kind) => err_ctor(vm, kind, &args),
        Builtins::Func(func) => {
            use BuiltinFunc as F;
            match func {
                F::IsInt | F::IsUint | F::IsFloat | F::IsChar | F::IsBool | F::IsStr | F::IsBytes
                | F::IsDecimal | F::IsArray | F::IsDict | F::IsSyncDict | F::IsError | F::IsFunction
                | F::IsCallable | F::IsIterable | F::IsNil => predicates::predicate(vm, func, &args),
                F::Is => predicates::is(vm, &args),
                F::Int => constructors::int(vm, &args),
                F::Uint => constructors::uint(vm, &args),
                F::Float => constructors::float(vm, &args),
                F::Decimal => constructors::decimal(vm, &args),
                F::Char => constructors::char_(vm, &args),
                F::Str => constructors::str_(vm, &args),
                F::Bytes => constructors::bytes(vm, &args),
                F::Chars => constructors::chars(vm, &args),
                F::Buffer => constructors::buffer(vm, &args),
                F::Error => constructors::error(vm, &args),
                F::KeyValue => constructors::key_value(vm, &args),
                F::KeyValueArray => constructors::key_value_array(vm, &args),
                F::Regexp => constructors::regexp(vm, &args),
                F::Struct => constructors::struct_(vm, &args),
                F::SyncDict => constructors::sync_dict(vm, &args),
                F::Append => collections::append(vm, &args),
                F::Delete => collections::delete(vm, &args),
                F::Copy => collections::copy(vm, &args),
                F::Dcopy => collections::dcopy(vm, &args),
                F::Len => collections::len(vm, &args),
                F::Cap => collections::cap(vm, &args),
                F::Contains => collections::contains(vm, &args),
                F::Repeat => collections::repeat(vm, &args),
                F::Sort => collections::sort(vm, &args, false),
                F::SortReverse => collections::sort(vm, &args, true),
                F::Iterator => iterators::iterator(vm, &args),
                F::Keys => iterators::keys(vm, &args),
                F::Values => iterators::values(vm, &args),
                F::Items => iterators::items(vm, &args),
                F::Enumerate => iterators::enumerate(vm, &args),
                F::Map => iterators::map(vm, &args),
                F::Filter => iterators::filter(vm, &args),
                F::Reduce => iterators::reduce(vm, &args),
                F::Zip => iterators::zip(vm, &args),
                F::Collect => iterators::collect(vm, &args),
                F::Print => print::print(vm, &args, false),
                F::Println => print::print(vm, &args, true),
                F::Printf => print::printf(vm, &args),
                F::Sprintf => print::sprintf(vm, &args),
                F::Write => print::write(vm, &args),
                F::Read => print::read(vm, &args),
                F::Close => print::close(vm, &args),
                F::Flush => print::flush(vm, &args),
                F::Obstart => print::obstart(vm, &args),
                F::Obend => print::obend(vm, &args),
                F::TypeName => reflect::type_name(vm, &args),
                F::Typeof => reflect::type_of(vm, &args),
                F::Globals => reflect::globals(vm, &args),
                F::Wrap => calls::wrap(vm, &args),
                F::AddCallMethod => calls::add_call_method(vm, &args),
                F::RawCaller => calls::raw_caller(vm, &args),
                F::Cast => calls::cast(vm, &args),
                F::BinaryOperator => calls::binary_operator(vm, &args),
            }
        }
    }
}

/// `TypeError("msg")` and friends build error objects of that kind.
fn err_ctor(vm: &mut Vm<'_>, kind: ErrKind, args: &Args) -> RunResult<Value> {
    let message = match args.positional.as_slice() {
        [] => String::new(),
        [message] => crate::value::to_display(&vm.heap, *message, false)?,
        other => return Err(ErrKind::wrong_args(kind.into(), "0..1", other.len())),
    };
    Ok(vm.heap.alloc_error(ErrorObj::new(<&'static str>::from(kind), message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_matches_script_names() {
        assert_eq!(Builtins::resolve("isInt"), Some(Builtins::Func(BuiltinFunc::IsInt)));
        assert_eq!(Builtins::resolve("typeName"), Some(Builtins::Func(BuiltinFunc::TypeName)));
        assert_eq!(Builtins::resolve("TypeError"), Some(Builtins::ErrCtor(ErrKind::TypeError)));
        assert_eq!(Builtins::resolve("noSuchBuiltin"), None);
    }

    #[test]
    fn encoding_round_trips() {
        for builtin in [
            Builtins::Func(BuiltinFunc::Print),
            Builtins::Func(BuiltinFunc::BinaryOperator),
            Builtins::ErrCtor(ErrKind::ZeroDivisionError),
        ] {
            let (tag, index) = Builtins::decode_parts(builtin.encode());
            assert_eq!(Builtins::decode(tag, index), Some(builtin));
        }
    }
}
