//! Callable value variants and the method-table overload machinery.
//!
//! Any callable may own a [`MethodTable`]: an ordered list of overloads, each
//! declaring a positional type signature. Dispatch walks the table in
//! declaration order and takes the first signature the incoming positional
//! types satisfy, falling back to the base implementation.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{
    bytecode::FuncId,
    heap::{Heap, HeapData, HeapId},
    types::reflect::HostFunc,
    value::Value,
};

/// A compiled function bound to its captured free-variable cells.
#[derive(Debug, Clone)]
pub(crate) struct Closure {
    pub func: FuncId,
    /// Captured cells, in the order the function's free list declares.
    pub cells: Vec<HeapId>,
    pub methods: Option<MethodTable>,
}

impl Closure {
    pub fn new(func: FuncId, cells: Vec<HeapId>) -> Self {
        Self {
            func,
            cells,
            methods: None,
        }
    }
}

/// A host-implemented callable injected through the run options.
#[derive(Debug, Clone)]
pub(crate) struct HostFuncObj {
    pub func: HostFunc,
    pub methods: Option<MethodTable>,
}

/// A method extracted from an instance selector, carrying its receiver.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundMethod {
    pub recv: Value,
    pub callee: Value,
}

/// A callable produced by `wrap(f, args...; named...)`: stored arguments are
/// prepended to every invocation.
#[derive(Debug, Clone)]
pub(crate) struct Wrapped {
    pub callee: Value,
    pub args: Vec<Value>,
    /// A KeyValueArray of stored named arguments, if any.
    pub named: Option<HeapId>,
}

/// Ordered overloads attached to a callable.
#[derive(Debug, Default, Clone)]
pub(crate) struct MethodTable {
    pub overloads: Vec<Overload>,
}

impl MethodTable {
    /// First-match selection by positional types; ties break by declaration
    /// order. `None` means the caller should fall back to the base.
    pub fn select(&self, args: &[Value], heap: &Heap) -> Option<Value> {
        self.overloads
            .iter()
            .find(|overload| overload.sig.matches(args, heap))
            .map(|overload| overload.callee)
    }
}

/// One overload: a positional signature and its implementation.
#[derive(Debug, Clone)]
pub(crate) struct Overload {
    pub sig: TypeSig,
    pub callee: Value,
}

/// A positional type signature: one type set per parameter plus an optional
/// variadic tail that matches any number of extra arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TypeSig {
    pub params: Vec<TypeSet>,
    pub variadic: Option<TypeSet>,
}

impl TypeSig {
    pub fn matches(&self, args: &[Value], heap: &Heap) -> bool {
        match &self.variadic {
            None if args.len() != self.params.len() => return false,
            Some(_) if args.len() < self.params.len() => return false,
            _ => {}
        }
        let fixed = self.params.len();
        if !self
            .params
            .iter()
            .zip(args)
            .all(|(set, arg)| set.matches(*arg, heap))
        {
            return false;
        }
        match &self.variadic {
            Some(set) => args[fixed..].iter().all(|arg| set.matches(*arg, heap)),
            None => true,
        }
    }
}

/// A set of acceptable types for one parameter (`int|uint`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct TypeSet(pub SmallVec<[TypeTag; 2]>);

impl TypeSet {
    pub fn single(tag: TypeTag) -> Self {
        Self(SmallVec::from_elem(tag, 1))
    }

    pub fn matches(&self, value: Value, heap: &Heap) -> bool {
        self.0.iter().any(|tag| tag.matches(value, heap))
    }
}

/// One acceptable type in a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum TypeTag {
    Any,
    Nil,
    Bool,
    Int,
    Uint,
    Float,
    Char,
    Str,
    Bytes,
    Decimal,
    Array,
    Dict,
    SyncDict,
    KeyValue,
    KeyValueArray,
    Func,
    Error,
    /// A user-declared object type, matched by name.
    User(Box<str>),
}

impl TypeTag {
    /// Maps a type-annotation name; unknown names are user types.
    pub fn from_name(name: &str) -> Self {
        match name {
            "any" => Self::Any,
            "nil" => Self::Nil,
            "bool" => Self::Bool,
            "int" => Self::Int,
            "uint" => Self::Uint,
            "float" => Self::Float,
            "char" => Self::Char,
            "str" => Self::Str,
            "bytes" => Self::Bytes,
            "decimal" => Self::Decimal,
            "array" => Self::Array,
            "dict" => Self::Dict,
            "syncDict" => Self::SyncDict,
            "keyValue" => Self::KeyValue,
            "keyValueArray" => Self::KeyValueArray,
            "func" => Self::Func,
            "error" => Self::Error,
            other => Self::User(other.into()),
        }
    }

    /// Widening rank for numeric kinds; non-numerics have none.
    fn numeric_rank(&self) -> Option<u8> {
        match self {
            Self::Bool => Some(0),
            Self::Char => Some(1),
            Self::Int | Self::Uint => Some(2),
            Self::Float => Some(3),
            Self::Decimal => Some(4),
            _ => None,
        }
    }

    pub fn matches(&self, value: Value, heap: &Heap) -> bool {
        if matches!(self, Self::Any) {
            return true;
        }
        let actual = tag_of(value, heap);
        if *self == actual {
            return true;
        }
        // Numeric kinds widen: an int argument satisfies a float parameter,
        // never the reverse.
        if let (Some(want), Some(have)) = (self.numeric_rank(), actual.numeric_rank()) {
            return have <= want;
        }
        false
    }
}

/// The dispatch tag of a runtime value.
pub(crate) fn tag_of(value: Value, heap: &Heap) -> TypeTag {
    match value {
        Value::Nil => TypeTag::Nil,
        Value::Bool(_) => TypeTag::Bool,
        Value::Int(_) => TypeTag::Int,
        Value::Uint(_) => TypeTag::Uint,
        Value::Float(_) => TypeTag::Float,
        Value::Char(_) => TypeTag::Char,
        Value::Builtin(_) => TypeTag::Func,
        Value::Ref(id) => match heap.get(id) {
            HeapData::Str(_) => TypeTag::Str,
            HeapData::Bytes(_) => TypeTag::Bytes,
            HeapData::Decimal(_) => TypeTag::Decimal,
            HeapData::Array(_) => TypeTag::Array,
            HeapData::Dict(_) => TypeTag::Dict,
            HeapData::SyncDict(_) => TypeTag::SyncDict,
            HeapData::KeyValue(_) => TypeTag::KeyValue,
            HeapData::KeyValueArray(_) | HeapData::NamedArgs(_) => TypeTag::KeyValueArray,
            HeapData::Error(_) => TypeTag::Error,
            HeapData::Instance(instance) => {
                let name = match heap.get(instance.ty) {
                    HeapData::ObjectType(ty) => ty.name.clone(),
                    _ => "object".into(),
                };
                TypeTag::User(name)
            }
            HeapData::Closure(_)
            | HeapData::HostFunc(_)
            | HeapData::Bound(_)
            | HeapData::Wrapped(_)
            | HeapData::ObjectType(_) => TypeTag::Func,
            HeapData::Cell(_) | HeapData::Iter(_) | HeapData::Regexp(_) | HeapData::Reflect(_) => TypeTag::Any,
        },
    }
}
