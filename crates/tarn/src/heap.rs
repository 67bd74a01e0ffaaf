//! The arena heap backing every composite value.
//!
//! Composites are reference-typed: `Value::Ref(HeapId)` aliases a slot, so
//! assignment shares storage and mutation is observed through every alias.
//! Slots live for the whole run and the arena frees wholesale when the VM is
//! dropped; free-variable cells are ordinary one-slot entries referenced by
//! index, which keeps cyclic closures representable without cyclic Rust
//! ownership.

use crate::{
    types::{
        Closure, Dict, ErrorObj, HostFuncObj, Instance, KeyValue, KeyValueArray, NamedArgs, ObjectType, Reflect,
        Regexp, SyncDict, ValueIter, decimal::Decimal,
    },
    value::Value,
};

/// Index of a heap slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct HeapId(u32);

impl HeapId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Contents of one heap slot.
#[derive(Debug, Clone)]
pub(crate) enum HeapData {
    Str(Box<str>),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Array(Vec<Value>),
    Dict(Dict),
    SyncDict(SyncDict),
    KeyValue(KeyValue),
    KeyValueArray(KeyValueArray),
    NamedArgs(NamedArgs),
    Closure(Closure),
    HostFunc(HostFuncObj),
    Bound(crate::types::BoundMethod),
    Wrapped(crate::types::Wrapped),
    ObjectType(ObjectType),
    Instance(Instance),
    Error(ErrorObj),
    /// A free-variable cell.
    Cell(Value),
    Iter(ValueIter),
    Regexp(Regexp),
    Reflect(Reflect),
}

impl HeapData {
    /// The script-visible type name of this slot's value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::Decimal(_) => "decimal",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::SyncDict(_) => "syncDict",
            Self::KeyValue(_) => "keyValue",
            Self::KeyValueArray(_) => "keyValueArray",
            Self::NamedArgs(_) => "namedArgs",
            Self::Closure(_) | Self::Bound(_) | Self::Wrapped(_) => "func",
            Self::HostFunc(_) => "builtinFunc",
            Self::ObjectType(_) => "objectType",
            Self::Instance(_) => "object",
            Self::Error(_) => "error",
            Self::Cell(_) => "cell",
            Self::Iter(_) => "iterator",
            Self::Regexp(_) => "regexp",
            Self::Reflect(_) => "reflect",
        }
    }
}

/// The arena of heap slots.
#[derive(Debug, Default)]
pub(crate) struct Heap {
    slots: Vec<HeapData>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, data: HeapData) -> HeapId {
        let id = HeapId(self.slots.len() as u32);
        self.slots.push(data);
        id
    }

    /// Allocates and returns the referencing value in one step.
    pub fn alloc_value(&mut self, data: HeapData) -> Value {
        Value::Ref(self.alloc(data))
    }

    pub fn alloc_str(&mut self, s: impl Into<Box<str>>) -> Value {
        self.alloc_value(HeapData::Str(s.into()))
    }

    pub fn alloc_array(&mut self, items: Vec<Value>) -> Value {
        self.alloc_value(HeapData::Array(items))
    }

    pub fn alloc_dict(&mut self, dict: Dict) -> Value {
        self.alloc_value(HeapData::Dict(dict))
    }

    pub fn alloc_error(&mut self, error: ErrorObj) -> Value {
        self.alloc_value(HeapData::Error(error))
    }

    pub fn alloc_cell(&mut self, value: Value) -> HeapId {
        self.alloc(HeapData::Cell(value))
    }

    pub fn get(&self, id: HeapId) -> &HeapData {
        &self.slots[id.index()]
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        &mut self.slots[id.index()]
    }

    /// The string behind a value, when it is one.
    pub fn str_of(&self, value: Value) -> Option<&str> {
        match value {
            Value::Ref(id) => match self.get(id) {
                HeapData::Str(s) => Some(s),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn cell_get(&self, id: HeapId) -> Value {
        match self.get(id) {
            HeapData::Cell(value) => *value,
            other => unreachable!("cell slot holds {}", other.type_name()),
        }
    }

    pub fn cell_set(&mut self, id: HeapId, value: Value) {
        *self.get_mut(id) = HeapData::Cell(value);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
