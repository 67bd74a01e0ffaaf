//! User-declared object types and their instances.
//!
//! An `ObjectType` is created by the `struct` builtin with optional fields,
//! getters/setters, methods, and a constructor. Calling the type allocates an
//! instance; selector access resolves fields, then getters, then methods
//! (methods bind the instance as their receiver).

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{heap::HeapId, value::Value};

#[derive(Debug, Clone)]
pub(crate) struct ObjectType {
    pub name: Box<str>,
    /// Declared fields with their default values, in declaration order.
    pub fields: IndexMap<String, Value>,
    pub methods: AHashMap<String, Value>,
    pub getters: AHashMap<String, Value>,
    pub setters: AHashMap<String, Value>,
    /// Constructor; called with the fresh instance as receiver. Without one,
    /// positional arguments bind to the declared fields in order.
    pub init: Option<Value>,
}

impl ObjectType {
    pub fn new(name: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            methods: AHashMap::new(),
            getters: AHashMap::new(),
            setters: AHashMap::new(),
            init: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Instance {
    pub ty: HeapId,
    pub fields: AHashMap<String, Value>,
}
