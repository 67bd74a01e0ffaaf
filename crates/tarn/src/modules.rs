//! The module map (compile-time) and module registry (runtime).
//!
//! `import("name")` compiles the mapped chunk once and memoizes the module
//! body's result value in the registry keyed by name. Both are explicit
//! structs handed to compile/run; there are no hidden process-wide
//! singletons. Sharing a registry across VM instances requires external
//! serialization of its inserts.

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::{ast::Chunk, value::Value};

/// Maps import names to parsed module bodies.
#[derive(Debug, Clone, Default)]
pub struct ModuleMap {
    chunks: AHashMap<String, Chunk>,
}

impl ModuleMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, chunk: Chunk) {
        self.chunks.insert(name.into(), chunk);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Chunk> {
        self.chunks.get(name)
    }
}

/// Memoized module results for one VM run.
#[derive(Debug, Default)]
pub(crate) struct ModuleRegistry {
    values: IndexMap<String, Value>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}
