//! Bridges between host values and script values.
//!
//! Hosts inject values two ways: [`HostFunc`] for callables and
//! [`HostObject`] for structured values the script can index, call, and
//! close. Both cross the boundary as host-level [`Object`]s, never as raw
//! heap references.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{errors::RuntimeError, object::Object};

/// Arguments delivered to a host callable.
#[derive(Debug, Clone, Default)]
pub struct HostCall {
    pub args: Vec<Object>,
    pub named: Vec<(String, Object)>,
}

type HostFnPtr = Arc<dyn Fn(HostCall) -> Result<Object, RuntimeError> + Send + Sync>;

/// A host-implemented callable.
#[derive(Clone)]
pub struct HostFunc {
    pub name: Arc<str>,
    func: HostFnPtr,
}

impl HostFunc {
    pub fn new(
        name: impl Into<Arc<str>>,
        func: impl Fn(HostCall) -> Result<Object, RuntimeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn invoke(&self, call: HostCall) -> Result<Object, RuntimeError> {
        (self.func)(call)
    }
}

impl fmt::Debug for HostFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunc").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A host value the script can interact with reflectively.
///
/// Default method bodies decline every capability; implementors override
/// what they support.
pub trait HostObject: fmt::Debug + Send {
    fn type_name(&self) -> &str {
        "reflect"
    }

    fn to_display(&self) -> String;

    fn index_get(&self, _key: &Object) -> Option<Object> {
        None
    }

    fn index_set(&mut self, _key: Object, _value: Object) -> Result<(), String> {
        Err("not index-assignable".to_owned())
    }

    /// `Some` when callable; `None` routes to `NotCallableError`.
    fn call(&mut self, _call: HostCall) -> Option<Result<Object, RuntimeError>> {
        None
    }

    fn length(&self) -> Option<usize> {
        None
    }

    /// Releases host resources; `close(r)` and `defer close(r)` land here.
    fn close(&mut self) {}
}

/// The heap slot wrapping a shared host object.
#[derive(Debug, Clone)]
pub(crate) struct Reflect {
    inner: Arc<Mutex<dyn HostObject>>,
}

impl Reflect {
    pub fn new(inner: Arc<Mutex<dyn HostObject>>) -> Self {
        Self { inner }
    }

    pub fn lock(&self) -> MutexGuard<'_, dyn HostObject + 'static> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn share(&self) -> Arc<Mutex<dyn HostObject>> {
        Arc::clone(&self.inner)
    }
}
