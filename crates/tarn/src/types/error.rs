//! The runtime error object scripts throw and catch.

use crate::value::Value;

/// `Error{Name, Message, Cause}`.
///
/// Selector access exposes `Name`, `Literal` (an alias of `Name`; two
/// revisions of the surface disagreed, so both are served), `Message`, and
/// `Cause`.
#[derive(Debug, Clone)]
pub(crate) struct ErrorObj {
    pub name: Box<str>,
    pub message: Box<str>,
    pub cause: Option<Value>,
}

impl ErrorObj {
    pub fn new(name: impl Into<Box<str>>, message: impl Into<Box<str>>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            cause: None,
        }
    }
}
