//! Function parameter specs and their frame-slot layout.
//!
//! A signature has four sections: positional parameters, an optional
//! variadic tail, named parameters (each with an optional default fragment),
//! and an optional named-variadic rest. Slots are laid out in that order at
//! the frame base:
//!
//! ```text
//! [positional...][variadic?][named...][named-variadic?][plain locals...]
//! ```
//!
//! The binding algorithm itself lives with the VM (`bytecode::vm::call`);
//! this module only answers layout questions.

use serde::{Deserialize, Serialize};

use crate::types::TypeSig;

/// A named parameter and the index of its default fragment, if any.
/// Parameters without a default bind nil when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct NamedParamSpec {
    pub name: Box<str>,
    pub default: Option<u16>,
}

/// A function's parameter specification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Signature {
    pub positional: Vec<Box<str>>,
    pub variadic: Option<Box<str>>,
    pub named: Vec<NamedParamSpec>,
    pub named_variadic: Option<Box<str>>,
    /// Positional type annotations, when declared; drives overload
    /// registration and dispatch.
    pub type_sig: Option<TypeSig>,
}

impl Signature {
    /// Total parameter slots at the frame base.
    pub fn slot_count(&self) -> u16 {
        (self.positional.len()
            + usize::from(self.variadic.is_some())
            + self.named.len()
            + usize::from(self.named_variadic.is_some())) as u16
    }

    pub fn variadic_slot(&self) -> Option<u16> {
        self.variadic.as_ref().map(|_| self.positional.len() as u16)
    }

    pub fn named_slot(&self, index: usize) -> u16 {
        (self.positional.len() + usize::from(self.variadic.is_some()) + index) as u16
    }

    pub fn named_variadic_slot(&self) -> Option<u16> {
        self.named_variadic
            .as_ref()
            .map(|_| (self.positional.len() + usize::from(self.variadic.is_some()) + self.named.len()) as u16)
    }

    /// Human form of the accepted positional arity, for
    /// `WrongNumArgumentsError` messages.
    pub fn arity(&self) -> String {
        let required = self.positional.len();
        if self.variadic.is_some() {
            format!("{required}+")
        } else {
            required.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str, default: Option<u16>) -> NamedParamSpec {
        NamedParamSpec { name: name.into(), default }
    }

    #[test]
    fn slot_layout_orders_sections() {
        let sig = Signature {
            positional: vec!["a".into()],
            variadic: Some("rest".into()),
            named: vec![named("n", Some(0)), named("m", None)],
            named_variadic: Some("kw".into()),
            type_sig: None,
        };
        assert_eq!(sig.slot_count(), 5);
        assert_eq!(sig.variadic_slot(), Some(1));
        assert_eq!(sig.named_slot(0), 2);
        assert_eq!(sig.named_slot(1), 3);
        assert_eq!(sig.named_variadic_slot(), Some(4));
        assert_eq!(sig.arity(), "1+");
    }
}
