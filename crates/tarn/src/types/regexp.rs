//! The compiled-pattern hook behind the `regexp` builtin.
//!
//! Full regexp helpers live outside the core; the VM only needs a value that
//! compiles a pattern and answers match queries when called.

use regex::Regex;

use crate::errors::{ErrKind, RunError};

#[derive(Debug, Clone)]
pub(crate) struct Regexp {
    pub source: Box<str>,
    pub pattern: Regex,
}

impl Regexp {
    pub fn compile(source: &str) -> Result<Self, RunError> {
        let pattern = Regex::new(source)
            .map_err(|err| ErrKind::TypeError.err(format!("invalid regexp pattern: {err}")))?;
        Ok(Self {
            source: source.into(),
            pattern,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}
