//! Error kinds and the error plumbing shared by the compiler and VM.
//!
//! Script-visible failures are [`ErrKind`]s wrapped in a [`RunError`]; the VM
//! attaches source positions and frame names while unwinding. Unhandled
//! errors surface to the host as a [`RuntimeError`] carrying the trace.

use std::fmt::{self, Display, Write};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, FromRepr, IntoStaticStr};

use crate::{ast::Pos, value::Value};

/// Result type alias for operations that can raise a script error.
pub(crate) type RunResult<T> = Result<T, RunError>;

/// Error kinds surfaced to scripts.
///
/// The string form matches the variant name exactly (`TypeError` ->
/// "TypeError"), which is also the name of the builtin constructor for the
/// kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, FromRepr, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum ErrKind {
    TypeError,
    IndexOutOfBoundsError,
    InvalidIndexError,
    NotIndexableError,
    NotIndexAssignableError,
    NotCallableError,
    NotIterableError,
    InvalidOperatorError,
    WrongNumArgumentsError,
    ZeroDivisionError,
    StackOverflowError,
    NotImplementedError,
    Cancelled,
    /// User-thrown errors with no specific kind (`throw "oops"`, `error(..)`).
    Error,
}

impl ErrKind {
    /// Creates a catchable [`RunError`] of this kind.
    pub(crate) fn err(self, message: impl Into<String>) -> RunError {
        RunError::Thrown(Box::new(ThrownError {
            name: <&'static str>::from(self).to_owned(),
            message: message.into(),
            value: None,
            pos: None,
            trace: Vec::new(),
        }))
    }

    pub(crate) fn type_error(message: impl Into<String>) -> RunError {
        Self::TypeError.err(message)
    }

    pub(crate) fn wrong_args(callee: &str, want: impl Display, got: usize) -> RunError {
        Self::WrongNumArgumentsError.err(format!("{callee}: want={want} got={got}"))
    }

    pub(crate) fn index_out_of_bounds(index: i64, len: usize) -> RunError {
        Self::IndexOutOfBoundsError.err(format!("index {index} out of bounds for length {len}"))
    }

    pub(crate) fn not_callable(type_name: &str) -> RunError {
        Self::NotCallableError.err(format!("'{type_name}' is not callable"))
    }

    pub(crate) fn not_iterable(type_name: &str) -> RunError {
        Self::NotIterableError.err(format!("'{type_name}' is not iterable"))
    }

    pub(crate) fn invalid_operator(op: &str, lhs: &str, rhs: &str) -> RunError {
        Self::InvalidOperatorError.err(format!("unsupported operand types for {op}: '{lhs}' and '{rhs}'"))
    }
}

/// A thrown, catchable error travelling through the unwinder.
#[derive(Debug, Clone)]
pub(crate) struct ThrownError {
    /// Kind name (an [`ErrKind`] literal, or a user-chosen error name).
    pub name: String,
    pub message: String,
    /// The originally thrown value when it was already an error object.
    ///
    /// Heap ids stay valid for the whole run (the heap is an arena), so the
    /// catch handler can rebind the identical object.
    pub value: Option<Value>,
    /// Position of the raising instruction.
    pub pos: Option<Pos>,
    /// Frames traversed while unwinding, innermost first.
    pub trace: Vec<TraceFrame>,
}

/// Errors produced while executing bytecode.
#[derive(Debug, Clone)]
pub(crate) enum RunError {
    /// A script-level error; `try`/`catch` can intercept it.
    Thrown(Box<ThrownError>),
    /// A broken VM invariant. Never catchable, surfaces as a `RuntimeError`
    /// with an "internal" marker.
    Internal(String),
}

impl RunError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Attaches a source position if the error doesn't carry one yet.
    pub(crate) fn with_pos(mut self, pos: Pos) -> Self {
        if let Self::Thrown(t) = &mut self
            && t.pos.is_none()
        {
            t.pos = Some(pos);
        }
        self
    }

    pub(crate) fn push_frame(&mut self, frame: TraceFrame) {
        if let Self::Thrown(t) = self {
            t.trace.push(frame);
        }
    }

    /// Converts into the host-facing error, used when no handler caught it.
    pub(crate) fn into_runtime_error(self) -> RuntimeError {
        match self {
            Self::Thrown(t) => RuntimeError {
                name: t.name,
                message: t.message,
                trace: t.trace,
            },
            Self::Internal(message) => RuntimeError {
                name: "InternalError".to_owned(),
                message,
                trace: Vec::new(),
            },
        }
    }
}

/// One entry of a user-visible stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Function name, or `<main>` / the module name for top-level code.
    pub name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl Display for TraceFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: in {}", self.file, self.line, self.column, self.name)
    }
}

/// The error a host receives when `Run` fails.
///
/// Carries the error name (an [`ErrKind`] literal or user error name), the
/// message, and a snapshot of the frame chain, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeError {
    pub name: String,
    pub message: String,
    pub trace: Vec<TraceFrame>,
}

impl RuntimeError {
    #[must_use]
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            trace: Vec::new(),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)?;
        for frame in &self.trace {
            f.write_char('\n')?;
            write!(f, "  at {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// A compile-time failure with its source location.
///
/// Compile errors never surface at runtime; the compiler stops at the first
/// fatal one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    pub message: String,
    pub file: String,
    pub pos: Pos,
}

impl CompileError {
    pub(crate) fn new(message: impl Into<String>, file: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            file: file.into(),
            pos,
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: {}", self.file, self.pos.line, self.pos.column, self.message)
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        use std::str::FromStr;
        for kind in [ErrKind::TypeError, ErrKind::ZeroDivisionError, ErrKind::Cancelled] {
            let name = kind.to_string();
            assert_eq!(ErrKind::from_str(&name).unwrap(), kind);
        }
    }

    #[test]
    fn runtime_error_display_includes_trace() {
        let mut err = RuntimeError::new("TypeError", "boom");
        err.trace.push(TraceFrame {
            name: "f".to_owned(),
            file: "main.tarn".to_owned(),
            line: 3,
            column: 7,
        });
        let text = err.to_string();
        assert!(text.contains("TypeError: boom"));
        assert!(text.contains("main.tarn:3:7: in f"));
    }
}
