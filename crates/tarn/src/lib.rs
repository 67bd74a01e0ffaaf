//! tarn: an embeddable scripting language core.
//!
//! The crate compiles a parsed [`ast::Chunk`] into a [`Program`] of stack
//! bytecode and runs it on a register-free VM with a dynamically-typed value
//! model, closures over free-variable cells, tail-call optimization,
//! `try`/`catch`/`finally` with `defer`, and a calling convention covering
//! variadic positionals, named arguments with defaults and rest capture,
//! splat expansion, and method-table multiple dispatch.
//!
//! ```
//! use tarn::ast::{Chunk, Expr, Pos, Stmt};
//!
//! let pos = Pos::new(1, 0);
//! let chunk = Chunk::new(
//!     "example.tarn",
//!     vec![Stmt::Return { values: vec![Expr::Int(42, pos)], pos }],
//! );
//! let program = tarn::compile(&chunk, &tarn::CompileOptions::default()).unwrap();
//! let result = tarn::Runner::new(program).run(tarn::RunOptions::default()).unwrap();
//! assert_eq!(result, tarn::Object::Int(42));
//! ```
//!
//! The lexer/parser producing the AST is an external collaborator; hosts and
//! tests may also build chunks programmatically.

pub mod ast;

mod args;
mod builtins;
mod bytecode;
mod errors;
mod heap;
mod io;
mod limits;
mod modules;
mod object;
mod run;
mod signature;
mod symbol;
mod tracer;
mod types;
mod value;

pub use crate::{
    bytecode::{FuncId, ImageError, LocationEntry, Opcode, Program, compile},
    errors::{CompileError, ErrKind, RuntimeError, TraceFrame},
    io::{CollectStringWriter, RenderHook, ScriptWriter, StdWriter, WriteStrategy},
    limits::{CANCEL_CHECK_INTERVAL, CancelToken, DEFAULT_MAX_FRAME_DEPTH, ResourceLimits},
    modules::ModuleMap,
    object::Object,
    run::{CompileOptions, RunOptions, Runner},
    tracer::{NoopTracer, RecordingTracer, StderrTracer, TraceEvent, VmTracer},
    types::{Decimal, HostCall, HostFunc, HostObject, dict::SyncDict},
};
