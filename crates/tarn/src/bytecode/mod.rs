//! Bytecode: instruction set, code objects, builder, compiler, and the VM.
//!
//! - `op` - opcode definitions and operand encodings
//! - `code` - code objects, the constant pool, source maps, the image format
//! - `builder` - `CodeBuilder` for emission and jump patching
//! - `compiler` - AST to bytecode lowering
//! - `vm` - the stack virtual machine

pub use code::{FuncId, ImageError, LocationEntry, Program};
pub(crate) use code::{Code, CompiledFunction, Constant};
pub use compiler::compile;
pub use op::Opcode;

mod builder;
mod code;
mod compiler;
pub(crate) mod op;
pub(crate) mod vm;
