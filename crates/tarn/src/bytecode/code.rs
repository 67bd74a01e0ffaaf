//! Compiled code objects and the serialized program image.

use serde::{Deserialize, Serialize};

use crate::{ast::Pos, signature::Signature, types::decimal::Decimal};

/// Image header magic: "tarn".
const MAGIC: u32 = 0x7461_726e;
/// Bumped whenever the encoding changes; images are not stable across
/// versions.
const VERSION: u16 = 1;

/// Index into [`Program::funcs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId(pub u32);

impl FuncId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// One entry of the source map: instructions at `offset` and beyond (until
/// the next entry) originate at `line`/`column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationEntry {
    pub offset: u32,
    pub line: u32,
    pub column: u32,
}

/// A constant pool entry. `Nil`, booleans, and small integers have dedicated
/// opcodes and never land here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Constant {
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Str(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Func(FuncId),
}

/// A linear instruction stream with its constants and source map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Code {
    pub bytecode: Vec<u8>,
    pub constants: Vec<Constant>,
    /// Sorted by offset.
    pub locations: Vec<LocationEntry>,
}

impl Code {
    /// Source position of the instruction at `ip`.
    pub fn location_at(&self, ip: usize) -> Option<Pos> {
        let offset = u32::try_from(ip).ok()?;
        let index = self.locations.partition_point(|entry| entry.offset <= offset);
        index.checked_sub(1).map(|i| {
            let entry = self.locations[i];
            Pos::new(entry.line, entry.column)
        })
    }
}

/// A bytecode-bearing callable: parameter spec, body code, and the layout
/// facts the VM needs to build its frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CompiledFunction {
    pub name: Box<str>,
    /// File the function was compiled from, for traces and `__file__`.
    pub file: Box<str>,
    /// `__name__`: the import name for module bodies, "main" otherwise.
    pub module_name: Box<str>,
    /// `__is_module__`.
    pub is_module: bool,
    pub code: Code,
    pub params: Signature,
    /// Stack slots the frame reserves (parameters included).
    pub local_count: u16,
    /// Cells allocated at entry for locals captured by nested functions.
    pub cell_count: u16,
    /// For each own cell: the parameter slot whose bound value seeds it.
    pub cell_param_slots: Vec<Option<u16>>,
    /// Number of captured free cells a closure over this function carries.
    pub free_count: u16,
    /// Default-value fragments for named parameters; each ends in Return.
    pub default_fragments: Vec<Code>,
    /// Whether the body reads `__args__`/`__named_args__`/`__callee__`.
    pub captures_call_info: bool,
}

/// A module compiled into the program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModuleEntry {
    pub name: String,
    pub func: FuncId,
}

/// The compiled form of a chunk and everything it imported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// The main body, a parameterless-or-`param`-driven function.
    pub(crate) main: CompiledFunction,
    pub(crate) funcs: Vec<CompiledFunction>,
    pub(crate) modules: Vec<ModuleEntry>,
    /// Global names by slot, for `globals()` and host injection.
    pub(crate) global_names: Vec<String>,
}

impl Program {
    pub(crate) fn func(&self, id: FuncId) -> &CompiledFunction {
        &self.funcs[id.index()]
    }

    /// Serializes to the compact binary image.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(&Image {
            magic: MAGIC,
            version: VERSION,
            program: self.clone(),
        })
    }

    /// Restores a program from [`Program::dump`] output. Refuses images from
    /// other encodings or versions.
    pub fn load(bytes: &[u8]) -> Result<Self, ImageError> {
        let image: Image = postcard::from_bytes(bytes).map_err(ImageError::Encoding)?;
        if image.magic != MAGIC {
            return Err(ImageError::BadMagic(image.magic));
        }
        if image.version != VERSION {
            return Err(ImageError::BadVersion(image.version));
        }
        Ok(image.program)
    }
}

/// The on-disk container: `{magic, version}` header plus the program.
#[derive(Serialize, Deserialize)]
struct Image {
    magic: u32,
    version: u16,
    program: Program,
}

/// Failures loading a serialized image.
#[derive(Debug)]
pub enum ImageError {
    Encoding(postcard::Error),
    BadMagic(u32),
    BadVersion(u16),
}

impl std::fmt::Display for ImageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encoding(err) => write!(f, "malformed program image: {err}"),
            Self::BadMagic(magic) => write!(f, "not a tarn program image (magic {magic:#x})"),
            Self::BadVersion(version) => write!(f, "unsupported image version {version}"),
        }
    }
}

impl std::error::Error for ImageError {}
