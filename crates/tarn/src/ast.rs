//! The abstract syntax tree consumed by the bytecode compiler.
//!
//! The lexer/parser is an external collaborator: it produces a [`Chunk`] and
//! hands it to [`crate::compile`]. The node types here are therefore the
//! parser's output contract. Hosts (and this crate's tests) may also build
//! chunks programmatically.

use serde::{Deserialize, Serialize};

/// A source position (1-based line, 0-based column).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    #[must_use]
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Binary operator tokens.
///
/// `&&`, `||` and `??` are not listed: they lower to conditional jumps, not
/// to a binary-op instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    /// The source token for this operator, used in error messages and as the
    /// well-known name of its operator callable.
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        }
    }

    /// True for operators where `a OP b == b OP a` holds for every operand
    /// pair, which permits the symmetric dispatch retry.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(self, Self::Add | Self::Mul | Self::BitAnd | Self::BitOr | Self::BitXor)
    }
}

/// Comparison operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Unary operator tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl UnOp {
    #[must_use]
    pub fn token(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "^",
        }
    }
}

/// A parsed source file or module body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// File name for source maps and `__file__`.
    pub file: String,
    pub stmts: Vec<Stmt>,
}

impl Chunk {
    #[must_use]
    pub fn new(file: impl Into<String>, stmts: Vec<Stmt>) -> Self {
        Self { file: file.into(), stmts }
    }
}

/// Expressions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Expr {
    Nil(Pos),
    Bool(bool, Pos),
    Int(i64, Pos),
    Uint(u64, Pos),
    Float(f64, Pos),
    Char(char, Pos),
    Str(String, Pos),
    Bytes(Vec<u8>, Pos),
    /// Decimal literal, kept as its source text until compilation.
    Decimal(String, Pos),
    Ident(String, Pos),
    Array(Vec<Expr>, Pos),
    /// `{k: v, ...}` — keys are identifiers or string literals.
    Dict(Vec<(String, Expr)>, Pos),
    /// `(;k=v, ...)` — ordered pairs permitting duplicate keys.
    KeyValueArray(Vec<(String, Expr)>, Pos),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Pos,
    },
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        pos: Pos,
    },
    /// `a && b`: short-circuit, leaves the selecting operand.
    And(Box<Expr>, Box<Expr>, Pos),
    /// `a || b`: short-circuit, leaves the selecting operand.
    Or(Box<Expr>, Box<Expr>, Pos),
    /// `a ?? b`: `b` only when `a` is nil.
    NilCoalesce(Box<Expr>, Box<Expr>, Pos),
    Unary {
        op: UnOp,
        expr: Box<Expr>,
        pos: Pos,
    },
    /// `cond ? then : else`.
    Ternary {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
        pos: Pos,
    },
    Index {
        obj: Box<Expr>,
        index: Box<Expr>,
        pos: Pos,
    },
    /// `obj[low:high]`, half-open; either bound may be absent.
    Slice {
        obj: Box<Expr>,
        low: Option<Box<Expr>>,
        high: Option<Box<Expr>>,
        pos: Pos,
    },
    /// `obj.name`.
    Selector {
        obj: Box<Expr>,
        name: String,
        pos: Pos,
    },
    /// `obj?.name`: the whole selector chain yields nil once any link is nil.
    OptSelector {
        obj: Box<Expr>,
        name: String,
        pos: Pos,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        /// The last positional argument is `*expanded`.
        splat: bool,
        named: Vec<(String, Expr)>,
        /// `**rest` — a dict/KeyValueArray expanded into named arguments.
        named_splat: Option<Box<Expr>>,
        pos: Pos,
    },
    /// `value .| f .| g` — left-to-right call chaining.
    Pipe {
        value: Box<Expr>,
        calls: Vec<Expr>,
        pos: Pos,
    },
    Func(FuncLit),
    /// `import("name")`.
    Import(String, Pos),
}

impl Expr {
    #[must_use]
    pub fn pos(&self) -> Pos {
        match self {
            Self::Nil(p)
            | Self::Bool(_, p)
            | Self::Int(_, p)
            | Self::Uint(_, p)
            | Self::Float(_, p)
            | Self::Char(_, p)
            | Self::Str(_, p)
            | Self::Bytes(_, p)
            | Self::Decimal(_, p)
            | Self::Ident(_, p)
            | Self::Array(_, p)
            | Self::Dict(_, p)
            | Self::KeyValueArray(_, p)
            | Self::And(_, _, p)
            | Self::Or(_, _, p)
            | Self::NilCoalesce(_, _, p)
            | Self::Import(_, p) => *p,
            Self::Binary { pos, .. }
            | Self::Compare { pos, .. }
            | Self::Unary { pos, .. }
            | Self::Ternary { pos, .. }
            | Self::Index { pos, .. }
            | Self::Slice { pos, .. }
            | Self::Selector { pos, .. }
            | Self::OptSelector { pos, .. }
            | Self::Call { pos, .. }
            | Self::Pipe { pos, .. } => *pos,
            Self::Func(f) => f.pos,
        }
    }
}

/// A function literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncLit {
    /// Declared name, if any (`func f(...)`); anonymous literals have none.
    pub name: Option<String>,
    pub params: Params,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

/// The parameter list of a function literal.
///
/// Positional parameters come first, then an optional `*variadic` tail; a
/// `;` switches to named parameters, ending with an optional `**rest`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Params {
    pub positional: Vec<Param>,
    pub variadic: Option<String>,
    pub named: Vec<NamedParam>,
    pub named_variadic: Option<String>,
}

/// A positional parameter, optionally annotated with accepted type names for
/// overload registration (`func f(x int|uint)`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub types: Vec<String>,
}

impl Param {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), types: Vec::new() }
    }

    #[must_use]
    pub fn typed(name: impl Into<String>, types: Vec<String>) -> Self {
        Self { name: name.into(), types }
    }
}

/// A named parameter with an optional default expression.
///
/// The default compiles to a bytecode fragment executed in the callee frame
/// when the argument is absent; without one the parameter binds nil.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedParam {
    pub name: String,
    pub default: Option<Expr>,
}

/// How a plain assignment statement combines with the current value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignKind {
    /// `=`.
    Plain,
    /// `a OP= v` desugars to `a = a OP v`.
    Op(BinOp),
    /// `||=` assigns only when the current value is falsy.
    OrElse,
    /// `??=` assigns only when the current value is nil.
    NilElse,
}

/// Statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stmt {
    Expr(Expr),
    /// `var a, b = x, y` (values may be empty: declare as nil).
    Var {
        names: Vec<String>,
        values: Vec<Expr>,
        pos: Pos,
    },
    Const {
        name: String,
        value: Expr,
        pos: Pos,
    },
    /// `global a, b` — only legal at file/function top level.
    Global {
        names: Vec<String>,
        pos: Pos,
    },
    /// `param a, b` — script/module parameters; top level only.
    Param {
        names: Vec<String>,
        pos: Pos,
    },
    /// `name := value` — declares a new name in the innermost block.
    ShortDecl {
        name: String,
        value: Expr,
        pos: Pos,
    },
    Assign {
        target: Expr,
        kind: AssignKind,
        value: Expr,
        pos: Pos,
    },
    /// `return`, `return v`, or `return a, b` (packed into an array).
    Return {
        values: Vec<Expr>,
        pos: Pos,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
        els: Vec<Stmt>,
        pos: Pos,
    },
    /// C-style loop; the `els` block runs when the loop exits without break.
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        post: Option<Box<Stmt>>,
        body: Vec<Stmt>,
        els: Vec<Stmt>,
        pos: Pos,
    },
    /// `for k, v in iter { ... } else { ... }`.
    ForIn {
        key: Option<String>,
        value: String,
        iter: Expr,
        body: Vec<Stmt>,
        els: Vec<Stmt>,
        pos: Pos,
    },
    Break(Pos),
    Continue(Pos),
    Throw {
        value: Expr,
        pos: Pos,
    },
    Try {
        body: Vec<Stmt>,
        /// Catch variable name and handler body.
        catch: Option<(String, Vec<Stmt>)>,
        finally: Option<Vec<Stmt>>,
        pos: Pos,
    },
    /// `defer f(args)` — the call must be a [`Expr::Call`].
    Defer {
        call: Expr,
        pos: Pos,
    },
    Block(Vec<Stmt>, Pos),
    /// `func name(...) { ... }`; with typed parameters and an existing
    /// binding of the same name this registers an overload instead of
    /// rebinding.
    FuncDecl {
        name: String,
        func: FuncLit,
        pos: Pos,
    },
}
