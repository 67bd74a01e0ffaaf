//! Shared AST-building helpers for the integration suites.
//!
//! The parser is an external collaborator, so tests construct chunks
//! programmatically; these helpers keep the trees readable.

#![allow(dead_code)]

use tarn::{
    CompileOptions, Object, RunOptions, Runner,
    ast::{AssignKind, BinOp, Chunk, CmpOp, Expr, FuncLit, NamedParam, Param, Params, Pos, Stmt},
};

pub fn p() -> Pos {
    Pos::new(1, 0)
}

pub fn chunk(stmts: Vec<Stmt>) -> Chunk {
    Chunk::new("test.tarn", stmts)
}

// -- Expressions -------------------------------------------------------

pub fn nil() -> Expr {
    Expr::Nil(p())
}

pub fn int(value: i64) -> Expr {
    Expr::Int(value, p())
}

pub fn uint(value: u64) -> Expr {
    Expr::Uint(value, p())
}

pub fn float(value: f64) -> Expr {
    Expr::Float(value, p())
}

pub fn boolean(value: bool) -> Expr {
    Expr::Bool(value, p())
}

pub fn ch(value: char) -> Expr {
    Expr::Char(value, p())
}

pub fn s(value: &str) -> Expr {
    Expr::Str(value.to_owned(), p())
}

pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_owned(), p())
}

pub fn array(items: Vec<Expr>) -> Expr {
    Expr::Array(items, p())
}

pub fn dict(pairs: Vec<(&str, Expr)>) -> Expr {
    Expr::Dict(pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(), p())
}

pub fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        pos: p(),
    }
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    bin(BinOp::Mul, lhs, rhs)
}

pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Compare {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        pos: p(),
    }
}

pub fn ternary(cond: Expr, then: Expr, els: Expr) -> Expr {
    Expr::Ternary {
        cond: Box::new(cond),
        then: Box::new(then),
        els: Box::new(els),
        pos: p(),
    }
}

pub fn index(obj: Expr, idx: Expr) -> Expr {
    Expr::Index {
        obj: Box::new(obj),
        index: Box::new(idx),
        pos: p(),
    }
}

pub fn selector(obj: Expr, name: &str) -> Expr {
    Expr::Selector {
        obj: Box::new(obj),
        name: name.to_owned(),
        pos: p(),
    }
}

pub fn opt_selector(obj: Expr, name: &str) -> Expr {
    Expr::OptSelector {
        obj: Box::new(obj),
        name: name.to_owned(),
        pos: p(),
    }
}

pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        splat: false,
        named: Vec::new(),
        named_splat: None,
        pos: p(),
    }
}

pub fn call_named(callee: Expr, args: Vec<Expr>, named: Vec<(&str, Expr)>) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        splat: false,
        named: named.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        named_splat: None,
        pos: p(),
    }
}

pub fn call_full(
    callee: Expr,
    args: Vec<Expr>,
    splat: bool,
    named: Vec<(&str, Expr)>,
    named_splat: Option<Expr>,
) -> Expr {
    Expr::Call {
        callee: Box::new(callee),
        args,
        splat,
        named: named.into_iter().map(|(k, v)| (k.to_owned(), v)).collect(),
        named_splat: named_splat.map(Box::new),
        pos: p(),
    }
}

/// A function literal with plain positional parameters.
pub fn func(params: &[&str], body: Vec<Stmt>) -> Expr {
    Expr::Func(FuncLit {
        name: None,
        params: Params {
            positional: params.iter().map(|name| Param::new(*name)).collect(),
            ..Params::default()
        },
        body,
        pos: p(),
    })
}

pub fn func_with(params: Params, body: Vec<Stmt>) -> Expr {
    Expr::Func(FuncLit {
        name: None,
        params,
        body,
        pos: p(),
    })
}

pub fn named_param(name: &str, default: Option<Expr>) -> NamedParam {
    NamedParam {
        name: name.to_owned(),
        default,
    }
}

// -- Statements --------------------------------------------------------

pub fn expr_stmt(expr: Expr) -> Stmt {
    Stmt::Expr(expr)
}

pub fn var(name: &str, value: Expr) -> Stmt {
    Stmt::Var {
        names: vec![name.to_owned()],
        values: vec![value],
        pos: p(),
    }
}

pub fn var_uninit(name: &str) -> Stmt {
    Stmt::Var {
        names: vec![name.to_owned()],
        values: Vec::new(),
        pos: p(),
    }
}

pub fn short(name: &str, value: Expr) -> Stmt {
    Stmt::ShortDecl {
        name: name.to_owned(),
        value,
        pos: p(),
    }
}

pub fn assign(target: Expr, value: Expr) -> Stmt {
    Stmt::Assign {
        target,
        kind: AssignKind::Plain,
        value,
        pos: p(),
    }
}

pub fn ret(value: Expr) -> Stmt {
    Stmt::Return {
        values: vec![value],
        pos: p(),
    }
}

pub fn ret0() -> Stmt {
    Stmt::Return {
        values: Vec::new(),
        pos: p(),
    }
}

// -- Running -----------------------------------------------------------

pub fn compile_default(stmts: Vec<Stmt>) -> Runner {
    let program = tarn::compile(&chunk(stmts), &CompileOptions::default()).expect("compile failed");
    Runner::new(program)
}

/// Compiles and runs a program, returning its result.
pub fn run_program(stmts: Vec<Stmt>) -> Result<Object, tarn::RuntimeError> {
    compile_default(stmts).run(RunOptions::default())
}

/// Compiles and runs, asserting success.
pub fn eval(stmts: Vec<Stmt>) -> Object {
    run_program(stmts).expect("run failed")
}

/// Evaluates a single expression.
pub fn eval_expr(expr: Expr) -> Object {
    eval(vec![ret(expr)])
}

/// Runs and returns `(result, captured output)`.
pub fn eval_capture(stmts: Vec<Stmt>) -> (Object, String) {
    compile_default(stmts)
        .run_capture(RunOptions::default())
        .expect("run failed")
}

/// Runs expecting a runtime error; returns its kind name.
pub fn eval_err(stmts: Vec<Stmt>) -> String {
    match run_program(stmts) {
        Ok(value) => panic!("expected an error, got {value}"),
        Err(err) => err.name,
    }
}

pub fn obj_array(items: Vec<Object>) -> Object {
    Object::Array(items)
}
