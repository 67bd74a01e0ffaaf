//! Module compilation/memoization and the binary program image.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{CompileOptions, ModuleMap, Object, Program, RunOptions, Runner, ast::Chunk};

fn module_chunk(file: &str, stmts: Vec<tarn::ast::Stmt>) -> Chunk {
    Chunk::new(file, stmts)
}

fn import(name: &str) -> tarn::ast::Expr {
    tarn::ast::Expr::Import(name.to_owned(), p())
}

#[test]
fn imported_modules_run_once_and_memoize_their_result() {
    // module m: print("init"); return {val: 21}
    let mut module_map = ModuleMap::new();
    module_map.insert(
        "m",
        module_chunk(
            "m.tarn",
            vec![
                expr_stmt(call(ident("print"), vec![s("init")])),
                ret(dict(vec![("val", int(21))])),
            ],
        ),
    );
    let options = CompileOptions {
        module_map,
        ..CompileOptions::default()
    };
    let program = tarn::compile(
        &chunk(vec![
            short("a", import("m")),
            short("b", import("m")),
            ret(add(selector(ident("a"), "val"), selector(ident("b"), "val"))),
        ]),
        &options,
    )
    .expect("compile");
    let (result, output) = Runner::new(program).run_capture(RunOptions::default()).expect("run");
    assert_eq!(result, Object::Int(42));
    // The module body ran exactly once.
    assert_eq!(output, "init");
}

#[test]
fn module_name_identifiers_reflect_the_module() {
    let mut module_map = ModuleMap::new();
    module_map.insert(
        "info",
        module_chunk(
            "info.tarn",
            vec![ret(array(vec![
                ident("__name__"),
                ident("__file__"),
                ident("__is_module__"),
            ]))],
        ),
    );
    let options = CompileOptions {
        module_map,
        ..CompileOptions::default()
    };
    let program = tarn::compile(&chunk(vec![ret(import("info"))]), &options).expect("compile");
    let result = Runner::new(program).run(RunOptions::default()).expect("run");
    assert_eq!(
        result,
        obj_array(vec![
            Object::Str("info".to_owned()),
            Object::Str("info.tarn".to_owned()),
            Object::Bool(true),
        ])
    );
}

#[test]
fn main_is_not_a_module() {
    let result = eval(vec![ret(array(vec![ident("__name__"), ident("__is_module__")]))]);
    assert_eq!(
        result,
        obj_array(vec![Object::Str("main".to_owned()), Object::Bool(false)])
    );
}

#[test]
fn cyclic_imports_are_a_compile_error() {
    let mut module_map = ModuleMap::new();
    module_map.insert("a", module_chunk("a.tarn", vec![ret(import("b"))]));
    module_map.insert("b", module_chunk("b.tarn", vec![ret(import("a"))]));
    let options = CompileOptions {
        module_map,
        ..CompileOptions::default()
    };
    let err = tarn::compile(&chunk(vec![ret(import("a"))]), &options).expect_err("cycle");
    assert!(err.message.contains("cyclic"));
}

#[test]
fn unknown_modules_are_a_compile_error() {
    let err = tarn::compile(&chunk(vec![ret(import("nope"))]), &CompileOptions::default()).expect_err("unknown");
    assert!(err.message.contains("unknown module"));
}

#[test]
fn modules_keep_their_own_globals() {
    // module m declares a top-level `x`; the main chunk's `x` is separate.
    let mut module_map = ModuleMap::new();
    module_map.insert(
        "m",
        module_chunk("m.tarn", vec![var("x", int(1)), ret(ident("x"))]),
    );
    let options = CompileOptions {
        module_map,
        ..CompileOptions::default()
    };
    let program = tarn::compile(
        &chunk(vec![
            var("x", int(100)),
            short("from_module", import("m")),
            ret(add(ident("x"), ident("from_module"))),
        ]),
        &options,
    )
    .expect("compile");
    let result = Runner::new(program).run(RunOptions::default()).expect("run");
    assert_eq!(result, Object::Int(101));
}

#[test]
fn global_declarations_rebind_file_globals_from_functions() {
    // var x = 1; bump := func() { global x; x = x + 41 }; bump(); return x
    let bump = func(
        &[],
        vec![
            tarn::ast::Stmt::Global {
                names: vec!["x".to_owned()],
                pos: p(),
            },
            assign(ident("x"), add(ident("x"), int(41))),
            ret0(),
        ],
    );
    let result = eval(vec![
        var("x", int(1)),
        short("bump", bump),
        expr_stmt(call(ident("bump"), vec![])),
        ret(ident("x")),
    ]);
    assert_eq!(result, Object::Int(42));
}

#[test]
fn program_images_round_trip() {
    let program = tarn::compile(
        &chunk(vec![ret(add(int(1), mul(int(2), int(3))))]),
        &CompileOptions::default(),
    )
    .expect("compile");
    let bytes = program.dump().expect("dump");
    let restored = Program::load(&bytes).expect("load");
    let result = Runner::new(restored).run(RunOptions::default()).expect("run");
    assert_eq!(result, Object::Int(7));
}

#[test]
fn images_from_other_formats_are_rejected() {
    assert!(Program::load(b"not an image").is_err());
    let program = tarn::compile(&chunk(vec![ret(int(1))]), &CompileOptions::default()).expect("compile");
    let mut bytes = program.dump().expect("dump");
    // Corrupt the header.
    bytes[0] ^= 0xff;
    assert!(Program::load(&bytes).is_err());
}

#[test]
fn script_params_bind_from_run_arguments() {
    // param a, b; return a + b
    let program = tarn::compile(
        &chunk(vec![
            tarn::ast::Stmt::Param {
                names: vec!["a".to_owned(), "b".to_owned()],
                pos: p(),
            },
            ret(add(ident("a"), ident("b"))),
        ]),
        &CompileOptions::default(),
    )
    .expect("compile");
    let result = Runner::new(program)
        .run(RunOptions {
            args: vec![Object::Int(20), Object::Int(22)],
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(result, Object::Int(42));
}
