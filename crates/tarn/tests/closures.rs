//! Closures over free-variable cells and tail-call optimization.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object, ResourceLimits, RunOptions,
    ast::{AssignKind, BinOp, CmpOp},
};

#[test]
fn closures_over_the_same_binding_share_storage() {
    // counter := func() {
    //   var n; n = 0
    //   inc := func() { n = n + 1; return n }
    //   get := func() { return n }
    //   return [inc, get]
    // }
    // pair := counter(); pair[0](); pair[0](); return pair[1]()
    let counter = func(
        &[],
        vec![
            var("n", int(0)),
            short(
                "inc",
                func(
                    &[],
                    vec![
                        assign(ident("n"), add(ident("n"), int(1))),
                        ret(ident("n")),
                    ],
                ),
            ),
            short("get", func(&[], vec![ret(ident("n"))])),
            ret(array(vec![ident("inc"), ident("get")])),
        ],
    );
    let result = eval(vec![
        short("pair", call(counter, vec![])),
        expr_stmt(call(index(ident("pair"), int(0)), vec![])),
        expr_stmt(call(index(ident("pair"), int(0)), vec![])),
        ret(call(index(ident("pair"), int(1)), vec![])),
    ]);
    assert_eq!(result, Object::Int(2));
}

#[test]
fn captured_parameters_seed_their_cells() {
    // make := func(start) { return func() { start = start + 1; return start } }
    // c := make(10); c(); return c()
    let make = func(
        &["start"],
        vec![ret(func(
            &[],
            vec![
                assign(ident("start"), add(ident("start"), int(1))),
                ret(ident("start")),
            ],
        ))],
    );
    let result = eval(vec![
        short("c", call(make, vec![int(10)])),
        expr_stmt(call(ident("c"), vec![])),
        ret(call(ident("c"), vec![])),
    ]);
    assert_eq!(result, Object::Int(12));
}

#[test]
fn two_level_capture_value() {
    // f := func() { var x; x = 7; return func() { return func() { return x } } }
    // return f()()()
    let f = func(
        &[],
        vec![
            var("x", int(7)),
            ret(func(&[], vec![ret(func(&[], vec![ret(ident("x"))]))])),
        ],
    );
    let result = eval(vec![ret(call(call(call(f, vec![]), vec![]), vec![]))]);
    assert_eq!(result, Object::Int(7));
}

fn countdown(n: i64) -> Vec<tarn::ast::Stmt> {
    // loop := func(n) { return n == 0 ? 0 : loop(n - 1) }; return loop(N)
    let body = ret(ternary(
        cmp(CmpOp::Eq, ident("n"), int(0)),
        int(0),
        call(ident("looper"), vec![sub(ident("n"), int(1))]),
    ));
    vec![
        short("looper", func(&["n"], vec![body])),
        ret(call(ident("looper"), vec![int(n)])),
    ]
}

#[test]
fn tail_recursion_runs_in_constant_frame_depth() {
    // Far deeper than the frame limit: only possible with frame reuse.
    let result = eval(countdown(100_000));
    assert_eq!(result, Object::Int(0));
}

#[test]
fn non_tail_recursion_overflows_the_frame_limit() {
    // sum := func(n) { return n == 0 ? 0 : 1 + sum(n - 1) }
    let body = ret(ternary(
        cmp(CmpOp::Eq, ident("n"), int(0)),
        int(0),
        add(int(1), call(ident("sum"), vec![sub(ident("n"), int(1))])),
    ));
    let stmts = vec![
        short("sum", func(&["n"], vec![body])),
        ret(call(ident("sum"), vec![int(10_000)])),
    ];
    let err = compile_default(stmts)
        .run(RunOptions {
            limits: ResourceLimits {
                max_frame_depth: 256,
                ..ResourceLimits::default()
            },
            ..RunOptions::default()
        })
        .expect_err("must overflow");
    assert_eq!(err.name, "StackOverflowError");
}

#[test]
fn compound_or_else_assigns_only_when_falsy() {
    // x := 0; x ||= 5; y := 3; y ||= 9; return [x, y]
    let result = eval(vec![
        short("x", int(0)),
        tarn::ast::Stmt::Assign {
            target: ident("x"),
            kind: AssignKind::OrElse,
            value: int(5),
            pos: p(),
        },
        short("y", int(3)),
        tarn::ast::Stmt::Assign {
            target: ident("y"),
            kind: AssignKind::OrElse,
            value: int(9),
            pos: p(),
        },
        ret(array(vec![ident("x"), ident("y")])),
    ]);
    assert_eq!(result, obj_array(vec![Object::Int(5), Object::Int(3)]));
}

#[test]
fn compound_nil_else_assigns_only_when_nil() {
    // x := nil; x ??= 5; y := 0; y ??= 9; return [x, y]
    let result = eval(vec![
        short("x", nil()),
        tarn::ast::Stmt::Assign {
            target: ident("x"),
            kind: AssignKind::NilElse,
            value: int(5),
            pos: p(),
        },
        short("y", int(0)),
        tarn::ast::Stmt::Assign {
            target: ident("y"),
            kind: AssignKind::NilElse,
            value: int(9),
            pos: p(),
        },
        ret(array(vec![ident("x"), ident("y")])),
    ]);
    assert_eq!(result, obj_array(vec![Object::Int(5), Object::Int(0)]));
}

#[test]
fn compound_op_on_index_targets() {
    // a := [1, 2]; a[1] += 10; return a[1]
    let result = eval(vec![
        short("a", array(vec![int(1), int(2)])),
        tarn::ast::Stmt::Assign {
            target: index(ident("a"), int(1)),
            kind: AssignKind::Op(BinOp::Add),
            value: int(10),
            pos: p(),
        },
        ret(index(ident("a"), int(1))),
    ]);
    assert_eq!(result, Object::Int(12));
}

#[test]
fn constants_cannot_be_reassigned() {
    let chunk = common::chunk(vec![
        tarn::ast::Stmt::Const {
            name: "k".to_owned(),
            value: int(1),
            pos: p(),
        },
        assign(ident("k"), int(2)),
    ]);
    let err = tarn::compile(&chunk, &tarn::CompileOptions::default()).expect_err("const assignment");
    assert!(err.message.contains("constant"));
}

