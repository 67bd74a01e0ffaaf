//! Throwing, catching, finally paths, defer ordering, cancellation, and
//! trace capture.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    CancelToken, Object, ResourceLimits, RunOptions,
    ast::{Expr, Stmt},
};

fn try_stmt(body: Vec<Stmt>, catch: Option<(&str, Vec<Stmt>)>, finally: Option<Vec<Stmt>>) -> Stmt {
    Stmt::Try {
        body,
        catch: catch.map(|(name, stmts)| (name.to_owned(), stmts)),
        finally,
        pos: p(),
    }
}

fn throw(value: Expr) -> Stmt {
    Stmt::Throw { value, pos: p() }
}

fn print1(text: &str) -> Stmt {
    expr_stmt(call(ident("print"), vec![s(text)]))
}

#[test]
fn finally_runs_on_the_normal_path() {
    let (result, output) = eval_capture(vec![
        try_stmt(vec![print1("t")], None, Some(vec![print1("f")])),
        ret(int(1)),
    ]);
    assert_eq!(result, Object::Int(1));
    assert_eq!(output, "tf");
}

#[test]
fn finally_runs_on_the_exception_path() {
    let (result, output) = eval_capture(vec![
        try_stmt(
            vec![throw(s("boom")), print1("unreachable")],
            Some(("e", vec![print1("c")])),
            Some(vec![print1("f")]),
        ),
        ret(int(2)),
    ]);
    assert_eq!(result, Object::Int(2));
    assert_eq!(output, "cf");
}

#[test]
fn finally_runs_when_returning_through_the_try() {
    let f = func(
        &[],
        vec![try_stmt(vec![ret(int(7))], None, Some(vec![print1("f")]))],
    );
    let (result, output) = eval_capture(vec![short("g", f), ret(call(ident("g"), vec![]))]);
    assert_eq!(result, Object::Int(7));
    assert_eq!(output, "f");
}

#[test]
fn uncaught_errors_in_catch_still_run_finally() {
    let (result, output) = eval_capture(vec![
        try_stmt(
            vec![try_stmt(
                vec![throw(s("first"))],
                Some(("e", vec![print1("c1"), throw(s("second"))])),
                Some(vec![print1("f1")]),
            )],
            Some(("e", vec![ret(selector(ident("e"), "Message"))])),
            None,
        ),
    ]);
    assert_eq!(result, Object::Str("second".to_owned()));
    assert_eq!(output, "c1f1");
}

#[test]
fn thrown_error_objects_travel_unchanged() {
    // e := error("MyError", "bad"); try { throw e } catch c { return [c.Name, c.Literal, c == e] }
    let result = eval(vec![
        short("e", call(ident("error"), vec![s("MyError"), s("bad")])),
        try_stmt(
            vec![throw(ident("e"))],
            Some((
                "c",
                vec![ret(array(vec![
                    selector(ident("c"), "Name"),
                    selector(ident("c"), "Literal"),
                    cmp(tarn::ast::CmpOp::Eq, ident("c"), ident("e")),
                ]))],
            )),
            None,
        ),
    ]);
    assert_eq!(
        result,
        obj_array(vec![
            Object::Str("MyError".to_owned()),
            Object::Str("MyError".to_owned()),
            Object::Bool(true),
        ])
    );
}

#[test]
fn error_kind_constructors_build_typed_errors() {
    // try { throw TypeError("nope") } catch e { return e.Name }
    let result = eval(vec![try_stmt(
        vec![throw(call(ident("TypeError"), vec![s("nope")]))],
        Some(("e", vec![ret(selector(ident("e"), "Name"))])),
        None,
    )]);
    assert_eq!(result, Object::Str("TypeError".to_owned()));
}

#[test]
fn runtime_errors_carry_a_trace() {
    // f := func() { throw "inner" }; f()
    let f = func(&[], vec![throw(s("inner"))]);
    let err = run_program(vec![short("f", f), expr_stmt(call(ident("f"), vec![])), ret0()])
        .expect_err("must fail");
    assert_eq!(err.name, "error");
    assert_eq!(err.message, "inner");
    assert!(!err.trace.is_empty());
    assert!(err.trace.iter().all(|frame| frame.file == "test.tarn"));
}

#[test]
fn defers_run_last_in_first_out_on_return() {
    let f = func(
        &[],
        vec![
            Stmt::Defer {
                call: call(ident("print"), vec![s("1")]),
                pos: p(),
            },
            Stmt::Defer {
                call: call(ident("print"), vec![s("2")]),
                pos: p(),
            },
            print1("3"),
            ret(nil()),
        ],
    );
    let (_, output) = eval_capture(vec![expr_stmt(call(f, vec![])), ret0()]);
    assert_eq!(output, "321");
}

#[test]
fn defers_run_during_unwinding() {
    // g := func() { defer print("d"); throw "x" }
    // try { g() } catch e { print("c") }
    let g = func(
        &[],
        vec![
            Stmt::Defer {
                call: call(ident("print"), vec![s("d")]),
                pos: p(),
            },
            throw(s("x")),
        ],
    );
    let (_, output) = eval_capture(vec![
        short("g", g),
        try_stmt(
            vec![expr_stmt(call(ident("g"), vec![]))],
            Some(("e", vec![print1("c")])),
            None,
        ),
        ret0(),
    ]);
    assert_eq!(output, "dc");
}

#[test]
fn deferred_arguments_are_captured_at_defer_time() {
    // x := 1; defer print(x); x = 2  -- prints 1
    let f = func(
        &[],
        vec![
            short("x", int(1)),
            Stmt::Defer {
                call: call(ident("print"), vec![ident("x")]),
                pos: p(),
            },
            assign(ident("x"), int(2)),
            ret(nil()),
        ],
    );
    let (_, output) = eval_capture(vec![expr_stmt(call(f, vec![])), ret0()]);
    assert_eq!(output, "1");
}

#[test]
fn cancellation_unwinds_as_a_catchable_error() {
    let token = CancelToken::new();
    token.cancel();
    let err = compile_default(vec![
        Stmt::For {
            init: None,
            cond: None,
            post: None,
            body: vec![],
            els: vec![],
            pos: p(),
        },
        ret0(),
    ])
    .run(RunOptions {
        limits: ResourceLimits {
            cancel: token,
            ..ResourceLimits::default()
        },
        ..RunOptions::default()
    })
    .expect_err("must cancel");
    assert_eq!(err.name, "Cancelled");
}

#[test]
fn operation_budget_stops_runaway_loops() {
    let err = compile_default(vec![
        Stmt::For {
            init: None,
            cond: None,
            post: None,
            body: vec![],
            els: vec![],
            pos: p(),
        },
        ret0(),
    ])
    .run(RunOptions {
        limits: ResourceLimits {
            max_ops: Some(10_000),
            ..ResourceLimits::default()
        },
        ..RunOptions::default()
    })
    .expect_err("must trip the budget");
    assert_eq!(err.name, "Cancelled");
}
