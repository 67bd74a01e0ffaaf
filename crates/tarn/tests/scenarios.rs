//! The end-to-end scenarios every conforming core must pass.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object,
    ast::{AssignKind, BinOp, CmpOp, Expr, FuncLit, Param, Params, Stmt},
};

#[test]
fn arithmetic_with_precedence() {
    // return 1 + 2 * 3
    let result = eval_expr(add(int(1), mul(int(2), int(3))));
    assert_eq!(result, Object::Int(7));
}

#[test]
fn full_calling_convention() {
    // f := func(a, *b; n=1, **m) { return [a, b, n, m.dict] }
    // return f(10, 20, 30; n=2, x=3)
    let f = func_with(
        Params {
            positional: vec![Param::new("a")],
            variadic: Some("b".to_owned()),
            named: vec![named_param("n", Some(int(1)))],
            named_variadic: Some("m".to_owned()),
        },
        vec![ret(array(vec![
            ident("a"),
            ident("b"),
            ident("n"),
            selector(ident("m"), "dict"),
        ]))],
    );
    let result = eval(vec![
        short("f", f),
        ret(call_named(ident("f"), vec![int(10), int(20), int(30)], vec![
            ("n", int(2)),
            ("x", int(3)),
        ])),
    ]);
    let mut expected_dict = indexmap::IndexMap::new();
    expected_dict.insert("x".to_owned(), Object::Int(3));
    assert_eq!(
        result,
        obj_array(vec![
            Object::Int(10),
            obj_array(vec![Object::Int(20), Object::Int(30)]),
            Object::Int(2),
            Object::Dict(expected_dict),
        ])
    );
}

fn fib_literal() -> Expr {
    // func(n) { return n < 2 ? n : fib(n-1) + fib(n-2) }
    func(
        &["n"],
        vec![ret(ternary(
            cmp(CmpOp::Lt, ident("n"), int(2)),
            ident("n"),
            add(
                call(ident("fib"), vec![sub(ident("n"), int(1))]),
                call(ident("fib"), vec![sub(ident("n"), int(2))]),
            ),
        ))],
    )
}

#[test]
fn recursive_function_through_declared_variable() {
    // var fib; fib = func(n){ ... }; return fib(10)
    let result = eval(vec![
        var_uninit("fib"),
        assign(ident("fib"), fib_literal()),
        ret(call(ident("fib"), vec![int(10)])),
    ]);
    assert_eq!(result, Object::Int(55));
}

#[test]
fn recursive_capture_shares_the_cell() {
    // Same shape one function down, so `fib` is a captured local: the
    // closure must observe the assignment made after its construction.
    let outer = func(
        &[],
        vec![
            var_uninit("fib"),
            assign(ident("fib"), fib_literal()),
            ret(call(ident("fib"), vec![int(10)])),
        ],
    );
    let result = eval(vec![ret(call(outer, vec![]))]);
    assert_eq!(result, Object::Int(55));
}

#[test]
fn composites_alias_on_assignment() {
    // a := {x: [1,2,3]}; b := a; a.x[0] = 9; return b.x[0]
    let result = eval(vec![
        short("a", dict(vec![("x", array(vec![int(1), int(2), int(3)]))])),
        short("b", ident("a")),
        assign(index(selector(ident("a"), "x"), int(0)), int(9)),
        ret(index(selector(ident("b"), "x"), int(0))),
    ]);
    assert_eq!(result, Object::Int(9));
}

#[test]
fn typed_redeclaration_dispatches_by_argument_type() {
    // func f(x int) { return x * 2 }
    // func f(x str) { return x + "!" }
    // return [f(3), f("hi")]
    let f_int = FuncLit {
        name: Some("f".to_owned()),
        params: Params {
            positional: vec![Param::typed("x", vec!["int".to_owned()])],
            ..Params::default()
        },
        body: vec![ret(mul(ident("x"), int(2)))],
        pos: p(),
    };
    let f_str = FuncLit {
        name: Some("f".to_owned()),
        params: Params {
            positional: vec![Param::typed("x", vec!["str".to_owned()])],
            ..Params::default()
        },
        body: vec![ret(add(ident("x"), s("!")))],
        pos: p(),
    };
    let result = eval(vec![
        Stmt::FuncDecl {
            name: "f".to_owned(),
            func: f_int,
            pos: p(),
        },
        Stmt::FuncDecl {
            name: "f".to_owned(),
            func: f_str,
            pos: p(),
        },
        ret(array(vec![
            call(ident("f"), vec![int(3)]),
            call(ident("f"), vec![s("hi")]),
        ])),
    ]);
    assert_eq!(result, obj_array(vec![Object::Int(6), Object::Str("hi!".to_owned())]));
}

#[test]
fn caught_error_exposes_its_message() {
    // try { throw "oops" } catch e { return e.Message } finally { }
    let result = eval(vec![Stmt::Try {
        body: vec![Stmt::Throw {
            value: s("oops"),
            pos: p(),
        }],
        catch: Some(("e".to_owned(), vec![ret(selector(ident("e"), "Message"))])),
        finally: Some(Vec::new()),
        pos: p(),
    }]);
    assert_eq!(result, Object::Str("oops".to_owned()));
}

#[test]
fn compound_assignment_desugars() {
    // x := 1; x += 4; return x
    let result = eval(vec![
        short("x", int(1)),
        Stmt::Assign {
            target: ident("x"),
            kind: AssignKind::Op(BinOp::Add),
            value: int(4),
            pos: p(),
        },
        ret(ident("x")),
    ]);
    assert_eq!(result, Object::Int(5));
}
