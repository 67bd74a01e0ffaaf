//! Calling convention: splats, named arguments, defaults, rest capture,
//! arity errors, wrap, and the reserved call-info identifiers.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object,
    ast::{Param, Params, Stmt},
};

/// `func(a, *b; n=1, **m) { return [a, b, n, m.dict] }`
fn harness() -> Stmt {
    short(
        "f",
        func_with(
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
        ),
    )
}

fn expected(a: i64, b: Vec<i64>, n: i64, m: Vec<(&str, i64)>) -> Object {
    let mut m_dict = indexmap::IndexMap::new();
    for (key, value) in m {
        m_dict.insert(key.to_owned(), Object::Int(value));
    }
    obj_array(vec![
        Object::Int(a),
        obj_array(b.into_iter().map(Object::Int).collect()),
        Object::Int(n),
        Object::Dict(m_dict),
    ])
}

#[test]
fn splat_and_named_splat_are_equivalent_to_direct_arguments() {
    // f(x, *[a,b], n=1, **{m:2})  ==  f(x, a, b; n=1, m=2)
    let splatted = eval(vec![
        harness(),
        ret(call_full(
            ident("f"),
            vec![int(10), array(vec![int(20), int(30)])],
            true,
            vec![("n", int(1))],
            Some(dict(vec![("m", int(2))])),
        )),
    ]);
    let direct = eval(vec![
        harness(),
        ret(call_named(
            ident("f"),
            vec![int(10), int(20), int(30)],
            vec![("n", int(1)), ("m", int(2))],
        )),
    ]);
    assert_eq!(splatted, direct);
    assert_eq!(splatted, expected(10, vec![20, 30], 1, vec![("m", 2)]));
}

#[test]
fn absent_named_arguments_run_their_defaults() {
    let result = eval(vec![harness(), ret(call(ident("f"), vec![int(10)]))]);
    assert_eq!(result, expected(10, vec![], 1, vec![]));
}

#[test]
fn defaults_may_reference_earlier_parameters() {
    // func(a; n=a+1) { return n }; f(4) == 5
    let f = func_with(
        Params {
            positional: vec![Param::new("a")],
            named: vec![named_param("n", Some(add(ident("a"), int(1))))],
            ..Params::default()
        },
        vec![ret(ident("n"))],
    );
    let result = eval(vec![short("f", f), ret(call(ident("f"), vec![int(4)]))]);
    assert_eq!(result, Object::Int(5));
}

#[test]
fn missing_positionals_raise_wrong_num_arguments() {
    let f = func(&["a", "b"], vec![ret(ident("a"))]);
    let kind = eval_err(vec![short("f", f), ret(call(ident("f"), vec![int(1)]))]);
    assert_eq!(kind, "WrongNumArgumentsError");
}

#[test]
fn extra_positionals_without_variadic_raise() {
    let f = func(&["a"], vec![ret(ident("a"))]);
    let kind = eval_err(vec![short("f", f), ret(call(ident("f"), vec![int(1), int(2)]))]);
    assert_eq!(kind, "WrongNumArgumentsError");
}

#[test]
fn unknown_named_arguments_without_rest_raise() {
    let f = func(&["a"], vec![ret(ident("a"))]);
    let kind = eval_err(vec![
        short("f", f),
        ret(call_named(ident("f"), vec![int(1)], vec![("bogus", int(2))])),
    ]);
    assert_eq!(kind, "WrongNumArgumentsError");
}

#[test]
fn later_duplicate_named_arguments_win() {
    let f = func_with(
        Params {
            named: vec![named_param("n", Some(int(0)))],
            ..Params::default()
        },
        vec![ret(ident("n"))],
    );
    let result = eval(vec![
        short("f", f),
        ret(call_named(ident("f"), vec![], vec![("n", int(1)), ("n", int(2))])),
    ]);
    assert_eq!(result, Object::Int(2));
}

#[test]
fn calling_a_non_callable_raises() {
    assert_eq!(eval_err(vec![ret(call(int(3), vec![]))]), "NotCallableError");
}

#[test]
fn wrap_stores_leading_arguments() {
    // add := func(a, b) { return a + b }; inc := wrap(add, 1); return inc(41)
    let addf = func(&["a", "b"], vec![ret(add(ident("a"), ident("b")))]);
    let result = eval(vec![
        short("add", addf),
        short("inc", call(ident("wrap"), vec![ident("add"), int(1)])),
        ret(call(ident("inc"), vec![int(41)])),
    ]);
    assert_eq!(result, Object::Int(42));
}

#[test]
fn call_info_identifiers_reflect_the_call() {
    // f := func(*rest) { return [__args__, __callee__ == f] }; f(1, 2)
    let f = func_with(
        Params {
            variadic: Some("rest".to_owned()),
            ..Params::default()
        },
        vec![ret(array(vec![
            ident("__args__"),
            cmp(tarn::ast::CmpOp::Eq, ident("__callee__"), ident("f")),
        ]))],
    );
    let result = eval(vec![short("f", f), ret(call(ident("f"), vec![int(1), int(2)]))]);
    assert_eq!(
        result,
        obj_array(vec![
            obj_array(vec![Object::Int(1), Object::Int(2)]),
            Object::Bool(true),
        ])
    );
}

#[test]
fn pipe_chains_apply_left_to_right() {
    // double := func(x) { return x * 2 }; 5 .| double .| double == 20
    let double = func(&["x"], vec![ret(mul(ident("x"), int(2)))]);
    let pipe = tarn::ast::Expr::Pipe {
        value: Box::new(int(5)),
        calls: vec![ident("double"), ident("double")],
        pos: p(),
    };
    let result = eval(vec![short("double", double), ret(pipe)]);
    assert_eq!(result, Object::Int(20));
}

#[test]
fn multi_value_return_packs_into_an_array() {
    // f := func() { return 1, 2 }
    let f = func_with(
        Params::default(),
        vec![Stmt::Return {
            values: vec![int(1), int(2)],
            pos: p(),
        }],
    );
    let result = eval(vec![short("f", f), ret(call(ident("f"), vec![]))]);
    assert_eq!(result, obj_array(vec![Object::Int(1), Object::Int(2)]));
}
