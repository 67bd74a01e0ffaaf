//! Method tables: overload selection, runtime registration, user object
//! types, and operator customization.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object,
    ast::{BinOp, FuncLit, Param, Params, Stmt},
};

fn typed_decl(name: &str, param: &str, types: &[&str], body: Vec<Stmt>) -> Stmt {
    Stmt::FuncDecl {
        name: name.to_owned(),
        func: FuncLit {
            name: Some(name.to_owned()),
            params: Params {
                positional: vec![Param::typed(param, types.iter().map(|t| (*t).to_owned()).collect())],
                ..Params::default()
            },
            body,
            pos: p(),
        },
        pos: p(),
    }
}

#[test]
fn first_matching_overload_wins_in_declaration_order() {
    // f(x int|uint) -> 1; f(x any) -> 2
    let result = eval(vec![
        typed_decl("f", "x", &["int", "uint"], vec![ret(int(1))]),
        typed_decl("f", "x", &["any"], vec![ret(int(2))]),
        ret(array(vec![
            call(ident("f"), vec![int(5)]),
            call(ident("f"), vec![uint(5)]),
            call(ident("f"), vec![s("x")]),
        ])),
    ]);
    assert_eq!(result, obj_array(vec![Object::Int(1), Object::Int(1), Object::Int(2)]));
}

#[test]
fn numeric_arguments_widen_into_float_parameters() {
    // f(x float) matches an int argument; f(x int) does not match a float.
    let result = eval(vec![
        typed_decl("f", "x", &["float"], vec![ret(s("float"))]),
        ret(call(ident("f"), vec![int(3)])),
    ]);
    assert_eq!(result, Object::Str("float".to_owned()));

    // A float argument does not narrow into the int overload; with no
    // signature matching, the base implementation (the first declaration)
    // binds it.
    let result = eval(vec![
        typed_decl("g", "x", &["int"], vec![ret(s("int"))]),
        typed_decl("g", "x", &["str"], vec![ret(s("str"))]),
        ret(call(ident("g"), vec![float(1.5)])),
    ]);
    assert_eq!(result, Object::Str("int".to_owned()));
}

#[test]
fn no_match_falls_back_to_the_base_implementation() {
    // Base takes any value; the overload only ints.
    let base = FuncLit {
        name: Some("h".to_owned()),
        params: Params {
            positional: vec![Param::new("x")],
            ..Params::default()
        },
        body: vec![ret(s("base"))],
        pos: p(),
    };
    let result = eval(vec![
        Stmt::FuncDecl {
            name: "h".to_owned(),
            func: base,
            pos: p(),
        },
        typed_decl("h", "x", &["int"], vec![ret(s("int"))]),
        ret(array(vec![
            call(ident("h"), vec![int(1)]),
            call(ident("h"), vec![s("zzz")]),
        ])),
    ]);
    assert_eq!(
        result,
        obj_array(vec![Object::Str("int".to_owned()), Object::Str("base".to_owned())])
    );
}

#[test]
fn add_call_method_registers_at_runtime() {
    // h := func(x) { return "base" }
    // addCallMethod(h, func(x int) { return "int" })
    let base = func(&["x"], vec![ret(s("base"))]);
    let typed = FuncLit {
        name: None,
        params: Params {
            positional: vec![Param::typed("x", vec!["int".to_owned()])],
            ..Params::default()
        },
        body: vec![ret(s("int"))],
        pos: p(),
    };
    let result = eval(vec![
        short("h", base),
        expr_stmt(call(
            ident("addCallMethod"),
            vec![ident("h"), tarn::ast::Expr::Func(typed)],
        )),
        ret(array(vec![
            call(ident("h"), vec![int(1)]),
            call(ident("h"), vec![s("x")]),
        ])),
    ]);
    assert_eq!(
        result,
        obj_array(vec![Object::Str("int".to_owned()), Object::Str("base".to_owned())])
    );
}

fn point_type() -> Stmt {
    // Point := struct("Point"; fields=["x", "y"])
    short(
        "Point",
        call_full(
            ident("struct"),
            vec![s("Point")],
            false,
            vec![("fields", array(vec![s("x"), s("y")]))],
            None,
        ),
    )
}

#[test]
fn object_types_construct_and_field_access_works() {
    // p := Point(3, 4); p.y = 5; return [p.x, p.y, is(Point, p)]
    let result = eval(vec![
        point_type(),
        short("pt", call(ident("Point"), vec![int(3), int(4)])),
        assign(selector(ident("pt"), "y"), int(5)),
        ret(array(vec![
            selector(ident("pt"), "x"),
            selector(ident("pt"), "y"),
            call(ident("is"), vec![ident("Point"), ident("pt")]),
        ])),
    ]);
    assert_eq!(
        result,
        obj_array(vec![Object::Int(3), Object::Int(5), Object::Bool(true)])
    );
}

#[test]
fn object_type_methods_bind_their_receiver() {
    // Point := struct("Point"; fields=["x"], methods={double: func(self){ return self.x * 2 }})
    let method = func(&["self"], vec![ret(mul(selector(ident("self"), "x"), int(2)))]);
    let result = eval(vec![
        short(
            "Point",
            call_full(
                ident("struct"),
                vec![s("Point")],
                false,
                vec![
                    ("fields", array(vec![s("x")])),
                    ("methods", dict(vec![("double", method)])),
                ],
                None,
            ),
        ),
        short("pt", call(ident("Point"), vec![int(21)])),
        ret(call(selector(ident("pt"), "double"), vec![])),
    ]);
    assert_eq!(result, Object::Int(42));
}

#[test]
fn operators_dispatch_through_their_well_known_callable() {
    // Vec2 := struct("Vec2"; fields=["x"])
    // addCallMethod(binaryOperator("*"), func(a Vec2, b int) { return Vec2(a.x * b) })
    // v := Vec2(6); return (v * 7).x
    let overload = FuncLit {
        name: None,
        params: Params {
            positional: vec![
                Param::typed("a", vec!["Vec2".to_owned()]),
                Param::typed("b", vec!["int".to_owned()]),
            ],
            ..Params::default()
        },
        body: vec![ret(call(
            ident("Vec2"),
            vec![mul(selector(ident("a"), "x"), ident("b"))],
        ))],
        pos: p(),
    };
    let result = eval(vec![
        short(
            "Vec2",
            call_full(
                ident("struct"),
                vec![s("Vec2")],
                false,
                vec![("fields", array(vec![s("x")]))],
                None,
            ),
        ),
        expr_stmt(call(
            ident("addCallMethod"),
            vec![
                call(ident("binaryOperator"), vec![s("*")]),
                tarn::ast::Expr::Func(overload),
            ],
        )),
        short("v", call(ident("Vec2"), vec![int(6)])),
        ret(selector(mul(ident("v"), int(7)), "x")),
    ]);
    assert_eq!(result, Object::Int(42));
}

#[test]
fn unmatched_operator_on_user_types_raises() {
    let kind = eval_err(vec![
        point_type(),
        short("pt", call(ident("Point"), vec![int(1), int(2)])),
        ret(bin(BinOp::Mul, ident("pt"), int(3))),
    ]);
    // No operator callable registered at all: invalid operator.
    assert_eq!(kind, "InvalidOperatorError");
}

#[test]
fn raw_caller_bypasses_the_method_table() {
    let result = eval(vec![
        typed_decl("f", "x", &["int"], vec![ret(s("int"))]),
        typed_decl("f", "x", &["str"], vec![ret(s("str"))]),
        // rawCaller returns the base implementation (the int version),
        // which then accepts any argument it can bind.
        short("raw", call(ident("rawCaller"), vec![ident("f")])),
        ret(call(ident("raw"), vec![s("hello")])),
    ]);
    assert_eq!(result, Object::Str("int".to_owned()));
}

#[test]
fn cast_converts_through_constructors() {
    let result = eval_expr(call(ident("cast"), vec![ident("int"), s("41")]));
    assert_eq!(result, Object::Int(41));
}
