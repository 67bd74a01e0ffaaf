//! Value-model properties: equality across kinds, copying, indexing,
//! operator rules, and the nil ordering.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object,
    ast::{BinOp, CmpOp, Expr, Stmt},
};

fn eq(lhs: Expr, rhs: Expr) -> Expr {
    cmp(CmpOp::Eq, lhs, rhs)
}

#[test]
fn equality_crosses_numeric_widening_only() {
    assert_eq!(eval_expr(eq(int(1), float(1.0))), Object::Bool(true));
    assert_eq!(eval_expr(eq(int(1), uint(1))), Object::Bool(true));
    assert_eq!(eval_expr(eq(ch('a'), int(97))), Object::Bool(true));
    // Bool is not a numeric widening pair.
    assert_eq!(eval_expr(eq(boolean(true), int(1))), Object::Bool(false));
    assert_eq!(eval_expr(eq(s("1"), int(1))), Object::Bool(false));
    assert_eq!(eval_expr(eq(nil(), int(0))), Object::Bool(false));
    assert_eq!(eval_expr(cmp(CmpOp::Ne, s("1"), int(1))), Object::Bool(true));
}

#[test]
fn composite_equality_is_structural() {
    let result = eval_expr(eq(
        array(vec![int(1), array(vec![int(2)])]),
        array(vec![int(1), array(vec![int(2)])]),
    ));
    assert_eq!(result, Object::Bool(true));
    let result = eval_expr(eq(dict(vec![("a", int(1))]), dict(vec![("a", int(1))])));
    assert_eq!(result, Object::Bool(true));
    let result = eval_expr(eq(dict(vec![("a", int(1))]), dict(vec![("a", int(2))])));
    assert_eq!(result, Object::Bool(false));
}

#[test]
fn copy_is_shallow_and_dcopy_is_deep() {
    // a := [[1]]; b := copy(a); b[0][0] = 9; return a[0][0]  -> 9 (aliased)
    let result = eval(vec![
        short("a", array(vec![array(vec![int(1)])])),
        short("b", call(ident("copy"), vec![ident("a")])),
        assign(index(index(ident("b"), int(0)), int(0)), int(9)),
        ret(index(index(ident("a"), int(0)), int(0))),
    ]);
    assert_eq!(result, Object::Int(9));

    // c := dcopy(a); c[0][0] = 7; a unchanged.
    let result = eval(vec![
        short("a", array(vec![array(vec![int(1)])])),
        short("c", call(ident("dcopy"), vec![ident("a")])),
        assign(index(index(ident("c"), int(0)), int(0)), int(7)),
        ret(index(index(ident("a"), int(0)), int(0))),
    ]);
    assert_eq!(result, Object::Int(1));

    // Copies compare equal to their originals.
    let result = eval(vec![
        short("a", dict(vec![("x", array(vec![int(1), int(2)]))])),
        ret(eq(call(ident("dcopy"), vec![ident("a")]), ident("a"))),
    ]);
    assert_eq!(result, Object::Bool(true));
}

#[test]
fn mutating_a_shallow_copy_does_not_touch_the_original_top_level() {
    // b := copy(a); b[0] = 9 must not change a[0].
    let result = eval(vec![
        short("a", array(vec![int(1), int(2)])),
        short("b", call(ident("copy"), vec![ident("a")])),
        assign(index(ident("b"), int(0)), int(9)),
        ret(index(ident("a"), int(0))),
    ]);
    assert_eq!(result, Object::Int(1));
}

#[test]
fn set_then_get_round_trips() {
    let result = eval(vec![
        short("d", dict(vec![])),
        assign(index(ident("d"), s("k")), int(42)),
        ret(index(ident("d"), s("k"))),
    ]);
    assert_eq!(result, Object::Int(42));
}

#[test]
fn non_assignable_targets_raise() {
    let kind = eval_err(vec![
        short("x", int(1)),
        assign(index(ident("x"), int(0)), int(2)),
    ]);
    assert_eq!(kind, "NotIndexAssignableError");
}

#[test]
fn negative_indices_and_slices() {
    assert_eq!(
        eval_expr(index(array(vec![int(1), int(2), int(3)]), int(-1))),
        Object::Int(3)
    );
    let sliced = eval_expr(Expr::Slice {
        obj: Box::new(array(vec![int(1), int(2), int(3), int(4)])),
        low: Some(Box::new(int(1))),
        high: Some(Box::new(int(3))),
        pos: p(),
    });
    assert_eq!(sliced, obj_array(vec![Object::Int(2), Object::Int(3)]));

    let kind = eval_err(vec![ret(Expr::Slice {
        obj: Box::new(array(vec![int(1)])),
        low: Some(Box::new(int(0))),
        high: Some(Box::new(int(5))),
        pos: p(),
    })]);
    assert_eq!(kind, "IndexOutOfBoundsError");

    let kind = eval_err(vec![ret(index(array(vec![int(1)]), int(4)))]);
    assert_eq!(kind, "IndexOutOfBoundsError");
}

#[test]
fn string_concatenation_is_left_biased() {
    assert_eq!(eval_expr(add(s("a"), int(1))), Object::Str("a1".to_owned()));
    assert_eq!(eval_expr(add(s("n="), nil())), Object::Str("n=nil".to_owned()));
    assert_eq!(eval_expr(add(ch('a'), s("bc"))), Object::Str("abc".to_owned()));
    // Non-convertible left of a string raises TypeError.
    assert_eq!(eval_err(vec![ret(add(int(1), s("a")))]), "TypeError");
}

#[test]
fn array_plus_appends_and_dict_minus_removes() {
    // [1] + 2, [1] + [2, 3]
    assert_eq!(
        eval_expr(add(array(vec![int(1)]), int(2))),
        obj_array(vec![Object::Int(1), Object::Int(2)])
    );
    assert_eq!(
        eval_expr(add(array(vec![int(1)]), array(vec![int(2), int(3)]))),
        obj_array(vec![Object::Int(1), Object::Int(2), Object::Int(3)])
    );
    // Operator + yields a new array; the original is untouched.
    let result = eval(vec![
        short("a", array(vec![int(1)])),
        expr_stmt(add(ident("a"), int(2))),
        ret(call(ident("len"), vec![ident("a")])),
    ]);
    assert_eq!(result, Object::Int(1));

    // {a:1, b:2} - ["a"] == {b:2}
    let result = eval_expr(bin(
        BinOp::Sub,
        dict(vec![("a", int(1)), ("b", int(2))]),
        array(vec![s("a")]),
    ));
    let mut expected = indexmap::IndexMap::new();
    expected.insert("b".to_owned(), Object::Int(2));
    assert_eq!(result, Object::Dict(expected));
}

#[test]
fn division_by_zero_raises() {
    assert_eq!(
        eval_err(vec![short("z", int(0)), ret(bin(BinOp::Div, int(1), ident("z")))]),
        "ZeroDivisionError"
    );
}

#[test]
fn nil_sorts_below_everything() {
    let result = eval(vec![
        short("a", array(vec![int(2), nil(), int(1)])),
        expr_stmt(call(ident("sort"), vec![ident("a")])),
        ret(ident("a")),
    ]);
    assert_eq!(result, obj_array(vec![Object::Nil, Object::Int(1), Object::Int(2)]));
}

#[test]
fn decimal_arithmetic_keeps_precision() {
    // decimal("0.1") + decimal("0.2") == decimal("0.3")
    let result = eval_expr(eq(
        add(Expr::Decimal("0.1".to_owned(), p()), Expr::Decimal("0.2".to_owned(), p())),
        Expr::Decimal("0.3".to_owned(), p()),
    ));
    assert_eq!(result, Object::Bool(true));
}

#[test]
fn nullish_selector_chain_short_circuits() {
    // a := {b: {c: 1}}; a?.b.c == 1; a?.missing.c == nil
    let result = eval(vec![
        short("a", dict(vec![("b", dict(vec![("c", int(1))]))])),
        ret(selector(opt_selector(ident("a"), "b"), "c")),
    ]);
    assert_eq!(result, Object::Int(1));
    let result = eval(vec![
        short("a", dict(vec![("b", dict(vec![("c", int(1))]))])),
        ret(selector(opt_selector(ident("a"), "missing"), "c")),
    ]);
    assert_eq!(result, Object::Nil);
}

#[test]
fn short_circuit_operators_leave_the_selecting_operand() {
    let and = Expr::And(Box::new(int(0)), Box::new(int(5)), p());
    assert_eq!(eval_expr(and), Object::Int(0));
    let and = Expr::And(Box::new(int(1)), Box::new(int(5)), p());
    assert_eq!(eval_expr(and), Object::Int(5));
    let or = Expr::Or(Box::new(int(0)), Box::new(int(5)), p());
    assert_eq!(eval_expr(or), Object::Int(5));
    let coalesce = Expr::NilCoalesce(Box::new(nil()), Box::new(int(7)), p());
    assert_eq!(eval_expr(coalesce), Object::Int(7));
    let coalesce = Expr::NilCoalesce(Box::new(int(0)), Box::new(int(7)), p());
    assert_eq!(eval_expr(coalesce), Object::Int(0));
}

#[test]
fn redeclaration_in_the_same_block_is_a_compile_error() {
    let chunk = common::chunk(vec![
        short("x", int(1)),
        short("x", int(2)),
        Stmt::Return { values: vec![], pos: p() },
    ]);
    let err = tarn::compile(&chunk, &tarn::CompileOptions::default()).expect_err("redeclaration must fail");
    assert!(err.message.contains("redeclared"));
}
