//! Iteration: for-in loops with else clauses, iterator options, and the
//! lazy transformer builtins.

mod common;

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    Object,
    ast::{AssignKind, BinOp, Stmt},
};

fn for_in(key: Option<&str>, value: &str, iter: tarn::ast::Expr, body: Vec<Stmt>, els: Vec<Stmt>) -> Stmt {
    Stmt::ForIn {
        key: key.map(str::to_owned),
        value: value.to_owned(),
        iter,
        body,
        els,
        pos: p(),
    }
}

fn add_to(name: &str, amount: tarn::ast::Expr) -> Stmt {
    Stmt::Assign {
        target: ident(name),
        kind: AssignKind::Op(BinOp::Add),
        value: amount,
        pos: p(),
    }
}

#[test]
fn for_in_yields_every_element_in_order() {
    // total := 0; for i, v in [5, 6, 7] { total += v + i }; return total
    let result = eval(vec![
        short("total", int(0)),
        for_in(
            Some("i"),
            "v",
            array(vec![int(5), int(6), int(7)]),
            vec![add_to("total", add(ident("v"), ident("i")))],
            vec![],
        ),
        ret(ident("total")),
    ]);
    assert_eq!(result, Object::Int(21));
}

#[test]
fn loop_else_runs_exactly_when_no_break_happened() {
    let completed = eval(vec![
        short("marker", int(0)),
        for_in(
            None,
            "v",
            array(vec![int(1), int(2)]),
            vec![],
            vec![assign(ident("marker"), int(100))],
        ),
        ret(ident("marker")),
    ]);
    assert_eq!(completed, Object::Int(100));

    let broke = eval(vec![
        short("marker", int(0)),
        for_in(
            None,
            "v",
            array(vec![int(1), int(2)]),
            vec![Stmt::Break(p())],
            vec![assign(ident("marker"), int(100))],
        ),
        ret(ident("marker")),
    ]);
    assert_eq!(broke, Object::Int(0));
}

#[test]
fn continue_skips_to_the_next_element() {
    // total := 0; for v in [1,2,3,4] { if v % 2 == 0 { continue }; total += v }
    let result = eval(vec![
        short("total", int(0)),
        for_in(
            None,
            "v",
            array(vec![int(1), int(2), int(3), int(4)]),
            vec![
                Stmt::If {
                    cond: cmp(
                        tarn::ast::CmpOp::Eq,
                        bin(BinOp::Rem, ident("v"), int(2)),
                        int(0),
                    ),
                    then: vec![Stmt::Continue(p())],
                    els: vec![],
                    pos: p(),
                },
                add_to("total", ident("v")),
            ],
            vec![],
        ),
        ret(ident("total")),
    ]);
    assert_eq!(result, Object::Int(4));
}

#[test]
fn c_style_loop_with_else() {
    // total := 0; for i := 0; i < 4; i += 1 { total += i } else { total += 100 }
    let result = eval(vec![
        short("total", int(0)),
        Stmt::For {
            init: Some(Box::new(short("i", int(0)))),
            cond: Some(cmp(tarn::ast::CmpOp::Lt, ident("i"), int(4))),
            post: Some(Box::new(add_to("i", int(1)))),
            body: vec![add_to("total", ident("i"))],
            els: vec![add_to("total", int(100))],
            pos: p(),
        },
        ret(ident("total")),
    ]);
    assert_eq!(result, Object::Int(106));
}

#[test]
fn dict_iteration_yields_keys_and_values() {
    // ks := ""; total := 0; for k, v in {a: 1, b: 2} { ks += k; total += v }
    let result = eval(vec![
        short("ks", s("")),
        short("total", int(0)),
        for_in(
            Some("k"),
            "v",
            dict(vec![("b", int(2)), ("a", int(1))]),
            vec![add_to("ks", ident("k")), add_to("total", ident("v"))],
            vec![],
        ),
        ret(array(vec![ident("ks"), ident("total")])),
    ]);
    // Key snapshots are sorted for determinism.
    assert_eq!(result, obj_array(vec![Object::Str("ab".to_owned()), Object::Int(3)]));
}

#[test]
fn string_iteration_yields_chars() {
    let result = eval(vec![
        short("out", s("")),
        for_in(None, "c", s("héllo"), vec![add_to("out", ident("c"))], vec![]),
        ret(ident("out")),
    ]);
    assert_eq!(result, Object::Str("héllo".to_owned()));
}

fn collect_of(expr: tarn::ast::Expr) -> tarn::ast::Expr {
    call(ident("collect"), vec![expr])
}

#[test]
fn iterator_options_sorted_reversed_step() {
    let sorted = eval_expr(collect_of(call_named(
        ident("iterator"),
        vec![array(vec![int(3), int(1), int(2)])],
        vec![("sorted", boolean(true))],
    )));
    assert_eq!(sorted, obj_array(vec![Object::Int(1), Object::Int(2), Object::Int(3)]));

    let reversed = eval_expr(collect_of(call_named(
        ident("iterator"),
        vec![array(vec![int(3), int(1), int(2)])],
        vec![("reversed", boolean(true))],
    )));
    assert_eq!(reversed, obj_array(vec![Object::Int(2), Object::Int(1), Object::Int(3)]));

    let stepped = eval_expr(collect_of(call_named(
        ident("iterator"),
        vec![array(vec![int(1), int(2), int(3), int(4), int(5)])],
        vec![("step", int(2))],
    )));
    assert_eq!(stepped, obj_array(vec![Object::Int(1), Object::Int(3), Object::Int(5)]));
}

#[test]
fn map_filter_compose_lazily() {
    // collect(map(filter([1,2,3,4], even), double)) == [4, 8]
    let even = func(
        &["v"],
        vec![ret(cmp(
            tarn::ast::CmpOp::Eq,
            bin(BinOp::Rem, ident("v"), int(2)),
            int(0),
        ))],
    );
    let double = func(&["v"], vec![ret(mul(ident("v"), int(2)))]);
    let result = eval(vec![
        short("even", even),
        short("double", double),
        ret(collect_of(call(
            ident("map"),
            vec![
                call(ident("filter"), vec![array(vec![int(1), int(2), int(3), int(4)]), ident("even")]),
                ident("double"),
            ],
        ))),
    ]);
    assert_eq!(result, obj_array(vec![Object::Int(4), Object::Int(8)]));
}

#[test]
fn reduce_folds_left() {
    let acc = func(&["acc", "v"], vec![ret(add(ident("acc"), ident("v")))]);
    let result = eval(vec![
        short("acc", acc),
        ret(call(
            ident("reduce"),
            vec![array(vec![int(1), int(2), int(3)]), int(10), ident("acc")],
        )),
    ]);
    assert_eq!(result, Object::Int(16));
}

#[test]
fn zip_ends_with_the_shorter_side() {
    let result = eval_expr(collect_of(call(
        ident("zip"),
        vec![array(vec![int(1), int(2)]), array(vec![int(3), int(4), int(5)])],
    )));
    assert_eq!(
        result,
        obj_array(vec![
            obj_array(vec![Object::Int(1), Object::Int(3)]),
            obj_array(vec![Object::Int(2), Object::Int(4)]),
        ])
    );
}

#[test]
fn enumerate_counts_from_zero() {
    // collect(items(enumerate(["a","b"]))) keys are the counter
    let result = eval(vec![
        short("out", array(vec![])),
        for_in(
            Some("i"),
            "v",
            call(ident("enumerate"), vec![array(vec![s("a"), s("b")])]),
            vec![expr_stmt(call(
                ident("append"),
                vec![ident("out"), ident("i"), ident("v")],
            ))],
            vec![],
        ),
        ret(ident("out")),
    ]);
    assert_eq!(
        result,
        obj_array(vec![
            Object::Int(0),
            Object::Str("a".to_owned()),
            Object::Int(1),
            Object::Str("b".to_owned()),
        ])
    );
}

#[test]
fn keys_and_values_of_a_dict() {
    let keys = eval_expr(collect_of(call(ident("keys"), vec![dict(vec![("b", int(2)), ("a", int(1))])])));
    assert_eq!(keys, obj_array(vec![Object::Str("a".to_owned()), Object::Str("b".to_owned())]));

    let values = eval_expr(collect_of(call(ident("values"), vec![dict(vec![("b", int(2)), ("a", int(1))])])));
    assert_eq!(values, obj_array(vec![Object::Int(1), Object::Int(2)]));
}

#[test]
fn user_iterator_protocol_drives_for_in() {
    // gen := func(state) { state = state ?? 0; return state < 3 ? [state+1, state, state*10] : nil }
    let r#gen = func(
        &["state"],
        vec![
            assign(
                ident("state"),
                tarn::ast::Expr::NilCoalesce(Box::new(ident("state")), Box::new(int(0)), p()),
            ),
            ret(ternary(
                cmp(tarn::ast::CmpOp::Lt, ident("state"), int(3)),
                array(vec![
                    add(ident("state"), int(1)),
                    ident("state"),
                    mul(ident("state"), int(10)),
                ]),
                nil(),
            )),
        ],
    );
    let result = eval(vec![
        short("gen", r#gen),
        short("total", int(0)),
        for_in(None, "v", ident("gen"), vec![add_to("total", ident("v"))], vec![]),
        ret(ident("total")),
    ]);
    assert_eq!(result, Object::Int(30));
}

#[test]
fn iterating_a_non_iterable_raises() {
    assert_eq!(
        eval_err(vec![for_in(None, "v", int(3), vec![], vec![]), ret0()]),
        "NotIterableError"
    );
}
