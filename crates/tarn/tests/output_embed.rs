//! Output plumbing and the host-embedding surface: writers, strategies,
//! capture buffers, host functions, reflection, and SyncDict sharing.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use pretty_assertions::assert_eq;
use tarn::{
    HostCall, HostFunc, HostObject, Object, RenderHook, RunOptions, RuntimeError, SyncDict, WriteStrategy,
};

#[test]
fn print_separates_with_spaces_and_println_terminates() {
    let (_, output) = eval_capture(vec![
        expr_stmt(call(ident("println"), vec![s("a"), int(1)])),
        expr_stmt(call(ident("print"), vec![s("b")])),
        ret0(),
    ]);
    assert_eq!(output, "a 1\nb");
}

#[test]
fn sprintf_formats_verbs() {
    let result = eval_expr(call(
        ident("sprintf"),
        vec![s("%d-%s-%t-%x"), int(5), s("x"), int(0), int(255)],
    ));
    assert_eq!(result, Object::Str("5-x-false-ff".to_owned()));
}

#[test]
fn printf_writes_formatted_output() {
    let (_, output) = eval_capture(vec![
        expr_stmt(call(ident("printf"), vec![s("v=%v!"), array(vec![int(1), int(2)])])),
        ret0(),
    ]);
    assert_eq!(output, "v=[1, 2]!");
}

#[test]
fn output_buffers_nest() {
    // obstart(); print("inner"); txt := obend(); print("outer:", txt)
    let (_, output) = eval_capture(vec![
        expr_stmt(call(ident("obstart"), vec![])),
        expr_stmt(call(ident("print"), vec![s("inner")])),
        short("txt", call(ident("obend"), vec![])),
        expr_stmt(call(ident("print"), vec![s("outer:"), ident("txt")])),
        ret0(),
    ]);
    assert_eq!(output, "outer: inner");
}

#[test]
fn write_strategies_take_precedence_over_the_default_rendering() {
    let strategy: Box<dyn WriteStrategy> = Box::new(RenderHook::new(|type_name: &str, canonical: &str| {
        (type_name == "int").then(|| format!("<int:{canonical}>"))
    }));
    let runner = compile_default(vec![
        expr_stmt(call(ident("print"), vec![int(5), s("x")])),
        ret0(),
    ]);
    let (_, output) = runner
        .run_capture(RunOptions {
            strategies: vec![strategy],
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(output, "<int:5> x");
}

#[test]
fn read_consumes_the_host_input_once() {
    let runner = compile_default(vec![ret(array(vec![
        call(ident("read"), vec![]),
        call(ident("read"), vec![]),
    ]))]);
    let result = runner
        .run(RunOptions {
            input: Some("payload".to_owned()),
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(
        result,
        obj_array(vec![Object::Str("payload".to_owned()), Object::Nil])
    );
}

#[test]
fn host_functions_are_callable_with_named_arguments() {
    let add2 = HostFunc::new("add2", |call: HostCall| {
        let mut total = 0;
        for arg in &call.args {
            if let Object::Int(i) = arg {
                total += i;
            }
        }
        for (name, value) in &call.named {
            if name == "extra"
                && let Object::Int(i) = value
            {
                total += i;
            }
        }
        Ok(Object::Int(total))
    });
    let program = tarn::compile(
        &chunk(vec![ret(call_named(
            ident("add2"),
            vec![int(1), int(2)],
            vec![("extra", int(39))],
        ))]),
        &tarn::CompileOptions {
            predefined_globals: vec!["add2".to_owned()],
            ..tarn::CompileOptions::default()
        },
    )
    .expect("compile");
    let result = tarn::Runner::new(program)
        .run(RunOptions {
            globals: vec![("add2".to_owned(), Object::HostFunc(add2))],
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(result, Object::Int(42));
}

#[test]
fn recover_converts_host_panics_into_runtime_errors() {
    let boom = HostFunc::new("boom", |_call| -> Result<Object, RuntimeError> {
        panic!("host exploded");
    });
    let program = tarn::compile(
        &chunk(vec![ret(call(ident("boom"), vec![]))]),
        &tarn::CompileOptions {
            predefined_globals: vec!["boom".to_owned()],
            ..tarn::CompileOptions::default()
        },
    )
    .expect("compile");
    let err = tarn::Runner::new(program)
        .run(RunOptions {
            globals: vec![("boom".to_owned(), Object::HostFunc(boom))],
            recover: true,
            ..RunOptions::default()
        })
        .expect_err("must surface as an error");
    assert!(err.message.contains("host exploded"));
}

#[test]
fn sync_dict_changes_are_visible_to_the_host() {
    let shared = SyncDict::new();
    shared.insert("seed".to_owned(), Object::Int(1));
    let program = tarn::compile(
        &chunk(vec![
            assign(selector(ident("shared"), "fromScript"), int(2)),
            ret(selector(ident("shared"), "seed")),
        ]),
        &tarn::CompileOptions {
            predefined_globals: vec!["shared".to_owned()],
            ..tarn::CompileOptions::default()
        },
    )
    .expect("compile");
    let result = tarn::Runner::new(program)
        .run(RunOptions {
            globals: vec![("shared".to_owned(), Object::SyncDict(shared.clone()))],
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(result, Object::Int(1));
    assert_eq!(shared.get("fromScript"), Some(Object::Int(2)));
}

#[derive(Debug)]
struct Gauge {
    width: i64,
    closed: bool,
}

impl HostObject for Gauge {
    fn type_name(&self) -> &str {
        "gauge"
    }

    fn to_display(&self) -> String {
        format!("gauge(width={})", self.width)
    }

    fn index_get(&self, key: &Object) -> Option<Object> {
        match key {
            Object::Str(name) if name == "width" => Some(Object::Int(self.width)),
            _ => None,
        }
    }

    fn index_set(&mut self, key: Object, value: Object) -> Result<(), String> {
        if let (Object::Str(name), Object::Int(width)) = (&key, &value)
            && name == "width"
        {
            self.width = *width;
            return Ok(());
        }
        Err("unknown member".to_owned())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[test]
fn reflect_values_bridge_host_state() {
    let gauge = Arc::new(Mutex::new(Gauge {
        width: 10,
        closed: false,
    }));
    let handle: Arc<Mutex<dyn HostObject>> = gauge.clone();
    let program = tarn::compile(
        &chunk(vec![
            assign(selector(ident("g"), "width"), int(30)),
            expr_stmt(call(ident("close"), vec![ident("g")])),
            ret(selector(ident("g"), "width")),
        ]),
        &tarn::CompileOptions {
            predefined_globals: vec!["g".to_owned()],
            ..tarn::CompileOptions::default()
        },
    )
    .expect("compile");
    let result = tarn::Runner::new(program)
        .run(RunOptions {
            globals: vec![("g".to_owned(), Object::Reflect(handle))],
            ..RunOptions::default()
        })
        .expect("run");
    assert_eq!(result, Object::Int(30));
    let gauge = gauge.lock().expect("lock");
    assert_eq!(gauge.width, 30);
    assert!(gauge.closed);
}

#[test]
fn globals_builtin_snapshots_the_global_table() {
    // var x = 5 at the top level is a global.
    let result = eval(vec![
        var("x", int(5)),
        short("g", call(ident("globals"), vec![])),
        ret(selector(ident("g"), "x")),
    ]);
    assert_eq!(result, Object::Int(5));
}
