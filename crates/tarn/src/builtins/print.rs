//! Output builtins and the printf-style formatter.

use std::fmt::Write as _;

use crate::{
    args::Args,
    bytecode::vm::Vm,
    errors::{ErrKind, RunResult},
    value::{Value, close_value, is_falsy, to_display},
};

/// `print(args...)` / `println(args...)`: values through the object-to-writer
/// chain, space-separated.
pub(super) fn print(vm: &mut Vm<'_>, args: &Args, newline: bool) -> RunResult<Value> {
    for (index, value) in args.positional.iter().enumerate() {
        if index > 0 {
            vm.out.write_text(" ")?;
        }
        vm.out.write_value(&vm.heap, *value)?;
    }
    if newline {
        vm.out.write_text("\n")?;
    }
    Ok(Value::Nil)
}

/// `write(args...)`: raw rendering, no separators.
pub(super) fn write(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    for value in &args.positional {
        vm.out.write_value(&vm.heap, *value)?;
    }
    Ok(Value::Nil)
}

pub(super) fn printf(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let text = format_args(vm, args, "printf")?;
    vm.out.write_text(&text)?;
    Ok(Value::Nil)
}

pub(super) fn sprintf(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let text = format_args(vm, args, "sprintf")?;
    Ok(vm.heap.alloc_str(text))
}

/// `read()`: the host-provided input, consumed once; nil when exhausted.
pub(super) fn read(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("read")?;
    match vm.input.take() {
        Some(input) => Ok(vm.heap.alloc_str(input)),
        None => Ok(Value::Nil),
    }
}

/// `close(v)`: releases a closable resource; a no-op returning the argument
/// otherwise.
pub(super) fn close(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    let value = args.one("close")?;
    Ok(close_value(&mut vm.heap, value))
}

pub(super) fn flush(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("flush")?;
    vm.out.flush()?;
    Ok(Value::Nil)
}

/// `obstart()`: redirect writes into a capture buffer.
pub(super) fn obstart(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("obstart")?;
    vm.out.push_buffer();
    Ok(Value::Nil)
}

/// `obend()`: end the innermost capture and return its contents.
pub(super) fn obend(vm: &mut Vm<'_>, args: &Args) -> RunResult<Value> {
    args.check_zero("obend")?;
    match vm.out.pop_buffer() {
        Some(buffer) => Ok(vm.heap.alloc_str(buffer)),
        None => Ok(Value::Nil),
    }
}

fn format_args(vm: &mut Vm<'_>, args: &Args, name: &str) -> RunResult<String> {
    let [fmt, rest @ ..] = args.positional.as_slice() else {
        return Err(ErrKind::wrong_args(name, "1+", 0));
    };
    let Some(fmt) = vm.heap.str_of(*fmt).map(str::to_owned) else {
        return Err(ErrKind::type_error(format!("{name}() expects a format string")));
    };
    format_with_verbs(vm, &fmt, rest)
}

/// The formatter behind `printf`/`sprintf`. Verbs: `%v` canonical, `%s` raw,
/// `%q` quoted, `%d` integer, `%f` float, `%x` hex, `%t` truthiness, `%%`.
fn format_with_verbs(vm: &mut Vm<'_>, fmt: &str, args: &[Value]) -> RunResult<String> {
    let mut out = String::with_capacity(fmt.len());
    let mut next = 0usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            return Err(ErrKind::type_error("format string ends with a bare %"));
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(value) = args.get(next).copied() else {
            return Err(ErrKind::wrong_args("printf", format!("{}+", next + 1), args.len()));
        };
        next += 1;
        match verb {
            'v' | 's' => out.push_str(&to_display(&vm.heap, value, false)?),
            'q' => out.push_str(&to_display(&vm.heap, value, true)?),
            'd' => match value {
                Value::Int(i) => {
                    let _ = write!(out, "{i}");
                }
                Value::Uint(u) => {
                    let _ = write!(out, "{u}");
                }
                Value::Char(c) => {
                    let _ = write!(out, "{}", u32::from(c));
                }
                _ => return Err(ErrKind::type_error("%d expects an integer")),
            },
            'f' => match value {
                Value::Float(f) => {
                    let _ = write!(out, "{f}");
                }
                Value::Int(i) => {
                    let _ = write!(out, "{}", i as f64);
                }
                _ => return Err(ErrKind::type_error("%f expects a number")),
            },
            'x' => match value {
                Value::Int(i) => {
                    let _ = write!(out, "{i:x}");
                }
                Value::Uint(u) => {
                    let _ = write!(out, "{u:x}");
                }
                _ => return Err(ErrKind::type_error("%x expects an integer")),
            },
            't' => out.push_str(if is_falsy(value, &vm.heap) { "false" } else { "true" }),
            other => return Err(ErrKind::type_error(format!("unknown format verb %{other}"))),
        }
    }
    Ok(out)
}
