//! Runs a serialized tarn program image.
//!
//! ```text
//! tarn-run <image.tbc> [args...]
//! ```
//!
//! Exit codes: 0 success, 1 malformed image or compile artifact, 2 runtime
//! error, 3 usage error.

use std::process::ExitCode;

use tarn::{Object, Program, RunOptions, Runner};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: tarn-run <image.tbc> [args...]");
        return ExitCode::from(3);
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("tarn-run: cannot read {path}: {err}");
            return ExitCode::from(3);
        }
    };
    let program = match Program::load(&bytes) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("tarn-run: {err}");
            return ExitCode::from(1);
        }
    };

    let script_args: Vec<Object> = args.map(|arg| Object::Str(arg)).collect();
    let options = RunOptions {
        args: script_args,
        ..RunOptions::default()
    };
    match Runner::new(program).run(options) {
        Ok(Object::Nil) => ExitCode::SUCCESS,
        Ok(result) => {
            println!("{result}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}
