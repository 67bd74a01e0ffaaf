//! The embedding surface: compile options, run options, and the runner.

use crate::{
    bytecode::{Program, vm::Vm},
    errors::RuntimeError,
    heap::HeapData,
    io::{CollectStringWriter, Output, ScriptWriter, StdWriter, WriteStrategy},
    limits::ResourceLimits,
    modules::ModuleMap,
    object::{Object, object_to_value, value_to_object},
    tracer::{NoopTracer, VmTracer},
    types::KeyValueArray,
    value::Value,
};

/// Options accepted by [`crate::compile`].
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Import-name to parsed-chunk mapping for `import("name")`.
    pub module_map: ModuleMap,
    /// Fold pure literal arithmetic at compile time.
    pub optimize_constants: bool,
    /// Emit compiler notes to stderr.
    pub trace_compiler: bool,
    /// Mixed-text templating is a parser mode; the flag is forwarded to the
    /// host parser and ignored by the core.
    pub mixed_mode: bool,
    /// Global names the host will inject before running; predefining them
    /// lets the compiler resolve references it would otherwise reject.
    pub predefined_globals: Vec<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_map: ModuleMap::new(),
            optimize_constants: true,
            trace_compiler: false,
            mixed_mode: false,
            predefined_globals: Vec::new(),
        }
    }
}

/// Options accepted by [`Runner::run`].
#[derive(Default)]
pub struct RunOptions {
    /// Values injected into the global table by name before execution.
    pub globals: Vec<(String, Object)>,
    /// Positional arguments bound to the main body's `param` declarations
    /// (and visible as `__args__`).
    pub args: Vec<Object>,
    /// Named arguments for the main body.
    pub named_args: Vec<(String, Object)>,
    /// Input consumed by the `read` builtin.
    pub input: Option<String>,
    /// Stdout sink; buffered stdout when absent.
    pub writer: Option<Box<dyn ScriptWriter>>,
    /// Object-to-writer strategy chain, tried in order before the default
    /// rendering.
    pub strategies: Vec<Box<dyn WriteStrategy>>,
    /// Execution tracer.
    pub tracer: Option<Box<dyn VmTracer>>,
    pub limits: ResourceLimits,
    /// Convert host-builtin panics into runtime errors instead of
    /// propagating them.
    pub recover: bool,
}

/// Executes a compiled [`Program`].
#[derive(Debug, Clone)]
pub struct Runner {
    program: Program,
}

impl Runner {
    #[must_use]
    pub fn new(program: Program) -> Self {
        Self { program }
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Runs the program to completion.
    pub fn run(&self, mut options: RunOptions) -> Result<Object, RuntimeError> {
        match options.writer.take() {
            Some(mut writer) => self.run_with(options, writer.as_mut()),
            None => {
                let mut writer = StdWriter;
                self.run_with(options, &mut writer)
            }
        }
    }

    /// Runs with output captured, returning the result and everything the
    /// script wrote.
    pub fn run_capture(&self, mut options: RunOptions) -> Result<(Object, String), RuntimeError> {
        options.writer = None;
        let mut writer = CollectStringWriter::new();
        let result = self.run_with(options, &mut writer)?;
        Ok((result, writer.into_output()))
    }

    fn run_with(&self, options: RunOptions, writer: &mut dyn ScriptWriter) -> Result<Object, RuntimeError> {
        let RunOptions {
            globals,
            args,
            named_args,
            input,
            writer: _,
            strategies,
            tracer,
            limits,
            recover,
        } = options;
        let mut default_tracer = NoopTracer;
        let mut boxed_tracer = tracer;
        let tracer: &mut dyn VmTracer = match boxed_tracer.as_mut() {
            Some(provided) => provided.as_mut(),
            None => &mut default_tracer,
        };

        let out = Output::new(writer, &strategies);
        let mut vm = Vm::new(&self.program, out, limits, tracer, recover);
        vm.set_input(input);
        for (name, object) in &globals {
            let value = object_to_value(&mut vm.heap, object);
            vm.set_global(name, value);
        }
        let args: Vec<Value> = args
            .iter()
            .map(|object| object_to_value(&mut vm.heap, object))
            .collect();
        let named = if named_args.is_empty() {
            None
        } else {
            let mut kva = KeyValueArray::new();
            for (name, object) in &named_args {
                let key = vm.heap.alloc_str(name.as_str());
                let value = object_to_value(&mut vm.heap, object);
                kva.push(key, value);
            }
            Some(vm.heap.alloc_value(HeapData::KeyValueArray(kva)))
        };

        match vm.run_main(args, named) {
            Ok(value) => value_to_object(&vm.heap, value).map_err(crate::errors::RunError::into_runtime_error),
            Err(err) => Err(err.into_runtime_error()),
        }
    }
}
