//! The bytecode virtual machine.
//!
//! Execution is a dispatch loop over a single contiguous operand stack and a
//! stack of call frames; each frame owns its instruction pointer and a base
//! index where its locals live. Nested loops (bounded by a frame floor) run
//! deferred calls, default fragments, and user callbacks invoked from
//! builtins.

mod attr;
mod binary;
mod call;
mod compare;
mod exceptions;
mod iter;

use ahash::AHashMap;
pub(crate) use attr::int_index;
pub(crate) use call::CallResult;
pub(crate) use compare::compare_values;
pub(crate) use iter::sort_values;

use super::{
    code::{Code, CompiledFunction, Constant, Program},
    op::{self, Opcode},
};
use crate::{
    ast::Pos,
    builtins::Builtins,
    errors::{RunError, RunResult},
    heap::{Heap, HeapData, HeapId},
    io::Output,
    limits::{CANCEL_CHECK_INTERVAL, ResourceLimits},
    modules::ModuleRegistry,
    tracer::{TraceEvent, VmTracer},
    value::{Value, is_falsy},
};

/// A deferred call recorded by the `Defer` opcode; runs at frame teardown.
#[derive(Debug, Clone)]
pub(crate) struct DeferredCall {
    callee: Value,
    args: Vec<Value>,
    named: Option<Value>,
}

/// Values backing `__args__`, `__named_args__`, and `__callee__`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CallInfo {
    args: Value,
    named: Value,
    callee: Value,
}

/// What kind of activation a frame is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Main,
    Function,
    /// A named-parameter default fragment sharing the callee's base.
    Fragment,
    /// A module body; its return value memoizes into the registry.
    Module(u16),
}

/// A single function activation record.
#[derive(Debug)]
pub(crate) struct CallFrame<'p> {
    func: &'p CompiledFunction,
    /// Usually `func.code`; default fragments run their own code over the
    /// same base.
    code: &'p Code,
    ip: usize,
    /// Operand-stack index of local slot 0.
    base: usize,
    /// Cells for this frame's captured locals.
    cells: Vec<HeapId>,
    /// Captured free cells from the closure.
    free: Vec<HeapId>,
    defers: Vec<DeferredCall>,
    call_pos: Option<Pos>,
    kind: FrameKind,
    call_info: Option<CallInfo>,
}

/// An installed `try` handler.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Handler {
    /// `frames.len()` at install time; the owning frame is `frame_depth - 1`.
    frame_depth: usize,
    /// Operand-stack height to restore before entering the handler.
    stack_len: usize,
    catch: Option<u32>,
    finally: Option<u32>,
    /// Set once the catch block is running; a second error routes to the
    /// finally block or outward.
    in_catch: bool,
}

/// An error parked while its finally block runs; rethrown by `FinallyEnd`.
#[derive(Debug)]
struct PendingFinally {
    handler_depth: usize,
    error: RunError,
}

pub(crate) struct Vm<'p> {
    program: &'p Program,
    pub(crate) heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame<'p>>,
    handlers: Vec<Handler>,
    pending_finally: Vec<PendingFinally>,
    globals: Vec<Value>,
    registry: ModuleRegistry,
    pub(crate) out: Output<'p>,
    limits: ResourceLimits,
    tracer: &'p mut dyn VmTracer,
    /// Well-known callables backing operator customization, keyed by the
    /// binary-op tag.
    operator_callables: AHashMap<u8, Value>,
    op_count: u64,
    /// Convert host-builtin panics into runtime errors.
    pub(crate) recover: bool,
    /// Host-provided input consumed by the `read` builtin.
    pub(crate) input: Option<String>,
}

impl<'p> Vm<'p> {
    pub fn new(
        program: &'p Program,
        out: Output<'p>,
        limits: ResourceLimits,
        tracer: &'p mut dyn VmTracer,
        recover: bool,
    ) -> Self {
        Self {
            program,
            heap: Heap::new(),
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(16),
            handlers: Vec::new(),
            pending_finally: Vec::new(),
            globals: vec![Value::Nil; program.global_names.len()],
            registry: ModuleRegistry::new(),
            out,
            limits,
            tracer,
            operator_callables: AHashMap::new(),
            op_count: 0,
            recover,
            input: None,
        }
    }

    pub fn set_input(&mut self, input: Option<String>) {
        self.input = input;
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    /// Seeds a global slot by name before execution.
    pub fn set_global(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.program.global_names.iter().position(|n| n == name) {
            self.globals[slot] = value;
        }
    }

    pub fn global_entries(&self) -> impl Iterator<Item = (&str, Value)> {
        self.program
            .global_names
            .iter()
            .map(String::as_str)
            .zip(self.globals.iter().copied())
    }

    /// Runs the main body with the given arguments to completion.
    pub fn run_main(&mut self, args: Vec<Value>, named: Option<Value>) -> RunResult<Value> {
        self.bind_and_push(BindTarget::Main, args, named, None)?;
        self.run_loop(0)
    }

    // ------------------------------------------------------------------
    // Stack and frame primitives
    // ------------------------------------------------------------------

    pub(crate) fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub(crate) fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RunError::internal("operand stack underflow"))
    }

    fn peek(&self) -> RunResult<Value> {
        self.stack
            .last()
            .copied()
            .ok_or_else(|| RunError::internal("operand stack underflow"))
    }

    fn pop_n(&mut self, n: usize) -> RunResult<Vec<Value>> {
        if self.stack.len() < n {
            return Err(RunError::internal("operand stack underflow"));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    pub(crate) fn frame(&self) -> &CallFrame<'p> {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame<'p> {
        self.frames.last_mut().expect("no active frame")
    }

    fn fetch8(&mut self) -> u8 {
        let frame = self.frame_mut();
        let byte = frame.code.bytecode[frame.ip];
        frame.ip += 1;
        byte
    }

    fn fetch_i8(&mut self) -> i8 {
        i8::from_le_bytes([self.fetch8()])
    }

    fn fetch16(&mut self) -> u16 {
        let frame = self.frame_mut();
        let bytes = [frame.code.bytecode[frame.ip], frame.code.bytecode[frame.ip + 1]];
        frame.ip += 2;
        u16::from_le_bytes(bytes)
    }

    fn fetch_i16(&mut self) -> i16 {
        let frame = self.frame_mut();
        let bytes = [frame.code.bytecode[frame.ip], frame.code.bytecode[frame.ip + 1]];
        frame.ip += 2;
        i16::from_le_bytes(bytes)
    }

    fn fetch32(&mut self) -> u32 {
        let frame = self.frame_mut();
        let at = frame.ip;
        let bytes = [
            frame.code.bytecode[at],
            frame.code.bytecode[at + 1],
            frame.code.bytecode[at + 2],
            frame.code.bytecode[at + 3],
        ];
        frame.ip += 4;
        u32::from_le_bytes(bytes)
    }

    fn fetch_i32(&mut self) -> i32 {
        self.fetch32() as i32
    }

    fn jump_relative(&mut self, offset: i64) {
        let frame = self.frame_mut();
        let target = frame.ip as i64 + offset;
        frame.ip = usize::try_from(target).expect("jump target out of bounds");
    }

    /// Source position of the instruction that started at `instr_ip`.
    pub(crate) fn position_at(&self, instr_ip: usize) -> Option<Pos> {
        self.frame().code.location_at(instr_ip)
    }

    fn constant_value(&mut self, index: u16) -> RunResult<Value> {
        let constant = self
            .frame()
            .code
            .constants
            .get(index as usize)
            .ok_or_else(|| RunError::internal("constant index out of range"))?
            .clone();
        Ok(match constant {
            Constant::Int(i) => Value::Int(i),
            Constant::Uint(u) => Value::Uint(u),
            Constant::Float(f) => Value::Float(f),
            Constant::Char(c) => Value::Char(c),
            Constant::Str(s) => self.heap.alloc_str(s),
            Constant::Bytes(b) => self.heap.alloc_value(HeapData::Bytes(b)),
            Constant::Decimal(d) => self.heap.alloc_value(HeapData::Decimal(d)),
            Constant::Func(_) => {
                return Err(RunError::internal("function constants load through MakeClosure"));
            }
        })
    }

    pub(crate) fn constant_str(&self, index: u16) -> RunResult<&'p str> {
        let code = self.frame().code;
        match code.constants.get(index as usize) {
            Some(Constant::Str(s)) => Ok(s.as_str()),
            _ => Err(RunError::internal("expected string constant")),
        }
    }

    // ------------------------------------------------------------------
    // The dispatch loop
    // ------------------------------------------------------------------

    /// Executes until the frame at depth `floor` returns, yielding its
    /// return value. The main body runs with floor 0; nested execution
    /// (defers, default fragments, callbacks) uses the current depth.
    pub(crate) fn run_loop(&mut self, floor: usize) -> RunResult<Value> {
        loop {
            self.op_count += 1;
            if self.op_count % u64::from(CANCEL_CHECK_INTERVAL) == 0 {
                if let Err(err) = self
                    .limits
                    .check_cancelled()
                    .and_then(|()| self.limits.check_ops(self.op_count))
                {
                    self.handle_error(err, floor)?;
                    continue;
                }
            }

            let instr_ip = self.frame().ip;
            let byte = self.fetch8();
            let Some(opcode) = Opcode::from_repr(byte) else {
                return Err(RunError::internal(format!("invalid opcode byte {byte:#04x}")));
            };
            if self.tracer.enabled() {
                self.tracer.trace(TraceEvent::Instruction {
                    opcode,
                    ip: instr_ip,
                    depth: self.frames.len(),
                });
            }

            let result = self.exec_opcode(opcode, instr_ip, floor);
            match result {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(value)) => return Ok(value),
                Err(err) => {
                    let err = self.locate(err, instr_ip);
                    self.handle_error(err, floor)?;
                }
            }
        }
    }

    fn locate(&self, err: RunError, instr_ip: usize) -> RunError {
        match self.position_at(instr_ip) {
            Some(pos) => err.with_pos(pos),
            None => err,
        }
    }

    fn exec_opcode(&mut self, opcode: Opcode, instr_ip: usize, floor: usize) -> RunResult<Flow> {
        match opcode {
            Opcode::Nop => {}
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Dup => {
                let top = self.peek()?;
                self.push(top);
            }
            Opcode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(RunError::internal("swap on short stack"));
                }
                self.stack.swap(len - 1, len - 2);
            }

            Opcode::LoadConst => {
                let index = self.fetch16();
                let value = self.constant_value(index)?;
                self.push(value);
            }
            Opcode::LoadNil => self.push(Value::Nil),
            Opcode::LoadTrue => self.push(Value::Bool(true)),
            Opcode::LoadFalse => self.push(Value::Bool(false)),
            Opcode::LoadSmallInt => {
                let value = self.fetch_i8();
                self.push(Value::Int(i64::from(value)));
            }

            Opcode::LoadLocal => {
                let slot = self.fetch8() as usize;
                let value = self.stack[self.frame().base + slot];
                self.push(value);
            }
            Opcode::StoreLocal => {
                let slot = self.fetch8() as usize;
                let value = self.pop()?;
                let base = self.frame().base;
                self.stack[base + slot] = value;
            }

            Opcode::LoadGlobal => {
                let slot = self.fetch16() as usize;
                self.push(self.globals[slot]);
            }
            Opcode::StoreGlobal => {
                let slot = self.fetch16() as usize;
                let value = self.pop()?;
                self.globals[slot] = value;
            }

            Opcode::LoadBuiltin => {
                let tag = self.fetch8();
                let index = self.fetch8();
                let builtin = Builtins::decode(tag, index)
                    .ok_or_else(|| RunError::internal("unknown builtin encoding"))?;
                self.push(Value::Builtin(builtin));
            }

            Opcode::LoadCell => {
                let index = self.fetch8() as usize;
                let cell = self.frame().cells[index];
                self.push(self.heap.cell_get(cell));
            }
            Opcode::StoreCell => {
                let index = self.fetch8() as usize;
                let value = self.pop()?;
                let cell = self.frame().cells[index];
                self.heap.cell_set(cell, value);
            }
            Opcode::LoadFree => {
                let index = self.fetch8() as usize;
                let cell = self.frame().free[index];
                self.push(self.heap.cell_get(cell));
            }
            Opcode::StoreFree => {
                let index = self.fetch8() as usize;
                let value = self.pop()?;
                let cell = self.frame().free[index];
                self.heap.cell_set(cell, value);
            }
            Opcode::PushCellRef => {
                let index = self.fetch8() as usize;
                let cell = self.frame().cells[index];
                self.push(Value::Ref(cell));
            }
            Opcode::PushFreeRef => {
                let index = self.fetch8() as usize;
                let cell = self.frame().free[index];
                self.push(Value::Ref(cell));
            }

            Opcode::BinaryOp => {
                let tag = self.fetch8();
                self.exec_binary(tag)?;
            }
            Opcode::UnaryOp => {
                let tag = self.fetch8();
                self.exec_unary(tag)?;
            }
            Opcode::Compare => {
                let tag = self.fetch8();
                self.exec_compare(tag)?;
            }

            Opcode::MakeArray => {
                let count = self.fetch16() as usize;
                let items = self.pop_n(count)?;
                let value = self.heap.alloc_array(items);
                self.push(value);
            }
            Opcode::MakeDict => {
                let count = self.fetch16() as usize;
                self.exec_make_dict(count)?;
            }
            Opcode::MakeKeyValue => {
                let value = self.pop()?;
                let key = self.pop()?;
                let kv = self.heap.alloc_value(HeapData::KeyValue(crate::types::KeyValue { key, value }));
                self.push(kv);
            }
            Opcode::MakeKvArray => {
                let count = self.fetch16() as usize;
                self.exec_make_kva(count)?;
            }

            Opcode::IndexGet => self.exec_index_get()?,
            Opcode::IndexSet => self.exec_index_set()?,
            Opcode::Slice => {
                let flags = self.fetch8();
                self.exec_slice(flags)?;
            }
            Opcode::Selector => {
                let index = self.fetch16();
                self.exec_selector(index)?;
            }

            Opcode::Jump => {
                let offset = self.fetch_i16();
                self.jump_relative(i64::from(offset));
            }
            Opcode::JumpW => {
                let offset = self.fetch_i32();
                self.jump_relative(i64::from(offset));
            }
            Opcode::JumpIfFalse | Opcode::JumpIfFalseW => {
                let offset = self.fetch_jump_offset(opcode);
                let cond = self.pop()?;
                if is_falsy(cond, &self.heap) {
                    self.jump_relative(offset);
                }
            }
            Opcode::JumpIfTrue | Opcode::JumpIfTrueW => {
                let offset = self.fetch_jump_offset(opcode);
                let cond = self.pop()?;
                if !is_falsy(cond, &self.heap) {
                    self.jump_relative(offset);
                }
            }
            Opcode::JumpIfNil | Opcode::JumpIfNilW => {
                let offset = self.fetch_jump_offset(opcode);
                let cond = self.pop()?;
                if cond.is_nil() {
                    self.jump_relative(offset);
                }
            }

            Opcode::Call => {
                let argc = self.fetch8();
                let flags = self.fetch8();
                self.exec_call(argc, flags, instr_ip, false)?;
            }
            Opcode::TailCall => {
                let argc = self.fetch8();
                let flags = self.fetch8();
                self.exec_call(argc, flags, instr_ip, true)?;
            }
            Opcode::Return => {
                let value = self.pop()?;
                if let Some(result) = self.finish_return(value, floor)? {
                    return Ok(Flow::Exit(result));
                }
            }
            Opcode::ReturnMulti => {
                let count = self.fetch8() as usize;
                let items = self.pop_n(count)?;
                let value = self.heap.alloc_array(items);
                if let Some(result) = self.finish_return(value, floor)? {
                    return Ok(Flow::Exit(result));
                }
            }

            Opcode::MakeClosure => {
                let fn_index = self.fetch16();
                let free_count = self.fetch8() as usize;
                self.exec_make_closure(fn_index, free_count)?;
            }
            Opcode::AddCallMethod => self.exec_add_call_method()?,

            Opcode::IterInit => self.exec_iter_init()?,
            Opcode::IterNext => {
                let offset = self.fetch_i32();
                self.exec_iter_next(i64::from(offset))?;
            }
            Opcode::IterClose => self.exec_iter_close()?,

            Opcode::Throw => {
                let value = self.pop()?;
                return Err(self.make_thrown(value));
            }
            Opcode::TryBegin => {
                let catch = self.fetch32();
                let finally = self.fetch32();
                self.handlers.push(Handler {
                    frame_depth: self.frames.len(),
                    stack_len: self.stack.len(),
                    catch: (catch != op::NO_OFFSET).then_some(catch),
                    finally: (finally != op::NO_OFFSET).then_some(finally),
                    in_catch: false,
                });
            }
            Opcode::TryEnd => {
                self.handlers
                    .pop()
                    .ok_or_else(|| RunError::internal("TryEnd without handler"))?;
            }
            Opcode::FinallyEnd => {
                if let Some(pending) = self.pending_finally.last()
                    && pending.handler_depth == self.handlers.len()
                {
                    let pending = self.pending_finally.pop().expect("pending finally");
                    return Err(pending.error);
                }
            }
            Opcode::Defer => {
                let argc = self.fetch8();
                let flags = self.fetch8();
                self.exec_defer(argc, flags)?;
            }

            Opcode::Import => {
                let index = self.fetch16();
                self.exec_import(index, instr_ip)?;
            }
            Opcode::LoadModInfo => {
                let which = self.fetch8();
                let func = self.frame().func;
                let value = match which {
                    0 => self.heap.alloc_str(func.module_name.clone()),
                    1 => self.heap.alloc_str(func.file.clone()),
                    _ => Value::Bool(func.is_module),
                };
                self.push(value);
            }
            Opcode::LoadCallInfo => {
                let which = self.fetch8();
                let info = self.frame().call_info;
                let value = match (which, info) {
                    (0, Some(info)) => info.args,
                    (1, Some(info)) => info.named,
                    (2, Some(info)) => info.callee,
                    _ => Value::Nil,
                };
                self.push(value);
            }
        }
        Ok(Flow::Continue)
    }

    fn fetch_jump_offset(&mut self, opcode: Opcode) -> i64 {
        match opcode {
            Opcode::JumpIfFalse | Opcode::JumpIfTrue | Opcode::JumpIfNil => i64::from(self.fetch_i16()),
            _ => i64::from(self.fetch_i32()),
        }
    }

    fn exec_make_dict(&mut self, count: usize) -> RunResult<()> {
        let flat = self.pop_n(count * 2)?;
        let mut dict = crate::types::Dict::with_capacity(count);
        for pair in flat.chunks_exact(2) {
            let key = self.key_string(pair[0])?;
            dict.insert(key, pair[1]);
        }
        let value = self.heap.alloc_dict(dict);
        self.push(value);
        Ok(())
    }

    fn exec_make_kva(&mut self, count: usize) -> RunResult<()> {
        let flat = self.pop_n(count * 2)?;
        let mut kva = crate::types::KeyValueArray::new();
        for pair in flat.chunks_exact(2) {
            kva.push(pair[0], pair[1]);
        }
        let value = self.heap.alloc_value(HeapData::KeyValueArray(kva));
        self.push(value);
        Ok(())
    }

    /// Dict keys are strings; other values coerce through their canonical
    /// rendering.
    pub(crate) fn key_string(&self, key: Value) -> RunResult<String> {
        match self.heap.str_of(key) {
            Some(s) => Ok(s.to_owned()),
            None => crate::value::to_display(&self.heap, key, false),
        }
    }

    /// Runs every recorded defer of the current frame, newest first.
    /// Return values are ignored; errors propagate with the remaining defers
    /// still attached so an outer unwind finishes them.
    fn run_frame_defers(&mut self) -> RunResult<()> {
        loop {
            let Some(deferred) = self.frame_mut().defers.pop() else {
                return Ok(());
            };
            self.call_value_nested(deferred.callee, deferred.args, deferred.named)?;
        }
    }

    /// Completes a `Return`: runs defers, pops the frame, and either exits
    /// the loop at its floor or pushes the value for the caller.
    fn finish_return(&mut self, value: Value, floor: usize) -> RunResult<Option<Value>> {
        self.run_frame_defers()?;
        let frame = self.frames.pop().expect("return without frame");
        if self.tracer.enabled() {
            self.tracer.trace(TraceEvent::Return { depth: self.frames.len() });
        }
        match frame.kind {
            FrameKind::Fragment => {}
            FrameKind::Main | FrameKind::Function => self.stack.truncate(frame.base),
            FrameKind::Module(index) => {
                self.stack.truncate(frame.base);
                let name = self.program.modules[index as usize].name.clone();
                self.registry.insert(name, value);
            }
        }
        // Handlers and parked errors cannot outlive their frame.
        while self.handlers.last().is_some_and(|h| h.frame_depth > self.frames.len()) {
            self.handlers.pop();
        }
        let depth = self.handlers.len();
        self.pending_finally.retain(|p| p.handler_depth <= depth);

        if self.frames.len() == floor {
            Ok(Some(value))
        } else {
            self.push(value);
            Ok(None)
        }
    }

    fn exec_import(&mut self, index: u16, instr_ip: usize) -> RunResult<()> {
        let entry = self
            .program
            .modules
            .get(index as usize)
            .ok_or_else(|| RunError::internal("module index out of range"))?;
        if let Some(value) = self.registry.get(&entry.name) {
            self.push(value);
            return Ok(());
        }
        let call_pos = self.position_at(instr_ip);
        self.bind_and_push(BindTarget::Module(index), Vec::new(), None, call_pos)?;
        Ok(())
    }
}

/// What the dispatch loop should do after one instruction.
enum Flow {
    Continue,
    Exit(Value),
}

/// What `bind_and_push` is activating.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BindTarget {
    Main,
    Module(u16),
}
