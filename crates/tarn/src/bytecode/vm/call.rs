//! The calling convention and method-table dispatch.
//!
//! A call site pushes the callee, the positional arguments, and (when
//! present) a KeyValueArray of named arguments. Binding expands the splat,
//! fills positional slots, routes extras into the variadic tail, consumes
//! named arguments against the named parameters (running default fragments in
//! the callee frame for absent ones), and collects the rest into the
//! named-variadic parameter.

use std::panic::{AssertUnwindSafe, catch_unwind};

use super::{BindTarget, CallFrame, CallInfo, DeferredCall, FrameKind, Vm};
use crate::{
    args::Args,
    ast::Pos,
    bytecode::{
        code::{CompiledFunction, FuncId},
        op,
    },
    errors::{ErrKind, RunError, RunResult},
    heap::{HeapData, HeapId},
    object::{object_to_value, value_to_object},
    tracer::TraceEvent,
    types::{
        Closure, HostCall, HostFunc, KeyValueArray, MethodTable, NamedArgs, Overload, Reflect, TypeSig, Wrapped,
    },
    value::{Value, type_name},
};

/// Result of a call operation.
#[derive(Debug)]
pub(crate) enum CallResult {
    /// The call completed inline; push this value.
    Value(Value),
    /// A frame was pushed (or rewritten, for tail calls).
    FramePushed,
}

/// Snapshot of a heap callee taken before mutation, to keep borrows short.
enum CalleeKind {
    Closure { func: FuncId, free: Vec<HeapId> },
    Host(HostFunc),
    Bound { recv: Value, callee: Value },
    Wrapped(Wrapped),
    ObjectType,
    Regexp,
    Reflect(Reflect),
    NotCallable(&'static str),
}

impl<'p> Vm<'p> {
    pub(super) fn exec_call(&mut self, argc: u8, flags: u8, instr_ip: usize, tail: bool) -> RunResult<()> {
        let named = if flags & op::CALL_FLAG_NAMED != 0 {
            Some(self.pop()?)
        } else {
            None
        };
        let mut args = self.pop_n(argc as usize)?;
        if flags & op::CALL_FLAG_SPLAT != 0 {
            let last = args
                .pop()
                .ok_or_else(|| RunError::internal("splat call without positional arguments"))?;
            let expanded = self.collect_values(last)?;
            args.extend(expanded);
        }
        let callee = self.pop()?;
        let call_pos = self.position_at(instr_ip);
        // Fragments never tail-call; their frame layout is borrowed.
        let tail = tail && !matches!(self.frame().kind, FrameKind::Fragment);
        match self.call_value(callee, args, named, call_pos, tail)? {
            CallResult::Value(value) => self.push(value),
            CallResult::FramePushed => {}
        }
        Ok(())
    }

    pub(super) fn exec_defer(&mut self, argc: u8, flags: u8) -> RunResult<()> {
        let named = if flags & op::CALL_FLAG_NAMED != 0 {
            Some(self.pop()?)
        } else {
            None
        };
        let mut args = self.pop_n(argc as usize)?;
        if flags & op::CALL_FLAG_SPLAT != 0 {
            let last = args
                .pop()
                .ok_or_else(|| RunError::internal("splat defer without positional arguments"))?;
            let expanded = self.collect_values(last)?;
            args.extend(expanded);
        }
        let callee = self.pop()?;
        self.frame_mut().defers.push(DeferredCall { callee, args, named });
        Ok(())
    }

    /// Calls `callee` and runs any pushed frame to completion, returning the
    /// result. Used by defers, builtin callbacks, operator callables, and
    /// getters/setters.
    pub(crate) fn call_value_nested(
        &mut self,
        callee: Value,
        args: Vec<Value>,
        named: Option<Value>,
    ) -> RunResult<Value> {
        let floor = self.frames.len();
        match self.call_value(callee, args, named, None, false)? {
            CallResult::Value(value) => Ok(value),
            CallResult::FramePushed => self.run_loop(floor),
        }
    }

    /// The uniform call path: method-table dispatch, receiver/wrapper
    /// unwrapping, then the concrete invocation.
    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        mut args: Vec<Value>,
        mut named: Option<Value>,
        call_pos: Option<Pos>,
        tail: bool,
    ) -> RunResult<CallResult> {
        let mut callee = callee;
        loop {
            // Method-table dispatch: first matching overload wins; no match
            // falls back to the base implementation.
            if let Value::Ref(id) = callee {
                let selected = match self.heap.get(id) {
                    HeapData::Closure(c) => c.methods.as_ref().and_then(|t| t.select(&args, &self.heap)),
                    HeapData::HostFunc(h) => h.methods.as_ref().and_then(|t| t.select(&args, &self.heap)),
                    _ => None,
                };
                if let Some(target) = selected
                    && !same_ref(target, callee)
                {
                    callee = target;
                    continue;
                }
            }

            let kind = match callee {
                Value::Builtin(builtin) => {
                    let named_id = self.named_to_kva_id(named)?;
                    let value = crate::builtins::call(
                        self,
                        builtin,
                        Args {
                            positional: args,
                            named: named_id,
                        },
                    )?;
                    return Ok(CallResult::Value(value));
                }
                Value::Ref(id) => match self.heap.get(id) {
                    HeapData::Closure(c) => CalleeKind::Closure {
                        func: c.func,
                        free: c.cells.clone(),
                    },
                    HeapData::HostFunc(h) => CalleeKind::Host(h.func.clone()),
                    HeapData::Bound(b) => CalleeKind::Bound {
                        recv: b.recv,
                        callee: b.callee,
                    },
                    HeapData::Wrapped(w) => CalleeKind::Wrapped(w.clone()),
                    HeapData::ObjectType(_) => CalleeKind::ObjectType,
                    HeapData::Regexp(_) => CalleeKind::Regexp,
                    HeapData::Reflect(r) => CalleeKind::Reflect(r.clone()),
                    other => CalleeKind::NotCallable(other.type_name()),
                },
                other => CalleeKind::NotCallable(type_name(other, &self.heap)),
            };

            match kind {
                CalleeKind::Closure { func, free } => {
                    let func = self.program.func(func);
                    if tail {
                        self.rebind_tail(func, free, args, named, callee)?;
                    } else {
                        self.push_function_frame(func, free, args, named, callee, call_pos)?;
                    }
                    return Ok(CallResult::FramePushed);
                }
                CalleeKind::Host(host) => {
                    let value = self.invoke_host(&host, args, named)?;
                    return Ok(CallResult::Value(value));
                }
                CalleeKind::Bound { recv, callee: inner } => {
                    args.insert(0, recv);
                    callee = inner;
                }
                CalleeKind::Wrapped(wrapped) => {
                    let mut combined = wrapped.args.clone();
                    combined.append(&mut args);
                    args = combined;
                    named = self.merge_named(wrapped.named, named)?;
                    callee = wrapped.callee;
                }
                CalleeKind::ObjectType => {
                    let Value::Ref(type_id) = callee else {
                        return Err(RunError::internal("object type is not a heap value"));
                    };
                    let value = self.instantiate(type_id, args, named)?;
                    return Ok(CallResult::Value(value));
                }
                CalleeKind::Regexp => {
                    let Value::Ref(id) = callee else {
                        return Err(RunError::internal("regexp is not a heap value"));
                    };
                    let text = args
                        .first()
                        .and_then(|v| self.heap.str_of(*v))
                        .ok_or_else(|| ErrKind::type_error("regexp expects one string argument"))?
                        .to_owned();
                    let HeapData::Regexp(regexp) = self.heap.get(id) else {
                        return Err(RunError::internal("regexp slot changed type"));
                    };
                    return Ok(CallResult::Value(Value::Bool(regexp.is_match(&text))));
                }
                CalleeKind::Reflect(reflect) => {
                    let call = self.host_call_of(args, named)?;
                    let result = reflect.lock().call(call);
                    return match result {
                        Some(Ok(object)) => Ok(CallResult::Value(object_to_value(&mut self.heap, &object))),
                        Some(Err(err)) => Err(ErrKind::Error.err(err.to_string())),
                        None => Err(ErrKind::not_callable("reflect")),
                    };
                }
                CalleeKind::NotCallable(name) => return Err(ErrKind::not_callable(name)),
            }
        }
    }

    fn invoke_host(&mut self, host: &HostFunc, args: Vec<Value>, named: Option<Value>) -> RunResult<Value> {
        let call = self.host_call_of(args, named)?;
        let result = if self.recover {
            match catch_unwind(AssertUnwindSafe(|| host.invoke(call))) {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "host function panicked".to_owned());
                    return Err(ErrKind::Error.err(message));
                }
            }
        } else {
            host.invoke(call)
        };
        match result {
            Ok(object) => Ok(object_to_value(&mut self.heap, &object)),
            Err(err) => Err(ErrKind::Error.err(format!("{}: {}", err.name, err.message))),
        }
    }

    fn host_call_of(&mut self, args: Vec<Value>, named: Option<Value>) -> RunResult<HostCall> {
        let mut call = HostCall::default();
        for arg in args {
            call.args.push(value_to_object(&self.heap, arg)?);
        }
        let view = self.named_view(named)?;
        for pair in view.remaining(&self.heap) {
            let key = self.key_string(pair.key)?;
            let value = value_to_object(&self.heap, pair.value)?;
            call.named.push((key, value));
        }
        Ok(call)
    }

    /// Normalizes a named-argument source into a consumption-tracking view.
    pub(crate) fn named_view(&mut self, named: Option<Value>) -> RunResult<NamedArgs> {
        let Some(value) = named else {
            return Ok(NamedArgs::new(Vec::new()));
        };
        match value {
            Value::Nil => Ok(NamedArgs::new(Vec::new())),
            Value::Ref(id) => match self.heap.get(id) {
                HeapData::KeyValueArray(_) => Ok(NamedArgs::new(vec![id])),
                HeapData::NamedArgs(view) => Ok(view.clone()),
                HeapData::Dict(dict) => {
                    let pairs: Vec<(String, Value)> = dict.sorted_keys()
                        .into_iter()
                        .map(|k| {
                            let v = dict.get(&k).unwrap_or(Value::Nil);
                            (k, v)
                        })
                        .collect();
                    let mut kva = KeyValueArray::new();
                    for (key, value) in pairs {
                        let key = self.heap.alloc_str(key);
                        kva.push(key, value);
                    }
                    let id = self.heap.alloc(HeapData::KeyValueArray(kva));
                    Ok(NamedArgs::new(vec![id]))
                }
                other => Err(ErrKind::type_error(format!(
                    "named arguments must be a dict or keyValueArray, got {}",
                    other.type_name()
                ))),
            },
            other => Err(ErrKind::type_error(format!(
                "named arguments must be a dict or keyValueArray, got {}",
                type_name(other, &self.heap)
            ))),
        }
    }

    /// Flattens a named source into a KeyValueArray slot (builtin calls).
    pub(crate) fn named_to_kva_id(&mut self, named: Option<Value>) -> RunResult<Option<HeapId>> {
        let Some(value) = named else { return Ok(None) };
        if let Value::Ref(id) = value
            && matches!(self.heap.get(id), HeapData::KeyValueArray(_))
        {
            return Ok(Some(id));
        }
        let view = self.named_view(Some(value))?;
        let mut kva = KeyValueArray::new();
        for pair in view.remaining(&self.heap) {
            kva.push(pair.key, pair.value);
        }
        Ok(Some(self.heap.alloc(HeapData::KeyValueArray(kva))))
    }

    /// Concatenates stored and fresh named arguments (wrap-calls).
    fn merge_named(&mut self, stored: Option<HeapId>, fresh: Option<Value>) -> RunResult<Option<Value>> {
        match (stored, fresh) {
            (None, fresh) => Ok(fresh),
            (Some(id), None) => Ok(Some(Value::Ref(id))),
            (Some(id), Some(fresh)) => {
                let mut combined = match self.heap.get(id) {
                    HeapData::KeyValueArray(kva) => kva.clone(),
                    _ => KeyValueArray::new(),
                };
                let view = self.named_view(Some(fresh))?;
                for pair in view.remaining(&self.heap) {
                    combined.pairs.push(pair);
                }
                Ok(Some(self.heap.alloc_value(HeapData::KeyValueArray(combined))))
            }
        }
    }

    // ------------------------------------------------------------------
    // Frame binding
    // ------------------------------------------------------------------

    /// Pushes a frame for a main body, module body, or closure call.
    pub(crate) fn bind_and_push(
        &mut self,
        target: BindTarget,
        args: Vec<Value>,
        named: Option<Value>,
        call_pos: Option<Pos>,
    ) -> RunResult<()> {
        match target {
            BindTarget::Main => {
                let func = &self.program.main;
                // Host arguments are advisory: missing `param` slots bind
                // nil, surplus arguments are dropped (hosts pass argv
                // unconditionally).
                let mut args = args;
                let want = func.params.positional.len();
                if func.params.variadic.is_none() {
                    args.truncate(want);
                }
                while args.len() < want {
                    args.push(Value::Nil);
                }
                self.push_frame_for(func, Vec::new(), args, named, Value::Nil, FrameKind::Main, call_pos)
            }
            BindTarget::Module(index) => {
                let func_id = self.program.modules[index as usize].func;
                let func = self.program.func(func_id);
                self.push_frame_for(func, Vec::new(), args, named, Value::Nil, FrameKind::Module(index), call_pos)
            }
        }
    }

    fn push_function_frame(
        &mut self,
        func: &'p CompiledFunction,
        free: Vec<HeapId>,
        args: Vec<Value>,
        named: Option<Value>,
        callee: Value,
        call_pos: Option<Pos>,
    ) -> RunResult<()> {
        self.push_frame_for(func, free, args, named, callee, FrameKind::Function, call_pos)
    }

    fn push_frame_for(
        &mut self,
        func: &'p CompiledFunction,
        free: Vec<HeapId>,
        args: Vec<Value>,
        named: Option<Value>,
        callee: Value,
        kind: FrameKind,
        call_pos: Option<Pos>,
    ) -> RunResult<()> {
        if self.frames.len() >= self.limits.max_frame_depth {
            return Err(ErrKind::StackOverflowError.err(format!(
                "frame depth limit {} exceeded",
                self.limits.max_frame_depth
            )));
        }
        let bound = self.bind_slots(func, &args, named, callee)?;
        let base = self.stack.len();
        self.stack.extend_from_slice(&bound.slots);
        let cells = self.make_cells(func, base)?;
        if self.tracer.enabled() {
            self.tracer.trace(TraceEvent::Call {
                name: func.name.to_string(),
                depth: self.frames.len() + 1,
            });
        }
        self.frames.push(CallFrame {
            func,
            code: &func.code,
            ip: 0,
            base,
            cells,
            free,
            defers: Vec::new(),
            call_pos,
            kind,
            call_info: bound.call_info,
        });
        self.run_default_fragments(func, base, bound.pending_defaults)?;
        Ok(())
    }

    /// Tail call: rewrites the current frame in place, preserving its base,
    /// kind, and accumulated defers.
    fn rebind_tail(
        &mut self,
        func: &'p CompiledFunction,
        free: Vec<HeapId>,
        args: Vec<Value>,
        named: Option<Value>,
        callee: Value,
    ) -> RunResult<()> {
        let bound = self.bind_slots(func, &args, named, callee)?;
        let base = self.frame().base;
        self.stack.truncate(base);
        self.stack.extend_from_slice(&bound.slots);
        let cells = self.make_cells(func, base)?;
        {
            let frame = self.frame_mut();
            frame.func = func;
            frame.code = &func.code;
            frame.ip = 0;
            frame.cells = cells;
            frame.free = free;
            frame.call_info = bound.call_info;
        }
        self.run_default_fragments(func, base, bound.pending_defaults)?;
        Ok(())
    }

    fn make_cells(&mut self, func: &CompiledFunction, base: usize) -> RunResult<Vec<HeapId>> {
        let mut cells = Vec::with_capacity(func.cell_count as usize);
        for index in 0..func.cell_count as usize {
            let seed = match func.cell_param_slots.get(index).copied().flatten() {
                Some(slot) => self.stack[base + slot as usize],
                None => Value::Nil,
            };
            cells.push(self.heap.alloc_cell(seed));
        }
        Ok(cells)
    }

    /// Runs default fragments for absent named parameters, in declaration
    /// order, each as a fragment frame over the callee's base.
    fn run_default_fragments(
        &mut self,
        func: &'p CompiledFunction,
        base: usize,
        pending: Vec<(u16, u16)>,
    ) -> RunResult<()> {
        for (fragment, slot) in pending {
            let code = func
                .default_fragments
                .get(fragment as usize)
                .ok_or_else(|| RunError::internal("default fragment index out of range"))?;
            let (cells, free) = {
                let frame = self.frame();
                (frame.cells.clone(), frame.free.clone())
            };
            self.frames.push(CallFrame {
                func,
                code,
                ip: 0,
                base,
                cells,
                free,
                defers: Vec::new(),
                call_pos: None,
                kind: FrameKind::Fragment,
                call_info: None,
            });
            let floor = self.frames.len() - 1;
            let value = self.run_loop(floor)?;
            self.stack[base + slot as usize] = value;
            // A captured parameter's cell observes its default too.
            if let Some(cell_index) = func
                .cell_param_slots
                .iter()
                .position(|entry| *entry == Some(slot))
            {
                let cell = self.frame().cells[cell_index];
                self.heap.cell_set(cell, value);
            }
        }
        Ok(())
    }

    fn bind_slots(
        &mut self,
        func: &CompiledFunction,
        args: &[Value],
        named: Option<Value>,
        callee: Value,
    ) -> RunResult<BoundSlots> {
        let sig = &func.params;
        let positional_count = sig.positional.len();
        if args.len() < positional_count {
            return Err(ErrKind::wrong_args(&func.name, sig.arity(), args.len()));
        }

        let mut slots: Vec<Value> = Vec::with_capacity(func.local_count as usize);
        slots.extend_from_slice(&args[..positional_count]);
        let extras = &args[positional_count..];
        if sig.variadic.is_some() {
            let tail = self.heap.alloc_array(extras.to_vec());
            slots.push(tail);
        } else if !extras.is_empty() {
            return Err(ErrKind::wrong_args(&func.name, sig.arity(), args.len()));
        }

        let mut view = self.named_view(named)?;
        let mut pending_defaults: Vec<(u16, u16)> = Vec::new();
        for (index, param) in sig.named.iter().enumerate() {
            let slot = sig.named_slot(index);
            match view.take(&self.heap, &param.name) {
                Some(value) => slots.push(value),
                None => {
                    slots.push(Value::Nil);
                    if let Some(fragment) = param.default {
                        pending_defaults.push((fragment, slot));
                    }
                }
            }
        }
        let rest = view.remaining(&self.heap);
        if sig.named_variadic_slot().is_some() {
            let mut kva = KeyValueArray::new();
            kva.pairs = rest;
            slots.push(self.heap.alloc_value(HeapData::KeyValueArray(kva)));
        } else if !rest.is_empty() {
            let mut names = Vec::new();
            for pair in &rest {
                names.push(self.key_string(pair.key)?);
            }
            return Err(ErrKind::WrongNumArgumentsError.err(format!(
                "{}: unknown named arguments: {}",
                func.name,
                names.join(", ")
            )));
        }

        while slots.len() < func.local_count as usize {
            slots.push(Value::Nil);
        }

        let call_info = if func.captures_call_info {
            let args_value = self.heap.alloc_array(args.to_vec());
            let named_value = self.heap.alloc_value(HeapData::NamedArgs(view));
            Some(CallInfo {
                args: args_value,
                named: named_value,
                callee,
            })
        } else {
            None
        };

        Ok(BoundSlots {
            slots,
            pending_defaults,
            call_info,
        })
    }

    // ------------------------------------------------------------------
    // Object types and overload registration
    // ------------------------------------------------------------------

    /// Calls a user type: allocate the instance, then run the constructor
    /// (or bind positional arguments to the declared fields in order).
    fn instantiate(&mut self, type_id: HeapId, args: Vec<Value>, named: Option<Value>) -> RunResult<Value> {
        let (name, fields, init) = match self.heap.get(type_id) {
            HeapData::ObjectType(ty) => (ty.name.clone(), ty.fields.clone(), ty.init),
            _ => return Err(RunError::internal("instantiate on a non-type")),
        };
        let mut instance_fields = ahash::AHashMap::with_capacity(fields.len());
        for (field, default) in &fields {
            instance_fields.insert(field.clone(), *default);
        }
        let instance = self.heap.alloc_value(HeapData::Instance(crate::types::Instance {
            ty: type_id,
            fields: instance_fields,
        }));

        if let Some(init) = init {
            let mut init_args = Vec::with_capacity(args.len() + 1);
            init_args.push(instance);
            init_args.extend(args);
            self.call_value_nested(init, init_args, named)?;
            return Ok(instance);
        }

        if args.len() > fields.len() {
            return Err(ErrKind::wrong_args(&name, fields.len(), args.len()));
        }
        let field_names: Vec<String> = fields.keys().cloned().collect();
        for (value, field) in args.iter().zip(&field_names) {
            self.set_instance_field(instance, field, *value)?;
        }
        let view = self.named_view(named)?;
        for pair in view.remaining(&self.heap) {
            let key = self.key_string(pair.key)?;
            self.set_instance_field(instance, &key, pair.value)?;
        }
        Ok(instance)
    }

    fn set_instance_field(&mut self, instance: Value, field: &str, value: Value) -> RunResult<()> {
        let Value::Ref(id) = instance else {
            return Err(RunError::internal("instance is not a heap value"));
        };
        match self.heap.get_mut(id) {
            HeapData::Instance(inst) => {
                inst.fields.insert(field.to_owned(), value);
                Ok(())
            }
            _ => Err(RunError::internal("instance slot changed type")),
        }
    }

    pub(super) fn exec_make_closure(&mut self, fn_index: u16, free_count: usize) -> RunResult<()> {
        let refs = self.pop_n(free_count)?;
        let mut cells = Vec::with_capacity(free_count);
        for value in refs {
            match value {
                Value::Ref(id) if matches!(self.heap.get(id), HeapData::Cell(_)) => cells.push(id),
                _ => return Err(RunError::internal("closure capture is not a cell")),
            }
        }
        let closure = Closure::new(FuncId(u32::from(fn_index)), cells);
        let value = self.heap.alloc_value(HeapData::Closure(closure));
        self.push(value);
        Ok(())
    }

    pub(super) fn exec_add_call_method(&mut self) -> RunResult<()> {
        let overload = self.pop()?;
        let base = self.pop()?;
        self.add_call_method(base, overload)?;
        self.push(base);
        Ok(())
    }

    /// Appends `overload` (a closure with positional type annotations) to
    /// `base`'s method table, creating the table on first use. A base that
    /// itself declares annotations becomes the table's first overload so
    /// declaration order is preserved.
    pub(crate) fn add_call_method(&mut self, base: Value, overload: Value) -> RunResult<()> {
        let sig = self.overload_sig(overload)?;
        let Value::Ref(base_id) = base else {
            return Err(ErrKind::type_error("addCallMethod requires a callable base"));
        };
        let base_sig = match self.heap.get(base_id) {
            HeapData::Closure(c) => self.program.func(c.func).params.type_sig.clone(),
            HeapData::HostFunc(_) => None,
            other => return Err(ErrKind::type_error(format!("'{}' cannot carry call methods", other.type_name()))),
        };
        let entry = Overload { sig, callee: overload };
        match self.heap.get_mut(base_id) {
            HeapData::Closure(c) => {
                let table = c.methods.get_or_insert_with(MethodTable::default);
                if table.overloads.is_empty()
                    && let Some(own) = base_sig
                {
                    table.overloads.push(Overload { sig: own, callee: base });
                }
                table.overloads.push(entry);
            }
            HeapData::HostFunc(h) => {
                h.methods.get_or_insert_with(MethodTable::default).overloads.push(entry);
            }
            _ => return Err(RunError::internal("callable slot changed type")),
        }
        Ok(())
    }

    fn overload_sig(&self, overload: Value) -> RunResult<TypeSig> {
        let Value::Ref(id) = overload else {
            return Err(ErrKind::type_error("call method must be a function"));
        };
        match self.heap.get(id) {
            HeapData::Closure(c) => self
                .program
                .func(c.func)
                .params
                .type_sig
                .clone()
                .ok_or_else(|| ErrKind::type_error("call method requires positional type annotations")),
            other => Err(ErrKind::type_error(format!("'{}' cannot be a call method", other.type_name()))),
        }
    }
}

fn same_ref(a: Value, b: Value) -> bool {
    matches!((a, b), (Value::Ref(x), Value::Ref(y)) if x == y)
}

/// Output of [`Vm::bind_slots`].
struct BoundSlots {
    slots: Vec<Value>,
    /// `(fragment index, slot)` pairs for absent named parameters.
    pending_defaults: Vec<(u16, u16)>,
    call_info: Option<CallInfo>,
}
