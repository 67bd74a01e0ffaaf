//! AST to bytecode compiler.
//!
//! A single top-down walk with one emit buffer per function. Scope handling
//! lives in [`crate::symbol`]; this module lowers statements and expressions,
//! folds literal arithmetic behind `optimize_constants`, rewrites tail calls,
//! registers overloads for typed re-declarations, and links imported modules
//! (compiled once, cycles detected by the in-progress stack).

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use super::{
    builder::{CodeBuilder, CodeError, JumpSite},
    code::{Code, CompiledFunction, Constant, FuncId, ModuleEntry, Program},
    op::{self, Opcode},
};
use crate::{
    ast::{AssignKind, BinOp, Chunk, Expr, FuncLit, NamedParam, Pos, Stmt, UnOp},
    builtins::Builtins,
    errors::CompileError,
    run::CompileOptions,
    signature::{NamedParamSpec, Signature},
    symbol::{CellRef, DefineError, FuncScopeInfo, Symbol, SymbolScope, SymbolTable},
    types::{TypeSet, TypeSig, TypeTag},
};

type CResult<T> = Result<T, CompileError>;

/// Compiles a parsed chunk into a runnable [`Program`].
pub fn compile(chunk: &Chunk, options: &CompileOptions) -> Result<Program, CompileError> {
    Compiler::new(options).compile_chunk(chunk)
}

/// Per-loop fixup state.
struct LoopCtx {
    break_sites: Vec<JumpSite>,
    continue_sites: Vec<JumpSite>,
    /// Backward continue target when it is already known (`for ... in`).
    continue_known: Option<usize>,
    /// `trys.len()` at loop entry; break/continue unwind deeper handlers.
    try_depth: usize,
}

/// Per-`try` state: the finally body is re-emitted on return/break paths.
struct TryCtx {
    finally: Option<Vec<Stmt>>,
}

/// Emit state for one function being compiled.
struct FuncCtx {
    builder: CodeBuilder,
    loops: Vec<LoopCtx>,
    trys: Vec<TryCtx>,
    defaults: Vec<Code>,
    captures_call_info: bool,
    body_started: bool,
}

impl FuncCtx {
    fn new() -> Self {
        Self {
            builder: CodeBuilder::new(),
            loops: Vec::new(),
            trys: Vec::new(),
            defaults: Vec::new(),
            captures_call_info: false,
            body_started: false,
        }
    }
}

struct Compiler<'a> {
    options: &'a CompileOptions,
    funcs: Vec<CompiledFunction>,
    modules: Vec<ModuleEntry>,
    module_index: AHashMap<String, u16>,
    /// Import names currently being compiled, for cycle detection.
    compiling: Vec<String>,
    /// Mangled global name (`module:name`) to slot.
    globals: IndexMap<String, u16>,
    global_names: Vec<String>,
    symbols: SymbolTable,
    ctx: Vec<FuncCtx>,
    file: String,
    /// Mangling prefix for the chunk being compiled; empty for the main one.
    module_prefix: String,
}

impl<'a> Compiler<'a> {
    fn new(options: &'a CompileOptions) -> Self {
        Self {
            options,
            funcs: Vec::new(),
            modules: Vec::new(),
            module_index: AHashMap::new(),
            compiling: Vec::new(),
            globals: IndexMap::new(),
            global_names: Vec::new(),
            symbols: SymbolTable::new_file(AHashSet::new()),
            ctx: Vec::new(),
            file: String::new(),
            module_prefix: String::new(),
        }
    }

    fn err(&self, message: impl Into<String>, pos: Pos) -> CompileError {
        CompileError::new(message, self.file.clone(), pos)
    }

    fn code_err(&self, error: CodeError, pos: Pos) -> CompileError {
        self.err(error.to_string(), pos)
    }

    fn trace(&self, message: impl FnOnce() -> String) {
        if self.options.trace_compiler {
            eprintln!("[tarn compiler] {}", message());
        }
    }

    fn b(&mut self) -> &mut CodeBuilder {
        &mut self.ctx.last_mut().expect("no open function context").builder
    }

    fn fctx(&mut self) -> &mut FuncCtx {
        self.ctx.last_mut().expect("no open function context")
    }

    fn compile_chunk(mut self, chunk: &Chunk) -> Result<Program, CompileError> {
        self.file = chunk.file.clone();
        self.symbols = SymbolTable::new_file(captured_names(&chunk.stmts));
        let predefined = self.options.predefined_globals.clone();
        for name in &predefined {
            let slot = self.global_slot(name);
            self.symbols
                .define_global(name, slot, false)
                .map_err(|e| self.define_err(e, Pos::default()))?;
        }
        let main = self.compile_body(chunk, "main", false)?;
        self.trace(|| format!("compiled {} functions, {} modules", self.funcs.len(), self.modules.len()));
        Ok(Program {
            main,
            funcs: self.funcs,
            modules: self.modules,
            global_names: self.global_names,
        })
    }

    /// Compiles a file or module body into a parameterless-or-`param`-driven
    /// function.
    fn compile_body(&mut self, chunk: &Chunk, module_name: &str, is_module: bool) -> CResult<CompiledFunction> {
        self.ctx.push(FuncCtx::new());
        let mut signature = Signature::default();
        for stmt in &chunk.stmts {
            self.compile_stmt(stmt, Some(&mut signature))?;
        }
        self.b().emit(Opcode::LoadNil);
        self.b().emit(Opcode::Return);
        let ctx = self.ctx.pop().expect("body context");
        // The file scope stays open for the whole program; take a snapshot of
        // its layout instead of closing it.
        let info = self.symbols.file_scope_info();
        Ok(self.finish_function(ctx, info, signature, "<main>", module_name, is_module))
    }

    fn finish_function(
        &mut self,
        ctx: FuncCtx,
        info: FuncScopeInfo,
        signature: Signature,
        name: &str,
        module_name: &str,
        is_module: bool,
    ) -> CompiledFunction {
        CompiledFunction {
            name: name.into(),
            file: self.file.clone().into(),
            module_name: module_name.into(),
            is_module,
            code: ctx.builder.build(),
            params: signature,
            local_count: info.num_locals,
            cell_count: info.num_cells,
            cell_param_slots: info.cell_param_slots,
            free_count: info.free.len() as u16,
            default_fragments: ctx.defaults,
            captures_call_info: ctx.captures_call_info,
        }
    }

    // ------------------------------------------------------------------
    // Globals and symbols
    // ------------------------------------------------------------------

    fn global_slot(&mut self, name: &str) -> u16 {
        let mangled = format!("{}{}", self.module_prefix, name);
        if let Some(&slot) = self.globals.get(&mangled) {
            return slot;
        }
        let slot = self.global_names.len() as u16;
        self.globals.insert(mangled, slot);
        self.global_names.push(name.to_owned());
        slot
    }

    fn define_err(&self, error: DefineError, pos: Pos) -> CompileError {
        match error {
            DefineError::Redeclared(name) => self.err(format!("'{name}' redeclared in this block"), pos),
        }
    }

    /// Declares a new name where the statement appears: a global at the top
    /// block of a file, a local everywhere else.
    fn declare(&mut self, name: &str, constant: bool, pos: Pos) -> CResult<Symbol> {
        if self.symbols.in_file_scope() && self.symbols.at_scope_top() {
            let slot = self.global_slot(name);
            self.symbols
                .define_global(name, slot, constant)
                .map_err(|e| self.define_err(e, pos))
        } else {
            self.symbols
                .define_local(name, constant)
                .map_err(|e| self.define_err(e, pos))
        }
    }

    fn load_symbol(&mut self, symbol: &Symbol, pos: Pos) -> CResult<()> {
        match symbol.scope {
            SymbolScope::Global => self.b().emit_u16(Opcode::LoadGlobal, symbol.index),
            SymbolScope::Local => match symbol.cell {
                Some(cell) => {
                    let cell = self.narrow(cell, pos)?;
                    self.b().emit_u8(Opcode::LoadCell, cell);
                }
                None => {
                    let slot = self.narrow(symbol.index, pos)?;
                    self.b().emit_u8(Opcode::LoadLocal, slot);
                }
            },
            SymbolScope::Free => {
                let index = self.narrow(symbol.index, pos)?;
                self.b().emit_u8(Opcode::LoadFree, index);
            }
            SymbolScope::Builtin => {
                let (tag, index) = Builtins::decode_parts(symbol.index);
                self.b().emit_u8_u8(Opcode::LoadBuiltin, tag, index);
            }
        }
        Ok(())
    }

    fn store_symbol(&mut self, symbol: &Symbol, pos: Pos) -> CResult<()> {
        if symbol.constant {
            return Err(self.err(format!("cannot assign to constant '{}'", symbol.name), pos));
        }
        match symbol.scope {
            SymbolScope::Global => self.b().emit_u16(Opcode::StoreGlobal, symbol.index),
            SymbolScope::Local => match symbol.cell {
                Some(cell) => {
                    let cell = self.narrow(cell, pos)?;
                    self.b().emit_u8(Opcode::StoreCell, cell);
                }
                None => {
                    let slot = self.narrow(symbol.index, pos)?;
                    self.b().emit_u8(Opcode::StoreLocal, slot);
                }
            },
            SymbolScope::Free => {
                let index = self.narrow(symbol.index, pos)?;
                self.b().emit_u8(Opcode::StoreFree, index);
            }
            SymbolScope::Builtin => {
                return Err(self.err(format!("cannot assign to builtin '{}'", symbol.name), pos));
            }
        }
        Ok(())
    }

    fn narrow(&self, value: u16, pos: Pos) -> CResult<u8> {
        u8::try_from(value).map_err(|_| self.err("too many locals in one function", pos))
    }

    fn resolve_or_builtin(&mut self, name: &str, pos: Pos) -> CResult<Symbol> {
        if let Some(symbol) = self.symbols.resolve(name) {
            return Ok(symbol);
        }
        // Builtins resolve only when nothing else matched.
        if let Some(builtin) = Builtins::resolve(name) {
            return Ok(Symbol {
                name: name.to_owned(),
                scope: SymbolScope::Builtin,
                index: builtin.encode(),
                cell: None,
                constant: true,
            });
        }
        Err(self.err(format!("unresolved reference '{name}'"), pos))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> CResult<()> {
        self.symbols.enter_block();
        for stmt in stmts {
            self.compile_stmt(stmt, None)?;
        }
        self.symbols.leave_block();
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt, body_sig: Option<&mut Signature>) -> CResult<()> {
        match stmt {
            Stmt::Param { names, pos } => {
                let Some(signature) = body_sig else {
                    return Err(self.err("param declaration is only legal at the top of a file or function", *pos));
                };
                if self.fctx().body_started || !self.symbols.at_scope_top() {
                    return Err(self.err("param declaration must precede other statements", *pos));
                }
                for name in names {
                    self.symbols.define_param(name).map_err(|e| self.define_err(e, *pos))?;
                    signature.positional.push(name.as_str().into());
                }
                return Ok(());
            }
            Stmt::Global { names, pos } => {
                if !self.symbols.at_scope_top() {
                    return Err(self.err("global declaration is only legal at the top of a file or function", *pos));
                }
                for name in names {
                    // Resolve against the main namespace, not the module's.
                    let slot = self.global_slot_unprefixed(name);
                    self.symbols
                        .define_global(name, slot, false)
                        .map_err(|e| self.define_err(e, *pos))?;
                }
                return Ok(());
            }
            _ => {}
        }
        self.fctx().body_started = true;
        match stmt {
            Stmt::Param { .. } | Stmt::Global { .. } => unreachable!("handled above"),
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.b().emit(Opcode::Pop);
            }
            Stmt::Var { names, values, pos } => {
                if !values.is_empty() && values.len() != names.len() {
                    return Err(self.err("var declaration arity mismatch", *pos));
                }
                for (i, name) in names.iter().enumerate() {
                    match values.get(i) {
                        Some(value) => self.compile_expr(value)?,
                        None => self.b().emit(Opcode::LoadNil),
                    }
                    let symbol = self.declare(name, false, *pos)?;
                    self.store_symbol(&symbol, *pos)?;
                }
            }
            Stmt::Const { name, value, pos } => {
                self.compile_expr(value)?;
                let symbol = self.declare(name, true, *pos)?;
                // Store bypasses the const check: this is the initialization.
                let mut init = symbol;
                init.constant = false;
                self.store_symbol(&init, *pos)?;
            }
            Stmt::ShortDecl { name, value, pos } => {
                if self.symbols.declared_in_block(name) {
                    return Err(self.err(format!("'{name}' redeclared in this block"), *pos));
                }
                self.compile_expr(value)?;
                let symbol = self.declare(name, false, *pos)?;
                self.store_symbol(&symbol, *pos)?;
            }
            Stmt::Assign { target, kind, value, pos } => self.compile_assign(target, *kind, value, *pos)?,
            Stmt::Return { values, pos } => self.compile_return(values, *pos)?,
            Stmt::If { cond, then, els, pos } => {
                self.b().set_pos(*pos);
                self.compile_expr(cond)?;
                let to_else = self.b().emit_jump(Opcode::JumpIfFalse);
                self.compile_stmts(then)?;
                let to_end = self.b().emit_jump(Opcode::Jump);
                self.b().patch_jump(to_else).map_err(|e| self.code_err(e, *pos))?;
                self.compile_stmts(els)?;
                self.b().patch_jump(to_end).map_err(|e| self.code_err(e, *pos))?;
            }
            Stmt::For { init, cond, post, body, els, pos } => self.compile_for(init.as_deref(), cond.as_ref(), post.as_deref(), body, els, *pos)?,
            Stmt::ForIn { key, value, iter, body, els, pos } => self.compile_forin(key.as_deref(), value, iter, body, els, *pos)?,
            Stmt::Break(pos) => self.compile_break(*pos)?,
            Stmt::Continue(pos) => self.compile_continue(*pos)?,
            Stmt::Throw { value, pos } => {
                self.compile_expr(value)?;
                self.b().set_pos(*pos);
                self.b().emit(Opcode::Throw);
            }
            Stmt::Try { body, catch, finally, pos } => self.compile_try(body, catch.as_ref(), finally.as_ref(), *pos)?,
            Stmt::Defer { call, pos } => self.compile_defer(call, *pos)?,
            Stmt::Block(stmts, _) => self.compile_stmts(stmts)?,
            Stmt::FuncDecl { name, func, pos } => self.compile_func_decl(name, func, *pos)?,
        }
        Ok(())
    }

    fn compile_assign(&mut self, target: &Expr, kind: AssignKind, value: &Expr, pos: Pos) -> CResult<()> {
        self.b().set_pos(pos);
        match target {
            Expr::Ident(name, _) => {
                let symbol = self.resolve_or_builtin(name, pos)?;
                match kind {
                    AssignKind::Plain => {
                        self.compile_expr(value)?;
                        self.store_symbol(&symbol, pos)?;
                    }
                    AssignKind::Op(op) => {
                        self.load_symbol(&symbol, pos)?;
                        self.compile_expr(value)?;
                        self.b().emit_u8(Opcode::BinaryOp, op::binop_code(op));
                        self.store_symbol(&symbol, pos)?;
                    }
                    AssignKind::OrElse => {
                        self.load_symbol(&symbol, pos)?;
                        let skip = self.b().emit_jump(Opcode::JumpIfTrue);
                        self.compile_expr(value)?;
                        self.store_symbol(&symbol, pos)?;
                        self.b().patch_jump(skip).map_err(|e| self.code_err(e, pos))?;
                    }
                    AssignKind::NilElse => {
                        self.load_symbol(&symbol, pos)?;
                        let assign = self.b().emit_jump(Opcode::JumpIfNil);
                        let skip = self.b().emit_jump(Opcode::Jump);
                        self.b().patch_jump(assign).map_err(|e| self.code_err(e, pos))?;
                        self.compile_expr(value)?;
                        self.store_symbol(&symbol, pos)?;
                        self.b().patch_jump(skip).map_err(|e| self.code_err(e, pos))?;
                    }
                }
            }
            Expr::Index { obj, index, pos: target_pos } => {
                self.compile_indexed_assign(obj, IndexKey::Expr(index), kind, value, *target_pos)?;
            }
            Expr::Selector { obj, name, pos: target_pos } | Expr::OptSelector { obj, name, pos: target_pos } => {
                self.compile_indexed_assign(obj, IndexKey::Name(name), kind, value, *target_pos)?;
            }
            other => return Err(self.err("expression is not assignable", other.pos())),
        }
        Ok(())
    }

    /// Shared lowering for `obj[i] = v` and `obj.name = v` targets. The
    /// object (and index) expressions are re-evaluated for the read of a
    /// compound assignment.
    fn compile_indexed_assign(
        &mut self,
        obj: &Expr,
        key: IndexKey<'_>,
        kind: AssignKind,
        value: &Expr,
        pos: Pos,
    ) -> CResult<()> {
        let push_key = |this: &mut Self| -> CResult<()> {
            match key {
                IndexKey::Expr(index) => this.compile_expr(index),
                IndexKey::Name(name) => this.push_str_const(name, pos),
            }
        };
        match kind {
            AssignKind::Plain => {
                self.compile_expr(obj)?;
                push_key(self)?;
                self.compile_expr(value)?;
                self.b().emit(Opcode::IndexSet);
            }
            AssignKind::Op(op) => {
                self.compile_expr(obj)?;
                push_key(self)?;
                self.compile_expr(obj)?;
                push_key(self)?;
                self.b().emit(Opcode::IndexGet);
                self.compile_expr(value)?;
                self.b().emit_u8(Opcode::BinaryOp, op::binop_code(op));
                self.b().emit(Opcode::IndexSet);
            }
            AssignKind::OrElse | AssignKind::NilElse => {
                self.compile_expr(obj)?;
                push_key(self)?;
                self.compile_expr(obj)?;
                push_key(self)?;
                self.b().emit(Opcode::IndexGet);
                let (assign, skip_current) = if kind == AssignKind::NilElse {
                    let assign = self.b().emit_jump(Opcode::JumpIfNil);
                    (Some(assign), None)
                } else {
                    let skip = self.b().emit_jump(Opcode::JumpIfTrue);
                    (None, Some(skip))
                };
                match (assign, skip_current) {
                    (Some(assign), None) => {
                        // Current value is non-nil: drop obj/key and skip.
                        let skip = self.b().emit_jump(Opcode::Jump);
                        self.b().patch_jump(assign).map_err(|e| self.code_err(e, pos))?;
                        self.compile_expr(value)?;
                        self.b().emit(Opcode::IndexSet);
                        let done = self.b().emit_jump(Opcode::Jump);
                        self.b().patch_jump(skip).map_err(|e| self.code_err(e, pos))?;
                        self.b().emit(Opcode::Pop);
                        self.b().emit(Opcode::Pop);
                        self.b().patch_jump(done).map_err(|e| self.code_err(e, pos))?;
                    }
                    (None, Some(skip)) => {
                        self.compile_expr(value)?;
                        self.b().emit(Opcode::IndexSet);
                        let done = self.b().emit_jump(Opcode::Jump);
                        self.b().patch_jump(skip).map_err(|e| self.code_err(e, pos))?;
                        self.b().emit(Opcode::Pop);
                        self.b().emit(Opcode::Pop);
                        self.b().patch_jump(done).map_err(|e| self.code_err(e, pos))?;
                    }
                    _ => unreachable!("exactly one jump site per kind"),
                }
            }
        }
        Ok(())
    }

    fn compile_return(&mut self, values: &[Expr], pos: Pos) -> CResult<()> {
        self.b().set_pos(pos);
        match values {
            [] => {
                self.b().emit(Opcode::LoadNil);
                self.unwind_trys(0)?;
                self.b().emit(Opcode::Return);
            }
            [single] => {
                // A call in tail position reuses the frame, unless handlers
                // are active in this function.
                let can_tail = self.fctx().trys.is_empty();
                self.compile_tail_expr(single, can_tail)?;
            }
            many => {
                for value in many {
                    self.compile_expr(value)?;
                }
                let count = u8::try_from(many.len()).map_err(|_| self.err("too many return values", pos))?;
                self.unwind_trys(0)?;
                self.b().emit_u8(Opcode::ReturnMulti, count);
            }
        }
        Ok(())
    }

    /// Compiles `expr` in tail position: calls become TailCall, ternaries
    /// propagate tail position into both arms, everything else returns
    /// normally.
    fn compile_tail_expr(&mut self, expr: &Expr, can_tail: bool) -> CResult<()> {
        match expr {
            Expr::Call { .. } if can_tail => {
                self.compile_call(expr, true)?;
                // TailCall never falls through on the fast path, but callees
                // that are builtins complete inline and need the return.
                self.b().emit(Opcode::Return);
            }
            Expr::Ternary { cond, then, els, pos } => {
                self.compile_expr(cond)?;
                let to_else = self.b().emit_jump(Opcode::JumpIfFalse);
                self.compile_tail_expr(then, can_tail)?;
                self.b().patch_jump(to_else).map_err(|e| self.code_err(e, *pos))?;
                self.compile_tail_expr(els, can_tail)?;
            }
            other => {
                self.compile_expr(other)?;
                self.unwind_trys(0)?;
                self.b().emit(Opcode::Return);
            }
        }
        Ok(())
    }

    /// Emits handler pops (and re-runs finally bodies) for every `try`
    /// enclosing a return, innermost first, down to `depth`. The contexts are
    /// only truncated while their finally body compiles, so a return inside a
    /// finally unwinds outer handlers exactly once.
    fn unwind_trys(&mut self, depth: usize) -> CResult<()> {
        let total = self.fctx().trys.len();
        for level in (depth..total).rev() {
            self.b().emit(Opcode::TryEnd);
            let mut tail = self.fctx().trys.split_off(level);
            let finally = tail[0].finally.clone();
            if let Some(finally) = finally {
                self.compile_stmts(&finally)?;
            }
            self.fctx().trys.append(&mut tail);
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        post: Option<&Stmt>,
        body: &[Stmt],
        els: &[Stmt],
        pos: Pos,
    ) -> CResult<()> {
        self.symbols.enter_block();
        if let Some(init) = init {
            self.compile_stmt(init, None)?;
        }
        let cond_at = self.b().offset();
        let exit = match cond {
            Some(cond) => {
                self.compile_expr(cond)?;
                Some(self.b().emit_jump(Opcode::JumpIfFalse))
            }
            None => None,
        };
        let try_depth = self.fctx().trys.len();
        self.fctx().loops.push(LoopCtx {
            break_sites: Vec::new(),
            continue_sites: Vec::new(),
            continue_known: None,
            try_depth,
        });
        self.compile_stmts(body)?;
        // Continue lands on the post clause.
        let continue_sites = {
            let ctx = self.fctx().loops.last_mut().expect("loop context");
            std::mem::take(&mut ctx.continue_sites)
        };
        for site in continue_sites {
            self.b().patch_jump(site).map_err(|e| self.code_err(e, pos))?;
        }
        if let Some(post) = post {
            self.compile_stmt(post, None)?;
        }
        self.b().emit_loop(Opcode::Jump, cond_at).map_err(|e| self.code_err(e, pos))?;
        if let Some(exit) = exit {
            self.b().patch_jump(exit).map_err(|e| self.code_err(e, pos))?;
        }
        // The else clause runs exactly when the loop exited without break.
        self.compile_stmts(els)?;
        let loop_ctx = self.fctx().loops.pop().expect("loop context");
        for site in loop_ctx.break_sites {
            self.b().patch_jump(site).map_err(|e| self.code_err(e, pos))?;
        }
        self.symbols.leave_block();
        Ok(())
    }

    fn compile_forin(
        &mut self,
        key: Option<&str>,
        value: &str,
        iter: &Expr,
        body: &[Stmt],
        els: &[Stmt],
        pos: Pos,
    ) -> CResult<()> {
        self.symbols.enter_block();
        self.b().set_pos(pos);
        self.compile_expr(iter)?;
        self.b().emit(Opcode::IterInit);
        let key_symbol = match key {
            Some(name) => Some(self.symbols.define_local(name, false).map_err(|e| self.define_err(e, pos))?),
            None => None,
        };
        let value_symbol = self.symbols.define_local(value, false).map_err(|e| self.define_err(e, pos))?;
        let loop_at = self.b().offset();
        let exhausted = self.b().emit_jump(Opcode::IterNext);
        // Stack holds [key, value]; store top-down.
        self.store_symbol(&value_symbol, pos)?;
        match &key_symbol {
            Some(symbol) => self.store_symbol(symbol, pos)?,
            None => self.b().emit(Opcode::Pop),
        }
        let try_depth = self.fctx().trys.len();
        self.fctx().loops.push(LoopCtx {
            break_sites: Vec::new(),
            continue_sites: Vec::new(),
            continue_known: Some(loop_at),
            try_depth,
        });
        self.compile_stmts(body)?;
        self.b().emit_loop(Opcode::Jump, loop_at).map_err(|e| self.code_err(e, pos))?;
        // Exhaustion pops the iterator and lands on the else clause.
        self.b().patch_jump(exhausted).map_err(|e| self.code_err(e, pos))?;
        self.compile_stmts(els)?;
        let skip_close = self.b().emit_jump(Opcode::Jump);
        // Break lands here with the iterator still on the stack.
        let loop_ctx = self.fctx().loops.pop().expect("loop context");
        for site in loop_ctx.break_sites {
            self.b().patch_jump(site).map_err(|e| self.code_err(e, pos))?;
        }
        self.b().emit(Opcode::IterClose);
        self.b().patch_jump(skip_close).map_err(|e| self.code_err(e, pos))?;
        self.symbols.leave_block();
        Ok(())
    }

    fn compile_break(&mut self, pos: Pos) -> CResult<()> {
        let Some(loop_ctx) = self.fctx().loops.last() else {
            return Err(self.err("break outside a loop", pos));
        };
        let depth = loop_ctx.try_depth;
        self.unwind_trys(depth)?;
        let site = self.b().emit_jump(Opcode::Jump);
        self.fctx().loops.last_mut().expect("loop context").break_sites.push(site);
        Ok(())
    }

    fn compile_continue(&mut self, pos: Pos) -> CResult<()> {
        let Some(loop_ctx) = self.fctx().loops.last() else {
            return Err(self.err("continue outside a loop", pos));
        };
        let depth = loop_ctx.try_depth;
        let known = loop_ctx.continue_known;
        self.unwind_trys(depth)?;
        match known {
            Some(target) => self.b().emit_loop(Opcode::Jump, target).map_err(|e| self.code_err(e, pos))?,
            None => {
                let site = self.b().emit_jump(Opcode::Jump);
                self.fctx().loops.last_mut().expect("loop context").continue_sites.push(site);
            }
        }
        Ok(())
    }

    fn compile_try(
        &mut self,
        body: &[Stmt],
        catch: Option<&(String, Vec<Stmt>)>,
        finally: Option<&Vec<Stmt>>,
        pos: Pos,
    ) -> CResult<()> {
        self.b().set_pos(pos);
        let site = self.b().emit_try_begin();
        // The context is present exactly while the handler is installed at
        // runtime (the try body and the catch block), so return/break paths
        // emit the right handler pops.
        self.fctx().trys.push(TryCtx {
            finally: finally.cloned(),
        });
        self.compile_stmts(body)?;
        self.fctx().trys.pop();
        self.b().emit(Opcode::TryEnd);
        if let Some(finally) = finally {
            self.compile_stmts(finally)?;
        }
        let after_body = self.b().emit_jump(Opcode::Jump);

        let catch_at = match catch {
            Some((name, handler)) => {
                let at = self.b().offset();
                // The unwinder pushes the error value before jumping here.
                self.fctx().trys.push(TryCtx {
                    finally: finally.cloned(),
                });
                self.symbols.enter_block();
                let symbol = self.symbols.define_local(name, false).map_err(|e| self.define_err(e, pos))?;
                self.store_symbol(&symbol, pos)?;
                for stmt in handler {
                    self.compile_stmt(stmt, None)?;
                }
                self.symbols.leave_block();
                self.fctx().trys.pop();
                self.b().emit(Opcode::TryEnd);
                if let Some(finally) = finally {
                    self.compile_stmts(finally)?;
                }
                Some(at)
            }
            None => None,
        };
        let after_catch = catch_at.map(|_| self.b().emit_jump(Opcode::Jump));

        // The unwinder enters here with the handler already popped and the
        // pending error parked; FinallyEnd rethrows it.
        let finally_at = match finally {
            Some(stmts) => {
                let at = self.b().offset();
                self.compile_stmts(stmts)?;
                self.b().emit(Opcode::FinallyEnd);
                Some(at)
            }
            None => None,
        };

        self.b().patch_jump(after_body).map_err(|e| self.code_err(e, pos))?;
        if let Some(site) = after_catch {
            self.b().patch_jump(site).map_err(|e| self.code_err(e, pos))?;
        }
        self.b().patch_try_begin(site, catch_at, finally_at);
        Ok(())
    }

    fn compile_defer(&mut self, call: &Expr, pos: Pos) -> CResult<()> {
        let Expr::Call { callee, args, splat, named, named_splat, pos: call_pos } = call else {
            return Err(self.err("defer requires a call expression", pos));
        };
        let (argc, flags) = self.compile_call_operands(callee, args, *splat, named, named_splat.as_deref(), *call_pos)?;
        self.b().set_pos(pos);
        self.b().emit_u8_u8(Opcode::Defer, argc, flags);
        Ok(())
    }

    fn compile_func_decl(&mut self, name: &str, func: &FuncLit, pos: Pos) -> CResult<()> {
        let typed = func.params.positional.iter().any(|p| !p.types.is_empty());
        let existing = self.symbols.resolve(name);
        match existing {
            Some(symbol) if typed => {
                // Typed re-declaration: append to the existing callable's
                // method table instead of rebinding.
                self.load_symbol(&symbol, pos)?;
                self.compile_func_lit(func, Some(name))?;
                self.b().emit(Opcode::AddCallMethod);
                self.store_symbol(&symbol, pos)?;
            }
            _ => {
                let symbol = self.declare(name, false, pos)?;
                self.compile_func_lit(func, Some(name))?;
                self.store_symbol(&symbol, pos)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn push_str_const(&mut self, text: &str, pos: Pos) -> CResult<()> {
        let index = self
            .b()
            .add_constant(Constant::Str(text.to_owned()))
            .map_err(|e| self.code_err(e, pos))?;
        self.b().emit_u16(Opcode::LoadConst, index);
        Ok(())
    }

    fn push_const(&mut self, constant: Constant, pos: Pos) -> CResult<()> {
        let index = self.b().add_constant(constant).map_err(|e| self.code_err(e, pos))?;
        self.b().emit_u16(Opcode::LoadConst, index);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> CResult<()> {
        let folded;
        let expr = if self.options.optimize_constants {
            folded = fold_expr(expr);
            folded.as_ref().unwrap_or(expr)
        } else {
            expr
        };
        self.b().set_pos(expr.pos());
        match expr {
            Expr::Nil(_) => self.b().emit(Opcode::LoadNil),
            Expr::Bool(true, _) => self.b().emit(Opcode::LoadTrue),
            Expr::Bool(false, _) => self.b().emit(Opcode::LoadFalse),
            Expr::Int(value, pos) => match i8::try_from(*value) {
                Ok(small) => self.b().emit_i8(Opcode::LoadSmallInt, small),
                Err(_) => self.push_const(Constant::Int(*value), *pos)?,
            },
            Expr::Uint(value, pos) => self.push_const(Constant::Uint(*value), *pos)?,
            Expr::Float(value, pos) => self.push_const(Constant::Float(*value), *pos)?,
            Expr::Char(value, pos) => self.push_const(Constant::Char(*value), *pos)?,
            Expr::Str(value, pos) => self.push_const(Constant::Str(value.clone()), *pos)?,
            Expr::Bytes(value, pos) => self.push_const(Constant::Bytes(value.clone()), *pos)?,
            Expr::Decimal(text, pos) => {
                let decimal = text
                    .parse()
                    .map_err(|_| self.err(format!("invalid decimal literal '{text}'"), *pos))?;
                self.push_const(Constant::Decimal(decimal), *pos)?;
            }
            Expr::Ident(name, pos) => self.compile_ident(name, *pos)?,
            Expr::Array(items, pos) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                let count = u16::try_from(items.len()).map_err(|_| self.err("array literal too large", *pos))?;
                self.b().emit_u16(Opcode::MakeArray, count);
            }
            Expr::Dict(pairs, pos) => {
                for (key, value) in pairs {
                    self.push_str_const(key, *pos)?;
                    self.compile_expr(value)?;
                }
                let count = u16::try_from(pairs.len()).map_err(|_| self.err("dict literal too large", *pos))?;
                self.b().emit_u16(Opcode::MakeDict, count);
            }
            Expr::KeyValueArray(pairs, pos) => {
                for (key, value) in pairs {
                    self.push_str_const(key, *pos)?;
                    self.compile_expr(value)?;
                }
                let count = u16::try_from(pairs.len()).map_err(|_| self.err("literal too large", *pos))?;
                self.b().emit_u16(Opcode::MakeKvArray, count);
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.b().emit_u8(Opcode::BinaryOp, op::binop_code(*op));
            }
            Expr::Compare { op, lhs, rhs, .. } => {
                self.compile_expr(lhs)?;
                self.compile_expr(rhs)?;
                self.b().emit_u8(Opcode::Compare, op::cmpop_code(*op));
            }
            Expr::And(lhs, rhs, pos) => {
                self.compile_expr(lhs)?;
                self.b().emit(Opcode::Dup);
                let end = self.b().emit_jump(Opcode::JumpIfFalse);
                self.b().emit(Opcode::Pop);
                self.compile_expr(rhs)?;
                self.b().patch_jump(end).map_err(|e| self.code_err(e, *pos))?;
            }
            Expr::Or(lhs, rhs, pos) => {
                self.compile_expr(lhs)?;
                self.b().emit(Opcode::Dup);
                let end = self.b().emit_jump(Opcode::JumpIfTrue);
                self.b().emit(Opcode::Pop);
                self.compile_expr(rhs)?;
                self.b().patch_jump(end).map_err(|e| self.code_err(e, *pos))?;
            }
            Expr::NilCoalesce(lhs, rhs, pos) => {
                self.compile_expr(lhs)?;
                self.b().emit(Opcode::Dup);
                let fallback = self.b().emit_jump(Opcode::JumpIfNil);
                let end = self.b().emit_jump(Opcode::Jump);
                self.b().patch_jump(fallback).map_err(|e| self.code_err(e, *pos))?;
                self.b().emit(Opcode::Pop);
                self.compile_expr(rhs)?;
                self.b().patch_jump(end).map_err(|e| self.code_err(e, *pos))?;
            }
            Expr::Unary { op, expr, .. } => {
                self.compile_expr(expr)?;
                self.b().emit_u8(Opcode::UnaryOp, op::unop_code(*op));
            }
            Expr::Ternary { cond, then, els, pos } => {
                self.compile_expr(cond)?;
                let to_else = self.b().emit_jump(Opcode::JumpIfFalse);
                self.compile_expr(then)?;
                let end = self.b().emit_jump(Opcode::Jump);
                self.b().patch_jump(to_else).map_err(|e| self.code_err(e, *pos))?;
                self.compile_expr(els)?;
                self.b().patch_jump(end).map_err(|e| self.code_err(e, *pos))?;
            }
            Expr::Index { obj, index, .. } => {
                self.compile_expr(obj)?;
                self.compile_expr(index)?;
                self.b().emit(Opcode::IndexGet);
            }
            Expr::Slice { obj, low, high, pos } => {
                self.compile_expr(obj)?;
                let mut flags = 0u8;
                if let Some(low) = low {
                    self.compile_expr(low)?;
                    flags |= op::SLICE_FLAG_LOW;
                }
                if let Some(high) = high {
                    self.compile_expr(high)?;
                    flags |= op::SLICE_FLAG_HIGH;
                }
                self.b().set_pos(*pos);
                self.b().emit_u8(Opcode::Slice, flags);
            }
            Expr::Selector { .. } | Expr::OptSelector { .. } => self.compile_selector_chain(expr)?,
            Expr::Call { .. } => self.compile_call(expr, false)?,
            Expr::Pipe { value, calls, pos } => {
                self.compile_expr(value)?;
                for callee in calls {
                    self.compile_expr(callee)?;
                    self.b().emit(Opcode::Swap);
                    self.b().set_pos(*pos);
                    self.b().emit_u8_u8(Opcode::Call, 1, 0);
                }
            }
            Expr::Func(lit) => self.compile_func_lit(lit, lit.name.as_deref())?,
            Expr::Import(name, pos) => {
                let index = self.compile_module(name, *pos)?;
                self.b().set_pos(*pos);
                self.b().emit_u16(Opcode::Import, index);
            }
        }
        Ok(())
    }

    fn compile_ident(&mut self, name: &str, pos: Pos) -> CResult<()> {
        match name {
            "__name__" => self.b().emit_u8(Opcode::LoadModInfo, 0),
            "__file__" => self.b().emit_u8(Opcode::LoadModInfo, 1),
            "__is_module__" => self.b().emit_u8(Opcode::LoadModInfo, 2),
            "__args__" => {
                self.fctx().captures_call_info = true;
                self.b().emit_u8(Opcode::LoadCallInfo, 0);
            }
            "__named_args__" => {
                self.fctx().captures_call_info = true;
                self.b().emit_u8(Opcode::LoadCallInfo, 1);
            }
            "__callee__" => {
                self.fctx().captures_call_info = true;
                self.b().emit_u8(Opcode::LoadCallInfo, 2);
            }
            _ => {
                let symbol = self.resolve_or_builtin(name, pos)?;
                self.load_symbol(&symbol, pos)?;
            }
        }
        Ok(())
    }

    /// Lowers a selector chain; once a `?.` link appears, every later link is
    /// guarded so the whole chain yields nil as soon as any intermediate is.
    fn compile_selector_chain(&mut self, expr: &Expr) -> CResult<()> {
        let mut links = Vec::new();
        let mut root = expr;
        loop {
            match root {
                Expr::Selector { obj, name, pos } => {
                    links.push((name.as_str(), *pos, false));
                    root = obj;
                }
                Expr::OptSelector { obj, name, pos } => {
                    links.push((name.as_str(), *pos, true));
                    root = obj;
                }
                _ => break,
            }
        }
        links.reverse();
        self.compile_expr(root)?;
        let mut nil_sites = Vec::new();
        let mut nullable = false;
        for (name, pos, optional) in links {
            if optional || nullable {
                nullable = true;
                self.b().emit(Opcode::Dup);
                nil_sites.push((self.b().emit_jump(Opcode::JumpIfNil), pos));
            }
            let index = self
                .b()
                .add_constant(Constant::Str(name.to_owned()))
                .map_err(|e| self.code_err(e, pos))?;
            self.b().set_pos(pos);
            self.b().emit_u16(Opcode::Selector, index);
        }
        for (site, pos) in nil_sites {
            self.b().patch_jump(site).map_err(|e| self.code_err(e, pos))?;
        }
        Ok(())
    }

    /// Emits callee and arguments, returning `(argc, flags)`.
    fn compile_call_operands(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        splat: bool,
        named: &[(String, Expr)],
        named_splat: Option<&Expr>,
        pos: Pos,
    ) -> CResult<(u8, u8)> {
        self.compile_expr(callee)?;
        for arg in args {
            self.compile_expr(arg)?;
        }
        let mut flags = 0u8;
        if splat {
            if args.is_empty() {
                return Err(self.err("splat requires a positional argument", pos));
            }
            flags |= op::CALL_FLAG_SPLAT;
        }
        if !named.is_empty() || named_splat.is_some() {
            flags |= op::CALL_FLAG_NAMED;
            if !named.is_empty() {
                for (key, value) in named {
                    self.push_str_const(key, pos)?;
                    self.compile_expr(value)?;
                }
                let count = u16::try_from(named.len()).map_err(|_| self.err("too many named arguments", pos))?;
                self.b().emit_u16(Opcode::MakeKvArray, count);
                if let Some(extra) = named_splat {
                    // Merge the splatted names after the literal ones.
                    self.compile_expr(extra)?;
                    self.b().emit_u8(Opcode::BinaryOp, op::binop_code(BinOp::Add));
                }
            } else if let Some(extra) = named_splat {
                self.compile_expr(extra)?;
            }
        }
        let argc = u8::try_from(args.len()).map_err(|_| self.err("too many arguments", pos))?;
        Ok((argc, flags))
    }

    fn compile_call(&mut self, expr: &Expr, tail: bool) -> CResult<()> {
        let Expr::Call { callee, args, splat, named, named_splat, pos } = expr else {
            unreachable!("compile_call on a non-call expression");
        };
        let (argc, flags) = self.compile_call_operands(callee, args, *splat, named, named_splat.as_deref(), *pos)?;
        self.b().set_pos(*pos);
        if tail {
            self.b().emit_u8_u8(Opcode::TailCall, argc, flags);
        } else {
            self.b().emit_u8_u8(Opcode::Call, argc, flags);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Function literals
    // ------------------------------------------------------------------

    fn compile_func_lit(&mut self, lit: &FuncLit, name: Option<&str>) -> CResult<()> {
        let captured = captured_names(&lit.body);
        self.symbols.enter_function(captured);
        self.ctx.push(FuncCtx::new());

        let mut signature = Signature::default();
        let mut type_sets = Vec::new();
        let mut typed = false;
        for param in &lit.params.positional {
            self.symbols
                .define_param(&param.name)
                .map_err(|e| self.define_err(e, lit.pos))?;
            signature.positional.push(param.name.as_str().into());
            if param.types.is_empty() {
                type_sets.push(TypeSet::single(TypeTag::Any));
            } else {
                typed = true;
                type_sets.push(TypeSet(param.types.iter().map(|t| TypeTag::from_name(t)).collect()));
            }
        }
        if let Some(variadic) = &lit.params.variadic {
            self.symbols
                .define_param(variadic)
                .map_err(|e| self.define_err(e, lit.pos))?;
            signature.variadic = Some(variadic.as_str().into());
        }
        for named in &lit.params.named {
            self.symbols
                .define_param(&named.name)
                .map_err(|e| self.define_err(e, lit.pos))?;
        }
        if let Some(rest) = &lit.params.named_variadic {
            self.symbols
                .define_param(rest)
                .map_err(|e| self.define_err(e, lit.pos))?;
            signature.named_variadic = Some(rest.as_str().into());
        }
        if typed {
            signature.type_sig = Some(TypeSig {
                params: type_sets,
                variadic: lit.params.variadic.as_ref().map(|_| TypeSet::single(TypeTag::Any)),
            });
        }

        // Named defaults compile to standalone fragments executed in the
        // callee frame when the argument is absent.
        for named in &lit.params.named {
            let default = self.compile_default_fragment(named, lit.pos)?;
            signature.named.push(NamedParamSpec {
                name: named.name.as_str().into(),
                default,
            });
        }

        for stmt in &lit.body {
            self.compile_stmt(stmt, None)?;
        }
        self.b().emit(Opcode::LoadNil);
        self.b().emit(Opcode::Return);

        let ctx = self.ctx.pop().expect("function context");
        let info = self.symbols.leave_function();
        let module_name = self.current_module_name();
        let is_module_fn = !self.module_prefix.is_empty();
        let display = name.unwrap_or("<anon>");
        let func = self.finish_function(ctx, info.clone(), signature, display, &module_name, is_module_fn);
        let func_id = FuncId(self.funcs.len() as u32);
        self.funcs.push(func);

        // Capture emission happens in the enclosing function.
        for free in &info.free {
            match free.parent {
                CellRef::OwnCell(cell) => {
                    let cell = self.narrow(cell, lit.pos)?;
                    self.b().emit_u8(Opcode::PushCellRef, cell);
                }
                CellRef::Free(index) => {
                    let index = self.narrow(index, lit.pos)?;
                    self.b().emit_u8(Opcode::PushFreeRef, index);
                }
            }
        }
        let free_count = u8::try_from(info.free.len()).map_err(|_| self.err("too many captured variables", lit.pos))?;
        let fn_index = u16::try_from(func_id.0).map_err(|_| self.err("too many functions", lit.pos))?;
        self.b().set_pos(lit.pos);
        self.b().emit_u16_u8(Opcode::MakeClosure, fn_index, free_count);
        Ok(())
    }

    /// Compiles one named-parameter default into its own code fragment.
    fn compile_default_fragment(&mut self, named: &NamedParam, pos: Pos) -> CResult<Option<u16>> {
        let Some(default) = &named.default else {
            return Ok(None);
        };
        self.ctx.push(FuncCtx::new());
        self.compile_expr(default)?;
        self.b().emit(Opcode::Return);
        let fragment = self.ctx.pop().expect("fragment context");
        let captures = fragment.captures_call_info;
        let code = fragment.builder.build();
        let defaults_len = self.fctx().defaults.len();
        let index = u16::try_from(defaults_len).map_err(|_| self.err("too many defaults", pos))?;
        let ctx = self.fctx();
        ctx.captures_call_info |= captures;
        ctx.defaults.push(code);
        Ok(Some(index))
    }

    fn current_module_name(&self) -> String {
        match self.compiling.last() {
            Some(name) => name.clone(),
            None => "main".to_owned(),
        }
    }

    fn global_slot_unprefixed(&mut self, name: &str) -> u16 {
        if let Some(&slot) = self.globals.get(name) {
            return slot;
        }
        let slot = self.global_names.len() as u16;
        self.globals.insert(name.to_owned(), slot);
        self.global_names.push(name.to_owned());
        slot
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    /// Compiles `name` once, memoizing the module table index. Cycles are
    /// detected through the in-progress stack.
    fn compile_module(&mut self, name: &str, pos: Pos) -> CResult<u16> {
        if let Some(&index) = self.module_index.get(name) {
            return Ok(index);
        }
        if self.compiling.iter().any(|n| n == name) {
            return Err(self.err(format!("cyclic import of module '{name}'"), pos));
        }
        let Some(chunk) = self.options.module_map.get(name) else {
            return Err(self.err(format!("unknown module '{name}'"), pos));
        };
        let chunk = chunk.clone();
        self.trace(|| format!("compiling module '{name}'"));

        self.compiling.push(name.to_owned());
        let saved_symbols = std::mem::replace(&mut self.symbols, SymbolTable::new_file(captured_names(&chunk.stmts)));
        let saved_file = std::mem::replace(&mut self.file, chunk.file.clone());
        let saved_prefix = std::mem::replace(&mut self.module_prefix, format!("{name}:"));

        let result = self.compile_body(&chunk, name, true);

        self.module_prefix = saved_prefix;
        self.file = saved_file;
        self.symbols = saved_symbols;
        self.compiling.pop();

        let func = result?;
        let func_id = FuncId(self.funcs.len() as u32);
        self.funcs.push(func);
        let index = u16::try_from(self.modules.len()).map_err(|_| self.err("too many modules", pos))?;
        self.modules.push(ModuleEntry {
            name: name.to_owned(),
            func: func_id,
        });
        self.module_index.insert(name.to_owned(), index);
        Ok(index)
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

#[derive(Clone, Copy)]
enum IndexKey<'e> {
    Expr(&'e Expr),
    Name(&'e str),
}

/// Collects every identifier mentioned inside nested function literals.
///
/// Over-approximation only costs an unshared cell, so no local-definition
/// analysis is attempted inside the nested bodies.
fn captured_names(stmts: &[Stmt]) -> AHashSet<String> {
    let mut names = AHashSet::new();
    for stmt in stmts {
        walk_stmt_for_funcs(stmt, &mut names);
    }
    names
}

fn walk_stmt_for_funcs(stmt: &Stmt, names: &mut AHashSet<String>) {
    let mut on_expr = |expr: &Expr| walk_expr_for_funcs(expr, names);
    match stmt {
        Stmt::Expr(e) | Stmt::Const { value: e, .. } | Stmt::ShortDecl { value: e, .. } | Stmt::Throw { value: e, .. } | Stmt::Defer { call: e, .. } => on_expr(e),
        Stmt::Var { values, .. } => values.iter().for_each(on_expr),
        Stmt::Assign { target, value, .. } => {
            on_expr(target);
            on_expr(value);
        }
        Stmt::Return { values, .. } => values.iter().for_each(on_expr),
        Stmt::If { cond, then, els, .. } => {
            on_expr(cond);
            then.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            els.iter().for_each(|s| walk_stmt_for_funcs(s, names));
        }
        Stmt::For { init, cond, post, body, els, .. } => {
            if let Some(init) = init {
                walk_stmt_for_funcs(init, names);
            }
            if let Some(cond) = cond {
                walk_expr_for_funcs(cond, names);
            }
            if let Some(post) = post {
                walk_stmt_for_funcs(post, names);
            }
            body.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            els.iter().for_each(|s| walk_stmt_for_funcs(s, names));
        }
        Stmt::ForIn { iter, body, els, .. } => {
            walk_expr_for_funcs(iter, names);
            body.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            els.iter().for_each(|s| walk_stmt_for_funcs(s, names));
        }
        Stmt::Try { body, catch, finally, .. } => {
            body.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            if let Some((_, handler)) = catch {
                handler.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            }
            if let Some(finally) = finally {
                finally.iter().for_each(|s| walk_stmt_for_funcs(s, names));
            }
        }
        Stmt::Block(stmts, _) => stmts.iter().for_each(|s| walk_stmt_for_funcs(s, names)),
        Stmt::FuncDecl { func, .. } => collect_all_idents_in_func(func, names),
        Stmt::Param { .. } | Stmt::Global { .. } | Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn walk_expr_for_funcs(expr: &Expr, names: &mut AHashSet<String>) {
    match expr {
        Expr::Func(lit) => collect_all_idents_in_func(lit, names),
        Expr::Array(items, _) => items.iter().for_each(|e| walk_expr_for_funcs(e, names)),
        Expr::Dict(pairs, _) | Expr::KeyValueArray(pairs, _) => {
            pairs.iter().for_each(|(_, e)| walk_expr_for_funcs(e, names));
        }
        Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
            walk_expr_for_funcs(lhs, names);
            walk_expr_for_funcs(rhs, names);
        }
        Expr::And(a, b, _) | Expr::Or(a, b, _) | Expr::NilCoalesce(a, b, _) => {
            walk_expr_for_funcs(a, names);
            walk_expr_for_funcs(b, names);
        }
        Expr::Unary { expr, .. } => walk_expr_for_funcs(expr, names),
        Expr::Ternary { cond, then, els, .. } => {
            walk_expr_for_funcs(cond, names);
            walk_expr_for_funcs(then, names);
            walk_expr_for_funcs(els, names);
        }
        Expr::Index { obj, index, .. } => {
            walk_expr_for_funcs(obj, names);
            walk_expr_for_funcs(index, names);
        }
        Expr::Slice { obj, low, high, .. } => {
            walk_expr_for_funcs(obj, names);
            if let Some(low) = low {
                walk_expr_for_funcs(low, names);
            }
            if let Some(high) = high {
                walk_expr_for_funcs(high, names);
            }
        }
        Expr::Selector { obj, .. } | Expr::OptSelector { obj, .. } => walk_expr_for_funcs(obj, names),
        Expr::Call { callee, args, named, named_splat, .. } => {
            walk_expr_for_funcs(callee, names);
            args.iter().for_each(|e| walk_expr_for_funcs(e, names));
            named.iter().for_each(|(_, e)| walk_expr_for_funcs(e, names));
            if let Some(extra) = named_splat {
                walk_expr_for_funcs(extra, names);
            }
        }
        Expr::Pipe { value, calls, .. } => {
            walk_expr_for_funcs(value, names);
            calls.iter().for_each(|e| walk_expr_for_funcs(e, names));
        }
        _ => {}
    }
}

/// Inside a nested function literal, every identifier counts.
fn collect_all_idents_in_func(lit: &FuncLit, names: &mut AHashSet<String>) {
    fn walk_expr(expr: &Expr, names: &mut AHashSet<String>) {
        if let Expr::Ident(name, _) = expr {
            names.insert(name.clone());
        }
        match expr {
            Expr::Func(lit) => collect_all_idents_in_func(lit, names),
            Expr::Array(items, _) => items.iter().for_each(|e| walk_expr(e, names)),
            Expr::Dict(pairs, _) | Expr::KeyValueArray(pairs, _) => {
                pairs.iter().for_each(|(_, e)| walk_expr(e, names));
            }
            Expr::Binary { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                walk_expr(lhs, names);
                walk_expr(rhs, names);
            }
            Expr::And(a, b, _) | Expr::Or(a, b, _) | Expr::NilCoalesce(a, b, _) => {
                walk_expr(a, names);
                walk_expr(b, names);
            }
            Expr::Unary { expr, .. } => walk_expr(expr, names),
            Expr::Ternary { cond, then, els, .. } => {
                walk_expr(cond, names);
                walk_expr(then, names);
                walk_expr(els, names);
            }
            Expr::Index { obj, index, .. } => {
                walk_expr(obj, names);
                walk_expr(index, names);
            }
            Expr::Slice { obj, low, high, .. } => {
                walk_expr(obj, names);
                low.iter().for_each(|e| walk_expr(e, names));
                high.iter().for_each(|e| walk_expr(e, names));
            }
            Expr::Selector { obj, .. } | Expr::OptSelector { obj, .. } => walk_expr(obj, names),
            Expr::Call { callee, args, named, named_splat, .. } => {
                walk_expr(callee, names);
                args.iter().for_each(|e| walk_expr(e, names));
                named.iter().for_each(|(_, e)| walk_expr(e, names));
                named_splat.iter().for_each(|e| walk_expr(e, names));
            }
            Expr::Pipe { value, calls, .. } => {
                walk_expr(value, names);
                calls.iter().for_each(|e| walk_expr(e, names));
            }
            _ => {}
        }
    }

    fn walk_stmt(stmt: &Stmt, names: &mut AHashSet<String>) {
        match stmt {
            Stmt::Expr(e)
            | Stmt::Const { value: e, .. }
            | Stmt::ShortDecl { value: e, .. }
            | Stmt::Throw { value: e, .. }
            | Stmt::Defer { call: e, .. } => walk_expr(e, names),
            Stmt::Var { values, .. } => values.iter().for_each(|e| walk_expr(e, names)),
            Stmt::Assign { target, value, .. } => {
                walk_expr(target, names);
                walk_expr(value, names);
            }
            Stmt::Return { values, .. } => values.iter().for_each(|e| walk_expr(e, names)),
            Stmt::If { cond, then, els, .. } => {
                walk_expr(cond, names);
                then.iter().for_each(|s| walk_stmt(s, names));
                els.iter().for_each(|s| walk_stmt(s, names));
            }
            Stmt::For { init, cond, post, body, els, .. } => {
                init.iter().for_each(|s| walk_stmt(s, names));
                cond.iter().for_each(|e| walk_expr(e, names));
                post.iter().for_each(|s| walk_stmt(s, names));
                body.iter().for_each(|s| walk_stmt(s, names));
                els.iter().for_each(|s| walk_stmt(s, names));
            }
            Stmt::ForIn { iter, body, els, .. } => {
                walk_expr(iter, names);
                body.iter().for_each(|s| walk_stmt(s, names));
                els.iter().for_each(|s| walk_stmt(s, names));
            }
            Stmt::Try { body, catch, finally, .. } => {
                body.iter().for_each(|s| walk_stmt(s, names));
                if let Some((_, handler)) = catch {
                    handler.iter().for_each(|s| walk_stmt(s, names));
                }
                finally.iter().flatten().for_each(|s| walk_stmt(s, names));
            }
            Stmt::Block(stmts, _) => stmts.iter().for_each(|s| walk_stmt(s, names)),
            Stmt::FuncDecl { func, .. } => collect_all_idents_in_func(func, names),
            Stmt::Param { .. } | Stmt::Global { .. } | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    for param in &lit.params.named {
        if let Some(default) = &param.default {
            walk_expr(default, names);
        }
    }
    for stmt in &lit.body {
        walk_stmt(stmt, names);
    }
}

/// Evaluates pure arithmetic on literal operands at compile time. Anything
/// that could raise (division by zero, overflow) is left to the runtime.
fn fold_expr(expr: &Expr) -> Option<Expr> {
    match expr {
        Expr::Binary { op, lhs, rhs, pos } => {
            let lhs = fold_expr(lhs).unwrap_or_else(|| (**lhs).clone());
            let rhs = fold_expr(rhs).unwrap_or_else(|| (**rhs).clone());
            let folded = match (&lhs, &rhs) {
                (Expr::Int(a, _), Expr::Int(b, _)) => fold_int(*op, *a, *b, *pos),
                (Expr::Float(a, _), Expr::Float(b, _)) => fold_float(*op, *a, *b, *pos),
                (Expr::Str(a, _), Expr::Str(b, _)) if *op == BinOp::Add => {
                    Some(Expr::Str(format!("{a}{b}"), *pos))
                }
                _ => None,
            };
            folded.or_else(|| {
                Some(Expr::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    pos: *pos,
                })
            })
        }
        Expr::Unary { op: UnOp::Neg, expr: inner, pos } => match fold_expr(inner).as_ref().unwrap_or(inner) {
            Expr::Int(value, _) => value.checked_neg().map(|v| Expr::Int(v, *pos)),
            Expr::Float(value, _) => Some(Expr::Float(-value, *pos)),
            _ => None,
        },
        _ => None,
    }
}

fn fold_int(op: BinOp, a: i64, b: i64, pos: Pos) -> Option<Expr> {
    let value = match op {
        BinOp::Add => a.checked_add(b)?,
        BinOp::Sub => a.checked_sub(b)?,
        BinOp::Mul => a.checked_mul(b)?,
        BinOp::Div => a.checked_div(b)?,
        BinOp::Rem => a.checked_rem(b)?,
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::Shl => a.checked_shl(u32::try_from(b).ok()?)?,
        BinOp::Shr => a.checked_shr(u32::try_from(b).ok()?)?,
    };
    Some(Expr::Int(value, pos))
}

fn fold_float(op: BinOp, a: f64, b: f64, pos: Pos) -> Option<Expr> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div if b != 0.0 => a / b,
        _ => return None,
    };
    Some(Expr::Float(value, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Chunk, Pos};

    fn pos() -> Pos {
        Pos::new(1, 0)
    }

    fn int(value: i64) -> Expr {
        Expr::Int(value, pos())
    }

    #[test]
    fn literal_arithmetic_folds_into_one_constant() {
        let chunk = Chunk::new(
            "fold.tarn",
            vec![Stmt::Return {
                values: vec![Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(int(1)),
                    rhs: Box::new(Expr::Binary {
                        op: BinOp::Mul,
                        lhs: Box::new(int(2)),
                        rhs: Box::new(int(300)),
                        pos: pos(),
                    }),
                    pos: pos(),
                }],
                pos: pos(),
            }],
        );
        let folded = compile(&chunk, &CompileOptions::default()).unwrap();
        let unfolded = compile(
            &chunk,
            &CompileOptions {
                optimize_constants: false,
                ..CompileOptions::default()
            },
        )
        .unwrap();
        // The folded body loads a single constant; the unfolded one keeps
        // the operator instructions.
        assert!(folded.main.code.bytecode.len() < unfolded.main.code.bytecode.len());
    }

    #[test]
    fn unresolved_references_are_compile_errors() {
        let chunk = Chunk::new(
            "bad.tarn",
            vec![Stmt::Return {
                values: vec![Expr::Ident("missing".to_owned(), pos())],
                pos: pos(),
            }],
        );
        let err = compile(&chunk, &CompileOptions::default()).unwrap_err();
        assert!(err.message.contains("unresolved reference"));
        assert_eq!(err.file, "bad.tarn");
    }

    #[test]
    fn division_by_zero_is_never_folded() {
        let chunk = Chunk::new(
            "div.tarn",
            vec![Stmt::Return {
                values: vec![Expr::Binary {
                    op: BinOp::Div,
                    lhs: Box::new(int(1)),
                    rhs: Box::new(int(0)),
                    pos: pos(),
                }],
                pos: pos(),
            }],
        );
        // Compiles fine; the error surfaces at runtime.
        assert!(compile(&chunk, &CompileOptions::default()).is_ok());
    }
}
