//! Compile-time symbol table: lexical scopes, resolution, and free-variable
//! capture.
//!
//! Scopes form a tree that exists only during compilation. Each function
//! scope owns a stack of block scopes. Resolving a name walks blocks inner to
//! outer, then enclosing function scopes; a resolution that crosses a
//! function boundary promotes the symbol to `Free` and records the capture so
//! `MakeClosure` can collect the referenced cells.
//!
//! Locals that are captured anywhere below are allocated a cell index instead
//! of a stack slot; every access to them goes through the cell, so all
//! closures over the same binding observe mutations (including assignments
//! made after the closure was constructed).

use ahash::{AHashMap, AHashSet};

/// Storage class of a resolved name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SymbolScope {
    Global,
    Local,
    Free,
    Builtin,
}

/// A resolved name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    /// Global slot, local stack slot, free index, or encoded builtin.
    pub index: u16,
    /// For cell-backed locals: the cell index in the owning frame.
    pub cell: Option<u16>,
    pub constant: bool,
}

/// Where a captured cell lives in the *enclosing* frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellRef {
    /// One of the enclosing function's own cells.
    OwnCell(u16),
    /// One of the enclosing function's captured free cells.
    Free(u16),
}

/// A free variable recorded on a function scope, in capture order.
#[derive(Debug, Clone)]
pub(crate) struct FreeVar {
    pub name: String,
    pub parent: CellRef,
}

/// Layout facts the compiler needs when a function scope closes.
#[derive(Debug, Clone)]
pub(crate) struct FuncScopeInfo {
    pub num_locals: u16,
    pub num_cells: u16,
    /// For each own cell: the parameter slot its initial value copies from.
    pub cell_param_slots: Vec<Option<u16>>,
    pub free: Vec<FreeVar>,
}

#[derive(Debug)]
struct FuncScope {
    /// Block scopes, innermost last.
    blocks: Vec<AHashMap<String, Symbol>>,
    num_locals: u16,
    num_cells: u16,
    cell_param_slots: Vec<Option<u16>>,
    free: Vec<FreeVar>,
    /// Names referenced by nested function literals; locals with these names
    /// become cell-backed. Over-approximation is harmless (the cell is just
    /// never shared), under-approximation would break capture.
    captured: AHashSet<String>,
    is_file: bool,
}

impl FuncScope {
    fn new(captured: AHashSet<String>, is_file: bool) -> Self {
        Self {
            blocks: vec![AHashMap::new()],
            num_locals: 0,
            num_cells: 0,
            cell_param_slots: Vec::new(),
            free: Vec::new(),
            captured,
            is_file,
        }
    }
}

/// Reasons a definition can fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DefineError {
    Redeclared(String),
}

#[derive(Debug)]
pub(crate) struct SymbolTable {
    funcs: Vec<FuncScope>,
}

impl SymbolTable {
    /// Creates a table with the file scope open.
    ///
    /// `captured` holds every identifier mentioned inside function literals
    /// of the file body.
    pub fn new_file(captured: AHashSet<String>) -> Self {
        Self {
            funcs: vec![FuncScope::new(captured, true)],
        }
    }

    fn current(&mut self) -> &mut FuncScope {
        self.funcs.last_mut().expect("symbol table has no open scope")
    }

    /// True when the innermost function scope is the file scope.
    pub fn in_file_scope(&self) -> bool {
        self.funcs.len() == 1
    }

    /// True at the top block of the innermost function/file scope, where
    /// `param` and `global` declarations are legal.
    pub fn at_scope_top(&self) -> bool {
        self.funcs.last().is_some_and(|f| f.blocks.len() == 1)
    }

    /// Layout snapshot of the file scope, which stays open for the whole
    /// compilation (module bodies are functions over it).
    pub fn file_scope_info(&self) -> FuncScopeInfo {
        let scope = &self.funcs[0];
        FuncScopeInfo {
            num_locals: scope.num_locals,
            num_cells: scope.num_cells,
            cell_param_slots: scope.cell_param_slots.clone(),
            free: scope.free.clone(),
        }
    }

    pub fn enter_block(&mut self) {
        self.current().blocks.push(AHashMap::new());
    }

    pub fn leave_block(&mut self) {
        self.current().blocks.pop();
    }

    pub fn enter_function(&mut self, captured: AHashSet<String>) {
        self.funcs.push(FuncScope::new(captured, false));
    }

    pub fn leave_function(&mut self) -> FuncScopeInfo {
        let scope = self.funcs.pop().expect("leave_function without enter_function");
        FuncScopeInfo {
            num_locals: scope.num_locals,
            num_cells: scope.num_cells,
            cell_param_slots: scope.cell_param_slots,
            free: scope.free,
        }
    }

    fn insert(&mut self, symbol: Symbol) -> Result<(), DefineError> {
        let block = self.current().blocks.last_mut().expect("function scope has no block");
        if block.contains_key(&symbol.name) {
            return Err(DefineError::Redeclared(symbol.name.clone()));
        }
        block.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Defines a global in the file scope (or re-exposes one inside a
    /// function via a `global` declaration). The slot comes from the
    /// program-wide global table.
    pub fn define_global(&mut self, name: &str, slot: u16, constant: bool) -> Result<Symbol, DefineError> {
        let symbol = Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Global,
            index: slot,
            cell: None,
            constant,
        };
        self.insert(symbol.clone())?;
        Ok(symbol)
    }

    /// Defines a local in the innermost block. Captured names get a cell
    /// instead of a stack slot.
    pub fn define_local(&mut self, name: &str, constant: bool) -> Result<Symbol, DefineError> {
        let scope = self.current();
        let symbol = if scope.captured.contains(name) {
            let cell = scope.num_cells;
            scope.num_cells += 1;
            scope.cell_param_slots.push(None);
            Symbol {
                name: name.to_owned(),
                scope: SymbolScope::Local,
                index: 0,
                cell: Some(cell),
                constant,
            }
        } else {
            let slot = scope.num_locals;
            scope.num_locals += 1;
            Symbol {
                name: name.to_owned(),
                scope: SymbolScope::Local,
                index: slot,
                cell: None,
                constant,
            }
        };
        self.insert(symbol.clone())?;
        Ok(symbol)
    }

    /// Defines a parameter. Parameters always own a stack slot (the binder
    /// writes arguments there); captured ones additionally get a cell the
    /// frame setup copies the bound value into.
    pub fn define_param(&mut self, name: &str) -> Result<Symbol, DefineError> {
        let scope = self.current();
        let slot = scope.num_locals;
        scope.num_locals += 1;
        let cell = if scope.captured.contains(name) {
            let cell = scope.num_cells;
            scope.num_cells += 1;
            scope.cell_param_slots.push(Some(slot));
            Some(cell)
        } else {
            None
        };
        let symbol = Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Local,
            index: slot,
            cell,
            constant: false,
        };
        self.insert(symbol.clone())?;
        Ok(symbol)
    }

    /// True when `name` is declared in the innermost block.
    pub fn declared_in_block(&self, name: &str) -> bool {
        self.funcs
            .last()
            .and_then(|f| f.blocks.last())
            .is_some_and(|b| b.contains_key(name))
    }

    /// Resolves a name, promoting across function boundaries as needed.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        self.resolve_in(self.funcs.len() - 1, name)
    }

    fn resolve_in(&mut self, func_idx: usize, name: &str) -> Option<Symbol> {
        for block in self.funcs[func_idx].blocks.iter().rev() {
            if let Some(symbol) = block.get(name) {
                return Some(symbol.clone());
            }
        }
        if func_idx == 0 {
            return None;
        }
        let outer = self.resolve_in(func_idx - 1, name)?;
        match outer.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer),
            SymbolScope::Local => {
                // Crossing a function boundary: the outer local must be
                // cell-backed so the capture shares its storage.
                let cell = outer.cell?;
                Some(self.register_free(func_idx, name, CellRef::OwnCell(cell), outer.constant))
            }
            SymbolScope::Free => {
                Some(self.register_free(func_idx, name, CellRef::Free(outer.index), outer.constant))
            }
        }
    }

    fn register_free(&mut self, func_idx: usize, name: &str, parent: CellRef, constant: bool) -> Symbol {
        let scope = &mut self.funcs[func_idx];
        let index = match scope.free.iter().position(|f| f.name == name) {
            Some(existing) => existing as u16,
            None => {
                scope.free.push(FreeVar {
                    name: name.to_owned(),
                    parent,
                });
                (scope.free.len() - 1) as u16
            }
        };
        Symbol {
            name: name.to_owned(),
            scope: SymbolScope::Free,
            index,
            cell: None,
            constant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(names: &[&str]) -> AHashSet<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn redeclaration_in_same_block_fails() {
        let mut table = SymbolTable::new_file(AHashSet::new());
        table.enter_function(AHashSet::new());
        table.define_local("a", false).unwrap();
        assert_eq!(table.define_local("a", false), Err(DefineError::Redeclared("a".to_owned())));
    }

    #[test]
    fn shadowing_across_blocks_is_permitted() {
        let mut table = SymbolTable::new_file(AHashSet::new());
        table.enter_function(AHashSet::new());
        let outer = table.define_local("a", false).unwrap();
        table.enter_block();
        let inner = table.define_local("a", false).unwrap();
        assert_ne!(outer.index, inner.index);
        assert_eq!(table.resolve("a").unwrap(), inner);
        table.leave_block();
        assert_eq!(table.resolve("a").unwrap(), outer);
    }

    #[test]
    fn capture_promotes_to_free_and_shares_cell() {
        let mut table = SymbolTable::new_file(AHashSet::new());
        table.enter_function(captured(&["x"]));
        let x = table.define_local("x", false).unwrap();
        let cell = x.cell.expect("captured local is cell-backed");

        table.enter_function(AHashSet::new());
        let free = table.resolve("x").unwrap();
        assert_eq!(free.scope, SymbolScope::Free);
        assert_eq!(free.index, 0);
        let info = table.leave_function();
        assert_eq!(info.free.len(), 1);
        assert_eq!(info.free[0].parent, CellRef::OwnCell(cell));
    }

    #[test]
    fn two_level_capture_threads_through_the_middle_scope() {
        let mut table = SymbolTable::new_file(AHashSet::new());
        table.enter_function(captured(&["x"]));
        table.define_local("x", false).unwrap();

        table.enter_function(captured(&["x"]));
        table.enter_function(AHashSet::new());
        let innermost = table.resolve("x").unwrap();
        assert_eq!(innermost.scope, SymbolScope::Free);
        let inner_info = table.leave_function();
        // The middle scope captured x on behalf of the innermost one.
        assert_eq!(inner_info.free[0].parent, CellRef::Free(0));
        let middle_info = table.leave_function();
        assert_eq!(middle_info.free[0].parent, CellRef::OwnCell(0));
    }

    #[test]
    fn captured_param_keeps_its_slot_and_gets_a_cell() {
        let mut table = SymbolTable::new_file(AHashSet::new());
        table.enter_function(captured(&["n"]));
        let n = table.define_param("n").unwrap();
        assert_eq!(n.index, 0);
        assert!(n.cell.is_some());
        let info = table.leave_function();
        assert_eq!(info.cell_param_slots, vec![Some(0)]);
    }
}
