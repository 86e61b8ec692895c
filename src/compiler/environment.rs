//! Symbol table for the analyser.
//!
//! Globals and functions share the level-0 namespace. Everything declared
//! inside a function lives in a stack of scopes, one per open `{`, so
//! leaving a block releases exactly what it declared.
use lasso::Spur;

use crate::error::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnType {
    Int,
    Void,
}

/// A variable, constant or parameter. Only `int` storage exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variable {
    pub name: Spur,
    /// scope nesting level, 0 for globals
    pub level: usize,
    /// slot in the owning frame
    pub offset: usize,
    pub initialized: bool,
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: Spur,
    pub returns: ReturnType,
    pub ordinal: usize,
    pub params: Vec<Variable>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local(Variable),
    Global(Variable),
    /// ordinal in the function table
    Function(usize),
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    globals: Vec<Variable>,
    functions: Vec<FunctionEntry>,
    scopes: Vec<Vec<Variable>>,
    /// live slots in the current function frame
    frame_slots: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scope nesting level; 0 outside of any function.
    pub fn level(&self) -> usize {
        self.scopes.len()
    }

    pub fn in_function(&self) -> bool {
        !self.scopes.is_empty()
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Vec::new());
        log::trace!("entered scope level {}", self.level());
    }

    /// Pops every declaration made at the current level and returns how many
    /// frame slots were released.
    ///
    /// # Panics
    /// When no scope is open.
    pub fn leave_scope(&mut self) -> usize {
        let Some(scope) = self.scopes.pop() else {
            panic!("cannot leave the global scope");
        };
        self.frame_slots -= scope.len();
        log::trace!(
            "left scope level {}, releasing {} slots",
            self.level() + 1,
            scope.len()
        );
        scope.len()
    }

    /// Whether `name` is taken in the namespace a declaration here would use.
    pub fn is_declared_at_current_level(&self, name: Spur) -> bool {
        match self.scopes.last() {
            Some(scope) => scope.iter().any(|var| var.name == name),
            None => {
                self.globals.iter().any(|var| var.name == name)
                    || self.functions.iter().any(|func| func.name == name)
            }
        }
    }

    /// Declares a variable at the current level: a global outside of
    /// functions, a local inside them.
    pub fn declare_variable(
        &mut self,
        name: Spur,
        constant: bool,
        initialized: bool,
    ) -> Result<Variable, ErrorKind> {
        if self.is_declared_at_current_level(name) {
            return Err(ErrorKind::DuplicateDeclaration);
        }

        let level = self.level();
        let (offset, storage) = match self.scopes.last_mut() {
            Some(scope) => {
                self.frame_slots += 1;
                (self.frame_slots - 1, scope)
            }
            None => (self.globals.len(), &mut self.globals),
        };
        let variable = Variable {
            name,
            level,
            offset,
            initialized,
            constant,
        };
        storage.push(variable);
        Ok(variable)
    }

    /// Adds a function to the global table and returns its ordinal.
    pub fn declare_function(&mut self, name: Spur, returns: ReturnType) -> Result<usize, ErrorKind> {
        assert!(!self.in_function(), "functions are only declared at the global level");
        if self.is_declared_at_current_level(name) {
            return Err(ErrorKind::DuplicateDeclaration);
        }

        let ordinal = self.functions.len();
        self.functions.push(FunctionEntry {
            name,
            returns,
            ordinal,
            params: Vec::new(),
        });
        Ok(ordinal)
    }

    /// Declares a parameter of function `ordinal` in the current scope, which
    /// must be the function's body scope.
    pub fn add_parameter(&mut self, ordinal: usize, name: Spur, constant: bool) -> Result<Variable, ErrorKind> {
        assert!(self.level() == 1, "parameters belong to the function body scope");
        let variable = self.declare_variable(name, constant, true)?;
        self.functions[ordinal].params.push(variable);
        Ok(variable)
    }

    /// Resolves a name: innermost local first, then globals, then functions.
    pub fn lookup(&self, name: Spur) -> Option<Binding> {
        let local = self
            .scopes
            .iter()
            .rev()
            .find_map(|scope| scope.iter().rev().find(|var| var.name == name));
        if let Some(var) = local {
            return Some(Binding::Local(*var));
        }
        if let Some(var) = self.globals.iter().find(|var| var.name == name) {
            return Some(Binding::Global(*var));
        }
        self.functions
            .iter()
            .find(|func| func.name == name)
            .map(|func| Binding::Function(func.ordinal))
    }

    /// Marks whichever variable `name` currently resolves to as initialized.
    pub fn mark_initialized(&mut self, name: Spur) {
        let local = self
            .scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.iter_mut().rev().find(|var| var.name == name));
        let variable = match local {
            Some(var) => Some(var),
            None => self.globals.iter_mut().find(|var| var.name == name),
        };
        if let Some(variable) = variable {
            variable.initialized = true;
        }
    }

    /// `(level-diff, offset)` operands of the `loada` reaching `var` from
    /// the current frame.
    pub fn address(&self, var: &Variable) -> (i32, i32) {
        let level_diff = if var.level == 0 && self.in_function() { 1 } else { 0 };
        (level_diff, super::bytecode::address(var.offset))
    }

    pub fn function(&self, ordinal: usize) -> &FunctionEntry {
        &self.functions[ordinal]
    }

    pub fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }
}
