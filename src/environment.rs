//! Scope zinciri ve binding yönetimi.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::value::Value;

pub type EnvRef = Rc<RefCell<Environment>>;

/// A variable cell: value plus privacy flag and optional type constraint
/// ("num" | "string" | "bool" | "list" | "map").
#[derive(Clone, Debug)]
pub struct Variable {
    pub value: Value,
    pub is_private: bool,
    pub constraint: Option<String>,
}

impl Variable {
    pub fn plain(value: Value) -> Self {
        Self { value, is_private: false, constraint: None }
    }
}

/// Name -> cell mapping plus a disjoint alias-name -> type-name table.
/// The enclosing link is observer-only: strong ownership of a scope comes
/// from the interpreter's current-environment pointer, from closures, and
/// from namespace values — never from a child scope.
#[derive(Default)]
pub struct Environment {
    values: HashMap<String, Variable>,
    type_aliases: HashMap<String, String>,
    enclosing: Option<Weak<RefCell<Environment>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Environment {
    pub fn new() -> EnvRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_enclosing(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Self {
            values: HashMap::new(),
            type_aliases: HashMap::new(),
            enclosing: Some(Rc::downgrade(parent)),
        }))
    }

    fn parent(&self) -> Option<EnvRef> {
        self.enclosing.as_ref().and_then(Weak::upgrade)
    }

    pub fn define(&mut self, name: impl Into<String>, var: Variable) {
        self.values.insert(name.into(), var);
    }

    pub fn define_value(&mut self, name: impl Into<String>, value: Value) {
        self.define(name, Variable::plain(value));
    }

    /// Walks the chain; `false` when the name is nowhere.
    pub fn assign(&mut self, name: &str, value: Value) -> bool {
        if let Some(cell) = self.values.get_mut(name) {
            cell.value = value;
            return true;
        }
        if let Some(parent) = self.parent() {
            return parent.borrow_mut().assign(name, value);
        }
        false
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.get_var(name).map(|v| v.value)
    }

    /// Walks the chain and clones the whole cell.
    pub fn get_var(&self, name: &str) -> Option<Variable> {
        if let Some(cell) = self.values.get(name) {
            return Some(cell.clone());
        }
        self.parent().and_then(|p| p.borrow().get_var(name))
    }

    pub fn has(&self, name: &str) -> bool {
        if self.values.contains_key(name) {
            return true;
        }
        self.parent().map_or(false, |p| p.borrow().has(name))
    }

    /// Local table only — used by `get_at` style access after the resolver
    /// has already decided which scope owns the name.
    pub fn get_local_var(&self, name: &str) -> Option<Variable> {
        self.values.get(name).cloned()
    }

    pub fn set_local(&mut self, name: &str, value: Value) -> bool {
        match self.values.get_mut(name) {
            Some(cell) => {
                cell.value = value;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn define_type_alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.type_aliases.insert(alias.into(), target.into());
    }

    pub fn is_type_alias(&self, name: &str) -> bool {
        if self.type_aliases.contains_key(name) {
            return true;
        }
        self.parent().map_or(false, |p| p.borrow().is_type_alias(name))
    }

    /// First scope with an alias for the name wins; one hop, not transitive.
    pub fn get_type_alias(&self, name: &str) -> Option<String> {
        if let Some(t) = self.type_aliases.get(name) {
            return Some(t.clone());
        }
        self.parent().and_then(|p| p.borrow().get_type_alias(name))
    }
}

/// Navigates exactly `distance` enclosing links up without searching.
/// A dead link ends the walk at the last living scope.
pub fn ancestor(env: &EnvRef, distance: usize) -> EnvRef {
    let mut current = env.clone();
    for _ in 0..distance {
        let parent = current.borrow().parent();
        match parent {
            Some(p) => current = p,
            None => break,
        }
    }
    current
}
