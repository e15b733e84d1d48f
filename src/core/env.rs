// src/core/env.rs

//! # Environment
//!
//! A stack of variable scopes. Index 0 is the outermost scope; every included
//! file pushes a new innermost scope that is popped again once the file is
//! exhausted. Lookups walk from the innermost scope outwards, definitions
//! always land in the innermost one, so an inner redefinition shadows the outer
//! value without touching it.

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while resolving variables.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// The variable is not defined in any enclosing scope.
    #[error("{0}: undefined variable")]
    Undefined(String),
}

/// One level of variable bindings. Values are ordered lists of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    values: BTreeMap<String, Vec<String>>,
}

impl Scope {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, replacing any previous value in this scope.
    pub fn define(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.values.insert(name.into(), values);
    }

    /// Returns the values bound to `name` in this scope only.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Removes `name` from this scope, returning whether it was bound.
    pub fn delete(&mut self, name: &str) -> bool {
        self.values.remove(name).is_some()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates over the bindings in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.values.iter()
    }
}

/// A chain of scopes, innermost last.
#[derive(Debug, Clone)]
pub struct Env {
    scopes: Vec<Scope>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    /// Creates an environment holding a single empty scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
        }
    }

    /// Creates an environment whose outermost scope is `scope`.
    pub fn with_scope(scope: Scope) -> Self {
        Self {
            scopes: vec![scope],
        }
    }

    /// Number of scopes in the chain.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Enters a new innermost scope.
    pub fn push(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Enters a new innermost scope pre-filled with `scope`.
    pub fn push_scope(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Leaves the innermost scope. The outermost scope is never removed.
    pub fn pop(&mut self) -> Option<Scope> {
        if self.scopes.len() <= 1 {
            return None;
        }
        self.scopes.pop()
    }

    /// Binds `name` in the innermost scope.
    pub fn define(&mut self, name: impl Into<String>, values: Vec<String>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.define(name, values);
        }
    }

    /// Appends `values` to the visible value of `name` and binds the result in
    /// the innermost scope. An undefined name starts from an empty list.
    pub fn append(&mut self, name: &str, values: Vec<String>) {
        let mut current = self.resolve(name).map(<[String]>::to_vec).unwrap_or_default();
        current.extend(values);
        self.define(name, current);
    }

    /// Removes `name` from the innermost scope. Bindings of enclosing scopes
    /// are left untouched.
    pub fn delete(&mut self, name: &str) -> bool {
        self.scopes
            .last_mut()
            .map(|scope| scope.delete(name))
            .unwrap_or(false)
    }

    /// Looks `name` up from the innermost scope outwards.
    pub fn resolve(&self, name: &str) -> Result<&[String], EnvError> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .ok_or_else(|| EnvError::Undefined(name.to_string()))
    }

    /// True when `name` is visible from the innermost scope.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }

    /// Flattens the chain into a single scope where inner bindings win.
    pub fn snapshot(&self) -> Scope {
        let mut flat = Scope::new();
        for scope in &self.scopes {
            for (name, values) in scope.iter() {
                flat.define(name.clone(), values.clone());
            }
        }
        flat
    }
}
