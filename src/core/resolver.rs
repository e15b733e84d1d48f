// src/core/resolver.rs

//! Turns a command's dependency edges into a tree of resolved nodes.
//!
//! One visited set is shared by the whole pass, so a command reachable through
//! several paths appears once, under the first path that reaches it. A name
//! that is already on the path being walked is a cycle and fails the pass.

use crate::core::registry::{Registry, RegistryError};
use crate::models::Command;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Lookup(#[from] RegistryError),
    #[error("circular dependency: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },
}

/// One resolved dependency edge and the edges below it.
#[derive(Debug, Clone)]
pub struct ResolvedDep {
    pub command: Command,
    pub args: Vec<String>,
    pub background: bool,
    pub optional: bool,
    pub deps: Vec<ResolvedDep>,
}

impl ResolvedDep {
    pub fn name(&self) -> &str {
        self.command.name()
    }
}

/// The global hook lists, each resolved to commands without their own
/// dependencies.
#[derive(Debug, Clone, Default)]
pub struct Hooks {
    pub before: Vec<Command>,
    pub after: Vec<Command>,
    pub error: Vec<Command>,
    pub success: Vec<Command>,
}

struct Resolver<'a> {
    registry: &'a Registry,
    visited: HashSet<String>,
    path: Vec<String>,
}

impl Resolver<'_> {
    fn walk(&mut self, command: &Command) -> Result<Vec<ResolvedDep>, ResolveError> {
        self.path.push(command.name().to_string());
        let mut resolved = Vec::new();
        for edge in command.deps() {
            let target = match self.registry.find(&edge.name) {
                Ok(target) => target.clone(),
                Err(e) if edge.optional => {
                    log::debug!("Dropping optional dependency '{}': {}", edge.name, e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let name = target.name().to_string();
            if self.path.contains(&name) {
                let mut path = self.path.clone();
                path.push(name);
                return Err(ResolveError::CircularDependency { path });
            }
            if !self.visited.insert(name) {
                log::trace!("'{}' already resolved, skipping", target.name());
                continue;
            }
            let deps = self.walk(&target)?;
            resolved.push(ResolvedDep {
                command: target,
                args: edge.args,
                background: edge.background,
                optional: edge.optional,
                deps,
            });
        }
        self.path.pop();
        Ok(resolved)
    }
}

/// Resolves every dependency of `root`, depth first.
pub fn resolve(registry: &Registry, root: &Command) -> Result<Vec<ResolvedDep>, ResolveError> {
    let mut resolver = Resolver {
        registry,
        visited: HashSet::from([root.name().to_string()]),
        path: Vec::new(),
    };
    let deps = resolver.walk(root)?;
    log::debug!(
        "Resolved {} dependency node(s) for '{}'",
        resolver.visited.len() - 1,
        root.name()
    );
    Ok(deps)
}

/// Resolves a flat list of command names.
pub fn resolve_list(registry: &Registry, names: &[String]) -> Result<Vec<Command>, ResolveError> {
    names
        .iter()
        .map(|name| registry.find(name).cloned().map_err(ResolveError::from))
        .collect()
}

pub fn resolve_hooks(
    registry: &Registry,
    before: &[String],
    after: &[String],
    error: &[String],
    success: &[String],
) -> Result<Hooks, ResolveError> {
    Ok(Hooks {
        before: resolve_list(registry, before)?,
        after: resolve_list(registry, after)?,
        error: resolve_list(registry, error)?,
        success: resolve_list(registry, success)?,
    })
}

/// Names of every node in execution order: children before their parent.
pub fn execution_order(deps: &[ResolvedDep]) -> Vec<String> {
    let mut order = Vec::new();
    for dep in deps {
        order.extend(execution_order(&dep.deps));
        order.push(dep.name().to_string());
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CommandDep, CommandSettings, DuplicatePolicy};

    fn edge(name: &str) -> CommandDep {
        CommandDep {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn registry(defs: &[(&str, Vec<CommandDep>)]) -> Registry {
        let mut registry = Registry::new(DuplicatePolicy::Error);
        for (name, deps) in defs {
            let mut settings = CommandSettings::new(*name);
            settings.deps = deps.clone();
            registry.register(settings).unwrap();
        }
        registry
    }

    fn count(deps: &[ResolvedDep], name: &str) -> usize {
        deps.iter()
            .map(|dep| usize::from(dep.name() == name) + count(&dep.deps, name))
            .sum()
    }

    #[test]
    fn test_diamond_resolves_shared_dependency_once() {
        let registry = registry(&[
            ("a", vec![edge("b"), edge("c")]),
            ("b", vec![edge("d")]),
            ("c", vec![edge("d")]),
            ("d", vec![]),
        ]);
        let root = registry.find("a").unwrap().clone();
        let deps = resolve(&registry, &root).unwrap();
        assert_eq!(count(&deps, "d"), 1);
        assert_eq!(execution_order(&deps), vec!["d", "b", "c"]);
        // The first path wins.
        assert_eq!(deps[0].deps[0].name(), "d");
        assert!(deps[1].deps.is_empty());
    }

    #[test]
    fn test_missing_optional_dependency_is_dropped() {
        let registry = registry(&[(
            "a",
            vec![CommandDep {
                name: "ghost".to_string(),
                optional: true,
                ..Default::default()
            }],
        )]);
        let root = registry.find("a").unwrap().clone();
        assert!(resolve(&registry, &root).unwrap().is_empty());
    }

    #[test]
    fn test_missing_mandatory_dependency_fails() {
        let registry = registry(&[("a", vec![edge("ghost")])]);
        let root = registry.find("a").unwrap().clone();
        assert!(matches!(
            resolve(&registry, &root),
            Err(ResolveError::Lookup(RegistryError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_cycle_is_reported_with_its_path() {
        let registry = registry(&[
            ("a", vec![edge("b")]),
            ("b", vec![edge("c")]),
            ("c", vec![edge("a")]),
        ]);
        let root = registry.find("a").unwrap().clone();
        match resolve(&registry, &root) {
            Err(ResolveError::CircularDependency { path }) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected a cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_edge_flags_and_args_are_kept() {
        let registry = registry(&[
            (
                "a",
                vec![CommandDep {
                    name: "b".to_string(),
                    args: vec!["x".to_string()],
                    background: true,
                    optional: false,
                }],
            ),
            ("b", vec![]),
        ]);
        let root = registry.find("a").unwrap().clone();
        let deps = resolve(&registry, &root).unwrap();
        assert_eq!(deps[0].args, vec!["x"]);
        assert!(deps[0].background);
    }

    #[test]
    fn test_hooks_are_flat() {
        let registry = registry(&[("setup", vec![edge("deeper")]), ("deeper", vec![])]);
        let hooks = resolve_hooks(&registry, &["setup".to_string()], &[], &[], &[]).unwrap();
        assert_eq!(hooks.before.len(), 1);
        assert!(resolve_list(&registry, &["nope".to_string()]).is_err());
    }
}
