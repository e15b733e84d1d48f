// src/core/registry.rs

use crate::models::{Command, CommandSettings, DuplicatePolicy};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{0}: command already defined")]
    Duplicate(String),
    #[error("{name}: command not defined{}", did_you_mean(.suggestion))]
    NotFound {
        name: String,
        suggestion: Option<String>,
    },
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{}'?)", name),
        None => String::new(),
    }
}

/// The set of declared commands, keyed by name.
#[derive(Debug, Default)]
pub struct Registry {
    commands: BTreeMap<String, Command>,
    policy: DuplicatePolicy,
}

impl Registry {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            commands: BTreeMap::new(),
            policy,
        }
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Commands in name order.
    pub fn commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// Adds a definition, applying the duplicate policy on a name collision.
    pub fn register(&mut self, settings: CommandSettings) -> Result<(), RegistryError> {
        let name = settings.name.clone();
        let settings = Arc::new(settings);
        let Some(existing) = self.commands.remove(&name) else {
            log::debug!("Registered command '{}'", name);
            self.commands.insert(name, Command::Single(settings));
            return Ok(());
        };
        let command = match self.policy {
            DuplicatePolicy::Error => {
                self.commands.insert(name.clone(), existing);
                return Err(RegistryError::Duplicate(name));
            }
            DuplicatePolicy::Replace => {
                log::debug!("Command '{}' redefined, replacing previous definition", name);
                Command::Single(settings)
            }
            DuplicatePolicy::Append => {
                log::debug!("Command '{}' redefined, appending to previous definition", name);
                existing.append(settings)
            }
        };
        self.commands.insert(name, command);
        Ok(())
    }

    /// Finds a command by name, then by alias.
    pub fn lookup(&self, name: &str) -> Option<&Command> {
        if let Some(command) = self.commands.get(name) {
            return Some(command);
        }
        self.commands.values().find(|command| command.has_alias(name))
    }

    /// Like [`Registry::lookup`], failing with a suggestion when nothing matches.
    pub fn find(&self, name: &str) -> Result<&Command, RegistryError> {
        self.lookup(name).ok_or_else(|| RegistryError::NotFound {
            name: name.to_string(),
            suggestion: self.suggest(name),
        })
    }

    /// The known name or alias closest to `name`, if any is reasonably close.
    pub fn suggest(&self, name: &str) -> Option<String> {
        let threshold = (name.chars().count() / 3).max(2);
        self.commands
            .values()
            .flat_map(|command| {
                let mut names = vec![command.name().to_string()];
                for part in command.parts() {
                    names.extend(part.alias.iter().cloned());
                }
                names
            })
            .map(|candidate| (levenshtein(name, &candidate), candidate))
            .filter(|(distance, _)| *distance <= threshold)
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, candidate)| candidate)
    }
}

/// Edit distance between two strings, counted in characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = Vec::with_capacity(b.len() + 1);
        current.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let substitute = previous.get(j).copied().unwrap_or_default() + usize::from(ca != *cb);
            let delete = previous.get(j + 1).copied().unwrap_or_default() + 1;
            let insert = current.get(j).copied().unwrap_or_default() + 1;
            current.push(substitute.min(delete).min(insert));
        }
        previous = current;
    }
    previous.last().copied().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(name: &str, line: &str) -> CommandSettings {
        let mut cmd = CommandSettings::new(name);
        cmd.lines = vec![line.to_string()];
        cmd
    }

    fn lines(command: &Command) -> Vec<String> {
        command
            .parts()
            .iter()
            .flat_map(|part| part.lines.clone())
            .collect()
    }

    #[test]
    fn test_replace_keeps_second_definition() {
        let mut registry = Registry::new(DuplicatePolicy::Replace);
        registry.register(settings("build", "echo one")).unwrap();
        registry.register(settings("build", "echo two")).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(lines(registry.lookup("build").unwrap()), vec!["echo two"]);
    }

    #[test]
    fn test_append_combines_definitions() {
        let mut registry = Registry::new(DuplicatePolicy::Append);
        registry.register(settings("build", "echo one")).unwrap();
        registry.register(settings("build", "echo two")).unwrap();
        let command = registry.lookup("build").unwrap();
        assert!(matches!(command, Command::Combined(..)));
        assert_eq!(lines(command), vec!["echo one", "echo two"]);
    }

    #[test]
    fn test_error_policy_rejects_duplicates() {
        let mut registry = Registry::new(DuplicatePolicy::Error);
        registry.register(settings("build", "echo one")).unwrap();
        assert_eq!(
            registry.register(settings("build", "echo two")),
            Err(RegistryError::Duplicate("build".to_string()))
        );
        assert_eq!(lines(registry.lookup("build").unwrap()), vec!["echo one"]);
    }

    #[test]
    fn test_lookup_by_alias() {
        let mut registry = Registry::default();
        let mut cmd = settings("build", "make");
        cmd.alias = vec!["b".to_string(), "compile".to_string()];
        registry.register(cmd).unwrap();
        assert_eq!(registry.lookup("compile").unwrap().name(), "build");
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_not_found_suggests_closest_name() {
        let mut registry = Registry::default();
        registry.register(settings("deploy", "true")).unwrap();
        registry.register(settings("test", "true")).unwrap();
        let err = registry.find("deplyo").unwrap_err();
        assert_eq!(
            err,
            RegistryError::NotFound {
                name: "deplyo".to_string(),
                suggestion: Some("deploy".to_string())
            }
        );
        assert!(err.to_string().contains("did you mean 'deploy'"));
        assert_eq!(registry.suggest("zzzzzzzz"), None);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }
}
