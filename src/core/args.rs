// src/core/args.rs

//! Binding of invocation arguments to a command's declared options and
//! positional arguments.
//!
//! The result is a [`Scope`] layered over the command's definition-time
//! variables when its script lines are expanded. Options are bound under each
//! of their spellings, declared arguments under their names, and every
//! positional value under `args` unless a declared argument already uses it.

use crate::constants::ARGS_VARIABLE;
use crate::core::env::Scope;
use crate::core::validate::RuleError;
use crate::models::{CommandOption, CommandSettings};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("{0}: unknown option")]
    UnknownOption(String),
    #[error("{0}: option requires a value")]
    MissingValue(String),
    #[error("{0}: flag does not take a value")]
    UnexpectedValue(String),
    #[error("{0}: required option not provided")]
    MissingOption(String),
    #[error("{0}: missing argument")]
    MissingArgument(String),
    #[error("{name}: {source}")]
    Invalid {
        name: String,
        #[source]
        source: RuleError,
    },
}

/// Raw command line split into option values and positionals.
#[derive(Debug, Default)]
struct CliInputState<'a> {
    named: BTreeMap<usize, String>,
    positional: Vec<&'a str>,
}

impl<'a> CliInputState<'a> {
    /// Walks `args` once. Dash-prefixed words are options when the command
    /// declares any; otherwise they are passed through as positionals.
    fn parse(options: &[CommandOption], args: &'a [String]) -> Result<Self, ArgumentError> {
        let mut state = Self::default();
        let mut words = args.iter().map(String::as_str);
        while let Some(word) = words.next() {
            if word == "--" {
                state.positional.extend(words.by_ref());
                break;
            }
            let Some(spelled) = option_name(word) else {
                state.positional.push(word);
                continue;
            };
            if options.is_empty() {
                state.positional.push(word);
                continue;
            }
            let (name, inline) = match spelled.split_once('=') {
                Some((name, value)) => (name, Some(value)),
                None => (spelled, None),
            };
            let Some(index) = options.iter().position(|option| option.matches(name)) else {
                return Err(ArgumentError::UnknownOption(word.to_string()));
            };
            let flag = options.get(index).is_some_and(|option| option.flag);
            let value = match (flag, inline) {
                (true, None) => "true".to_string(),
                (true, Some(value)) => match crate::core::validate::parse_bool(value) {
                    Some(b) => b.to_string(),
                    None => return Err(ArgumentError::UnexpectedValue(word.to_string())),
                },
                (false, Some(value)) => value.to_string(),
                (false, None) => words
                    .next()
                    .map(str::to_string)
                    .ok_or_else(|| ArgumentError::MissingValue(word.to_string()))?,
            };
            state.named.insert(index, value);
        }
        Ok(state)
    }
}

/// `--name` or `-n`, but not `-`, `--` or a negative number.
fn option_name(word: &str) -> Option<&str> {
    let name = word
        .strip_prefix("--")
        .or_else(|| word.strip_prefix('-'))?;
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    Some(name)
}

/// Binds `args` against the declarations of `settings`.
pub fn bind(settings: &CommandSettings, args: &[String]) -> Result<Scope, ArgumentError> {
    let state = CliInputState::parse(&settings.options, args)?;
    let mut scope = Scope::new();

    for (index, option) in settings.options.iter().enumerate() {
        let value = match state.named.get(&index) {
            Some(value) => value.clone(),
            None if option.required => {
                return Err(ArgumentError::MissingOption(option.name().to_string()));
            }
            None => match (&option.default, option.flag) {
                (Some(default), _) => default.clone(),
                (None, true) => "false".to_string(),
                (None, false) => String::new(),
            },
        };
        if let Some(rule) = &option.valid {
            if !option.flag {
                rule.validate(&value).map_err(|source| ArgumentError::Invalid {
                    name: option.name().to_string(),
                    source,
                })?;
            }
        }
        for spelling in [&option.short, &option.long].into_iter().flatten() {
            scope.define(spelling.clone(), vec![value.clone()]);
        }
    }

    let mut positional = state.positional.iter();
    for arg in &settings.args {
        let value = positional
            .next()
            .ok_or_else(|| ArgumentError::MissingArgument(arg.name.clone()))?;
        if let Some(rule) = &arg.valid {
            rule.validate(value).map_err(|source| ArgumentError::Invalid {
                name: arg.name.clone(),
                source,
            })?;
        }
        scope.define(arg.name.clone(), vec![value.to_string()]);
    }

    if !settings.args.iter().any(|arg| arg.name == ARGS_VARIABLE) {
        let all = state.positional.iter().map(|s| s.to_string()).collect();
        scope.define(ARGS_VARIABLE, all);
    }
    log::trace!("Bound arguments for '{}': {:?}", settings.name, scope);
    Ok(scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validate::Rule;
    use crate::models::CommandArg;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn settings() -> CommandSettings {
        let mut cmd = CommandSettings::new("deploy");
        cmd.options = vec![
            CommandOption {
                short: Some("e".to_string()),
                long: Some("env".to_string()),
                default: Some("dev".to_string()),
                valid: Some(Rule::primitive("oneof", &strings(&["dev", "prod"])).unwrap()),
                ..Default::default()
            },
            CommandOption {
                long: Some("dry".to_string()),
                flag: true,
                ..Default::default()
            },
        ];
        cmd.args = vec![CommandArg {
            name: "version".to_string(),
            valid: Some(Rule::primitive("notempty", &[]).unwrap()),
        }];
        cmd
    }

    fn get(scope: &Scope, name: &str) -> Vec<String> {
        scope.get(name).unwrap_or_default().to_vec()
    }

    #[test]
    fn test_binds_options_flags_and_arguments() {
        let scope = bind(&settings(), &strings(&["-e", "prod", "--dry", "1.2", "extra"])).unwrap();
        assert_eq!(get(&scope, "env"), vec!["prod"]);
        assert_eq!(get(&scope, "e"), vec!["prod"]);
        assert_eq!(get(&scope, "dry"), vec!["true"]);
        assert_eq!(get(&scope, "version"), vec!["1.2"]);
        assert_eq!(get(&scope, "args"), vec!["1.2", "extra"]);
    }

    #[test]
    fn test_defaults_and_inline_values() {
        let scope = bind(&settings(), &strings(&["--env=prod", "1.0"])).unwrap();
        assert_eq!(get(&scope, "env"), vec!["prod"]);
        assert_eq!(get(&scope, "dry"), vec!["false"]);

        let scope = bind(&settings(), &strings(&["1.0"])).unwrap();
        assert_eq!(get(&scope, "env"), vec!["dev"]);
    }

    #[test]
    fn test_binding_errors() {
        assert_eq!(
            bind(&settings(), &strings(&["--nope", "1"])).unwrap_err(),
            ArgumentError::UnknownOption("--nope".to_string())
        );
        assert_eq!(
            bind(&settings(), &strings(&["1", "--env"])).unwrap_err(),
            ArgumentError::MissingValue("--env".to_string())
        );
        assert_eq!(
            bind(&settings(), &[]).unwrap_err(),
            ArgumentError::MissingArgument("version".to_string())
        );
        assert!(matches!(
            bind(&settings(), &strings(&["--env", "qa", "1"])),
            Err(ArgumentError::Invalid { ref name, .. }) if name == "env"
        ));
    }

    #[test]
    fn test_required_option() {
        let mut cmd = CommandSettings::new("x");
        cmd.options = vec![CommandOption {
            long: Some("token".to_string()),
            required: true,
            ..Default::default()
        }];
        assert_eq!(
            bind(&cmd, &[]).unwrap_err(),
            ArgumentError::MissingOption("token".to_string())
        );
    }

    #[test]
    fn test_dashes_pass_through_without_declared_options() {
        let cmd = CommandSettings::new("echo");
        let scope = bind(&cmd, &strings(&["-n", "hello", "-5"])).unwrap();
        assert_eq!(get(&scope, "args"), vec!["-n", "hello", "-5"]);
    }

    #[test]
    fn test_declared_args_shadow_the_args_variable() {
        let mut cmd = CommandSettings::new("b");
        cmd.args = vec![CommandArg {
            name: "args".to_string(),
            valid: None,
        }];
        let scope = bind(&cmd, &strings(&["x", "y"])).unwrap();
        assert_eq!(get(&scope, "args"), vec!["x"]);
    }

    #[test]
    fn test_double_dash_ends_options() {
        let scope = bind(&settings(), &strings(&["--", "--env"])).unwrap();
        assert_eq!(get(&scope, "version"), vec!["--env"]);
    }
}
