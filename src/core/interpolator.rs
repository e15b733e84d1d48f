// src/core/interpolator.rs

//! Expansion of `%(name)` references inside strings.
//!
//! Two flavours exist. Quoted strings in a maestro file are expanded while
//! decoding and every reference must resolve to exactly one value. Script
//! lines are expanded right before they run; list values are joined with a
//! single space there.

use crate::core::env::{Env, EnvError};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use thiserror::Error;

lazy_static! {
    static ref VARIABLE_RE: Regex = Regex::new(r"%\(([^()\s]+)\)").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("{name}: expected a single value, found {count}")]
    MultiValued { name: String, count: usize },
}

/// Expands every reference in a quoted string. Each one must hold a single value.
pub fn expand_quoted(text: &str, env: &Env) -> Result<String, InterpolationError> {
    expand_with(text, env, |name, values| match values {
        [value] => Ok(value.clone()),
        _ => Err(InterpolationError::MultiValued {
            name: name.to_string(),
            count: values.len(),
        }),
    })
}

/// Expands every reference in a script line, joining list values with spaces.
pub fn expand_script(line: &str, env: &Env) -> Result<String, InterpolationError> {
    expand_with(line, env, |_, values| Ok(values.join(" ")))
}

fn expand_with<F>(text: &str, env: &Env, render: F) -> Result<String, InterpolationError>
where
    F: Fn(&str, &[String]) -> Result<String, InterpolationError>,
{
    let mut failure = None;
    let expanded = VARIABLE_RE.replace_all(text, |caps: &Captures<'_>| {
        let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let rendered = env
            .resolve(name)
            .map_err(InterpolationError::from)
            .and_then(|values| render(name, values));
        match rendered {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Env {
        let mut env = Env::new();
        env.define("name", vec!["world".to_string()]);
        env.define("list", vec!["a".to_string(), "b".to_string()]);
        env
    }

    #[test]
    fn test_quoted_expansion() {
        assert_eq!(expand_quoted("hello %(name)!", &env()).unwrap(), "hello world!");
        assert_eq!(expand_quoted("no refs", &env()).unwrap(), "no refs");
    }

    #[test]
    fn test_quoted_rejects_lists() {
        assert_eq!(
            expand_quoted("%(list)", &env()),
            Err(InterpolationError::MultiValued {
                name: "list".to_string(),
                count: 2
            })
        );
    }

    #[test]
    fn test_script_joins_lists() {
        assert_eq!(expand_script("echo %(list)", &env()).unwrap(), "echo a b");
    }

    #[test]
    fn test_undefined_reference() {
        assert_eq!(
            expand_script("echo %(missing)", &env()),
            Err(InterpolationError::Env(EnvError::Undefined(
                "missing".to_string()
            )))
        );
    }

    #[test]
    fn test_shell_percent_is_left_alone() {
        assert_eq!(
            expand_script("date +%Y-%m-%d", &env()).unwrap(),
            "date +%Y-%m-%d"
        );
        assert_eq!(
            expand_script("printf '%s'", &env()).unwrap(),
            "printf '%s'"
        );
    }
}
