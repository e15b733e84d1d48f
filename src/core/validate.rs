// src/core/validate.rs

//! Validation rules attached to command options and positional arguments.
//!
//! Rules are built once by the decoder and evaluated against the values given
//! on each invocation. Three combinators compose them recursively: `all`
//! (every rule passes), `some` (at least one passes) and `not` (the
//! conjunction of its rules fails).

use regex::Regex;
use std::path::Path;
use thiserror::Error;

/// Combinator names recognized by the decoder.
pub const RULE_ALL: &str = "all";
pub const RULE_SOME: &str = "some";
pub const RULE_NOT: &str = "not";

/// Errors raised while building or evaluating a rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The rule name is not one of the known primitives.
    #[error("{0}: unknown validation rule")]
    Unknown(String),
    /// The rule was given the wrong number or kind of arguments.
    #[error("{rule}: {reason}")]
    Arguments { rule: String, reason: String },
    /// A value did not satisfy the rule.
    #[error("'{value}': {reason}")]
    Invalid { value: String, reason: String },
}

/// A primitive check over a single string value.
#[derive(Debug, Clone)]
pub enum Check {
    NotEmpty,
    Int,
    Float,
    Bool,
    OneOf(Vec<String>),
    NoneOf(Vec<String>),
    Match(Regex),
    MinLen(usize),
    MaxLen(usize),
    Min(f64),
    Max(f64),
    Between(f64, f64),
    File,
    Dir,
    Exists,
}

/// A composable validation rule.
#[derive(Debug, Clone)]
pub enum Rule {
    All(Vec<Rule>),
    Any(Vec<Rule>),
    Not(Vec<Rule>),
    Check(Check),
}

impl Rule {
    /// True for the names that take a nested rule list instead of arguments.
    pub fn is_combinator(name: &str) -> bool {
        matches!(name, RULE_ALL | RULE_SOME | RULE_NOT)
    }

    /// Builds a combinator from its name and nested rules.
    pub fn combine(name: &str, rules: Vec<Rule>) -> Result<Self, RuleError> {
        match name {
            RULE_ALL => Ok(Self::All(rules)),
            RULE_SOME => Ok(Self::Any(rules)),
            RULE_NOT => Ok(Self::Not(rules)),
            _ => Err(RuleError::Unknown(name.to_string())),
        }
    }

    /// Folds a rule list into a single rule: nothing, the rule itself, or `all`.
    pub fn from_list(mut rules: Vec<Rule>) -> Option<Self> {
        match rules.len() {
            0 => None,
            1 => rules.pop(),
            _ => Some(Self::All(rules)),
        }
    }

    /// Builds a primitive rule from its name and literal arguments.
    pub fn primitive(name: &str, args: &[String]) -> Result<Self, RuleError> {
        let check = match name {
            "notempty" => no_args(name, args, Check::NotEmpty)?,
            "int" => no_args(name, args, Check::Int)?,
            "float" => no_args(name, args, Check::Float)?,
            "bool" => no_args(name, args, Check::Bool)?,
            "file" => no_args(name, args, Check::File)?,
            "dir" => no_args(name, args, Check::Dir)?,
            "exists" => no_args(name, args, Check::Exists)?,
            "oneof" => Check::OneOf(at_least_one(name, args)?),
            "noneof" => Check::NoneOf(at_least_one(name, args)?),
            "match" => {
                let [pattern] = args else {
                    return Err(arguments(name, "expects exactly one pattern"));
                };
                let re = Regex::new(pattern).map_err(|e| arguments(name, &e.to_string()))?;
                Check::Match(re)
            }
            "minlen" => Check::MinLen(single_number(name, args)?),
            "maxlen" => Check::MaxLen(single_number(name, args)?),
            "min" => Check::Min(single_number(name, args)?),
            "max" => Check::Max(single_number(name, args)?),
            "between" => {
                let [low, high] = args else {
                    return Err(arguments(name, "expects a lower and an upper bound"));
                };
                let low = parse_number(name, low)?;
                let high = parse_number(name, high)?;
                if low > high {
                    return Err(arguments(name, "lower bound is greater than upper bound"));
                }
                Check::Between(low, high)
            }
            _ => return Err(RuleError::Unknown(name.to_string())),
        };
        Ok(Self::Check(check))
    }

    /// Checks `value` against the rule.
    pub fn validate(&self, value: &str) -> Result<(), RuleError> {
        match self {
            Self::All(rules) => rules.iter().try_for_each(|rule| rule.validate(value)),
            Self::Any(rules) => {
                if rules.is_empty() {
                    return Ok(());
                }
                let mut last = None;
                for rule in rules {
                    match rule.validate(value) {
                        Ok(()) => return Ok(()),
                        Err(e) => last = Some(e),
                    }
                }
                Err(last.unwrap_or_else(|| invalid(value, "no rule matched")))
            }
            Self::Not(rules) => {
                if rules.iter().all(|rule| rule.validate(value).is_ok()) {
                    Err(invalid(value, "value matches a forbidden rule"))
                } else {
                    Ok(())
                }
            }
            Self::Check(check) => check.validate(value),
        }
    }
}

impl Check {
    fn validate(&self, value: &str) -> Result<(), RuleError> {
        let ok = match self {
            Self::NotEmpty => !value.trim().is_empty(),
            Self::Int => value.parse::<i64>().is_ok(),
            Self::Float => value.parse::<f64>().is_ok(),
            Self::Bool => parse_bool(value).is_some(),
            Self::OneOf(choices) => choices.iter().any(|c| c == value),
            Self::NoneOf(choices) => !choices.iter().any(|c| c == value),
            Self::Match(re) => re.is_match(value),
            Self::MinLen(n) => value.chars().count() >= *n,
            Self::MaxLen(n) => value.chars().count() <= *n,
            Self::Min(n) => value.parse::<f64>().is_ok_and(|v| v >= *n),
            Self::Max(n) => value.parse::<f64>().is_ok_and(|v| v <= *n),
            Self::Between(low, high) => value
                .parse::<f64>()
                .is_ok_and(|v| v >= *low && v <= *high),
            Self::File => Path::new(value).is_file(),
            Self::Dir => Path::new(value).is_dir(),
            Self::Exists => Path::new(value).exists(),
        };
        if ok {
            Ok(())
        } else {
            Err(invalid(value, &self.describe()))
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::NotEmpty => "value should not be empty".to_string(),
            Self::Int => "value should be an integer".to_string(),
            Self::Float => "value should be a number".to_string(),
            Self::Bool => "value should be a boolean".to_string(),
            Self::OneOf(choices) => format!("value should be one of {}", choices.join(", ")),
            Self::NoneOf(choices) => format!("value should not be one of {}", choices.join(", ")),
            Self::Match(re) => format!("value should match {}", re.as_str()),
            Self::MinLen(n) => format!("value should have at least {} characters", n),
            Self::MaxLen(n) => format!("value should have at most {} characters", n),
            Self::Min(n) => format!("value should be at least {}", n),
            Self::Max(n) => format!("value should be at most {}", n),
            Self::Between(low, high) => format!("value should be between {} and {}", low, high),
            Self::File => "value should be an existing file".to_string(),
            Self::Dir => "value should be an existing directory".to_string(),
            Self::Exists => "value should be an existing path".to_string(),
        }
    }
}

/// Parses the boolean spellings accepted in maestro files and on the command line.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "yes" | "on" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "no" | "off" => Some(false),
        _ => None,
    }
}

// --- Argument helpers ---

fn arguments(rule: &str, reason: &str) -> RuleError {
    RuleError::Arguments {
        rule: rule.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid(value: &str, reason: &str) -> RuleError {
    RuleError::Invalid {
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn no_args(rule: &str, args: &[String], check: Check) -> Result<Check, RuleError> {
    if args.is_empty() {
        Ok(check)
    } else {
        Err(arguments(rule, "does not take arguments"))
    }
}

fn at_least_one(rule: &str, args: &[String]) -> Result<Vec<String>, RuleError> {
    if args.is_empty() {
        Err(arguments(rule, "expects at least one value"))
    } else {
        Ok(args.to_vec())
    }
}

fn single_number<T: std::str::FromStr>(rule: &str, args: &[String]) -> Result<T, RuleError> {
    let [value] = args else {
        return Err(arguments(rule, "expects exactly one number"));
    };
    parse_number(rule, value)
}

fn parse_number<T: std::str::FromStr>(rule: &str, value: &str) -> Result<T, RuleError> {
    value
        .parse::<T>()
        .map_err(|_| arguments(rule, &format!("'{}' is not a valid number", value)))
}
