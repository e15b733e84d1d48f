// src/cli.rs

use crate::constants::DEFAULT_FILE;
use crate::core::env::Scope;
use crate::models::{DuplicatePolicy, MetaExec};
use clap::Parser;
use std::path::PathBuf;

/// maestro: runs the commands declared in a maestro file.
///
/// Besides the commands of the file, a few names are reserved:
///
/// - `maestro` (no command) runs the command named by `.DEFAULT`.
/// - `maestro help [command]` prints the help of the file or of one command.
/// - `maestro version` prints the file name and its `.VERSION`.
/// - `maestro all` runs every command named by `.ALL`, in order.
/// - `maestro default` runs the command named by `.DEFAULT`.
/// - `maestro graph <command>` prints the dependency tree of a command.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// The maestro file to load.
    #[arg(short = 'f', long = "file", default_value = DEFAULT_FILE)]
    pub file: PathBuf,

    /// Print the expanded scripts instead of running them.
    #[arg(short = 'd', long)]
    pub dry: bool,

    /// Skip the dependencies of the invoked command.
    #[arg(short = 'k', long = "no-deps")]
    pub nodeps: bool,

    /// Only run commands that declare remote hosts.
    #[arg(short = 'r', long)]
    pub remote: bool,

    /// Tag every output line with the name of the command that wrote it.
    #[arg(short = 'p', long)]
    pub prefix: bool,

    /// Treat a failure of the invoked command as success.
    #[arg(short = 'i', long)]
    pub ignore: bool,

    /// Print start, failure and elapsed time of every command.
    #[arg(short = 't', long)]
    pub trace: bool,

    /// Print every script line before running it.
    #[arg(short = 'e', long)]
    pub echo: bool,

    /// What to do when a command name is declared twice.
    #[arg(long, value_enum, default_value_t = DuplicatePolicy::Replace)]
    pub duplicate: DuplicatePolicy,

    /// Define a variable before the file is read (repeatable).
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE", value_parser = parse_define)]
    pub defines: Vec<(String, String)>,

    /// The command to run.
    pub command: Option<String>,

    /// Arguments passed to the command.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// The `-D` definitions as the outermost variable scope. Values are split
    /// on whitespace, the way a variable assignment in the file is.
    pub fn scope(&self) -> Scope {
        let mut scope = Scope::new();
        for (name, value) in &self.defines {
            scope.define(
                name.clone(),
                value.split_whitespace().map(str::to_string).collect(),
            );
        }
        scope
    }

    /// Applies the behaviour flags on top of what the file declares. A flag
    /// can switch a behaviour on, never off.
    pub fn apply(&self, exec: &mut MetaExec) {
        exec.dry |= self.dry;
        exec.nodeps |= self.nodeps;
        exec.remote |= self.remote;
        exec.prefix |= self.prefix;
        exec.ignore |= self.ignore;
        exec.trace |= self.trace;
        exec.echo |= self.echo;
    }
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("'{}': expected NAME=VALUE", raw))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("'{}': empty variable name", raw));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_command_and_args() {
        let cli = Cli::parse_from([
            "maestro", "-f", "build.mf", "-tp", "--duplicate", "append", "-D", "MODE=fast lean",
            "deploy", "staging", "--env", "prod",
        ]);
        assert_eq!(cli.file, PathBuf::from("build.mf"));
        assert!(cli.trace && cli.prefix && !cli.dry);
        assert_eq!(cli.duplicate, DuplicatePolicy::Append);
        assert_eq!(cli.command.as_deref(), Some("deploy"));
        assert_eq!(cli.args, vec!["staging", "--env", "prod"]);
        assert_eq!(cli.scope().get("MODE").unwrap(), ["fast", "lean"]);
    }

    #[test]
    fn test_flags_switch_behaviour_on() {
        let cli = Cli::parse_from(["maestro", "-e", "-i"]);
        let mut exec = MetaExec {
            trace: true,
            ..Default::default()
        };
        cli.apply(&mut exec);
        assert!(exec.echo && exec.ignore && exec.trace);
        assert!(!exec.dry);
    }

    #[test]
    fn test_parse_define_rejects_malformed_input() {
        assert!(parse_define("novalue").is_err());
        assert!(parse_define("=x").is_err());
        assert_eq!(parse_define("A=").unwrap(), ("A".to_string(), String::new()));
    }
}
