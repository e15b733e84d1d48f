// src/core/engine.rs

//! # Maestro
//!
//! The entry points of the task runner. A [`Maestro`] owns everything a
//! decoded file declares and runs commands from it, either locally through an
//! [`Executer`] tree or on remote hosts.

use crate::CancellationToken;
use crate::core::decoder::{self, DecodeError, Decoded};
use crate::core::env::Scope;
use crate::core::executer::{ExecContext, Executer, expand_lines, trace_end, trace_start};
use crate::core::graph_display::render_tree;
use crate::core::help::{render_command, render_overview};
use crate::core::registry::{Registry, RegistryError};
use crate::core::resolver::{ResolveError, resolve, resolve_hooks};
use crate::models::{Command, CommandSettings, DuplicatePolicy, MetaAbout, MetaExec, MetaHttp, MetaSsh};
use crate::system::executor::{ExecutionError, apply_alias};
use crate::system::output::Output;
use crate::system::remote::{RemoteJob, execute_remote};
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use thiserror::Error;

const HELP_FLAGS: [&str; 3] = ["-h", "-help", "--help"];

#[derive(Error, Debug)]
pub enum MaestroError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error("{0} command not defined")]
    NotConfigured(&'static str),
    #[error("Could not write output: {0}")]
    Output(#[from] io::Error),
}

impl MaestroError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Execution(e) if e.is_cancelled())
    }
}

#[derive(Debug)]
pub struct Maestro {
    pub exec: MetaExec,
    pub about: MetaAbout,
    pub ssh: MetaSsh,
    pub http: MetaHttp,
    registry: Registry,
    /// When set, only these commands may be executed directly.
    allowed: Option<BTreeSet<String>>,
    output: Output,
    cancellation_token: CancellationToken,
}

impl From<Decoded> for Maestro {
    fn from(decoded: Decoded) -> Self {
        Self {
            exec: decoded.exec,
            about: decoded.about,
            ssh: decoded.ssh,
            http: decoded.http,
            registry: decoded.registry,
            allowed: None,
            output: Output::stdio(),
            cancellation_token: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Maestro {
    /// Decodes the file at `path`. `defines` seeds the outermost scope.
    pub fn load(path: &Path, policy: DuplicatePolicy, defines: Scope) -> Result<Self, MaestroError> {
        let decoded = decoder::decode_file(path, policy, defines)?;
        log::debug!(
            "Loaded {} command(s) from {}",
            decoded.registry.len(),
            path.display()
        );
        Ok(decoded.into())
    }

    /// Decodes an in-memory source.
    pub fn from_source(source: &str, policy: DuplicatePolicy) -> Result<Self, MaestroError> {
        Ok(decoder::decode_str(source, policy)?.into())
    }

    /// Sends all output to `output` instead of the standard streams.
    pub fn with_output(mut self, output: Output) -> Self {
        self.output = output;
        self
    }

    /// Shares `token` with every execution started from now on.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        Arc::clone(&self.cancellation_token)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Limits direct execution to `names`. Dependencies and hooks are not
    /// affected.
    pub fn restrict<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = Some(names.into_iter().map(Into::into).collect());
    }

    /// The file name without its extension.
    pub fn name(&self) -> String {
        self.about
            .file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| crate::constants::TRACE_PREFIX.to_string())
    }

    // --- ENTRY POINTS ---

    /// Runs `name` with `args`.
    pub async fn execute(&self, name: &str, args: &[String]) -> Result<(), MaestroError> {
        if args.iter().any(|arg| HELP_FLAGS.contains(&arg.as_str())) {
            return self.execute_help(name);
        }
        if self.exec.dry {
            return self.dry(name, args);
        }
        let command = self.prepare(name)?;
        self.authorize(command)?;
        if command.is_remote() {
            return self.run_remote(command, args).await;
        }
        self.run_local(command, args).await
    }

    /// Runs the command named by the `DEFAULT` meta directive.
    pub async fn execute_default(&self, args: &[String]) -> Result<(), MaestroError> {
        let name = self
            .exec
            .default
            .as_deref()
            .ok_or(MaestroError::NotConfigured("default"))?;
        self.execute(name, args).await
    }

    /// Runs every command named by the `ALL` meta directive, in order,
    /// stopping at the first failure.
    pub async fn execute_all(&self, args: &[String]) -> Result<(), MaestroError> {
        if self.exec.all.is_empty() {
            return Err(MaestroError::NotConfigured("all"));
        }
        for name in &self.exec.all {
            self.execute(name, args).await?;
        }
        Ok(())
    }

    /// Prints the help of `name`, or the file-level help when `name` is empty.
    pub fn execute_help(&self, name: &str) -> Result<(), MaestroError> {
        let text = if name.is_empty() {
            let visible = self
                .registry
                .commands()
                .filter(|command| command.is_visible() && self.is_allowed(command));
            render_overview(&self.name(), &self.about, visible)
        } else {
            render_command(self.registry.find(name)?)
        };
        for line in text.lines() {
            self.output.out(line)?;
        }
        Ok(())
    }

    pub fn execute_version(&self) -> Result<(), MaestroError> {
        self.output
            .out(&format!("{} {}", self.name(), self.about.version))?;
        Ok(())
    }

    /// Prints the expanded script of `name` without running anything.
    pub fn dry(&self, name: &str, args: &[String]) -> Result<(), MaestroError> {
        let command = self.prepare(name)?;
        trace_start(&self.output, command.name(), args)?;
        for part in command.parts() {
            for line in expand_lines(&part, args)? {
                self.output.out(&line)?;
            }
        }
        Ok(())
    }

    /// Prints the dependency tree of `name` and the resulting execution order.
    pub fn graph(&self, name: &str) -> Result<(), MaestroError> {
        let command = self.prepare(name)?;
        let deps = resolve(&self.registry, command)?;
        for line in render_tree(command.name(), &deps) {
            self.output.out(&line)?;
        }
        Ok(())
    }

    // --- INTERNALS ---

    fn prepare(&self, name: &str) -> Result<&Command, MaestroError> {
        Ok(self.registry.find(name)?)
    }

    fn is_allowed(&self, command: &Command) -> bool {
        self.allowed
            .as_ref()
            .is_none_or(|allowed| allowed.contains(command.name()))
    }

    fn authorize(&self, command: &Command) -> Result<(), ExecutionError> {
        let name = command.name().to_string();
        if !command.is_visible() {
            return Err(ExecutionError::Hidden(name));
        }
        if !self.is_allowed(command) {
            return Err(ExecutionError::NotAllowed(name));
        }
        if self.exec.remote && !command.is_remote() {
            return Err(ExecutionError::NotRemote(name));
        }
        Ok(())
    }

    fn context(&self) -> ExecContext {
        ExecContext {
            output: self.output.clone(),
            cancellation_token: self.cancellation_token(),
            workdir: self.exec.workdir.clone(),
            prefix: self.exec.prefix,
            echo: self.exec.echo,
            ignore: self.exec.ignore,
        }
    }

    async fn run_local(&self, command: &Command, args: &[String]) -> Result<(), MaestroError> {
        let deps = if self.exec.nodeps {
            Vec::new()
        } else {
            resolve(&self.registry, command)?
        };
        let hooks = resolve_hooks(
            &self.registry,
            &self.exec.before,
            &self.exec.after,
            &self.exec.error,
            &self.exec.success,
        )?;
        let root = Executer::build(
            command.clone(),
            args.to_vec(),
            deps,
            hooks,
            self.exec.trace,
            self.exec.prefix,
        );
        root.execute(&self.context()).await?;
        Ok(())
    }

    async fn run_remote(&self, command: &Command, args: &[String]) -> Result<(), MaestroError> {
        let mut lines = Vec::new();
        for part in command.parts() {
            for line in expand_lines(&part, args)? {
                lines.push(remote_line(&part, &line)?);
            }
        }
        let job = RemoteJob {
            command: command.name().to_string(),
            lines,
            ssh: self.ssh.clone(),
            prefix: self.exec.prefix,
        };
        if self.exec.trace {
            trace_start(&self.output, command.name(), args)?;
        }
        let start = Instant::now();
        let result = execute_remote(
            job,
            command.targets(),
            self.output.clone(),
            self.cancellation_token(),
        )
        .await;
        if self.exec.trace {
            trace_end(&self.output, start, result.is_err())?;
        }
        result.map_err(|e| ExecutionError::from(e).into())
    }
}

/// One script line as sent to a remote shell. The working directory is
/// entered and exported variables are set first; the line, aliases applied,
/// only runs when all of them succeeded.
fn remote_line(part: &CommandSettings, line: &str) -> Result<String, ExecutionError> {
    let quote = |name: &str, value: &str| {
        shlex::try_quote(value)
            .map(|quoted| quoted.into_owned())
            .map_err(|source| ExecutionError::Quote {
                command: part.name.clone(),
                name: name.to_string(),
                source,
            })
    };
    let mut steps = Vec::new();
    if let Some(workdir) = &part.workdir {
        steps.push(format!("cd {}", quote("workdir", &workdir.to_string_lossy())?));
    }
    for (name, value) in &part.exports {
        steps.push(format!("export {}={}", name, quote(name, value)?));
    }
    let line = apply_alias(line, &part.aliases);
    if steps.is_empty() {
        return Ok(line);
    }
    // The group keeps `;` or `||` inside the line behind the prelude.
    Ok(format!("{} && {{ {}\n}}", steps.join(" && "), line))
}
