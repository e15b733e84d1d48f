// src/core/executer.rs

//! # Execution tree
//!
//! An [`Executer`] is built fresh for every invocation from the resolver's
//! output and consumed by running it once. The variant set is closed:
//!
//! - `Root`: the invoked command, its dependency nodes and the global hooks.
//! - `Dep`: one resolved dependency edge with its own sub-dependencies.
//! - `Tree`: tags the output of every command below it with the command name.
//! - `Trace`: prints a start line, a failure marker and the elapsed time.

use crate::CancellationToken;
use crate::constants::TRACE_PREFIX;
use crate::core::args::bind;
use crate::core::env::Env;
use crate::core::interpolator::expand_script;
use crate::core::resolver::{Hooks, ResolvedDep};
use crate::models::{Command, CommandSettings};
use crate::system::executor::{ExecutionError, ProcessSpec, execute_script};
use crate::system::output::Output;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Instant;
use tokio::task::JoinSet;

type ExecFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecutionError>> + Send + 'a>>;

/// Everything a running node needs besides its own definition.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub output: Output,
    pub cancellation_token: CancellationToken,
    /// Fallback working directory for commands that declare none.
    pub workdir: Option<PathBuf>,
    pub prefix: bool,
    pub echo: bool,
    /// Treat a failure of the invoked command as success.
    pub ignore: bool,
}

#[derive(Debug, Clone)]
pub enum Executer {
    Root {
        command: Command,
        args: Vec<String>,
        deps: Vec<Executer>,
        hooks: Hooks,
    },
    Dep {
        command: Command,
        args: Vec<String>,
        background: bool,
        optional: bool,
        deps: Vec<Executer>,
    },
    Tree(Box<Executer>),
    Trace(Box<Executer>),
}

impl Executer {
    /// Builds the tree for `command`. With `trace` set every node is traced;
    /// with `prefix` set the whole tree is wrapped for prefixed output.
    pub fn build(
        command: Command,
        args: Vec<String>,
        deps: Vec<ResolvedDep>,
        hooks: Hooks,
        trace: bool,
        prefix: bool,
    ) -> Self {
        let deps = deps.into_iter().map(|dep| Self::node(dep, trace)).collect();
        let mut root = Self::Root {
            command,
            args,
            deps,
            hooks,
        };
        if trace {
            root = Self::Trace(Box::new(root));
        }
        if prefix {
            root = Self::Tree(Box::new(root));
        }
        root
    }

    fn node(dep: ResolvedDep, trace: bool) -> Self {
        let node = Self::Dep {
            deps: dep.deps.into_iter().map(|d| Self::node(d, trace)).collect(),
            command: dep.command,
            args: dep.args,
            background: dep.background,
            optional: dep.optional,
        };
        if trace {
            Self::Trace(Box::new(node))
        } else {
            node
        }
    }

    /// The command and arguments this node runs.
    pub fn describe(&self) -> (&Command, &[String]) {
        match self {
            Self::Root { command, args, .. } | Self::Dep { command, args, .. } => (command, args),
            Self::Tree(inner) | Self::Trace(inner) => inner.describe(),
        }
    }

    pub fn name(&self) -> &str {
        self.describe().0.name()
    }

    pub fn is_background(&self) -> bool {
        match self {
            Self::Dep { background, .. } => *background,
            Self::Root { .. } => false,
            Self::Tree(inner) | Self::Trace(inner) => inner.is_background(),
        }
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Self::Dep { optional, .. } => *optional,
            Self::Root { .. } => false,
            Self::Tree(inner) | Self::Trace(inner) => inner.is_optional(),
        }
    }

    /// Runs the node and everything below it.
    pub fn execute<'a>(&'a self, ctx: &'a ExecContext) -> ExecFuture<'a> {
        Box::pin(async move {
            match self {
                Self::Root {
                    command,
                    args,
                    deps,
                    hooks,
                } => {
                    run_hooks("before", &hooks.before, ctx).await;
                    let mut result = match execute_deps(deps, ctx).await {
                        Ok(()) => run_command(command, args, ctx).await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = &result {
                        if ctx.ignore && !e.is_cancelled() {
                            log::warn!("Ignoring failure of '{}': {}", command.name(), e);
                            result = Ok(());
                        }
                    }
                    match &result {
                        Ok(()) => run_hooks("success", &hooks.success, ctx).await,
                        Err(_) => run_hooks("error", &hooks.error, ctx).await,
                    }
                    run_hooks("after", &hooks.after, ctx).await;
                    result
                }
                Self::Dep {
                    command, args, deps, ..
                } => {
                    execute_deps(deps, ctx).await?;
                    run_command(command, args, ctx).await
                }
                Self::Tree(inner) => {
                    let ctx = ExecContext {
                        prefix: true,
                        ..ctx.clone()
                    };
                    inner.execute(&ctx).await
                }
                Self::Trace(inner) => {
                    let (command, args) = inner.describe();
                    trace_start(&ctx.output, command.name(), args)?;
                    let start = Instant::now();
                    let result = inner.execute(ctx).await;
                    trace_end(&ctx.output, start, result.is_err())?;
                    result
                }
            }
        })
    }
}

/// Runs foreground dependencies in order and background ones concurrently.
/// Every background task is awaited before this returns; the first
/// non-optional failure, in completion order, is the group's error.
async fn execute_deps(deps: &[Executer], ctx: &ExecContext) -> Result<(), ExecutionError> {
    let mut background = JoinSet::new();
    let mut failure = None;

    for dep in deps {
        if dep.is_background() {
            let (dep, ctx) = (dep.clone(), ctx.clone());
            background.spawn(async move {
                let result = dep.execute(&ctx).await;
                (dep.name().to_string(), dep.is_optional(), result)
            });
            continue;
        }
        if let Err(e) = dep.execute(ctx).await {
            if dep.is_optional() && !e.is_cancelled() {
                log::warn!("Optional dependency '{}' failed: {}", dep.name(), e);
                continue;
            }
            failure = Some(e);
            break;
        }
    }

    while let Some(joined) = background.join_next().await {
        let error = match joined {
            Ok((_, _, Ok(()))) => continue,
            Ok((name, true, Err(e))) if !e.is_cancelled() => {
                log::warn!("Optional dependency '{}' failed: {}", name, e);
                continue;
            }
            Ok((_, _, Err(e))) => e,
            Err(e) => ExecutionError::Join(e.to_string()),
        };
        if failure.is_none() {
            failure = Some(error);
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Runs hooks one after the other. A failing hook is reported, not returned.
async fn run_hooks(kind: &str, hooks: &[Command], ctx: &ExecContext) {
    for hook in hooks {
        log::debug!("Running {} hook '{}'", kind, hook.name());
        if let Err(e) = run_command(hook, &[], ctx).await {
            log::warn!("{} hook '{}' failed: {}", kind, hook.name(), e);
        }
    }
}

/// Runs every part of `command` in declaration order, stopping at the first
/// failing part.
pub async fn run_command(
    command: &Command,
    args: &[String],
    ctx: &ExecContext,
) -> Result<(), ExecutionError> {
    for part in command.parts() {
        let lines = expand_lines(&part, args)?;
        let spec = ProcessSpec {
            workdir: part.workdir.clone().or_else(|| ctx.workdir.clone()),
            env: part.exports.clone(),
            aliases: part.aliases.clone(),
            timeout: part.timeout,
            echo: ctx.echo,
        };
        let output = if ctx.prefix {
            ctx.output.with_prefix(part.name.clone())
        } else {
            ctx.output.clone()
        };
        log::debug!("Executing '{}' ({} line(s))", part.name, lines.len());
        execute_script(&lines, &spec, &output, &ctx.cancellation_token).await?;
    }
    Ok(())
}

/// Binds `args` against the declarations of `part` and expands every script
/// line against the result layered over the declaration-time variables.
pub fn expand_lines(part: &CommandSettings, args: &[String]) -> Result<Vec<String>, ExecutionError> {
    let bindings = bind(part, args).map_err(|source| ExecutionError::Arguments {
        name: part.name.clone(),
        source,
    })?;
    let mut env = Env::with_scope(part.locals.clone());
    env.push_scope(bindings);
    part.lines
        .iter()
        .map(|line| expand_script(line, &env))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ExecutionError::Interpolation {
            name: part.name.clone(),
            source,
        })
}

// --- TRACING ---

/// `[maestro] name: arg1 'arg 2'`, or just the name without arguments.
pub fn trace_start(output: &Output, name: &str, args: &[String]) -> std::io::Result<()> {
    if args.is_empty() {
        return output.stdout.write_line(Some(TRACE_PREFIX), name);
    }
    let quoted = shlex::try_join(args.iter().map(String::as_str)).unwrap_or_else(|_| args.join(" "));
    output
        .stdout
        .write_line(Some(TRACE_PREFIX), &format!("{}: {}", name, quoted))
}

/// `[maestro] fail` when `failed`, then `[maestro] time: 0.123s`.
pub fn trace_end(output: &Output, start: Instant, failed: bool) -> std::io::Result<()> {
    if failed {
        output.stdout.write_line(Some(TRACE_PREFIX), "fail")?;
    }
    output.stdout.write_line(
        Some(TRACE_PREFIX),
        &format!("time: {:.3}s", start.elapsed().as_secs_f64()),
    )
}
