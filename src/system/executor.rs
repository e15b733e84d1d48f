// src/system/executor.rs

use crate::CancellationToken;
use crate::core::args::ArgumentError;
use crate::core::interpolator::InterpolationError;
use crate::system::output::Output;
use crate::system::remote::RemoteError;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::Ordering;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as TokioCommand;
use tokio::time::Instant;

/// How often a running process is checked for cancellation and timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, #[source] io::Error),
    #[error("Command '{command}' exited with status {code}.")]
    NonZeroExitStatus { command: String, code: i32 },
    #[error("Command '{0}' was terminated by a signal.")]
    Terminated(String),
    #[error("Command '{command}' timed out after {}s.", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
    #[error("Operation was cancelled by the user.")]
    Cancelled,
    #[error("{0}: command is hidden")]
    Hidden(String),
    #[error("{0}: command is not allowed")]
    NotAllowed(String),
    #[error("{0}: command has no remote targets")]
    NotRemote(String),
    #[error("{name}: {source}")]
    Arguments {
        name: String,
        #[source]
        source: ArgumentError,
    },
    #[error("{name}: {source}")]
    Interpolation {
        name: String,
        #[source]
        source: InterpolationError,
    },
    #[error("{command}: value of {name} cannot be quoted for a shell: {source}")]
    Quote {
        command: String,
        name: String,
        #[source]
        source: shlex::QuoteError,
    },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Could not write output: {0}")]
    Output(#[from] io::Error),
    #[error("Background task failed: {0}")]
    Join(String),
}

impl ExecutionError {
    /// True when the error, or the remote error it wraps, is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Remote(RemoteError::Cancelled)
        )
    }
}

/// Process-level settings shared by every line of one script.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub workdir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub aliases: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    /// Print every line before running it.
    pub echo: bool,
}

/// Runs `lines` one after the other, stopping at the first failure. A
/// configured timeout bounds the whole script, not each line.
pub async fn execute_script(
    lines: &[String],
    spec: &ProcessSpec,
    output: &Output,
    cancellation_token: &CancellationToken,
) -> Result<(), ExecutionError> {
    let deadline = spec.timeout.map(|timeout| (Instant::now() + timeout, timeout));
    for line in lines {
        let line = apply_alias(line, &spec.aliases);
        execute_command(&line, spec, deadline, output, cancellation_token).await?;
    }
    Ok(())
}

/// Replaces the first word of `line` when it names a shell alias.
pub fn apply_alias(line: &str, aliases: &BTreeMap<String, String>) -> String {
    let trimmed = line.trim_start();
    let (first, rest) = match trimmed.find(char::is_whitespace) {
        Some(at) => trimmed.split_at(at),
        None => (trimmed, ""),
    };
    match aliases.get(first) {
        Some(value) => format!("{}{}", value, rest),
        None => trimmed.to_string(),
    }
}

/// Executes one line through `sh -c`, piping its output line by line into
/// `output`. The call returns once the process has exited, or as soon as the
/// token is cancelled or the deadline passes, in which case the process is
/// killed.
pub async fn execute_command(
    command_line: &str,
    spec: &ProcessSpec,
    deadline: Option<(Instant, Duration)>,
    output: &Output,
    cancellation_token: &CancellationToken,
) -> Result<(), ExecutionError> {
    let trimmed_command = command_line.trim();
    if trimmed_command.is_empty() {
        return Ok(());
    }
    if cancellation_token.load(Ordering::SeqCst) {
        return Err(ExecutionError::Cancelled);
    }
    if spec.echo {
        output.out(&format!("→ {}", trimmed_command))?;
    }

    let mut command = TokioCommand::new("sh");
    command
        .arg("-c")
        .arg(trimmed_command)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(workdir) = &spec.workdir {
        command.current_dir(dunce::simplified(workdir));
    }

    let mut child = command
        .spawn()
        .map_err(|e| ExecutionError::CommandFailed(trimmed_command.to_string(), e))?;
    log::debug!("Spawned '{}' (PID: {:?})", trimmed_command, child.id());

    let stdout = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(pipe_lines(pipe, output.clone(), false)));
    let stderr = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(pipe_lines(pipe, output.clone(), true)));

    // Wait for the process while polling for cancellation and timeout.
    let status = loop {
        tokio::select! {
            status = child.wait() => {
                break status.map_err(|e| ExecutionError::CommandFailed(trimmed_command.to_string(), e))?;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {
                if cancellation_token.load(Ordering::SeqCst) {
                    log::debug!("Cancellation requested, killing child process (PID: {:?})...", child.id());
                    if let Err(e) = child.kill().await {
                        log::warn!("Failed to kill child process: {}", e);
                    }
                    return Err(ExecutionError::Cancelled);
                }
                if let Some((at, timeout)) = deadline {
                    if Instant::now() >= at {
                        log::debug!("'{}' exceeded its timeout, killing it", trimmed_command);
                        if let Err(e) = child.kill().await {
                            log::warn!("Failed to kill child process: {}", e);
                        }
                        return Err(ExecutionError::Timeout {
                            command: trimmed_command.to_string(),
                            timeout,
                        });
                    }
                }
            }
        }
    };

    for task in [stdout, stderr].into_iter().flatten() {
        match task.await {
            Ok(result) => result?,
            Err(e) => log::warn!("Output reader task failed: {}", e),
        }
    }

    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ExecutionError::NonZeroExitStatus {
            command: trimmed_command.to_string(),
            code,
        }),
        None => Err(ExecutionError::Terminated(trimmed_command.to_string())),
    }
}

/// Forwards every line read from `pipe` to the output sink.
pub async fn pipe_lines<R>(pipe: R, output: Output, stderr: bool) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&buf);
        let line = text.trim_end_matches(['\n', '\r']);
        if stderr {
            output.err(line)?;
        } else {
            output.out(line)?;
        }
    }
}
