// src/system/remote.rs

//! Remote execution over the system `ssh` client.
//!
//! Every script line runs in its own session. Hosts are processed
//! concurrently, at most `parallel` at a time, while the lines of one host run
//! strictly in order. A host that fails stops only its own remaining lines.

use crate::CancellationToken;
use crate::models::{CommandTarget, MetaSsh};
use crate::system::executor::pipe_lines;
use crate::system::output::Output;
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Exit status reported by `ssh` itself when the connection fails.
const SSH_CONNECTION_FAILURE: i32 = 255;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{host}: could not start ssh: {source}")]
    Spawn {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("{host}: connection failed")]
    Connection { host: String },
    #[error("{host}: '{command}' exited with status {code}")]
    Session {
        host: String,
        command: String,
        code: i32,
    },
    #[error("{host}: session terminated by a signal")]
    Terminated { host: String },
    #[error("{host}: task failed: {reason}")]
    Task { host: String, reason: String },
    #[error("Operation was cancelled by the user.")]
    Cancelled,
    #[error("{} host(s) failed:\n{}", .0.len(), join_errors(.0))]
    Hosts(Vec<RemoteError>),
}

fn join_errors(errors: &[RemoteError]) -> String {
    errors
        .iter()
        .map(|e| format!("  {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// What to run on every target.
#[derive(Debug, Clone)]
pub struct RemoteJob {
    pub command: String,
    pub lines: Vec<String>,
    pub ssh: MetaSsh,
    /// Tag output lines with `user;host;command`.
    pub prefix: bool,
}

/// Runs `job` on every distinct target.
pub async fn execute_remote(
    job: RemoteJob,
    targets: Vec<CommandTarget>,
    output: Output,
    cancellation_token: CancellationToken,
) -> Result<(), RemoteError> {
    let job = Arc::new(job);
    let parallel = job.ssh.parallel;
    run_hosts(targets, parallel, move |target| {
        run_on_host(
            target,
            Arc::clone(&job),
            output.clone(),
            Arc::clone(&cancellation_token),
        )
    })
    .await
}

/// Starts one task per distinct host, admitting at most `parallel` at once
/// (every host when unset), and waits for all of them.
pub async fn run_hosts<F, Fut>(
    targets: Vec<CommandTarget>,
    parallel: Option<usize>,
    run: F,
) -> Result<(), RemoteError>
where
    F: Fn(CommandTarget) -> Fut,
    Fut: Future<Output = Result<(), RemoteError>> + Send + 'static,
{
    let mut hosts: Vec<CommandTarget> = Vec::new();
    for target in targets {
        if !hosts.iter().any(|seen| seen.address() == target.address()) {
            hosts.push(target);
        }
    }
    if hosts.is_empty() {
        return Ok(());
    }
    let limit = parallel.unwrap_or(hosts.len()).max(1);
    log::debug!("Running on {} host(s), {} at a time", hosts.len(), limit);
    let limiter = Arc::new(Semaphore::new(limit));

    let mut tasks = JoinSet::new();
    for target in hosts {
        let host = target.to_string();
        let limiter = Arc::clone(&limiter);
        let session = run(target);
        tasks.spawn(async move {
            let _permit = limiter
                .acquire_owned()
                .await
                .map_err(|e| RemoteError::Task {
                    host: host.clone(),
                    reason: e.to_string(),
                })?;
            session.await
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("{}", e);
                failures.push(e);
            }
            Err(e) => failures.push(RemoteError::Task {
                host: String::from("?"),
                reason: e.to_string(),
            }),
        }
    }

    if failures.iter().any(|e| matches!(e, RemoteError::Cancelled)) {
        return Err(RemoteError::Cancelled);
    }
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0)),
        _ => Err(RemoteError::Hosts(failures)),
    }
}

/// Runs every line of `job` on one host, one session per line.
async fn run_on_host(
    target: CommandTarget,
    job: Arc<RemoteJob>,
    output: Output,
    cancellation_token: CancellationToken,
) -> Result<(), RemoteError> {
    let host = target.to_string();
    let user = target
        .user
        .clone()
        .or_else(|| job.ssh.user.clone())
        .unwrap_or_default();
    let output = if job.prefix {
        output.with_prefix(format!("{};{};{}", user, target.host, job.command))
    } else {
        output
    };

    for line in &job.lines {
        if cancellation_token.load(Ordering::SeqCst) {
            return Err(RemoteError::Cancelled);
        }
        let (program, args) = ssh_invocation(&target, &job.ssh, line);
        log::debug!("{}: {} {}", host, program, args.join(" "));
        let mut command = TokioCommand::new(&program);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(password) = &job.ssh.password {
            command.env("SSHPASS", password);
        }
        let mut child = command.spawn().map_err(|source| RemoteError::Spawn {
            host: host.clone(),
            source,
        })?;

        let readers: Vec<_> = [
            child
                .stdout
                .take()
                .map(|pipe| tokio::spawn(pipe_lines(pipe, output.clone(), false))),
            child
                .stderr
                .take()
                .map(|pipe| tokio::spawn(pipe_lines(pipe, output.clone(), true))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let status = child.wait().await.map_err(|source| RemoteError::Spawn {
            host: host.clone(),
            source,
        })?;
        for reader in readers {
            if let Ok(Err(e)) = reader.await {
                log::warn!("{}: could not forward output: {}", host, e);
            }
        }

        match status.code() {
            Some(0) => {}
            Some(SSH_CONNECTION_FAILURE) => return Err(RemoteError::Connection { host }),
            Some(code) => {
                return Err(RemoteError::Session {
                    host,
                    command: line.clone(),
                    code,
                });
            }
            None => return Err(RemoteError::Terminated { host }),
        }
    }
    Ok(())
}

/// The program and arguments of one ssh session running `line` on `target`.
/// A password credential goes through `sshpass -e`, which reads it from the
/// `SSHPASS` environment variable.
pub fn ssh_invocation(target: &CommandTarget, ssh: &MetaSsh, line: &str) -> (String, Vec<String>) {
    let mut args: Vec<String> = Vec::new();
    let program = if ssh.password.is_some() {
        args.extend(["-e".to_string(), "ssh".to_string()]);
        "sshpass".to_string()
    } else {
        args.extend(["-o".to_string(), "BatchMode=yes".to_string()]);
        "ssh".to_string()
    };
    args.extend(["-p".to_string(), target.port.to_string()]);
    if let Some(key) = &ssh.key {
        args.extend(["-i".to_string(), key.display().to_string()]);
    }
    match &ssh.known_hosts {
        Some(file) => args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=yes".to_string(),
            "-o".to_string(),
            format!("UserKnownHostsFile={}", file.display()),
        ]),
        None => args.extend([
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
        ]),
    }
    let user = target.user.as_ref().or(ssh.user.as_ref());
    let destination = match user {
        Some(user) => format!("{}@{}", user, target.host),
        None => target.host.clone(),
    };
    args.push(destination);
    args.push("--".to_string());
    args.push(line.to_string());
    (program, args)
}
