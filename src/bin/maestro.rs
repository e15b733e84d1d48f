// src/bin/maestro.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use maestro::cli::Cli;
use maestro::constants::{CMD_ALL, CMD_DEFAULT, CMD_GRAPH, CMD_HELP, CMD_VERSION};
use maestro::system::signals;
use maestro::{CancellationToken, Maestro, MaestroError};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// The main entry point of the `maestro` application.
/// It sets up logging, parses arguments, dispatches to the engine,
/// and performs centralized error handling.
fn main() {
    env_logger::init();
    let cancellation_token: CancellationToken = Arc::new(AtomicBool::new(false));

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("could not start the async runtime")
        .and_then(|runtime| runtime.block_on(run_cli(Cli::parse(), cancellation_token)));

    if let Err(e) = result {
        // --- Centralized Error Handling ---
        // An interrupted run exits silently with the conventional status.
        if let Some(err) = e.downcast_ref::<MaestroError>() {
            if err.is_cancelled() {
                std::process::exit(130);
            }
        }

        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

/// Loads the maestro file and routes the invocation to the matching entry point.
async fn run_cli(cli: Cli, cancellation_token: CancellationToken) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let mut maestro = Maestro::load(&cli.file, cli.duplicate, cli.scope())?
        .with_cancellation_token(Arc::clone(&cancellation_token));
    cli.apply(&mut maestro.exec);

    signals::listen(cancellation_token);

    let args = cli.args;
    let Some(name) = cli.command else {
        return Ok(maestro.execute_default(&args).await?);
    };
    // A command declared in the file wins over a reserved name.
    if maestro.registry().lookup(&name).is_some() {
        return Ok(maestro.execute(&name, &args).await?);
    }

    match name.as_str() {
        CMD_HELP => maestro.execute_help(args.first().map(String::as_str).unwrap_or(""))?,
        CMD_VERSION => maestro.execute_version()?,
        CMD_ALL => maestro.execute_all(&args).await?,
        CMD_DEFAULT => maestro.execute_default(&args).await?,
        CMD_GRAPH => {
            let target = args
                .first()
                .or(maestro.exec.default.as_ref())
                .context("graph: no command given and no default command defined")?;
            maestro.graph(target)?;
        }
        _ => maestro.execute(&name, &args).await?,
    }
    Ok(())
}
