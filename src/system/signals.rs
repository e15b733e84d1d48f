// src/system/signals.rs

use crate::CancellationToken;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;

/// Spawns a task that sets `token` on the first interrupt (`Ctrl+C`) or, on
/// Unix, termination signal. The token is set at most once.
pub fn listen(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                log::debug!("Received {}, cancelling running commands", signal);
                token.store(true, Ordering::SeqCst);
            }
            Err(e) => log::warn!("Could not listen for signals: {}", e),
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
}
