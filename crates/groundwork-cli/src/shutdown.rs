//! Shutdown signal handling

use std::io;

/// Resolve on the first SIGINT or SIGTERM (Ctrl+C elsewhere).
#[cfg(unix)]
pub async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = terminate.recv() => Ok(()),
    }
}

/// Resolve on the first SIGINT or SIGTERM (Ctrl+C elsewhere).
#[cfg(not(unix))]
pub async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
