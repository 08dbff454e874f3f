//! Signal handling for graceful shutdown.

use anyhow::{Context, Result};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;

/// Set up signal handlers for graceful shutdown.
///
/// Returns a receiver that yields the signal name when SIGTERM or SIGINT
/// arrives. SIGTERM is what systemd sends on `stop`.
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<&'static str>> {
    let (tx, rx) = mpsc::channel(1);

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut interrupt =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = interrupt.recv() => "SIGINT",
        };
        info!(signal = name, "Received shutdown signal");
        let _ = tx.send(name).await;
    });

    Ok(rx)
}
