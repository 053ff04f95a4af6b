// Signal handling module
//
// SIGTERM and SIGINT request a graceful shutdown; elsewhere only Ctrl+C.

use std::sync::Arc;
use tokio::sync::Notify;

use super::ServerError;
use crate::logger;

/// Notify `shutdown` once a termination signal arrives
#[cfg(unix)]
pub fn start_signal_handler(shutdown: Arc<Notify>) -> Result<(), ServerError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).map_err(ServerError::Signal)?;
    let mut sigint = signal(SignalKind::interrupt()).map_err(ServerError::Signal)?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => logger::log_info("SIGTERM received, initiating graceful shutdown"),
            _ = sigint.recv() => logger::log_info("SIGINT received, initiating graceful shutdown"),
        }
        shutdown.notify_one();
    });
    Ok(())
}

/// Windows fallback - only handles Ctrl+C
#[cfg(not(unix))]
pub fn start_signal_handler(shutdown: Arc<Notify>) -> Result<(), ServerError> {
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            logger::log_info("Ctrl+C received, initiating graceful shutdown");
            shutdown.notify_one();
        }
    });
    Ok(())
}
