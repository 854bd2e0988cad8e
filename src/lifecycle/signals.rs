//! OS signal handling.
//!
//! # Responsibilities
//! - SIGINT (Ctrl+C) and SIGTERM → request host shutdown
//! - SIGHUP → reload the configuration stack
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads, it never stops the host
//! - Reloads read files on the blocking pool, off the runtime's workers
//! - Handler installation failures are logged and the signal is treated as
//!   never arriving; the host can still be stopped through its handle

use crate::config::ConfigView;

/// Which termination signal arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for TerminationSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationSignal::Interrupt => f.write_str("SIGINT"),
            TerminationSignal::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Wait for Ctrl+C, or SIGTERM on unix.
pub async fn wait_for_termination() -> TerminationSignal {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = ctrl_c => TerminationSignal::Interrupt,
        _ = terminate => TerminationSignal::Terminate,
    };
    tracing::info!(signal = %received, "Shutdown signal received");
    received
}

/// Reload `view` on every SIGHUP. Runs until the task is aborted.
#[cfg(unix)]
pub async fn reload_on_hangup(view: ConfigView) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGHUP handler");
            return;
        }
    };

    while hangup.recv().await.is_some() {
        tracing::info!("SIGHUP received, reloading configuration");
        if let Err(e) = view.reload_async().await {
            tracing::error!(error = %e, "Configuration reload failed, keeping previous values");
        }
    }
}

#[cfg(not(unix))]
pub async fn reload_on_hangup(_view: ConfigView) {}
