// Signal handling for graceful server shutdown

use crate::error::{GatewayError, Result};
use tokio::signal::unix::{signal, Signal as TokioSignal, SignalKind};

/// Signal handler that manages the Unix termination signals
pub struct SignalHandler {
    sigterm: TokioSignal,
    sigint: TokioSignal,
    sighup: TokioSignal,
}

impl SignalHandler {
    /// Create a new signal handler
    /// Sets up handlers for SIGTERM, SIGINT and SIGHUP
    pub fn new() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate()).map_err(|e| GatewayError::Io {
            source: e,
            context: "Failed to setup SIGTERM handler".to_string(),
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| GatewayError::Io {
            source: e,
            context: "Failed to setup SIGINT handler".to_string(),
        })?;
        let sighup = signal(SignalKind::hangup()).map_err(|e| GatewayError::Io {
            source: e,
            context: "Failed to setup SIGHUP handler".to_string(),
        })?;

        Ok(Self {
            sigterm,
            sigint,
            sighup,
        })
    }

    /// Wait for any signal to be received
    /// Returns a string indicating which signal was received
    pub async fn wait(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "terminate",
            _ = self.sigint.recv() => "interrupt",
            _ = self.sighup.recv() => "hangup",
        }
    }
}

/// Resolves once the process is asked to stop; in-flight requests are drained
pub async fn shutdown_signal(mut handler: SignalHandler) {
    let sig = handler.wait().await;
    tracing::info!(signal = sig, "Shutdown signal received, draining in-flight requests");
}
