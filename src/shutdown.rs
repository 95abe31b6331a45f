// src/shutdown.rs - Termination signals received before the hand-off

use std::fmt;
use tracing::info;

use crate::error::{Result, StartupError};

/// Signal that interrupted startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT (Ctrl+C)
    Interrupt,
    /// SIGTERM, sent by `docker stop` and Kubernetes
    Terminate,
    /// SIGQUIT
    Quit,
}

impl ShutdownReason {
    pub fn signal_number(&self) -> i32 {
        match self {
            ShutdownReason::Interrupt => 2,
            ShutdownReason::Quit => 3,
            ShutdownReason::Terminate => 15,
        }
    }

    /// Shell convention: 128 + signal number
    pub fn exit_code(&self) -> i32 {
        128 + self.signal_number()
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Terminate => write!(f, "SIGTERM"),
            ShutdownReason::Quit => write!(f, "SIGQUIT"),
        }
    }
}

/// Resolve once a termination signal arrives.
///
/// Running as PID 1 the default dispositions are ignored, so without this a
/// container stuck waiting for its database would only die on SIGKILL.
pub async fn wait_for_signal() -> Result<ShutdownReason> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).map_err(StartupError::Signal)?;
        let mut sigint = signal(SignalKind::interrupt()).map_err(StartupError::Signal)?;
        let mut sigquit = signal(SignalKind::quit()).map_err(StartupError::Signal)?;

        let reason = tokio::select! {
            _ = sigterm.recv() => ShutdownReason::Terminate,
            _ = sigint.recv() => ShutdownReason::Interrupt,
            _ = sigquit.recv() => ShutdownReason::Quit,
        };

        info!("Received {}, abandoning startup", reason);
        Ok(reason)
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map_err(StartupError::Signal)?;
        info!("Received Ctrl+C, abandoning startup");
        Ok(ShutdownReason::Interrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_shell_convention() {
        assert_eq!(ShutdownReason::Interrupt.exit_code(), 130);
        assert_eq!(ShutdownReason::Quit.exit_code(), 131);
        assert_eq!(ShutdownReason::Terminate.exit_code(), 143);
    }

    #[test]
    fn test_display() {
        assert_eq!(ShutdownReason::Terminate.to_string(), "SIGTERM");
    }
}
