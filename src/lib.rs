// src/lib.rs - Container entrypoint: wait for the database, migrate, hand off to the API server

pub mod config;
pub mod dependencies;
pub mod error;
pub mod migration;
pub mod process;
pub mod shutdown;
pub mod startup;

// Re-export commonly used items for convenience
pub use config::{Config, ConfigSummary};
pub use dependencies::{DatabaseWaiter, ReadinessProbe, TcpProbe, WaitReport};
pub use error::{Result, StartupError};
pub use migration::{MigrationEnvironment, MigrationState, MigrationTool};
pub use process::{CommandSpec, ProcessLauncher, SystemLauncher};
pub use shutdown::ShutdownReason;
pub use startup::{ApplicationStartup, ConfigurationHalt, StartupOutcome, StartupPhase};

/// startgate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Feature flags available in this build
#[derive(Debug, Clone, serde::Serialize)]
pub struct Features {
    pub cli: bool,
}

impl Features {
    pub fn new() -> Self {
        Self {
            cli: cfg!(feature = "cli"),
        }
    }

    pub fn list_enabled(&self) -> Vec<&'static str> {
        let mut features = Vec::new();
        if self.cli {
            features.push("cli");
        }
        features
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::new()
    }
}

/// Get build information
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: VERSION,
        features: Features::new(),
        exec_handoff: cfg!(unix),
    }
}

/// Build information structure
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub features: Features,
    /// Whether the server replaces this process (Unix) or runs as a child
    pub exec_handoff: bool,
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "startgate v{}\nFeatures: {:?}\nHand-off: {}",
            self.version,
            self.features.list_enabled(),
            if self.exec_handoff { "exec" } else { "child process" }
        )
    }
}
