// src/startup.rs - The container startup sequence

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dependencies::{DatabaseWaiter, ReadinessProbe, TcpProbe, WaitReport};
use crate::error::Result;
use crate::migration::{MigrationEnvironment, MigrationState, MigrationTool};
use crate::process::{CommandSpec, ProcessLauncher, SystemLauncher};

/// Where the startup sequence currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupPhase {
    WaitingForDb,
    CheckingMigrationEnv,
    Migrating,
    Serving,
}

impl fmt::Display for StartupPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StartupPhase::WaitingForDb => "WAITING_FOR_DB",
            StartupPhase::CheckingMigrationEnv => "CHECKING_MIGRATION_ENV",
            StartupPhase::Migrating => "MIGRATING",
            StartupPhase::Serving => "SERVING",
        };
        f.write_str(name)
    }
}

/// Startup stopped so a human can finish configuring migrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigurationHalt {
    /// A fresh environment was just scaffolded
    Scaffolded { directory: PathBuf, env_file: PathBuf },
    /// The environment file still has the unbound-metadata sentinel
    MetadataUnbound { env_file: PathBuf },
}

impl ConfigurationHalt {
    /// Instructions printed for whoever is watching the container logs
    pub fn guidance(&self) -> String {
        match self {
            ConfigurationHalt::Scaffolded { directory, env_file } => format!(
                "Created a new migration environment in {}.\n\
                 Edit {} and set target_metadata to your models' metadata \
                 (for example `from db.base import Base; target_metadata = Base.metadata`),\n\
                 generate a revision with `alembic revision --autogenerate -m \"init\"`, \
                 then restart the container.",
                directory.display(),
                env_file.display()
            ),
            ConfigurationHalt::MetadataUnbound { env_file } => format!(
                "{} still contains `target_metadata = None`.\n\
                 Bind it to your models' metadata and restart the container.",
                env_file.display()
            ),
        }
    }
}

/// How the startup sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Intentional halt pending manual configuration; the server was not started
    NeedsConfiguration(ConfigurationHalt),
    /// Migrations are applied and the server command is ready for hand-off
    Serving(CommandSpec),
}

/// Build the API server command line
pub fn server_command(config: &Config) -> CommandSpec {
    CommandSpec::new(&config.server.program)
        .arg(&config.server.app)
        .arg("--host")
        .arg(&config.server.host)
        .arg("--port")
        .arg(config.server.port.to_string())
        .args(config.server.extra_args.iter().cloned())
}

/// Handles the startup sequence and the final hand-off
pub struct ApplicationStartup<P = TcpProbe, L = SystemLauncher> {
    config: Arc<Config>,
    waiter: DatabaseWaiter<P>,
    environment: MigrationEnvironment,
    tool: MigrationTool,
    launcher: L,
}

impl ApplicationStartup<TcpProbe, SystemLauncher> {
    /// Create a startup handler that talks to the real network and processes
    pub fn new(config: Config) -> Result<Self> {
        let probe = TcpProbe::from_config(&config);
        Ok(Self::with_components(config, probe, SystemLauncher::new()))
    }
}

impl<P: ReadinessProbe, L: ProcessLauncher> ApplicationStartup<P, L> {
    pub fn with_components(config: Config, probe: P, launcher: L) -> Self {
        let waiter = DatabaseWaiter::new(probe, config.probe_interval()).with_max_wait(config.max_wait());
        let environment = MigrationEnvironment::from_config(&config.migrations);
        let tool = MigrationTool::from_config(&config);

        Self {
            config: Arc::new(config),
            waiter,
            environment,
            tool,
            launcher,
        }
    }

    /// Run the whole sequence and hand off to the server.
    ///
    /// With the system launcher this only returns for a configuration halt or
    /// an error.
    pub async fn start(&self) -> Result<StartupOutcome> {
        let outcome = self.prepare().await?;

        if let StartupOutcome::Serving(command) = &outcome {
            self.enter(StartupPhase::Serving);
            if let Err(e) = self.launcher.hand_off(command) {
                error!("❌ Hand-off to {} failed: {}", command.program, e);
                return Err(e);
            }
        }

        Ok(outcome)
    }

    /// Wait for the database, check the migration environment and migrate,
    /// stopping short of the hand-off
    pub async fn prepare(&self) -> Result<StartupOutcome> {
        let started = Instant::now();
        info!("🚀 Starting container startup sequence");

        self.wait_for_database().await?;

        self.enter(StartupPhase::CheckingMigrationEnv);
        match self.environment.inspect().await? {
            MigrationState::Uninitialized => {
                let directory = self.environment.directory().to_path_buf();
                self.tool.init(&self.launcher, &directory).await?;

                let halt = ConfigurationHalt::Scaffolded {
                    directory,
                    env_file: self.environment.env_file().to_path_buf(),
                };
                warn!("⚠️  Migration environment created; startup halted for configuration");
                return Ok(StartupOutcome::NeedsConfiguration(halt));
            }
            MigrationState::Unconfigured => {
                let halt = ConfigurationHalt::MetadataUnbound {
                    env_file: self.environment.env_file().to_path_buf(),
                };
                warn!("⚠️  Migration environment not configured; startup halted");
                return Ok(StartupOutcome::NeedsConfiguration(halt));
            }
            MigrationState::Ready => {
                info!("✅ Migration environment is configured");
            }
        }

        self.enter(StartupPhase::Migrating);
        if let Err(e) = self.tool.upgrade(&self.launcher).await {
            error!("❌ Migrations failed: {}", e);
            return Err(e);
        }

        info!(
            "✅ Startup sequence completed in {:.3}s",
            started.elapsed().as_secs_f64()
        );

        Ok(StartupOutcome::Serving(server_command(&self.config)))
    }

    /// Only block until the database accepts connections
    pub async fn wait_for_database(&self) -> Result<WaitReport> {
        self.enter(StartupPhase::WaitingForDb);
        self.waiter.wait_until_ready().await
    }

    /// Read-only view of the migration environment
    pub async fn migration_state(&self) -> Result<MigrationState> {
        self.environment.inspect().await
    }

    fn enter(&self, phase: StartupPhase) {
        info!(phase = %phase, "Entering phase {}", phase);
    }

    /// Get configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }
}
