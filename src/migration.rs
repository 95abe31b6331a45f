// src/migration.rs - Migration environment inspection and migration tool commands

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{Config, MigrationConfig};
use crate::error::{Result, StartupError};
use crate::process::{CommandSpec, ProcessLauncher};

/// Observed state of the migration environment on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationState {
    Uninitialized,
    /// The environment file still carries the unbound-metadata sentinel
    Unconfigured,
    Ready,
}

impl MigrationState {
    pub fn is_ready(&self) -> bool {
        matches!(self, MigrationState::Ready)
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrationState::Uninitialized => write!(f, "uninitialized"),
            MigrationState::Unconfigured => write!(f, "unconfigured (metadata not bound)"),
            MigrationState::Ready => write!(f, "ready"),
        }
    }
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

/// The migration directory and the file checked for the sentinel
#[derive(Debug, Clone)]
pub struct MigrationEnvironment {
    directory: PathBuf,
    env_file: PathBuf,
    sentinel: String,
}

impl MigrationEnvironment {
    pub fn new(directory: impl Into<PathBuf>, env_file: impl AsRef<Path>, sentinel: impl Into<String>) -> Self {
        let directory = directory.into();
        let env_file = directory.join(env_file);
        Self {
            directory,
            env_file,
            sentinel: sentinel.into(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(
            config.directory.clone(),
            &config.env_file,
            config.sentinel.clone(),
        )
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Classify the environment without modifying anything
    pub async fn inspect(&self) -> Result<MigrationState> {
        let metadata = match tokio::fs::metadata(&self.directory).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Migration directory {} is absent", self.directory.display());
                return Ok(MigrationState::Uninitialized);
            }
            Err(source) => {
                return Err(StartupError::MigrationEnvironment {
                    path: self.directory.clone(),
                    source,
                })
            }
        };

        if !metadata.is_dir() {
            return Err(StartupError::Configuration(format!(
                "Migration path {} exists but is not a directory",
                self.directory.display()
            )));
        }

        // A missing environment file is fatal: only an absent directory or the
        // sentinel count as "needs configuration"
        let contents = tokio::fs::read(&self.env_file).await.map_err(|source| {
            StartupError::MigrationEnvironment {
                path: self.env_file.clone(),
                source,
            }
        })?;

        if contains_bytes(&contents, self.sentinel.as_bytes()) {
            Ok(MigrationState::Unconfigured)
        } else {
            Ok(MigrationState::Ready)
        }
    }
}

/// Commands of the schema-migration CLI
#[derive(Debug, Clone)]
pub struct MigrationTool {
    program: String,
    target: String,
}

impl MigrationTool {
    pub fn new(program: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            target: target.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.migrations.tool.clone(),
            config.migrations.target.clone(),
        )
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn init_command(&self, directory: &Path) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("init")
            .arg(directory.to_string_lossy())
    }

    pub fn upgrade_command(&self) -> CommandSpec {
        CommandSpec::new(&self.program)
            .arg("upgrade")
            .arg(&self.target)
    }

    /// Scaffold a new environment in `directory`
    pub async fn init(&self, launcher: &dyn ProcessLauncher, directory: &Path) -> Result<()> {
        info!("🏗️  Creating migration environment in {}", directory.display());
        launcher.run(&self.init_command(directory)).await
    }

    /// Apply every pending revision up to the configured target
    pub async fn upgrade(&self, launcher: &dyn ProcessLauncher) -> Result<()> {
        info!("📦 Applying migrations up to {}", self.target);
        launcher.run(&self.upgrade_command()).await
    }
}
