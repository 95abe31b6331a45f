use std::path::PathBuf;
use thiserror::Error;

/// Exit code used for failures that carry no code of their own
pub const GENERIC_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database at {target} still unreachable after {waited_seconds} seconds ({attempts} attempts)")]
    DatabaseUnavailable {
        target: String,
        attempts: u64,
        waited_seconds: u64,
    },

    #[error("Migration environment error at {}: {source}", .path.display())]
    MigrationEnvironment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool not found on PATH: {program}")]
    ToolNotFound { program: String },

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with status {code}")]
    ToolFailed { command: String, code: i32 },

    #[error("Failed to hand off to {program}: {source}")]
    HandOff {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Signal handling error: {0}")]
    Signal(#[source] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StartupError {
    /// Process exit code for this failure.
    ///
    /// Tool failures propagate the tool's own code so the container reports
    /// exactly what the migration CLI returned.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::ToolFailed { code, .. } if *code != 0 => *code,
            _ => GENERIC_FAILURE_EXIT_CODE,
        }
    }
}

pub type Result<T> = std::result::Result<T, StartupError>;
