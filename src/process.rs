// src/process.rs - External tool invocation and process hand-off

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, StartupError};

/// A program plus its argument vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Value following `flag`, if present
    #[cfg(test)]
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    /// Map a finished child's status onto the crate's error type
    pub fn check_status(&self, status: ExitStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        Err(StartupError::ToolFailed {
            command: self.to_string(),
            code: exit_code_of(status),
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Shell-style exit code: the child's code, or 128 + signal number.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    crate::error::GENERIC_FAILURE_EXIT_CODE
}

/// Runs external tools on behalf of the startup sequence
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run `command` to completion with inherited stdio
    async fn run(&self, command: &CommandSpec) -> Result<()>;

    /// Replace this process with `command`.
    ///
    /// A real replacement never returns; `Ok` is only produced by launchers
    /// that do not exec.
    fn hand_off(&self, command: &CommandSpec) -> Result<()>;
}

/// Launcher backed by the operating system
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    pub fn new() -> Self {
        Self
    }
}

fn spawn_error(program: &str, source: std::io::Error) -> StartupError {
    if source.kind() == std::io::ErrorKind::NotFound {
        StartupError::ToolNotFound {
            program: program.to_string(),
        }
    } else {
        StartupError::Spawn {
            program: program.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn run(&self, command: &CommandSpec) -> Result<()> {
        let started = Instant::now();
        info!("▶️  Running: {}", command);

        let status = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| spawn_error(&command.program, e))?;

        debug!(
            "{} finished in {:.3}s with {}",
            command.program,
            started.elapsed().as_secs_f64(),
            status
        );

        command.check_status(status)
    }

    #[cfg(unix)]
    fn hand_off(&self, command: &CommandSpec) -> Result<()> {
        use std::os::unix::process::CommandExt;

        info!("🚀 Handing off to: {}", command);

        // exec only returns on failure
        let source = std::process::Command::new(&command.program)
            .args(&command.args)
            .exec();

        match spawn_error(&command.program, source) {
            StartupError::Spawn { program, source } => Err(StartupError::HandOff { program, source }),
            other => Err(other),
        }
    }

    #[cfg(not(unix))]
    fn hand_off(&self, command: &CommandSpec) -> Result<()> {
        info!("🚀 Starting (no exec on this platform): {}", command);

        let status = std::process::Command::new(&command.program)
            .args(&command.args)
            .status()
            .map_err(|e| spawn_error(&command.program, e))?;

        std::process::exit(exit_code_of(status));
    }
}

/// Whether `program` resolves to an executable
pub fn is_available(program: &str) -> bool {
    which::which(program).is_ok()
}
