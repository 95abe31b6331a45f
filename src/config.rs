// src/config.rs - Entrypoint configuration loaded from the container environment

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub migrations: MigrationConfig,
    pub server: ServerConfig,
    /// Exit code used when startup halts because the migration environment
    /// needs manual configuration
    pub halt_exit_code: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    /// Delay between readiness probes (in milliseconds)
    pub probe_interval_ms: u64,
    /// Upper bound for a single connection attempt (in milliseconds)
    pub connect_timeout_ms: u64,
    /// Give up waiting after this many seconds; `None` waits forever
    pub max_wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Migration environment directory, relative to the working directory
    pub directory: PathBuf,
    /// Generated environment file inside `directory`
    pub env_file: String,
    /// Literal marker left in the environment file until metadata is bound
    pub sentinel: String,
    /// Migration CLI executable
    pub tool: String,
    /// Revision passed to `upgrade`
    pub target: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// ASGI server executable
    pub program: String,
    /// Application import path handed to the server
    pub app: String,
    pub host: String,
    pub port: u16,
    /// Extra arguments appended after host and port
    pub extra_args: Vec<String>,
}

/// Detailed validation result with specific error information
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub success: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub error_type: String,
    pub message: String,
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub recommendation: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                host: "db".to_string(),
                port: 5432,
                probe_interval_ms: 1000,
                connect_timeout_ms: 1000,
                max_wait_seconds: None,
            },
            migrations: MigrationConfig {
                directory: PathBuf::from("alembic"),
                env_file: "env.py".to_string(),
                sentinel: "target_metadata = None".to_string(),
                tool: "alembic".to_string(),
                target: "head".to_string(),
            },
            server: ServerConfig {
                program: "uvicorn".to_string(),
                app: "app.main:app".to_string(),
                host: "0.0.0.0".to_string(),
                port: 8000,
                extra_args: Vec::new(),
            },
            halt_exit_code: 0,
        }
    }
}

/// Read `name` and parse it, recording a readable error on failure.
fn parse_var<T>(name: &str, parse_errors: &mut Vec<String>) -> Option<T>
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!("Found {}: {}", name, value);
            Some(value)
        }
        Err(e) => {
            parse_errors.push(format!("Invalid {} '{}': {}", name, raw, e));
            None
        }
    }
}

fn string_var(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    debug!("Found {}: {}", name, value);
    Some(value)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let start_time = std::time::Instant::now();
        let mut config = Config::default();
        let mut parse_errors = Vec::new();

        debug!("🔧 Loading configuration from environment variables");

        // Database endpoint (same names the migration environment reads)
        if let Some(host) = string_var("DB_HOST") {
            config.database.host = host;
        }
        if let Some(port) = parse_var("DB_PORT", &mut parse_errors) {
            config.database.port = port;
        }
        if let Some(interval) = parse_var("STARTGATE_PROBE_INTERVAL_MS", &mut parse_errors) {
            config.database.probe_interval_ms = interval;
        }
        if let Some(timeout) = parse_var("STARTGATE_CONNECT_TIMEOUT_MS", &mut parse_errors) {
            config.database.connect_timeout_ms = timeout;
        }
        if let Some(max_wait) = parse_var::<u64>("STARTGATE_MAX_WAIT_SECONDS", &mut parse_errors) {
            config.database.max_wait_seconds = Some(max_wait);
        }

        // Migration environment
        if let Some(dir) = string_var("STARTGATE_MIGRATIONS_DIR") {
            config.migrations.directory = PathBuf::from(dir);
        }
        if let Some(env_file) = string_var("STARTGATE_MIGRATIONS_ENV_FILE") {
            config.migrations.env_file = env_file;
        }
        if let Some(sentinel) = string_var("STARTGATE_MIGRATIONS_SENTINEL") {
            config.migrations.sentinel = sentinel;
        }
        if let Some(tool) = string_var("STARTGATE_MIGRATION_TOOL") {
            config.migrations.tool = tool;
        }
        if let Some(target) = string_var("STARTGATE_MIGRATION_TARGET") {
            config.migrations.target = target;
        }

        // API server
        if let Some(program) = string_var("STARTGATE_SERVER_PROGRAM") {
            config.server.program = program;
        }
        if let Some(app) = string_var("STARTGATE_SERVER_APP") {
            config.server.app = app;
        }
        if let Some(host) = string_var("STARTGATE_SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_var("STARTGATE_SERVER_PORT", &mut parse_errors) {
            config.server.port = port;
        }
        if let Some(args) = string_var("STARTGATE_SERVER_ARGS") {
            config.server.extra_args = args.split_whitespace().map(String::from).collect();
        }

        if let Some(code) = parse_var("STARTGATE_HALT_EXIT_CODE", &mut parse_errors) {
            config.halt_exit_code = code;
        }

        let load_duration = start_time.elapsed();

        if !parse_errors.is_empty() {
            let error_msg = format!(
                "Configuration parsing failed after {:.3}s with {} errors: {}",
                load_duration.as_secs_f64(),
                parse_errors.len(),
                parse_errors.join(", ")
            );
            return Err(anyhow::anyhow!(error_msg));
        }

        info!(
            "✅ Configuration loaded from environment in {:.3}s (database: {}:{}, migrations: {})",
            load_duration.as_secs_f64(),
            config.database.host,
            config.database.port,
            config.migrations.directory.display()
        );

        Ok(config)
    }

    /// Validate configuration, logging any warnings
    pub fn validate(&self) -> Result<()> {
        let validation_result = self.validate_detailed();

        if !validation_result.success {
            let error_messages: Vec<String> = validation_result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();

            return Err(anyhow::anyhow!(
                "Configuration validation failed: {}",
                error_messages.join(", ")
            ));
        }

        for warning in &validation_result.warnings {
            warn!(
                "Configuration warning for {}: {}{}",
                warning.field,
                warning.message,
                warning
                    .recommendation
                    .as_ref()
                    .map(|r| format!(" (Recommendation: {})", r))
                    .unwrap_or_default()
            );
        }

        Ok(())
    }

    /// Perform detailed validation
    pub fn validate_detailed(&self) -> ValidationResult {
        let start_time = std::time::Instant::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.database.host.trim().is_empty() {
            errors.push(ValidationError {
                field: "database.host".to_string(),
                error_type: "empty_value".to_string(),
                message: "Database host cannot be empty".to_string(),
                suggested_fix: Some("Set DB_HOST".to_string()),
            });
        }

        if self.database.port == 0 {
            errors.push(ValidationError {
                field: "database.port".to_string(),
                error_type: "invalid_port".to_string(),
                message: "Database port cannot be 0".to_string(),
                suggested_fix: Some("Set DB_PORT to the database listen port".to_string()),
            });
        }

        if self.database.probe_interval_ms == 0 {
            errors.push(ValidationError {
                field: "database.probe_interval_ms".to_string(),
                error_type: "invalid_interval".to_string(),
                message: "Probe interval must be greater than zero".to_string(),
                suggested_fix: Some("Use the default of 1000 milliseconds".to_string()),
            });
        }

        if self.database.connect_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "database.connect_timeout_ms".to_string(),
                error_type: "invalid_timeout".to_string(),
                message: "Connect timeout must be greater than zero".to_string(),
                suggested_fix: Some("Use the default of 1000 milliseconds".to_string()),
            });
        } else if self.database.connect_timeout_ms > self.database.probe_interval_ms
            && self.database.probe_interval_ms > 0
        {
            warnings.push(ValidationWarning {
                field: "database.connect_timeout_ms".to_string(),
                message: format!(
                    "Connect timeout ({}ms) is longer than the probe interval ({}ms)",
                    self.database.connect_timeout_ms, self.database.probe_interval_ms
                ),
                recommendation: Some("Keep the connect timeout at or below the interval".to_string()),
            });
        }

        let required = [
            (
                "migrations.directory",
                self.migrations.directory.as_os_str().is_empty(),
            ),
            ("migrations.env_file", self.migrations.env_file.trim().is_empty()),
            ("migrations.sentinel", self.migrations.sentinel.is_empty()),
            ("migrations.tool", self.migrations.tool.trim().is_empty()),
            ("migrations.target", self.migrations.target.trim().is_empty()),
            ("server.program", self.server.program.trim().is_empty()),
            ("server.app", self.server.app.trim().is_empty()),
            ("server.host", self.server.host.trim().is_empty()),
        ];
        for (field, empty) in required {
            if empty {
                errors.push(ValidationError {
                    field: field.to_string(),
                    error_type: "empty_value".to_string(),
                    message: format!("{} cannot be empty", field),
                    suggested_fix: None,
                });
            }
        }

        if self.server.port == 0 {
            errors.push(ValidationError {
                field: "server.port".to_string(),
                error_type: "invalid_port".to_string(),
                message: "Server port cannot be 0".to_string(),
                suggested_fix: Some("Set STARTGATE_SERVER_PORT".to_string()),
            });
        }

        if !(0..=255).contains(&self.halt_exit_code) {
            errors.push(ValidationError {
                field: "halt_exit_code".to_string(),
                error_type: "invalid_exit_code".to_string(),
                message: format!(
                    "Halt exit code {} is outside the range 0-255",
                    self.halt_exit_code
                ),
                suggested_fix: Some("Use 0, or a distinct code such as 78".to_string()),
            });
        } else if self.halt_exit_code != 0 {
            warnings.push(ValidationWarning {
                field: "halt_exit_code".to_string(),
                message: format!(
                    "Configuration halts exit with {} instead of 0",
                    self.halt_exit_code
                ),
                recommendation: Some(
                    "Make sure the container restart policy does not loop on this code".to_string(),
                ),
            });
        }

        let duration = start_time.elapsed();

        ValidationResult {
            success: errors.is_empty(),
            errors,
            warnings,
            duration,
        }
    }

    /// Get configuration summary
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            database_endpoint: self.database_endpoint(),
            probe_interval_ms: self.database.probe_interval_ms,
            max_wait_seconds: self.database.max_wait_seconds,
            migrations_directory: self.migrations.directory.display().to_string(),
            env_file: self.env_file_path().display().to_string(),
            migration_tool: self.migrations.tool.clone(),
            migration_target: self.migrations.target.clone(),
            server_program: self.server.program.clone(),
            server_endpoint: format!("{}:{}", self.server.host, self.server.port),
            halt_exit_code: self.halt_exit_code,
        }
    }

    pub fn database_endpoint(&self) -> String {
        format!("{}:{}", self.database.host, self.database.port)
    }

    pub fn env_file_path(&self) -> PathBuf {
        self.migrations.directory.join(&self.migrations.env_file)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.database.probe_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.database.connect_timeout_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.database.max_wait_seconds.map(Duration::from_secs)
    }
}

/// Configuration summary for logging and the `config` command
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub database_endpoint: String,
    pub probe_interval_ms: u64,
    pub max_wait_seconds: Option<u64>,
    pub migrations_directory: String,
    pub env_file: String,
    pub migration_tool: String,
    pub migration_target: String,
    pub server_program: String,
    pub server_endpoint: String,
    pub halt_exit_code: i32,
}
