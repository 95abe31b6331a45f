// src/bin/startgate/main.rs - startgate container entrypoint

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use startgate::{
    build_info, process, shutdown, ApplicationStartup, BuildInfo, Config, ConfigSummary,
    MigrationEnvironment, MigrationState, ShutdownReason, StartupOutcome,
};

#[derive(Parser)]
#[command(name = "startgate")]
#[command(about = "Wait for the database, apply migrations and hand off to the API server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Database host (overrides DB_HOST)
    #[arg(long, global = true)]
    db_host: Option<String>,

    /// Database port (overrides DB_PORT)
    #[arg(long, global = true)]
    db_port: Option<u16>,

    /// Migration environment directory (overrides STARTGATE_MIGRATIONS_DIR)
    #[arg(long, global = true)]
    migrations_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full startup sequence (default)
    Run,
    /// Only wait until the database accepts connections
    Wait,
    /// Inspect the migration environment without changing anything
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as JSON
    Config,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    checked_at: DateTime<Utc>,
    database_endpoint: String,
    migrations_directory: PathBuf,
    env_file: PathBuf,
    migration_state: MigrationState,
    migration_tool: String,
    migration_tool_available: bool,
    server_program: String,
    server_program_available: bool,
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    build: BuildInfo,
    config: ConfigSummary,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(host) = cli.db_host {
        config.database.host = host;
    }
    if let Some(port) = cli.db_port {
        config.database.port = port;
    }
    if let Some(dir) = cli.migrations_dir {
        config.migrations.directory = dir;
    }

    if let Err(e) = config.validate() {
        error!("❌ {}", e);
        std::process::exit(1);
    }

    let code = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await,
        Commands::Wait => wait(config).await,
        Commands::Check { json } => check(config, json).await,
        Commands::Config => print_config(&config),
    };

    std::process::exit(code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("startgate=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "startgate=info".into())
    };

    // stdout is reserved for guidance text and JSON reports
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Resolves when a termination signal arrives; never resolves if handlers
/// could not be installed.
async fn interrupted() -> ShutdownReason {
    match shutdown::wait_for_signal().await {
        Ok(reason) => reason,
        Err(e) => {
            warn!("Signal handlers unavailable: {}", e);
            std::future::pending().await
        }
    }
}

async fn run(config: Config) -> i32 {
    let halt_exit_code = config.halt_exit_code;
    let summary = config.summary();
    info!("🚀 startgate v{}", build_info().version);
    info!("📋 Database: {}", summary.database_endpoint);
    info!("📋 Migrations: {} ({})", summary.migrations_directory, summary.migration_tool);
    info!("📋 Server: {} on {}", summary.server_program, summary.server_endpoint);

    let startup = match ApplicationStartup::new(config) {
        Ok(startup) => startup,
        Err(e) => {
            error!("❌ {}", e);
            return e.exit_code();
        }
    };

    tokio::select! {
        result = startup.start() => match result {
            Ok(StartupOutcome::NeedsConfiguration(halt)) => {
                println!("{}", halt.guidance());
                halt_exit_code
            }
            // Only reachable when the launcher does not exec
            Ok(StartupOutcome::Serving(_)) => 0,
            Err(e) => {
                error!("❌ Startup failed: {}", e);
                e.exit_code()
            }
        },
        reason = interrupted() => reason.exit_code(),
    }
}

async fn wait(config: Config) -> i32 {
    let startup = match ApplicationStartup::new(config) {
        Ok(startup) => startup,
        Err(e) => {
            error!("❌ {}", e);
            return e.exit_code();
        }
    };

    tokio::select! {
        result = startup.wait_for_database() => match result {
            Ok(_) => 0,
            Err(e) => {
                error!("❌ {}", e);
                e.exit_code()
            }
        },
        reason = interrupted() => reason.exit_code(),
    }
}

async fn check(config: Config, json: bool) -> i32 {
    let environment = MigrationEnvironment::from_config(&config.migrations);
    let state = match environment.inspect().await {
        Ok(state) => state,
        Err(e) => {
            error!("❌ {}", e);
            return e.exit_code();
        }
    };

    let report = CheckReport {
        checked_at: Utc::now(),
        database_endpoint: config.database_endpoint(),
        migrations_directory: environment.directory().to_path_buf(),
        env_file: environment.env_file().to_path_buf(),
        migration_state: state,
        migration_tool: config.migrations.tool.clone(),
        migration_tool_available: process::is_available(&config.migrations.tool),
        server_program: config.server.program.clone(),
        server_program_available: process::is_available(&config.server.program),
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(out) => println!("{}", out),
            Err(e) => {
                error!("❌ Failed to render report: {}", e);
                return 1;
            }
        }
    } else {
        println!("Database:        {}", report.database_endpoint);
        println!("Migrations:      {}", report.migrations_directory.display());
        println!("State:           {}", report.migration_state);
        println!(
            "Migration tool:  {} ({})",
            report.migration_tool,
            availability(report.migration_tool_available)
        );
        println!(
            "Server program:  {} ({})",
            report.server_program,
            availability(report.server_program_available)
        );
    }

    if state.is_ready() {
        0
    } else {
        config.halt_exit_code
    }
}

fn availability(found: bool) -> &'static str {
    if found {
        "found"
    } else {
        "not found on PATH"
    }
}

fn print_config(config: &Config) -> i32 {
    let report = ConfigReport {
        build: build_info(),
        config: config.summary(),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(out) => {
            println!("{}", out);
            0
        }
        Err(e) => {
            error!("❌ Failed to render configuration: {}", e);
            1
        }
    }
}
