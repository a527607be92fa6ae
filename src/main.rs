//! appstat entry point.
//!
//! Serves the console statistics API, or runs the schema migration.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appstat::config::AppConfig;
use appstat::database::Database;
use appstat::error::{Result, StatsError};
use appstat::migration::{MigrationReport, MigrationRunner};
use appstat::web;

#[derive(Parser)]
#[command(name = "appstat")]
#[command(about = "Console statistics API for application analytics", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,

    /// Schema migration commands
    #[command(subcommand)]
    Migrate(MigrateCommand),
}

#[derive(Subcommand)]
enum MigrateCommand {
    /// Add the custom columns
    Upgrade,
    /// Drop the custom columns
    Downgrade,
    /// Print the applied revision
    Current,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=appstat=debug
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database = %config.database_path,
        default_timezone = %config.default_timezone,
        migrate_on_start = config.migrate_on_start,
        "Configuration loaded"
    );

    let db = Arc::new(Database::new(&config.database_path, config.max_connections).await?);
    tracing::info!(path = %config.database_path, "Database initialized");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::Migrate(command) => migrate(command, db).await,
    }
}

async fn serve(config: AppConfig, db: Arc<Database>) -> Result<()> {
    if config.migrate_on_start {
        let report = MigrationRunner::new(db.clone()).upgrade().await?;
        log_report(&report);
    }

    let state = web::AppState::new(db, config.default_timezone);
    let router = web::build_router(state);
    let addr = config.bind_addr();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StatsError::Config(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(addr = %addr, "Starting statistics API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StatsError::Config(format!("Web server error: {}", e)))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn migrate(command: MigrateCommand, db: Arc<Database>) -> Result<()> {
    let runner = MigrationRunner::new(db);

    match command {
        MigrateCommand::Upgrade => log_report(&runner.upgrade().await?),
        MigrateCommand::Downgrade => log_report(&runner.downgrade().await?),
        MigrateCommand::Current => {
            let revision = runner.current_revision().await?;
            tracing::info!(revision = %revision, "Current schema revision");
            println!("{}", revision);
        }
    }

    Ok(())
}

fn log_report(report: &MigrationReport) {
    if report.is_noop() {
        tracing::info!(revision = %report.to_revision, "Schema already up to date");
        return;
    }

    tracing::info!(
        direction = report.direction.as_str(),
        from = %report.from_revision,
        to = %report.to_revision,
        changed = ?report.changed,
        "Schema migration applied"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
