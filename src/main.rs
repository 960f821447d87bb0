use anyhow::{Context, Result};
use bizops_dashboard_lib::config::{AppConfig, ConfigOverrides, LogFormat};
use bizops_dashboard_lib::{build_app, logging};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bizops-dashboard")]
#[command(about = "Business operations dashboard API server", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, env = "DASHBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:8787
    #[arg(long)]
    bind_addr: Option<String>,

    /// SQLite database file
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Write JSON logs to a daily-rotated file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        bind_addr: cli.bind_addr,
        database_path: cli.database_path,
        log_dir: cli.log_dir,
        log_format: cli.log_format,
        log_level: cli.log_level,
    };
    let config = AppConfig::load(cli.config.as_deref(), overrides).context("failed to load configuration")?;

    logging::init_tracing(&config).context("failed to initialize logging")?;
    tracing::info!("Starting dashboard server...");

    let addr = config.socket_addr()?;
    tracing::info!(database = %config.database_path.display(), "opening database");
    let (_core, app) = build_app(config).context("failed to open database")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %error, "failed to listen for shutdown signal");
    }
}
