//! Synapse server - Entry Point
//!
//! Starts the HTTP/WebSocket training API.

use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use synapse_orchestrator::Orchestrator;
use synapse_server::{AppState, ServerConfig, router};
use synapse_training::DenseRuntime;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Synapse - interactive neural network training server
#[derive(Parser, Debug)]
#[command(name = "synapse", author, version, about)]
struct Args {
    /// Path to a TOML config file (defaults to ./synapse.toml when present)
    #[arg(short, long, env = "SYNAPSE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and SYNAPSE_ADDRESS)
    #[arg(short, long)]
    address: Option<SocketAddr>,

    /// Directory holding <dataset_id>.csv files
    #[arg(long)]
    datasets_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "synapse=trace" (overrides RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

fn init_tracing(level: Option<&str>, format: LogFormat) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "synapse=info,tower_http=info".into()),
    };
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_level.as_deref(), args.log_format);

    let mut config = ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    config.apply_env().context("Invalid environment configuration")?;
    if let Some(address) = args.address {
        config.server.address = address;
    }
    if let Some(dir) = args.datasets_dir {
        config.datasets.local_dir = dir;
    }

    let loader = config.dataset_loader();
    info!(tiers = ?loader.tier_names(), "Dataset tiers configured");
    let orchestrator =
        Arc::new(Orchestrator::new(config.orchestrator_config(), loader, Arc::new(DenseRuntime)));

    let app = router(AppState::new(Arc::clone(&orchestrator)), &config.server.allowed_origins);
    let listener = tokio::net::TcpListener::bind(config.server.address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.address))?;
    info!(address = %config.server.address, "Synapse server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    orchestrator.shutdown().await;
    info!("Server stopped");
    Ok(())
}
