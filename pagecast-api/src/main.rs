//! pagecast-api - HTTP server for publishing and scheduling

use clap::Parser;
use libpagecast::logging::{LogFormat, LoggingConfig};
use libpagecast::{Config, PagecastError, PagecastService};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};

use pagecast_api::{app, AppState};

#[derive(Parser, Debug)]
#[command(name = "pagecast-api")]
#[command(version)]
#[command(about = "HTTP API for publishing, scheduling and analytics")]
#[command(long_about = "\
pagecast-api - HTTP API for publishing, scheduling and analytics

DESCRIPTION:
    Serves the Pagecast JSON API. Requests are authenticated upstream; the
    gateway forwards the user id in the x-user-id header.

ENDPOINTS:
    POST   /publish
    POST   /schedule
    GET    /schedule?state=pending
    PUT    /schedule/{postId}
    DELETE /schedule/{postId}
    POST   /retry
    POST   /analytics/{contentId}/collect
    GET    /analytics/{contentId}
    GET    /health

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (in-flight requests complete)

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Configuration file (default: $PAGECAST_CONFIG or ~/.config/pagecast/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address (overrides [server] bind)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            process::exit(2);
        }
    };

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        process::exit(1);
    }

    info!("pagecast-api stopped");
}

fn load_config(cli: &Cli) -> libpagecast::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(bind) = &cli.bind {
        config.server.bind = bind.clone();
    }
    Ok(config)
}

async fn run(config: Config) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let service = match PagecastService::from_config(config).await {
        Ok(service) => service,
        Err(e @ PagecastError::Config(_)) => {
            error!("Configuration error: {}", e);
            process::exit(2);
        }
        Err(e) => return Err(e.into()),
    };

    let router = app(Arc::new(AppState::new(service)));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, "pagecast-api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
