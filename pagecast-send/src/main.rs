//! pagecast-send - Background daemon for scheduled posting
//!
//! Polls the schedule, promotes due posts into publishes and periodically
//! refreshes analytics for recent publications.

use chrono::Utc;
use clap::Parser;
use libpagecast::logging::{LogFormat, LoggingConfig};
use libpagecast::{Config, PagecastError, PagecastService};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound on each nap while waiting for the next poll
const SHUTDOWN_CHECK: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "pagecast-send")]
#[command(version)]
#[command(about = "Background daemon for scheduled posting")]
#[command(long_about = "\
pagecast-send - Background daemon for scheduled posting

DESCRIPTION:
    pagecast-send is a long-running daemon that watches the schedule and
    publishes posts once they are due.

    Each poll claims due posts (and stale claims left by a crashed runner),
    publishes them to every target account and records the outcome. Several
    runners may share one database; each post is promoted exactly once.

    Every few polls it also refreshes engagement metrics for content
    published within the analytics lookback window.

USAGE:
    # Run in foreground (logs to stderr)
    pagecast-send

    # Run with custom poll interval
    pagecast-send --poll-interval 30

    # Process due posts once and exit
    pagecast-send --once

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes current poll)

CONFIGURATION:
    Configuration file: $PAGECAST_CONFIG or ~/.config/pagecast/config.toml

    [scheduling]
    poll_interval = \"60s\"
    claim_timeout = \"15m\"
    batch_size = 50

    [analytics]
    lookback = \"30days\"
    every_polls = 10

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime error
    2 - Configuration error
")]
struct Cli {
    /// Configuration file (default: $PAGECAST_CONFIG or ~/.config/pagecast/config.toml)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Poll interval in seconds (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,

    /// Process due posts once and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    LoggingConfig::from_env(cli.log_format, cli.verbose).init();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e @ PagecastError::Config(_)) => {
            error!("Configuration error: {}", e);
            2
        }
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    process::exit(code);
}

async fn run(cli: Cli) -> libpagecast::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(secs) = cli.poll_interval {
        config.scheduling.poll_interval = Duration::from_secs(secs.max(1));
    }

    let poll_interval = config.scheduling.poll_interval;
    let sweep_every = config.analytics.every_polls;
    let service = PagecastService::from_config(config).await?;

    info!("pagecast-send daemon starting");

    if cli.once {
        poll(&service, sweep_every > 0).await?;
        info!("pagecast-send: processed due posts once, exiting");
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone());

    info!("Poll interval: {}", humantime::format_duration(poll_interval));
    run_daemon_loop(&service, poll_interval, sweep_every, shutdown).await;

    info!("pagecast-send daemon stopped");
    Ok(())
}

/// Flip `shutdown` on SIGINT or SIGTERM
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) {
    use signal_hook::consts::{SIGINT, SIGTERM};

    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, shutdown.clone()) {
            warn!("Failed to register handler for signal {}: {}", signal, e);
        }
    }
}

#[cfg(not(unix))]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.store(true, Ordering::Relaxed);
        }
    });
}

/// Main daemon loop
///
/// A failed poll is logged and retried on the next tick.
async fn run_daemon_loop(
    service: &PagecastService,
    poll_interval: Duration,
    sweep_every: u32,
    shutdown: Arc<AtomicBool>,
) {
    let mut polls: u64 = 0;

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping daemon loop");
            break;
        }

        polls += 1;
        let sweep = sweep_every > 0 && polls % u64::from(sweep_every) == 0;
        if let Err(e) = poll(service, sweep).await {
            error!("Error processing scheduled posts: {}", e);
        }

        let deadline = Instant::now() + poll_interval;
        while Instant::now() < deadline {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(SHUTDOWN_CHECK.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }
}

/// One promotion pass, optionally followed by an analytics sweep
async fn poll(service: &PagecastService, sweep: bool) -> libpagecast::Result<()> {
    let report = service.promotion().run_once().await?;
    if report.claimed > 0 {
        info!(
            claimed = report.claimed,
            published = report.published,
            failed = report.failed,
            skipped = report.skipped,
            "Promotion pass finished"
        );
    } else {
        debug!("No scheduled posts due");
    }
    for message in &report.errors {
        warn!("{}", message);
    }

    if sweep {
        match service.analytics().collect_recent(Utc::now().timestamp()).await {
            Ok(sweep) => info!(
                collected = sweep.collected,
                failed = sweep.failed,
                "Analytics sweep finished"
            ),
            Err(e) => error!("Analytics sweep failed: {}", e),
        }
    }

    Ok(())
}
