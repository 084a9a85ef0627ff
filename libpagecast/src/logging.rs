//! Centralized logging configuration for the Pagecast binaries
//!
//! Both `pagecast-api` and `pagecast-send` log to stderr through
//! `tracing-subscriber`. Output format and level come from command-line flags
//! or from `PAGECAST_LOG_FORMAT` / `PAGECAST_LOG_LEVEL`; `RUST_LOG` still wins
//! when set.
//!
//! # Examples
//!
//! ```no_run
//! use libpagecast::logging::{LoggingConfig, LogFormat};
//!
//! // JSON lines for the log shipper
//! let config = LoggingConfig::new(LogFormat::Json, "info".to_string(), false);
//! config.init();
//!
//! // Or use default settings (respects env vars)
//! libpagecast::logging::init_default();
//! ```

use std::str::FromStr;

pub const LOG_FORMAT_ENV: &str = "PAGECAST_LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "PAGECAST_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text output (no colors, for piping)
    Text,
    /// Machine-parseable JSON (one JSON object per line)
    Json,
    /// Pretty-printed with colors (for development)
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

/// Configuration for logging initialization
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    pub verbose: bool,
}

impl LoggingConfig {
    /// Create a new logging configuration
    ///
    /// `verbose` forces debug level regardless of `level`.
    pub fn new(format: LogFormat, level: String, verbose: bool) -> Self {
        Self {
            format,
            level,
            verbose,
        }
    }

    /// Build from the environment, letting an explicit format flag win
    pub fn from_env(format: Option<LogFormat>, verbose: bool) -> Self {
        let format = format.unwrap_or_else(|| {
            std::env::var(LOG_FORMAT_ENV)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(LogFormat::Text)
        });
        let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        Self::new(format, level, verbose)
    }

    fn effective_level(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    /// Initialize logging with the configured settings
    ///
    /// # Panics
    ///
    /// Panics if the logging subscriber has already been initialized
    pub fn init(&self) {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.effective_level()));

        match self.format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_span_list(true)
                    .flatten_event(true)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .pretty()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .init();
            }
            LogFormat::Text => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(true)
                    .with_ansi(false)
                    .init();
            }
        }
    }
}

/// Initialize logging with default settings
///
/// Respects `PAGECAST_LOG_FORMAT` and `PAGECAST_LOG_LEVEL`, falling back to
/// text format at info level.
pub fn init_default() {
    LoggingConfig::from_env(None, false).init();
}
