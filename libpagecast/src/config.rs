//! Configuration management for Pagecast
//!
//! Configuration is read from a TOML file located via `PAGECAST_CONFIG` or
//! `<config_dir>/pagecast/config.toml`. Durations use humantime notation
//! (`"30s"`, `"15m"`, `"90d"`).
//!
//! ```toml
//! [database]
//! path = "~/.local/share/pagecast/pagecast.db"
//!
//! [security]
//! token_key = "AGE-SECRET-KEY-1..."
//!
//! [scheduling]
//! poll_interval = "30s"
//! claim_timeout = "10m"
//!
//! [scheduling.rate_limits]
//! twitter = 50
//!
//! [platforms.linkedin]
//! client_id = "..."
//! client_secret = "..."
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub platforms: PlatformsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Server-held key used to encrypt account tokens at rest
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// age X25519 secret key (`AGE-SECRET-KEY-1...`)
    #[serde(default, skip_serializing)]
    pub token_key: Option<String>,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("token_key", &self.token_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    /// Upper bound for a single adapter call
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,

    /// Attempts per account for transient failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay, doubled on every further attempt
    #[serde(default = "default_backoff_base", with = "duration_str")]
    pub backoff_base: Duration,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_poll_interval", with = "duration_str")]
    pub poll_interval: Duration,

    /// In-flight claims older than this are considered abandoned
    #[serde(default = "default_claim_timeout", with = "duration_str")]
    pub claim_timeout: Duration,

    #[serde(default = "default_max_schedule_ahead", with = "duration_str")]
    pub max_schedule_ahead: Duration,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_claim_attempts")]
    pub max_claim_attempts: u32,

    /// Posts per account per hour, keyed by platform name
    #[serde(default)]
    pub rate_limits: HashMap<String, u32>,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            claim_timeout: default_claim_timeout(),
            max_schedule_ahead: default_max_schedule_ahead(),
            batch_size: default_batch_size(),
            max_claim_attempts: default_max_claim_attempts(),
            rate_limits: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// How far back published content is swept for analytics
    #[serde(default = "default_lookback", with = "duration_str")]
    pub lookback: Duration,

    #[serde(default = "default_analytics_batch_size")]
    pub batch_size: usize,

    /// Run an analytics sweep every N promotion polls (0 disables)
    #[serde(default = "default_every_polls")]
    pub every_polls: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            batch_size: default_analytics_batch_size(),
            every_polls: default_every_polls(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub twitter: Option<PlatformConfig>,
    pub linkedin: Option<PlatformConfig>,
    pub facebook: Option<PlatformConfig>,
    pub instagram: Option<PlatformConfig>,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> Option<&PlatformConfig> {
        match platform {
            Platform::Twitter => self.twitter.as_ref(),
            Platform::LinkedIn => self.linkedin.as_ref(),
            Platform::Facebook => self.facebook.as_ref(),
            Platform::Instagram => self.instagram.as_ref(),
        }
    }

    /// Platforms are enabled unless explicitly switched off
    pub fn is_enabled(&self, platform: Platform) -> bool {
        self.get(platform).map(|p| p.enabled).unwrap_or(true)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overrides the public API base URL
    pub api_base: Option<String>,

    /// OAuth token endpoint used for refresh
    pub token_url: Option<String>,

    pub client_id: Option<String>,

    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for PlatformConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConfig")
            .field("enabled", &self.enabled)
            .field("api_base", &self.api_base)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_secs(1)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_claim_timeout() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_max_schedule_ahead() -> Duration {
    Duration::from_secs(365 * 24 * 3600)
}

fn default_batch_size() -> usize {
    50
}

fn default_max_claim_attempts() -> u32 {
    3
}

fn default_lookback() -> Duration {
    Duration::from_secs(30 * 24 * 3600)
}

fn default_analytics_batch_size() -> usize {
    100
}

fn default_every_polls() -> u32 {
    10
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration without touching the environment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/pagecast/pagecast.db".to_string(),
            },
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            publishing: PublishingConfig::default(),
            scheduling: SchedulingConfig::default(),
            analytics: AnalyticsConfig::default(),
            platforms: PlatformsConfig::default(),
        }
    }

    /// `PAGECAST_DB_PATH` and `PAGECAST_TOKEN_KEY` take precedence over the file
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("PAGECAST_DB_PATH") {
            if !path.trim().is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(key) = std::env::var("PAGECAST_TOKEN_KEY") {
            if !key.trim().is_empty() {
                self.security.token_key = Some(key);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::MissingField("database.path".to_string()).into());
        }
        if self.publishing.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "publishing.max_attempts".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        if self.scheduling.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scheduling.batch_size".to_string(),
                message: "must be at least 1".to_string(),
            }
            .into());
        }
        for name in self.scheduling.rate_limits.keys() {
            if name.parse::<Platform>().is_err() {
                return Err(ConfigError::InvalidValue {
                    field: format!("scheduling.rate_limits.{}", name),
                    message: "unknown platform".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("PAGECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("pagecast").join("config.toml"))
}

/// Expand `~` in the configured database path
pub fn resolve_db_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).to_string())
}

/// Serde adapter for humantime duration strings
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
