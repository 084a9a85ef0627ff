//! Platform adapters
//!
//! One adapter per social network translates a publish request and an
//! analytics lookup into that network's API shape. Adapters never touch the
//! database or token storage; they receive a ready-to-use access token.
//!
//! # Examples
//!
//! ```no_run
//! use libpagecast::platforms::{PlatformAdapter, PublishPayload, twitter::TwitterAdapter};
//! use secrecy::SecretString;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), libpagecast::PlatformError> {
//! let adapter = TwitterAdapter::new(None, Duration::from_secs(30))?;
//! let payload = PublishPayload {
//!     content_id: "c1".to_string(),
//!     external_account_id: "12345".to_string(),
//!     text: "Chapter one, in one sentence.".to_string(),
//!     image_url: None,
//! };
//!
//! adapter.validate_content(&payload)?;
//! let token = SecretString::from("bearer".to_string());
//! let post_id = adapter.publish(&payload, &token).await?;
//! let metrics = adapter.fetch_analytics(&post_id, &token).await?;
//! println!("{} impressions", metrics.impressions);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{PlatformError, Result};
use crate::types::{AnalyticsSnapshot, Platform};

pub mod facebook;
pub mod instagram;
pub mod linkedin;
pub mod twitter;

// Mock adapter is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Everything an adapter needs to publish one piece of content
#[derive(Debug, Clone)]
pub struct PublishPayload {
    pub content_id: String,
    /// Account identifier on the platform (user id, person URN, page id)
    pub external_account_id: String,
    /// Final text including hashtags
    pub text: String,
    pub image_url: Option<String>,
}

pub type AdapterResult<T> = std::result::Result<T, PlatformError>;

#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Publish and return the platform's post id
    async fn publish(&self, payload: &PublishPayload, token: &SecretString) -> AdapterResult<String>;

    /// Current engagement metrics for a published post
    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot>;

    fn character_limit(&self) -> usize {
        self.platform().character_limit()
    }

    /// Reject content the platform would refuse anyway
    fn validate_content(&self, payload: &PublishPayload) -> AdapterResult<()> {
        let platform = self.platform();

        if payload.text.trim().is_empty() && payload.image_url.is_none() {
            return Err(PlatformError::Validation(format!(
                "{}: content cannot be empty",
                platform
            )));
        }

        let length = payload.text.chars().count();
        let limit = self.character_limit();
        if length > limit {
            return Err(PlatformError::Validation(format!(
                "{}: content is {} characters, limit is {}",
                platform, length, limit
            )));
        }

        if platform.requires_image() && payload.image_url.is_none() {
            return Err(PlatformError::Validation(format!(
                "{}: an image is required",
                platform
            )));
        }

        Ok(())
    }
}

/// Map a non-success HTTP status to the error taxonomy
///
/// 429 and 5xx are transient; 401/403 mean the token is no good; any other
/// 4xx is a permanent rejection of the content.
pub fn error_for_status(platform: Platform, status: StatusCode, body: &str) -> PlatformError {
    let message = format!("{}: HTTP {}: {}", platform, status.as_u16(), truncate(body, 500));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PlatformError::Authentication(message),
        StatusCode::TOO_MANY_REQUESTS => PlatformError::RateLimit(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            PlatformError::Validation(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlatformError::Timeout(message),
        s if s.is_server_error() => PlatformError::Network(message),
        _ => PlatformError::Posting(message),
    }
}

/// Classify a transport-level reqwest failure
pub fn request_error(platform: Platform, error: reqwest::Error) -> PlatformError {
    if error.is_timeout() {
        PlatformError::Timeout(format!("{}: {}", platform, error))
    } else {
        PlatformError::Network(format!("{}: {}", platform, error))
    }
}

/// Read a JSON body, turning error statuses into [`PlatformError`]s
pub(crate) async fn read_json(
    platform: Platform,
    response: reqwest::Response,
) -> AdapterResult<serde_json::Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| request_error(platform, e))?;

    if !status.is_success() {
        return Err(error_for_status(platform, status, &body));
    }

    if body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }

    serde_json::from_str(&body)
        .map_err(|e| PlatformError::Posting(format!("{}: invalid response body: {}", platform, e)))
}

pub(crate) fn http_client(platform: Platform, timeout: Duration) -> AdapterResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| PlatformError::Network(format!("{}: failed to build HTTP client: {}", platform, e)))
}

/// Read an integer that may be missing or encoded as a string
pub(crate) fn as_count(value: &serde_json::Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Adapters by platform
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Real HTTP adapters for every enabled platform
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.publishing.request_timeout;
        let mut registry = Self::new();

        for platform in Platform::ALL {
            if !config.platforms.is_enabled(platform) {
                continue;
            }
            let api_base = config
                .platforms
                .get(platform)
                .and_then(|p| p.api_base.clone());

            let adapter: Arc<dyn PlatformAdapter> = match platform {
                Platform::Twitter => Arc::new(twitter::TwitterAdapter::new(api_base, timeout)?),
                Platform::LinkedIn => Arc::new(linkedin::LinkedInAdapter::new(api_base, timeout)?),
                Platform::Facebook => Arc::new(facebook::FacebookAdapter::new(api_base, timeout)?),
                Platform::Instagram => {
                    Arc::new(instagram::InstagramAdapter::new(api_base, timeout)?)
                }
            };
            registry.register(adapter);
        }

        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn PlatformAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, platform: Platform) -> AdapterResult<Arc<dyn PlatformAdapter>> {
        self.adapters.get(&platform).cloned().ok_or_else(|| {
            PlatformError::NotConfigured(format!("{}: no adapter registered", platform))
        })
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}
