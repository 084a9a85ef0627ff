//! Service layer for Pagecast
//!
//! Business logic shared by the HTTP API and the promotion daemon.
//!
//! # Architecture
//!
//! `PagecastService` is the facade and entry point. It owns the shared
//! resources and hands out the specialized sub-services:
//!
//! - `PublishingService`: immediate multi-account publishing
//! - `SchedulingService`: create, move, cancel and list scheduled posts
//! - `PromotionService`: claim and publish due scheduled posts
//! - `RetryService`: retry a single failed (content, account) publication
//! - `AnalyticsService`: collect and serve engagement metrics
//! - `ContentService`: generated content bookkeeping
//! - `EventBus`: state transition broadcasts
//!
//! # Example
//!
//! ```no_run
//! use libpagecast::service::PagecastService;
//! use libpagecast::service::publishing::PublishRequest;
//!
//! # async fn example() -> libpagecast::Result<()> {
//! let service = PagecastService::new().await?;
//!
//! let request = PublishRequest {
//!     content_id: "4b0e...".to_string(),
//!     account_ids: vec!["acct-1".to_string(), "acct-2".to_string()],
//! };
//!
//! let outcome = service.publishing().publish_now("user-1", &request).await?;
//! println!(
//!     "{}/{} accounts published",
//!     outcome.summary.successful, outcome.summary.total
//! );
//! # Ok(())
//! # }
//! ```

pub mod analytics;
pub mod content;
pub mod events;
pub mod promotion;
pub mod publishing;
pub mod retry;
pub mod scheduling;

use std::sync::Arc;

use self::analytics::AnalyticsService;
use self::content::ContentService;
use self::events::{EventBus, EventReceiver};
use self::promotion::PromotionService;
use self::publishing::PublishingService;
use self::retry::RetryService;
use self::scheduling::SchedulingService;
use crate::config::resolve_db_path;
use crate::crypto::TokenCipher;
use crate::error::{ConfigError, PagecastError};
use crate::platforms::AdapterRegistry;
use crate::rate_limiter::RateLimiter;
use crate::tokens::{OAuthRefresher, TokenRefresher, TokenStore};
use crate::types::GeneratedContent;
use crate::{Config, Database, Result};

/// Main service facade that coordinates all sub-services
///
/// All sub-services share one `Arc<Database>` and one `EventBus`.
#[derive(Clone)]
pub struct PagecastService {
    db: Arc<Database>,
    config: Arc<Config>,
    tokens: TokenStore,
    publishing: PublishingService,
    scheduling: SchedulingService,
    promotion: PromotionService,
    retry: RetryService,
    analytics: AnalyticsService,
    content: ContentService,
    event_bus: EventBus,
}

impl PagecastService {
    /// Create a service from the default configuration file
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Open the database, load the token key and build real HTTP adapters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `security.token_key` is missing or not an age secret key
    /// - the database cannot be opened or migrated
    /// - an HTTP client cannot be built
    pub async fn from_config(config: Config) -> Result<Self> {
        let token_key = config.security.token_key.as_deref().ok_or_else(|| {
            PagecastError::Config(ConfigError::MissingField(
                "security.token_key".to_string(),
            ))
        })?;
        let cipher = TokenCipher::from_key(token_key)?;

        let db_path = resolve_db_path(&config.database.path);
        let db_path_str = db_path.to_str().ok_or_else(|| {
            PagecastError::Config(ConfigError::InvalidValue {
                field: "database.path".to_string(),
                message: "path is not valid UTF-8".to_string(),
            })
        })?;
        let db = Database::new(db_path_str).await?;

        let refresher =
            OAuthRefresher::from_config(&config.platforms, config.publishing.request_timeout)?;
        let adapters = AdapterRegistry::from_config(&config)?;

        Ok(Self::with_components(
            config,
            db,
            cipher,
            Arc::new(refresher),
            adapters,
        ))
    }

    /// Assemble the service from prepared parts
    ///
    /// Tests use this to inject an in-memory database, mock adapters and a
    /// stub token refresher.
    pub fn with_components(
        config: Config,
        db: Database,
        cipher: TokenCipher,
        refresher: Arc<dyn TokenRefresher>,
        adapters: AdapterRegistry,
    ) -> Self {
        let db = Arc::new(db);
        let event_bus = EventBus::default();

        let tokens = TokenStore::new(
            Arc::clone(&db),
            Arc::new(cipher),
            refresher,
            event_bus.clone(),
        );
        let rate_limiter = Arc::new(RateLimiter::from_config(&config.scheduling.rate_limits));

        let publishing = PublishingService::new(
            Arc::clone(&db),
            tokens.clone(),
            adapters.clone(),
            rate_limiter,
            config.publishing.clone(),
            event_bus.clone(),
        );
        let scheduling = SchedulingService::new(
            Arc::clone(&db),
            config.scheduling.max_schedule_ahead,
            event_bus.clone(),
        );
        let promotion = PromotionService::new(
            Arc::clone(&db),
            publishing.clone(),
            config.scheduling.clone(),
            event_bus.clone(),
        );
        let retry = RetryService::new(Arc::clone(&db), publishing.clone());
        let analytics = AnalyticsService::new(
            Arc::clone(&db),
            tokens.clone(),
            adapters,
            config.analytics.clone(),
            config.publishing.request_timeout,
        );
        let content = ContentService::new(Arc::clone(&db), event_bus.clone());

        Self {
            db,
            config: Arc::new(config),
            tokens,
            publishing,
            scheduling,
            promotion,
            retry,
            analytics,
            content,
            event_bus,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Account connection and token access
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn publishing(&self) -> &PublishingService {
        &self.publishing
    }

    pub fn scheduling(&self) -> &SchedulingService {
        &self.scheduling
    }

    pub fn promotion(&self) -> &PromotionService {
        &self.promotion
    }

    pub fn retry(&self) -> &RetryService {
        &self.retry
    }

    pub fn analytics(&self) -> &AnalyticsService {
        &self.analytics
    }

    pub fn content(&self) -> &ContentService {
        &self.content
    }

    /// Subscribe to service events
    ///
    /// Events emitted before subscribing are not delivered.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }
}

/// Load content and check that `user_id` owns it
pub(crate) async fn owned_content(
    db: &Database,
    user_id: &str,
    content_id: &str,
) -> Result<GeneratedContent> {
    let content = db
        .get_content(content_id)
        .await?
        .ok_or_else(|| PagecastError::NotFound(format!("Content {} not found", content_id)))?;

    if content.user_id != user_id {
        return Err(PagecastError::Unauthorized(format!(
            "Content {} belongs to another user",
            content_id
        )));
    }
    Ok(content)
}

/// Drop blank and repeated ids, keeping first-seen order
pub(crate) fn unique_ids(ids: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Platform;

    #[test]
    fn test_unique_ids_keeps_order() {
        let ids = vec![
            "b".to_string(),
            "a".to_string(),
            " b ".to_string(),
            "".to_string(),
            "a".to_string(),
        ];
        assert_eq!(unique_ids(&ids), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_owned_content_checks_owner() {
        let db = Database::in_memory().await.unwrap();
        let content = GeneratedContent::new("user-1", Platform::Twitter, "Hi".to_string());
        db.insert_content(&content).await.unwrap();

        let found = owned_content(&db, "user-1", &content.id).await.unwrap();
        assert_eq!(found.id, content.id);

        let err = owned_content(&db, "user-2", &content.id).await.unwrap_err();
        assert!(matches!(err, PagecastError::Unauthorized(_)));

        let err = owned_content(&db, "user-1", "missing").await.unwrap_err();
        assert!(matches!(err, PagecastError::NotFound(_)));
    }
}
