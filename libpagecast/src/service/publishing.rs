//! Publishing engine
//!
//! Dispatches one content item to a set of accounts concurrently. Every
//! account produces exactly one [`PublishResult`]; a failing account never
//! aborts the batch and its failure is returned as data.

use futures::future::join_all;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::PublishingConfig;
use crate::error::{PagecastError, PlatformError, Result};
use crate::platforms::{AdapterRegistry, PlatformAdapter, PublishPayload};
use crate::rate_limiter::RateLimiter;
use crate::service::events::{Event, EventBus};
use crate::service::{owned_content, unique_ids};
use crate::tokens::TokenStore;
use crate::types::{GeneratedContent, Platform, PublishOutcome, PublishResult, SocialAccount};
use crate::Database;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub content_id: String,
    pub account_ids: Vec<String>,
}

#[derive(Clone)]
pub struct PublishingService {
    db: Arc<Database>,
    tokens: TokenStore,
    adapters: AdapterRegistry,
    rate_limiter: Arc<RateLimiter>,
    settings: PublishingConfig,
    event_bus: EventBus,
}

impl PublishingService {
    pub fn new(
        db: Arc<Database>,
        tokens: TokenStore,
        adapters: AdapterRegistry,
        rate_limiter: Arc<RateLimiter>,
        settings: PublishingConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            tokens,
            adapters,
            rate_limiter,
            settings,
            event_bus,
        }
    }

    /// Publish a content item to the given accounts right now
    ///
    /// # Errors
    ///
    /// Only request-level problems are errors: no accounts, unknown content,
    /// content owned by someone else, or a database failure. Per-account
    /// failures are reported in the returned outcome.
    pub async fn publish_now(&self, user_id: &str, request: &PublishRequest) -> Result<PublishOutcome> {
        let account_ids = unique_ids(&request.account_ids);
        if account_ids.is_empty() {
            return Err(PagecastError::InvalidInput(
                "At least one account id is required".to_string(),
            ));
        }

        let content = owned_content(&self.db, user_id, &request.content_id).await?;
        self.publish_content(&content, &account_ids).await
    }

    /// Dispatch to all accounts concurrently and gather the outcome
    pub(crate) async fn publish_content(
        &self,
        content: &GeneratedContent,
        account_ids: &[String],
    ) -> Result<PublishOutcome> {
        info!(
            content_id = %content.id,
            accounts = account_ids.len(),
            "Publishing content"
        );
        self.event_bus.emit(Event::PublishStarted {
            content_id: content.id.clone(),
            user_id: content.user_id.clone(),
            account_ids: account_ids.to_vec(),
        });

        let futures: Vec<_> = account_ids
            .iter()
            .map(|account_id| self.publish_to_account(content, account_id))
            .collect();
        // An unrecorded outcome fails the batch; recovery and retry read
        // the stored rows
        let results = join_all(futures)
            .await
            .into_iter()
            .collect::<Result<Vec<_>>>()?;

        let warnings: Vec<String> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                format!(
                    "{}: {}",
                    r.account_id,
                    r.error.as_deref().unwrap_or("unknown error")
                )
            })
            .collect();

        if results.iter().any(|r| r.success) {
            self.content_published(content).await?;
        }

        let outcome = PublishOutcome::new(results, warnings);
        info!(
            content_id = %content.id,
            successful = outcome.summary.successful,
            failed = outcome.summary.failed,
            "Publish batch finished"
        );

        Ok(outcome)
    }

    /// Publish to one account and record the outcome
    ///
    /// Platform failures become a failed result; only a failure to persist
    /// the outcome is an error.
    pub(crate) async fn publish_to_account(
        &self,
        content: &GeneratedContent,
        account_id: &str,
    ) -> Result<PublishResult> {
        let account = match self.db.get_account(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                return Ok(self.rejected(content, account_id, None, "Account not found".to_string()));
            }
            Err(e) => {
                warn!(account_id, error = %e, "Failed to load account");
                return Ok(self.rejected(content, account_id, None, e.to_string()));
            }
        };

        if account.user_id != content.user_id {
            return Ok(self.rejected(
                content,
                account_id,
                Some(account.platform),
                "Account does not belong to this user".to_string(),
            ));
        }
        if !account.is_active {
            return Ok(self.rejected(
                content,
                account_id,
                Some(account.platform),
                "Account is inactive".to_string(),
            ));
        }

        let result = match self.dispatch(content, &account).await {
            Ok(external_post_id) => {
                info!(
                    content_id = %content.id,
                    account_id,
                    platform = %account.platform,
                    external_post_id = %external_post_id,
                    "Published"
                );
                PublishResult::succeeded(&content.id, account_id, account.platform, external_post_id)
            }
            Err(e) => {
                warn!(
                    content_id = %content.id,
                    account_id,
                    platform = %account.platform,
                    error = %e,
                    "Publish failed"
                );
                PublishResult::failed(
                    &content.id,
                    account_id,
                    Some(account.platform),
                    e.to_string(),
                    e.is_retryable(),
                )
            }
        };

        self.record(&result, account.platform).await?;
        self.emit_result(&result);
        Ok(result)
    }

    pub(crate) async fn content_published(&self, content: &GeneratedContent) -> Result<()> {
        self.db
            .mark_content_published(&content.id, chrono::Utc::now().timestamp())
            .await?;
        self.event_bus.emit(Event::LibraryInvalidated {
            user_id: content.user_id.clone(),
        });
        Ok(())
    }

    async fn dispatch(&self, content: &GeneratedContent, account: &SocialAccount) -> Result<String> {
        let adapter = self.adapters.get(account.platform)?;

        let payload = PublishPayload {
            content_id: content.id.clone(),
            external_account_id: account.external_account_id.clone(),
            text: content.render_text(),
            image_url: content.image_url.clone(),
        };
        adapter.validate_content(&payload)?;

        let now = chrono::Utc::now().timestamp();
        if !self
            .rate_limiter
            .check_and_record(&self.db, &account.id, account.platform, now)
            .await?
        {
            return Err(PlatformError::RateLimit(format!(
                "{}: hourly publish limit reached for account {}",
                account.platform, account.id
            ))
            .into());
        }

        let token = self.tokens.token_for_account(account).await?;
        self.publish_with_retry(adapter.as_ref(), &payload, &token)
            .await
            .map_err(PagecastError::from)
    }

    /// Publish with a timeout per attempt and exponential backoff on
    /// transient errors
    async fn publish_with_retry(
        &self,
        adapter: &dyn PlatformAdapter,
        payload: &PublishPayload,
        token: &SecretString,
    ) -> std::result::Result<String, PlatformError> {
        let platform = adapter.platform();
        let max_attempts = self.settings.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.publish_once(adapter, payload, token).await {
                Ok(post_id) => {
                    if attempt > 1 {
                        info!("Successfully published to {} on attempt {}", platform, attempt);
                    }
                    return Ok(post_id);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = backoff_delay(self.settings.backoff_base, attempt);
                    warn!(
                        "Transient error publishing to {} (attempt {}/{}): {}. Retrying in {:?}...",
                        platform, attempt, max_attempts, e, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn publish_once(
        &self,
        adapter: &dyn PlatformAdapter,
        payload: &PublishPayload,
        token: &SecretString,
    ) -> std::result::Result<String, PlatformError> {
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, adapter.publish(payload, token)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Timeout(format!(
                "{}: no response after {}",
                adapter.platform(),
                humantime::format_duration(timeout)
            ))),
        }
    }

    fn rejected(
        &self,
        content: &GeneratedContent,
        account_id: &str,
        platform: Option<Platform>,
        error: String,
    ) -> PublishResult {
        warn!(content_id = %content.id, account_id, error = %error, "Account rejected");
        let result = PublishResult::failed(&content.id, account_id, platform, error, false);
        self.emit_result(&result);
        result
    }

    async fn record(&self, result: &PublishResult, platform: Platform) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.db
            .upsert_publication(result, platform, now)
            .await
            .inspect_err(|e| {
                error!(
                    content_id = %result.content_id,
                    account_id = %result.account_id,
                    success = result.success,
                    error = %e,
                    "Failed to record publish result"
                );
            })
    }

    fn emit_result(&self, result: &PublishResult) {
        let event = match (&result.external_post_id, result.platform) {
            (Some(external_post_id), Some(platform)) if result.success => Event::AccountPublished {
                content_id: result.content_id.clone(),
                account_id: result.account_id.clone(),
                platform,
                external_post_id: external_post_id.clone(),
            },
            _ => Event::AccountFailed {
                content_id: result.content_id.clone(),
                account_id: result.account_id.clone(),
                platform: result.platform,
                error: result.error.clone().unwrap_or_default(),
                retryable: result.retryable,
            },
        };
        self.event_bus.emit(event);
    }
}

/// `base * 2^(attempt-1)`
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2_u32.saturating_pow(attempt.saturating_sub(1)))
}
