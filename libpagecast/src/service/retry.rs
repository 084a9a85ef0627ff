//! Retry of a single failed publication
//!
//! Retrying is per (content, account) pair. An account that already has a
//! recorded success is never dispatched again; its stored result is returned
//! as-is.

use std::sync::Arc;
use tracing::info;

use crate::error::{PagecastError, Result};
use crate::service::owned_content;
use crate::service::publishing::PublishingService;
use crate::types::PublishResult;
use crate::Database;

#[derive(Clone)]
pub struct RetryService {
    db: Arc<Database>,
    publishing: PublishingService,
}

impl RetryService {
    pub fn new(db: Arc<Database>, publishing: PublishingService) -> Self {
        Self { db, publishing }
    }

    /// Re-run the publishing pipeline for one account
    ///
    /// # Errors
    ///
    /// `NotFound` when the content or account does not exist or the pair was
    /// never attempted, `Unauthorized` when either belongs to another user.
    pub async fn retry_publication(
        &self,
        user_id: &str,
        content_id: &str,
        account_id: &str,
    ) -> Result<PublishResult> {
        let content = owned_content(&self.db, user_id, content_id).await?;

        let account = self
            .db
            .get_account(account_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Account {} not found", account_id)))?;
        if account.user_id != user_id {
            return Err(PagecastError::Unauthorized(format!(
                "Account {} belongs to another user",
                account_id
            )));
        }

        let previous = self
            .db
            .get_publication(content_id, account_id)
            .await?
            .ok_or_else(|| {
                PagecastError::NotFound(format!(
                    "No publish attempt for content {} on account {}",
                    content_id, account_id
                ))
            })?;

        if previous.success {
            info!(content_id, account_id, "Already published, nothing to retry");
            return Ok(PublishResult::from(&previous));
        }

        info!(
            content_id,
            account_id,
            previous_attempts = previous.attempts,
            "Retrying publication"
        );
        let result = self.publishing.publish_to_account(&content, account_id).await?;
        if result.success {
            self.publishing.content_published(&content).await?;
        }

        Ok(result)
    }
}
