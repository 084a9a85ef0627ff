//! Scheduling engine
//!
//! Persists future publish intents and lets their owner cancel or move them
//! while they are still `pending`. Promotion of due posts lives in
//! [`super::promotion`].

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{PagecastError, Result};
use crate::scheduling::{format_timestamp, validate_schedule_time};
use crate::service::events::{Event, EventBus};
use crate::service::{owned_content, unique_ids};
use crate::types::{ContentStatus, ScheduleState, ScheduledPost};
use crate::Database;

#[derive(Clone)]
pub struct SchedulingService {
    db: Arc<Database>,
    max_schedule_ahead: Duration,
    event_bus: EventBus,
}

impl SchedulingService {
    pub fn new(db: Arc<Database>, max_schedule_ahead: Duration, event_bus: EventBus) -> Self {
        Self {
            db,
            max_schedule_ahead,
            event_bus,
        }
    }

    /// Persist a pending post for `scheduled_at`
    ///
    /// # Errors
    ///
    /// - `InvalidScheduleTime` when `scheduled_at` is not in the future or is
    ///   beyond the scheduling horizon
    /// - `NotFound` / `Unauthorized` for unknown or foreign content and accounts
    /// - `Validation` for an empty account list or an inactive account
    pub async fn schedule_post(
        &self,
        user_id: &str,
        content_id: &str,
        account_ids: &[String],
        scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduledPost> {
        let now = Utc::now().timestamp();
        validate_schedule_time(scheduled_at.timestamp(), now, self.max_schedule_ahead)?;

        let account_ids = unique_ids(account_ids);
        if account_ids.is_empty() {
            return Err(PagecastError::Validation(
                "At least one account id is required".to_string(),
            ));
        }

        let content = owned_content(&self.db, user_id, content_id).await?;
        for account_id in &account_ids {
            self.check_account(user_id, account_id).await?;
        }

        let post = ScheduledPost::new(user_id, content_id, account_ids, scheduled_at.timestamp());
        self.db.insert_scheduled_post(&post).await?;

        if matches!(content.status, ContentStatus::Draft | ContentStatus::Failed) {
            self.db
                .update_content_status(content_id, ContentStatus::Scheduled, now)
                .await?;
        }

        info!(
            post_id = %post.id,
            content_id,
            scheduled_at = %format_timestamp(post.scheduled_at),
            "Scheduled post"
        );
        self.emit_changed(&post);

        Ok(post)
    }

    /// `pending -> cancelled`
    pub async fn cancel_scheduled_post(&self, user_id: &str, post_id: &str) -> Result<ScheduledPost> {
        let post = self.pending_post(user_id, post_id).await?;
        let now = Utc::now().timestamp();

        // Loses against a promotion claim made since the read above
        if !self.db.cancel_scheduled_post(post_id, now).await? {
            return Err(not_pending(post_id, "is being published"));
        }

        if self.db.count_active_schedules(&post.content_id).await? == 0 {
            if let Some(content) = self.db.get_content(&post.content_id).await? {
                if content.status == ContentStatus::Scheduled {
                    self.db
                        .update_content_status(&content.id, ContentStatus::Draft, now)
                        .await?;
                }
            }
        }

        let post = self.reload(post_id).await?;
        info!(post_id, "Cancelled scheduled post");
        self.emit_changed(&post);

        Ok(post)
    }

    /// Move a pending post to a new future time; it stays `pending`
    pub async fn reschedule_post(
        &self,
        user_id: &str,
        post_id: &str,
        new_scheduled_at: DateTime<Utc>,
    ) -> Result<ScheduledPost> {
        self.pending_post(user_id, post_id).await?;

        let now = Utc::now().timestamp();
        validate_schedule_time(new_scheduled_at.timestamp(), now, self.max_schedule_ahead)?;

        if !self
            .db
            .reschedule_scheduled_post(post_id, new_scheduled_at.timestamp(), now)
            .await?
        {
            return Err(not_pending(post_id, "is being published"));
        }

        let post = self.reload(post_id).await?;
        info!(
            post_id,
            scheduled_at = %format_timestamp(post.scheduled_at),
            "Rescheduled post"
        );
        self.emit_changed(&post);

        Ok(post)
    }

    /// The user's scheduled posts, soonest first
    pub async fn list_scheduled_posts(
        &self,
        user_id: &str,
        state: Option<ScheduleState>,
    ) -> Result<Vec<ScheduledPost>> {
        self.db.list_scheduled_posts(user_id, state).await
    }

    pub async fn get_scheduled_post(&self, user_id: &str, post_id: &str) -> Result<ScheduledPost> {
        let post = self.reload(post_id).await?;
        if post.user_id != user_id {
            return Err(PagecastError::Unauthorized(format!(
                "Scheduled post {} belongs to another user",
                post_id
            )));
        }
        Ok(post)
    }

    async fn pending_post(&self, user_id: &str, post_id: &str) -> Result<ScheduledPost> {
        let post = self.get_scheduled_post(user_id, post_id).await?;
        match post.state {
            ScheduleState::Pending => Ok(post),
            ScheduleState::InFlight => Err(not_pending(post_id, "is being published")),
            state => Err(not_pending(post_id, &format!("is already {}", state))),
        }
    }

    async fn reload(&self, post_id: &str) -> Result<ScheduledPost> {
        self.db
            .get_scheduled_post(post_id)
            .await?
            .ok_or_else(|| PagecastError::NotFound(format!("Scheduled post {} not found", post_id)))
    }

    async fn check_account(&self, user_id: &str, account_id: &str) -> Result<()> {
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
        if !account.is_active {
            return Err(PagecastError::Validation(format!(
                "Account {} is inactive",
                account_id
            )));
        }
        Ok(())
    }

    fn emit_changed(&self, post: &ScheduledPost) {
        self.event_bus.emit(Event::ScheduleChanged {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            state: post.state,
            scheduled_at: post.scheduled_at,
        });
    }
}

fn not_pending(post_id: &str, detail: &str) -> PagecastError {
    PagecastError::Conflict(format!(
        "Scheduled post {} {} and can no longer be changed",
        post_id, detail
    ))
}
