//! Promotion of due scheduled posts
//!
//! Each run finds due `pending` posts (and `in_flight` posts whose claim went
//! stale), claims them one at a time with a conditional update and publishes
//! the claimed ones. Any number of runners may poll the same database: the
//! claim is the only write that can succeed for more than one of them, so a
//! post is dispatched by exactly one runner.
//!
//! A reclaimed post skips accounts that already have a recorded success, so a
//! crash mid-batch never double-posts to an account.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulingConfig;
use crate::error::Result;
use crate::service::events::{Event, EventBus};
use crate::service::publishing::PublishingService;
use crate::types::{ContentStatus, ScheduleState, ScheduledPost};
use crate::Database;

/// Counters for one promotion run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    /// Posts this runner won the claim for
    pub claimed: usize,
    pub published: usize,
    pub failed: usize,
    /// Posts another runner claimed first, or took over before completion
    pub skipped: usize,
    /// Claimed posts left `in_flight` after an internal error
    pub errors: Vec<String>,
}

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<Database>,
    publishing: PublishingService,
    settings: SchedulingConfig,
    event_bus: EventBus,
}

impl PromotionService {
    pub fn new(
        db: Arc<Database>,
        publishing: PublishingService,
        settings: SchedulingConfig,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            publishing,
            settings,
            event_bus,
        }
    }

    pub async fn run_once(&self) -> Result<PromotionReport> {
        self.run_at(Utc::now().timestamp()).await
    }

    /// Promote everything due at `now`
    ///
    /// Each claim is stamped with `now` plus the time this run has spent so
    /// far, so a long run never writes a claim that is already stale.
    pub async fn run_at(&self, now: i64) -> Result<PromotionReport> {
        let claim_timeout = self.settings.claim_timeout.as_secs() as i64;
        let candidates = self
            .db
            .find_claimable_posts(now, now - claim_timeout, self.settings.batch_size)
            .await?;

        let mut report = PromotionReport::default();
        if candidates.is_empty() {
            debug!("No scheduled posts due");
            return Ok(report);
        }

        let started = Instant::now();
        for post in candidates {
            let claim_at = now + started.elapsed().as_secs() as i64;
            let token = Uuid::new_v4().to_string();
            if !self
                .db
                .claim_scheduled_post(&post.id, &token, claim_at, claim_at - claim_timeout)
                .await?
            {
                debug!(post_id = %post.id, "Scheduled post claimed by another runner");
                report.skipped += 1;
                continue;
            }
            report.claimed += 1;

            if post.state == ScheduleState::InFlight {
                warn!(
                    post_id = %post.id,
                    attempt = post.attempts + 1,
                    "Reclaiming scheduled post with a stale claim"
                );
            }

            match self.promote(&post, &token).await {
                Ok(Some(ScheduleState::Published)) => report.published += 1,
                Ok(Some(_)) => report.failed += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    // The post stays in_flight and is reclaimed once stale
                    error!(post_id = %post.id, error = %e, "Promotion failed");
                    report.errors.push(format!("{}: {}", post.id, e));
                }
            }
        }

        info!(
            claimed = report.claimed,
            published = report.published,
            failed = report.failed,
            skipped = report.skipped,
            "Promotion run finished"
        );
        self.event_bus.emit(Event::PromotionCompleted {
            claimed: report.claimed,
            published: report.published,
            failed: report.failed,
            skipped: report.skipped,
        });

        Ok(report)
    }

    /// Publish a claimed post and record its terminal state
    ///
    /// `None` means the claim was taken over before completion.
    async fn promote(&self, post: &ScheduledPost, token: &str) -> Result<Option<ScheduleState>> {
        // attempts was incremented by the claim
        let attempt = post.attempts + 1;
        if attempt > self.settings.max_claim_attempts {
            let message = format!("Abandoned after {} claim attempts", post.attempts);
            return self
                .finish(post, token, ScheduleState::Failed, Some(message))
                .await;
        }

        let Some(content) = self.db.get_content(&post.content_id).await? else {
            let message = format!("Content {} no longer exists", post.content_id);
            return self
                .finish(post, token, ScheduleState::Failed, Some(message))
                .await;
        };

        let already_published: HashSet<String> = self
            .db
            .list_publications(&content.id)
            .await?
            .into_iter()
            .filter(|p| p.success)
            .map(|p| p.account_id)
            .collect();

        let remaining: Vec<String> = post
            .account_ids
            .iter()
            .filter(|id| !already_published.contains(*id))
            .cloned()
            .collect();
        let had_success = remaining.len() < post.account_ids.len();

        let (any_success, warnings) = if remaining.is_empty() {
            (true, Vec::new())
        } else {
            if had_success {
                info!(
                    post_id = %post.id,
                    skipped = post.account_ids.len() - remaining.len(),
                    "Skipping accounts that already succeeded"
                );
            }
            let outcome = self.publishing.publish_content(&content, &remaining).await?;
            (had_success || outcome.success, outcome.warnings)
        };

        let error_message = if warnings.is_empty() {
            None
        } else {
            Some(warnings.join("; "))
        };

        if any_success {
            if had_success && content.status != ContentStatus::Published {
                self.publishing.content_published(&content).await?;
            }
            self.finish(post, token, ScheduleState::Published, error_message)
                .await
        } else {
            self.finish(post, token, ScheduleState::Failed, error_message)
                .await
        }
    }

    async fn finish(
        &self,
        post: &ScheduledPost,
        token: &str,
        state: ScheduleState,
        error_message: Option<String>,
    ) -> Result<Option<ScheduleState>> {
        let now = Utc::now().timestamp();

        let completed = self
            .db
            .complete_scheduled_post(&post.id, token, state, error_message.as_deref(), now)
            .await?;
        if !completed {
            warn!(post_id = %post.id, "Claim was taken over before completion");
            return Ok(None);
        }

        if state == ScheduleState::Failed {
            self.mark_content_failed(&post.content_id, now).await?;
        }

        match &error_message {
            Some(message) if state == ScheduleState::Failed => {
                warn!(post_id = %post.id, error = %message, "Scheduled post failed");
            }
            _ => info!(post_id = %post.id, state = %state, "Scheduled post completed"),
        }

        self.event_bus.emit(Event::ScheduleChanged {
            post_id: post.id.clone(),
            user_id: post.user_id.clone(),
            state,
            scheduled_at: post.scheduled_at,
        });

        Ok(Some(state))
    }

    /// Unpublished content with no other pending schedule becomes failed
    async fn mark_content_failed(&self, content_id: &str, now: i64) -> Result<()> {
        let Some(content) = self.db.get_content(content_id).await? else {
            return Ok(());
        };
        if content.status == ContentStatus::Published {
            return Ok(());
        }
        if self.db.count_active_schedules(content_id).await? > 0 {
            debug!(content_id, "Content still has active schedules");
            return Ok(());
        }
        self.db
            .update_content_status(content_id, ContentStatus::Failed, now)
            .await
    }
}
