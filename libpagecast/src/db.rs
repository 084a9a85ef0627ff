//! Database operations for Pagecast

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{DbError, Result};
use crate::types::{
    AnalyticsSnapshot, ContentStatus, GeneratedContent, Platform, PostAnalytics, Publication,
    PublishResult, ScheduleState, ScheduledPost, SocialAccount,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::SqlxError)?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Social accounts
    // ------------------------------------------------------------------

    pub async fn insert_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts (
                id, user_id, platform, external_account_id, display_name,
                access_token, refresh_token, token_expires_at, is_active,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.user_id)
        .bind(account.platform.as_str())
        .bind(&account.external_account_id)
        .bind(&account.display_name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires_at)
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, platform, external_account_id, display_name,
                   access_token, refresh_token, token_expires_at, is_active,
                   created_at, updated_at
            FROM social_accounts WHERE id = ?
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, platform, external_account_id, display_name,
                   access_token, refresh_token, token_expires_at, is_active,
                   created_at, updated_at
            FROM social_accounts WHERE user_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    /// Persist refreshed (already encrypted) tokens. Last write wins.
    pub async fn update_account_tokens(
        &self,
        account_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        token_expires_at: Option<i64>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET access_token = ?,
                refresh_token = COALESCE(?, refresh_token),
                token_expires_at = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(token_expires_at)
        .bind(now)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Soft-deactivate; accounts are never deleted
    pub async fn deactivate_account(&self, account_id: &str, now: i64) -> Result<()> {
        sqlx::query("UPDATE social_accounts SET is_active = 0, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Generated content
    // ------------------------------------------------------------------

    pub async fn insert_content(&self, content: &GeneratedContent) -> Result<()> {
        let hashtags = serde_json::to_string(&content.hashtags).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO generated_content (
                id, user_id, book_id, platform, text, hashtags, image_url,
                status, created_at, updated_at, published_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&content.id)
        .bind(&content.user_id)
        .bind(&content.book_id)
        .bind(content.platform.as_str())
        .bind(&content.text)
        .bind(hashtags)
        .bind(&content.image_url)
        .bind(content.status.as_str())
        .bind(content.created_at)
        .bind(content.updated_at)
        .bind(content.published_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_content(&self, content_id: &str) -> Result<Option<GeneratedContent>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, book_id, platform, text, hashtags, image_url,
                   status, created_at, updated_at, published_at
            FROM generated_content WHERE id = ?
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(content_from_row).transpose()
    }

    pub async fn update_content_status(
        &self,
        content_id: &str,
        status: ContentStatus,
        now: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE generated_content SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Move content to published, keeping the first publish time
    pub async fn mark_content_published(&self, content_id: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE generated_content
            SET status = 'published',
                published_at = COALESCE(published_at, ?),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(content_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Edit text; returns false when the content is already published
    pub async fn update_content_text(&self, content_id: &str, text: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generated_content SET text = ?, updated_at = ?
            WHERE id = ? AND status != 'published'
            "#,
        )
        .bind(text)
        .bind(now)
        .bind(content_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_recently_published(
        &self,
        since: i64,
        limit: usize,
    ) -> Result<Vec<GeneratedContent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, book_id, platform, text, hashtags, image_url,
                   status, created_at, updated_at, published_at
            FROM generated_content
            WHERE status = 'published' AND published_at >= ?
            ORDER BY published_at DESC
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(content_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Publications
    // ------------------------------------------------------------------

    /// Record an attempt outcome for a (content, account) pair
    ///
    /// A stored success is never overwritten.
    pub async fn upsert_publication(
        &self,
        result: &PublishResult,
        platform: Platform,
        now: i64,
    ) -> Result<()> {
        let published_at = if result.success { Some(now) } else { None };

        sqlx::query(
            r#"
            INSERT INTO publications (
                content_id, account_id, platform, success, external_post_id,
                error_message, retryable, attempts, published_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)
            ON CONFLICT(content_id, account_id) DO UPDATE SET
                success = excluded.success,
                external_post_id = excluded.external_post_id,
                error_message = excluded.error_message,
                retryable = excluded.retryable,
                attempts = publications.attempts + 1,
                published_at = excluded.published_at,
                updated_at = excluded.updated_at
            WHERE publications.success = 0
            "#,
        )
        .bind(&result.content_id)
        .bind(&result.account_id)
        .bind(platform.as_str())
        .bind(result.success)
        .bind(&result.external_post_id)
        .bind(&result.error)
        .bind(result.retryable)
        .bind(published_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_publication(
        &self,
        content_id: &str,
        account_id: &str,
    ) -> Result<Option<Publication>> {
        let row = sqlx::query(
            r#"
            SELECT content_id, account_id, platform, success, external_post_id,
                   error_message, retryable, attempts, published_at, updated_at
            FROM publications WHERE content_id = ? AND account_id = ?
            "#,
        )
        .bind(content_id)
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(publication_from_row).transpose()
    }

    pub async fn list_publications(&self, content_id: &str) -> Result<Vec<Publication>> {
        let rows = sqlx::query(
            r#"
            SELECT content_id, account_id, platform, success, external_post_id,
                   error_message, retryable, attempts, published_at, updated_at
            FROM publications WHERE content_id = ?
            ORDER BY account_id
            "#,
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(publication_from_row).collect()
    }

    // ------------------------------------------------------------------
    // Scheduled posts
    // ------------------------------------------------------------------

    pub async fn insert_scheduled_post(&self, post: &ScheduledPost) -> Result<()> {
        let account_ids = serde_json::to_string(&post.account_ids).map_err(DbError::Serialization)?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_posts (
                id, content_id, user_id, account_ids, scheduled_at, state,
                claim_token, claimed_at, attempts, error_message, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.content_id)
        .bind(&post.user_id)
        .bind(account_ids)
        .bind(post.scheduled_at)
        .bind(post.state.as_str())
        .bind(&post.claim_token)
        .bind(post.claimed_at)
        .bind(post.attempts as i64)
        .bind(&post.error_message)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_scheduled_post(&self, post_id: &str) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, content_id, user_id, account_ids, scheduled_at, state,
                   claim_token, claimed_at, attempts, error_message, created_at, updated_at
            FROM scheduled_posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(scheduled_post_from_row).transpose()
    }

    pub async fn list_scheduled_posts(
        &self,
        user_id: &str,
        state: Option<ScheduleState>,
    ) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_id, user_id, account_ids, scheduled_at, state,
                   claim_token, claimed_at, attempts, error_message, created_at, updated_at
            FROM scheduled_posts
            WHERE user_id = ? AND (? IS NULL OR state = ?)
            ORDER BY scheduled_at
            "#,
        )
        .bind(user_id)
        .bind(state.map(|s| s.as_str()))
        .bind(state.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(scheduled_post_from_row).collect()
    }

    /// `pending -> cancelled`; false when the post is no longer pending
    pub async fn cancel_scheduled_post(&self, post_id: &str, now: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET state = 'cancelled', updated_at = ?
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Move a pending post; false when the post is no longer pending
    pub async fn reschedule_scheduled_post(
        &self,
        post_id: &str,
        scheduled_at: i64,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts SET scheduled_at = ?, updated_at = ?
            WHERE id = ? AND state = 'pending'
            "#,
        )
        .bind(scheduled_at)
        .bind(now)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Due pending posts plus in-flight posts whose claim went stale
    pub async fn find_claimable_posts(
        &self,
        now: i64,
        stale_before: i64,
        limit: usize,
    ) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, content_id, user_id, account_ids, scheduled_at, state,
                   claim_token, claimed_at, attempts, error_message, created_at, updated_at
            FROM scheduled_posts
            WHERE (state = 'pending' AND scheduled_at <= ?)
               OR (state = 'in_flight' AND claimed_at <= ?)
            ORDER BY scheduled_at
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(stale_before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(scheduled_post_from_row).collect()
    }

    /// Atomically claim a due post for promotion
    ///
    /// This single conditional UPDATE is the only write to the claim columns
    /// that can succeed for more than one caller; whoever changes the row
    /// owns the post until it completes or the claim goes stale.
    pub async fn claim_scheduled_post(
        &self,
        post_id: &str,
        claim_token: &str,
        now: i64,
        stale_before: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET state = 'in_flight',
                claim_token = ?,
                claimed_at = ?,
                attempts = attempts + 1,
                updated_at = ?
            WHERE id = ?
              AND ((state = 'pending' AND scheduled_at <= ?)
                OR (state = 'in_flight' AND claimed_at <= ?))
            "#,
        )
        .bind(claim_token)
        .bind(now)
        .bind(now)
        .bind(post_id)
        .bind(now)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the terminal outcome of a claim; false if the claim was lost
    pub async fn complete_scheduled_post(
        &self,
        post_id: &str,
        claim_token: &str,
        state: ScheduleState,
        error_message: Option<&str>,
        now: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET state = ?, error_message = ?, claim_token = NULL, updated_at = ?
            WHERE id = ? AND state = 'in_flight' AND claim_token = ?
            "#,
        )
        .bind(state.as_str())
        .bind(error_message)
        .bind(now)
        .bind(post_id)
        .bind(claim_token)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending or in-flight schedules referencing a content item
    pub async fn count_active_schedules(&self, content_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM scheduled_posts
            WHERE content_id = ? AND state IN ('pending', 'in_flight')
            "#,
        )
        .bind(content_id)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(count)
    }

    // ------------------------------------------------------------------
    // Analytics
    // ------------------------------------------------------------------

    /// Insert or overwrite the single analytics row for a content item
    pub async fn upsert_analytics(&self, analytics: &PostAnalytics) -> Result<()> {
        let m = &analytics.metrics;

        sqlx::query(
            r#"
            INSERT INTO post_analytics (
                content_id, platform, impressions, likes, shares, comments,
                clicks, reach, engagement_rate, last_updated
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                platform = excluded.platform,
                impressions = excluded.impressions,
                likes = excluded.likes,
                shares = excluded.shares,
                comments = excluded.comments,
                clicks = excluded.clicks,
                reach = excluded.reach,
                engagement_rate = excluded.engagement_rate,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&analytics.content_id)
        .bind(analytics.platform.as_str())
        .bind(m.impressions)
        .bind(m.likes)
        .bind(m.shares)
        .bind(m.comments)
        .bind(m.clicks)
        .bind(m.reach)
        .bind(m.engagement_rate)
        .bind(analytics.last_updated)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_analytics(&self, content_id: &str) -> Result<Option<PostAnalytics>> {
        let row = sqlx::query(
            r#"
            SELECT content_id, platform, impressions, likes, shares, comments,
                   clicks, reach, engagement_rate, last_updated
            FROM post_analytics WHERE content_id = ?
            "#,
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref()
            .map(|r| {
                Ok(PostAnalytics {
                    content_id: r.get("content_id"),
                    platform: parse_column(r.get("platform"))?,
                    metrics: AnalyticsSnapshot {
                        impressions: r.get("impressions"),
                        likes: r.get("likes"),
                        shares: r.get("shares"),
                        comments: r.get("comments"),
                        clicks: r.get("clicks"),
                        reach: r.get("reach"),
                        engagement_rate: r.get("engagement_rate"),
                    },
                    last_updated: r.get("last_updated"),
                })
            })
            .transpose()
    }
}

/// Decode a TEXT column into one of the closed enums
fn parse_column<T>(value: String) -> Result<T>
where
    T: FromStr<Err = String>,
{
    value.parse::<T>().map_err(|e| {
        let error: DbError = DbError::SqlxError(sqlx::Error::Decode(e.into()));
        error.into()
    })
}

fn account_from_row(r: &SqliteRow) -> Result<SocialAccount> {
    Ok(SocialAccount {
        id: r.get("id"),
        user_id: r.get("user_id"),
        platform: parse_column(r.get("platform"))?,
        external_account_id: r.get("external_account_id"),
        display_name: r.get("display_name"),
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        token_expires_at: r.get("token_expires_at"),
        is_active: r.get("is_active"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

fn content_from_row(r: &SqliteRow) -> Result<GeneratedContent> {
    let hashtags: String = r.get("hashtags");

    Ok(GeneratedContent {
        id: r.get("id"),
        user_id: r.get("user_id"),
        book_id: r.get("book_id"),
        platform: parse_column(r.get("platform"))?,
        text: r.get("text"),
        hashtags: serde_json::from_str(&hashtags).map_err(DbError::Serialization)?,
        image_url: r.get("image_url"),
        status: parse_column(r.get("status"))?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
        published_at: r.get("published_at"),
    })
}

fn publication_from_row(r: &SqliteRow) -> Result<Publication> {
    Ok(Publication {
        content_id: r.get("content_id"),
        account_id: r.get("account_id"),
        platform: parse_column(r.get("platform"))?,
        success: r.get("success"),
        external_post_id: r.get("external_post_id"),
        error_message: r.get("error_message"),
        retryable: r.get("retryable"),
        attempts: r.get::<i64, _>("attempts") as u32,
        published_at: r.get("published_at"),
        updated_at: r.get("updated_at"),
    })
}

fn scheduled_post_from_row(r: &SqliteRow) -> Result<ScheduledPost> {
    let account_ids: String = r.get("account_ids");

    Ok(ScheduledPost {
        id: r.get("id"),
        content_id: r.get("content_id"),
        user_id: r.get("user_id"),
        account_ids: serde_json::from_str(&account_ids).map_err(DbError::Serialization)?,
        scheduled_at: r.get("scheduled_at"),
        state: parse_column(r.get("state"))?,
        claim_token: r.get("claim_token"),
        claimed_at: r.get("claimed_at"),
        attempts: r.get::<i64, _>("attempts") as u32,
        error_message: r.get("error_message"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}
