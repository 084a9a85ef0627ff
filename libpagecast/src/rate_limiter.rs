//! Per-account publish rate limiting
//!
//! Caps how many posts a single account may publish per clock hour on its
//! platform. Counters live in the `rate_limits` table keyed by account and
//! hour window.

use std::collections::HashMap;

use crate::error::{DbError, Result};
use crate::types::Platform;
use crate::Database;

pub struct RateLimiter {
    /// Posts per account per hour
    limits: HashMap<Platform, u32>,
}

impl RateLimiter {
    pub fn new(limits: HashMap<Platform, u32>) -> Self {
        Self { limits }
    }

    /// Build from `[scheduling.rate_limits]`, ignoring unknown platform names
    pub fn from_config(limits: &HashMap<String, u32>) -> Self {
        let limits = limits
            .iter()
            .filter_map(|(name, limit)| name.parse::<Platform>().ok().map(|p| (p, *limit)))
            .collect();
        Self::new(limits)
    }

    pub fn limit_for(&self, platform: Platform) -> Option<u32> {
        self.limits.get(&platform).copied()
    }

    /// Reserve a publish slot for the account
    ///
    /// Returns `Ok(false)` when the account's hourly budget is spent. The check
    /// and increment happen in one statement so concurrent publishers cannot
    /// both take the last slot.
    pub async fn check_and_record(
        &self,
        db: &Database,
        account_id: &str,
        platform: Platform,
        now: i64,
    ) -> Result<bool> {
        let limit = match self.limit_for(platform) {
            Some(l) => l,
            None => return Ok(true),
        };
        if limit == 0 {
            return Ok(false);
        }

        let result = sqlx::query(
            r#"
            INSERT INTO rate_limits (account_id, window_start, post_count)
            VALUES (?, ?, 1)
            ON CONFLICT(account_id, window_start)
            DO UPDATE SET post_count = post_count + 1
            WHERE post_count < ?
            "#,
        )
        .bind(account_id)
        .bind(get_window_start(now))
        .bind(limit as i64)
        .execute(db.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    /// Whether a publish would currently be allowed (without recording)
    pub async fn check(
        &self,
        db: &Database,
        account_id: &str,
        platform: Platform,
        now: i64,
    ) -> Result<bool> {
        let limit = match self.limit_for(platform) {
            Some(l) => l,
            None => return Ok(true),
        };

        let count = get_window_count(db, account_id, get_window_start(now)).await?;
        Ok(count < limit)
    }

    /// Drop windows that ended before `cutoff`
    pub async fn cleanup_old_windows(&self, db: &Database, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limits WHERE window_start < ?")
            .bind(get_window_start(cutoff))
            .execute(db.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }
}

/// Get the window start timestamp (floor to hour)
fn get_window_start(timestamp: i64) -> i64 {
    (timestamp / 3600) * 3600
}

async fn get_window_count(db: &Database, account_id: &str, window_start: i64) -> Result<u32> {
    let row = sqlx::query_as::<_, (i64,)>(
        r#"
        SELECT post_count FROM rate_limits
        WHERE account_id = ? AND window_start = ?
        "#,
    )
    .bind(account_id)
    .bind(window_start)
    .fetch_optional(db.pool())
    .await
    .map_err(DbError::SqlxError)?;

    Ok(row.map(|r| r.0).unwrap_or(0) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32) -> RateLimiter {
        let mut limits = HashMap::new();
        limits.insert(Platform::Twitter, limit);
        RateLimiter::new(limits)
    }

    #[test]
    fn test_from_config_ignores_unknown_platforms() {
        let mut raw = HashMap::new();
        raw.insert("twitter".to_string(), 50);
        raw.insert("friendster".to_string(), 1);

        let limiter = RateLimiter::from_config(&raw);
        assert_eq!(limiter.limit_for(Platform::Twitter), Some(50));
        assert_eq!(limiter.limit_for(Platform::Facebook), None);
    }

    #[tokio::test]
    async fn test_blocks_posts_over_limit() {
        let db = Database::in_memory().await.unwrap();
        let limiter = limiter(3);
        let now = 1_000_000;

        for i in 0..3 {
            let allowed = limiter
                .check_and_record(&db, "acct-1", Platform::Twitter, now)
                .await
                .unwrap();
            assert!(allowed, "Post {} should be allowed", i + 1);
        }

        let allowed = limiter
            .check_and_record(&db, "acct-1", Platform::Twitter, now + 100)
            .await
            .unwrap();
        assert!(!allowed, "Fourth post in the same hour should be blocked");
        assert!(!limiter.check(&db, "acct-1", Platform::Twitter, now).await.unwrap());
    }

    #[tokio::test]
    async fn test_accounts_and_windows_are_independent() {
        let db = Database::in_memory().await.unwrap();
        let limiter = limiter(1);
        let now = 1_000_000;

        assert!(limiter.check_and_record(&db, "a", Platform::Twitter, now).await.unwrap());
        assert!(!limiter.check_and_record(&db, "a", Platform::Twitter, now).await.unwrap());
        assert!(limiter.check_and_record(&db, "b", Platform::Twitter, now).await.unwrap());

        let next_hour = now + 3600;
        assert!(limiter
            .check_and_record(&db, "a", Platform::Twitter, next_hour)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unlimited_and_zero_limits() {
        let db = Database::in_memory().await.unwrap();

        let unlimited = RateLimiter::new(HashMap::new());
        for _ in 0..10 {
            assert!(unlimited
                .check_and_record(&db, "a", Platform::LinkedIn, 0)
                .await
                .unwrap());
        }

        let closed = limiter(0);
        assert!(!closed
            .check_and_record(&db, "a", Platform::Twitter, 0)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_old_windows() {
        let db = Database::in_memory().await.unwrap();
        let limiter = limiter(5);
        let old = 1_000_000;
        let current = old + 7200;

        limiter.check_and_record(&db, "a", Platform::Twitter, old).await.unwrap();
        limiter.check_and_record(&db, "a", Platform::Twitter, current).await.unwrap();

        let removed = limiter.cleanup_old_windows(&db, current - 3600).await.unwrap();
        assert_eq!(removed, 1);
    }
}
