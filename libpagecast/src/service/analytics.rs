//! Analytics collection
//!
//! Fetches engagement metrics for published posts and keeps exactly one
//! current-state row per content item. Collecting again overwrites the row;
//! history is not kept.

use chrono::Utc;
use secrecy::SecretString;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AnalyticsConfig;
use crate::error::{PagecastError, PlatformError, Result};
use crate::platforms::AdapterRegistry;
use crate::service::owned_content;
use crate::tokens::TokenStore;
use crate::types::{AnalyticsSnapshot, GeneratedContent, Platform, PostAnalytics};
use crate::Database;

/// Counters for one analytics sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSweepReport {
    pub collected: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct AnalyticsService {
    db: Arc<Database>,
    tokens: TokenStore,
    adapters: AdapterRegistry,
    settings: AnalyticsConfig,
    request_timeout: Duration,
}

impl AnalyticsService {
    pub fn new(
        db: Arc<Database>,
        tokens: TokenStore,
        adapters: AdapterRegistry,
        settings: AnalyticsConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            db,
            tokens,
            adapters,
            settings,
            request_timeout,
        }
    }

    /// Fetch metrics for one platform post and upsert the content's row
    pub async fn collect_post_analytics(
        &self,
        content_id: &str,
        platform: Platform,
        external_post_id: &str,
        token: &SecretString,
    ) -> Result<PostAnalytics> {
        let metrics = self.fetch(platform, external_post_id, token).await?;
        self.store(content_id, platform, metrics).await
    }

    /// Collect across every successful publication of a content item
    ///
    /// Metrics from several accounts are summed into the single row. Accounts
    /// that fail are skipped; the call fails only if none succeeded.
    pub async fn collect_for_content(&self, user_id: &str, content_id: &str) -> Result<PostAnalytics> {
        let content = owned_content(&self.db, user_id, content_id).await?;
        self.collect(&content).await
    }

    /// Sweep content published within the lookback window
    pub async fn collect_recent(&self, now: i64) -> Result<AnalyticsSweepReport> {
        let since = now - self.settings.lookback.as_secs() as i64;
        let recent = self
            .db
            .list_recently_published(since, self.settings.batch_size)
            .await?;

        let mut report = AnalyticsSweepReport::default();
        for content in recent {
            match self.collect(&content).await {
                Ok(_) => report.collected += 1,
                Err(e) => {
                    warn!(content_id = %content.id, error = %e, "Analytics collection failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            collected = report.collected,
            failed = report.failed,
            "Analytics sweep finished"
        );
        Ok(report)
    }

    /// The stored analytics row
    pub async fn get(&self, user_id: &str, content_id: &str) -> Result<PostAnalytics> {
        owned_content(&self.db, user_id, content_id).await?;
        self.db.get_analytics(content_id).await?.ok_or_else(|| {
            PagecastError::NotFound(format!("No analytics collected for content {}", content_id))
        })
    }

    async fn collect(&self, content: &GeneratedContent) -> Result<PostAnalytics> {
        let publications: Vec<_> = self
            .db
            .list_publications(&content.id)
            .await?
            .into_iter()
            .filter(|p| p.success)
            .collect();

        if publications.is_empty() {
            return Err(PagecastError::NotFound(format!(
                "Content {} has no published posts",
                content.id
            )));
        }

        let mut total: Option<AnalyticsSnapshot> = None;
        let mut last_error = None;

        for publication in &publications {
            let Some(external_post_id) = publication.external_post_id.as_deref() else {
                continue;
            };

            let fetched = match self.db.get_account(&publication.account_id).await? {
                Some(account) => match self.tokens.token_for_account(&account).await {
                    Ok(token) => self.fetch(publication.platform, external_post_id, &token).await,
                    Err(e) => Err(e),
                },
                None => Err(PagecastError::NotFound(format!(
                    "Account {} not found",
                    publication.account_id
                ))),
            };

            match fetched {
                Ok(metrics) => {
                    debug!(
                        content_id = %content.id,
                        account_id = %publication.account_id,
                        impressions = metrics.impressions,
                        "Fetched metrics"
                    );
                    total = Some(match total {
                        Some(sum) => sum.combine(&metrics),
                        None => metrics,
                    });
                }
                Err(e) => {
                    warn!(
                        content_id = %content.id,
                        account_id = %publication.account_id,
                        error = %e,
                        "Skipping account for analytics"
                    );
                    last_error = Some(e);
                }
            }
        }

        match (total, last_error) {
            (Some(metrics), _) => self.store(&content.id, content.platform, metrics).await,
            (None, Some(e)) => Err(e),
            (None, None) => Err(PagecastError::NotFound(format!(
                "Content {} has no platform post ids",
                content.id
            ))),
        }
    }

    async fn fetch(
        &self,
        platform: Platform,
        external_post_id: &str,
        token: &SecretString,
    ) -> Result<AnalyticsSnapshot> {
        let adapter = self.adapters.get(platform)?;
        match tokio::time::timeout(
            self.request_timeout,
            adapter.fetch_analytics(external_post_id, token),
        )
        .await
        {
            Ok(result) => Ok(result?),
            Err(_) => Err(PlatformError::Timeout(format!(
                "{}: analytics request timed out",
                platform
            ))
            .into()),
        }
    }

    async fn store(
        &self,
        content_id: &str,
        platform: Platform,
        metrics: AnalyticsSnapshot,
    ) -> Result<PostAnalytics> {
        let analytics = PostAnalytics {
            content_id: content_id.to_string(),
            platform,
            metrics,
            last_updated: Utc::now().timestamp(),
        };
        self.db.upsert_analytics(&analytics).await?;
        Ok(analytics)
    }
}
