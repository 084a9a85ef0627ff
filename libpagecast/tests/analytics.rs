//! Analytics collection through the service facade

mod common;

use common::*;
use libpagecast::platforms::mock::MockAdapter;
use libpagecast::service::publishing::PublishRequest;
use libpagecast::{AnalyticsSnapshot, PagecastError, Platform, PlatformError};

async fn count_rows(h: &Harness, content_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM post_analytics WHERE content_id = ?")
        .bind(content_id)
        .fetch_one(h.service.database().pool())
        .await
        .unwrap()
}

async fn publish(h: &Harness, content_id: &str, account_ids: &[&str]) {
    let request = PublishRequest {
        content_id: content_id.to_string(),
        account_ids: account_ids.iter().map(|s| s.to_string()).collect(),
    };
    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request)
        .await
        .unwrap();
    assert!(outcome.success);
}

#[tokio::test]
async fn test_collect_twice_keeps_one_row() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_snapshot(AnalyticsSnapshot::new(1000, 50, 10, 5, 3, 800)),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Measured").await;
    publish(&h, &content.id, &[&a.id]).await;

    let first = h
        .service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap();
    assert_eq!(first.metrics.impressions, 1000);
    assert_eq!(first.metrics.engagement_rate, 6.5);

    h.service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap();

    assert_eq!(count_rows(&h, &content.id).await, 1);
    assert_eq!(h.twitter.analytics_call_count(), 2);

    let stored = h.service.analytics().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.metrics, first.metrics);
    assert_eq!(stored.platform, Platform::Twitter);
}

#[tokio::test]
async fn test_metrics_are_summed_across_accounts() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_snapshot(AnalyticsSnapshot::new(600, 30, 5, 5, 0, 500)),
        MockAdapter::new(Platform::LinkedIn)
            .with_snapshot(AnalyticsSnapshot::new(400, 20, 5, 0, 2, 300)),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let b = connect(&h.service, USER, Platform::LinkedIn, "li-b").await;
    let content = draft(&h.service, USER, "Everywhere").await;
    publish(&h, &content.id, &[&a.id, &b.id]).await;

    let analytics = h
        .service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap();

    assert_eq!(analytics.metrics.impressions, 1000);
    assert_eq!(analytics.metrics.likes, 50);
    assert_eq!(analytics.metrics.shares, 10);
    assert_eq!(analytics.metrics.comments, 5);
    assert_eq!(analytics.metrics.engagement_rate, 6.5);
}

#[tokio::test]
async fn test_failing_account_is_skipped() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_snapshot(AnalyticsSnapshot::new(100, 1, 0, 0, 0, 100)),
        MockAdapter::new(Platform::LinkedIn)
            .with_analytics_error(PlatformError::RateLimit("linkedin: slow down".to_string())),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let b = connect(&h.service, USER, Platform::LinkedIn, "li-b").await;
    let content = draft(&h.service, USER, "Half visible").await;
    publish(&h, &content.id, &[&a.id, &b.id]).await;

    let analytics = h
        .service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap();
    assert_eq!(analytics.metrics.impressions, 100);
    assert_eq!(analytics.metrics.engagement_rate, 1.0);
}

#[tokio::test]
async fn test_all_accounts_failing_is_an_error() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_analytics_error(PlatformError::Network("twitter: down".to_string())),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Dark").await;
    publish(&h, &content.id, &[&a.id]).await;

    let err = h
        .service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Platform(PlatformError::Network(_))));
    assert_eq!(count_rows(&h, &content.id).await, 0);
}

#[tokio::test]
async fn test_get_before_collect_is_not_found() {
    let h = harness().await;
    let content = draft(&h.service, USER, "Never measured").await;

    let err = h
        .service
        .analytics()
        .get(USER, &content.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::NotFound(_)));

    // Unpublished content has nothing to collect
    let err = h
        .service
        .analytics()
        .collect_for_content(USER, &content.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::NotFound(_)));

    let err = h
        .service
        .analytics()
        .get(OTHER_USER, &content.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Unauthorized(_)));
}

#[tokio::test]
async fn test_sweep_collects_recent_content() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_snapshot(AnalyticsSnapshot::new(10, 1, 0, 0, 0, 10)),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let published = draft(&h.service, USER, "Out").await;
    let unpublished = draft(&h.service, USER, "Not yet").await;
    publish(&h, &published.id, &[&a.id]).await;

    let report = h.service.analytics().collect_recent(now()).await.unwrap();
    assert_eq!(report.collected, 1);
    assert_eq!(report.failed, 0);

    assert_eq!(count_rows(&h, &published.id).await, 1);
    assert_eq!(count_rows(&h, &unpublished.id).await, 0);

    // Content published before the lookback window is ignored
    let lookback = h.service.config().analytics.lookback.as_secs() as i64;
    let report = h
        .service
        .analytics()
        .collect_recent(now() + lookback + 3600)
        .await
        .unwrap();
    assert_eq!(report.collected, 0);
}

#[tokio::test]
async fn test_collect_post_analytics_upserts_single_row() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter)
            .with_snapshot(AnalyticsSnapshot::new(400, 20, 4, 2, 9, 300)),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let content = draft(&h.service, USER, "Direct collect").await;
    let token = secrecy::SecretString::from("access-token".to_string());

    for _ in 0..3 {
        let row = h
            .service
            .analytics()
            .collect_post_analytics(&content.id, Platform::Twitter, "tweet-1", &token)
            .await
            .unwrap();
        assert_eq!(row.content_id, content.id);
        assert_eq!(row.metrics.engagement_rate, 6.5);
    }

    assert_eq!(count_rows(&h, &content.id).await, 1);
    assert_eq!(h.twitter.analytics_call_count(), 3);

    let stored = h.service.analytics().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.platform, Platform::Twitter);
    assert_eq!(stored.metrics.reach, 300);
}
