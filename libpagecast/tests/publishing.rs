//! Immediate publishing and per-account retry

mod common;

use common::*;
use libpagecast::platforms::mock::MockAdapter;
use libpagecast::service::events::Event;
use libpagecast::service::publishing::PublishRequest;
use libpagecast::{ContentStatus, PagecastError, Platform, PlatformError};

fn request(content_id: &str, account_ids: &[&str]) -> PublishRequest {
    PublishRequest {
        content_id: content_id.to_string(),
        account_ids: account_ids.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn test_partial_failure_reports_both_accounts() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter),
        MockAdapter::failing(
            Platform::LinkedIn,
            PlatformError::Validation("linkedin: duplicate post".to_string()),
        ),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let b = connect(&h.service, USER, Platform::LinkedIn, "li-b").await;
    let content = draft(&h.service, USER, "Chapter one").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id, &b.id]))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.successful, 1);
    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("duplicate post"));

    let ok = outcome.results.iter().find(|r| r.account_id == a.id).unwrap();
    assert!(ok.success);
    assert_eq!(ok.external_post_id.as_deref(), Some("twitter-tw-a-1"));

    let failed = outcome.results.iter().find(|r| r.account_id == b.id).unwrap();
    assert!(!failed.success);
    assert!(!failed.retryable);

    let stored = h.service.content().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.status, ContentStatus::Published);
    assert!(stored.published_at.is_some());

    // Hashtags are appended to what the platform receives
    assert_eq!(h.twitter.published()[0].text, "Chapter one\n\n#books");
}

#[tokio::test]
async fn test_all_failed_is_not_an_error() {
    let h = harness_with(
        MockAdapter::failing(
            Platform::Twitter,
            PlatformError::Authentication("twitter: revoked".to_string()),
        ),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Chapter two").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.summary.successful, 0);
    assert_eq!(outcome.summary.failed, 1);

    let stored = h.service.content().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.status, ContentStatus::Draft);
}

#[tokio::test]
async fn test_request_level_errors() {
    let h = harness().await;
    let content = draft(&h.service, USER, "Mine").await;

    let err = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[]))
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::InvalidInput(_)));

    let err = h
        .service
        .publishing()
        .publish_now(USER, &request("missing", &["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::NotFound(_)));

    let err = h
        .service
        .publishing()
        .publish_now(OTHER_USER, &request(&content.id, &["x"]))
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Unauthorized(_)));
}

#[tokio::test]
async fn test_foreign_and_unknown_accounts_fail_without_dispatch() {
    let h = harness().await;
    let foreign = connect(&h.service, OTHER_USER, Platform::Twitter, "tw-other").await;
    let content = draft(&h.service, USER, "Hello").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&foreign.id, "no-such-account"]))
        .await
        .unwrap();

    assert_eq!(outcome.summary.failed, 2);
    assert_eq!(h.twitter.publish_call_count(), 0);
    assert!(h
        .service
        .database()
        .list_publications(&content.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter).with_transient_failures(2),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Eventually").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(h.twitter.publish_call_count(), 3);
}

#[tokio::test]
async fn test_transient_errors_exhaust_attempts() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter).with_transient_failures(10),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Never").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.results[0].retryable);
    assert_eq!(h.twitter.publish_call_count(), 3);
}

#[tokio::test]
async fn test_rate_limited_account_is_not_dispatched() {
    let mut config = test_config();
    config
        .scheduling
        .rate_limits
        .insert("twitter".to_string(), 1);
    let h = harness_with(
        MockAdapter::new(Platform::Twitter),
        MockAdapter::new(Platform::LinkedIn),
        config,
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let first = draft(&h.service, USER, "First").await;
    let second = draft(&h.service, USER, "Second").await;

    let publishing = h.service.publishing();
    assert!(publishing
        .publish_now(USER, &request(&first.id, &[&a.id]))
        .await
        .unwrap()
        .success);

    let outcome = publishing
        .publish_now(USER, &request(&second.id, &[&a.id]))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.results[0].retryable);
    assert!(outcome.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("hourly publish limit"));
    assert_eq!(h.twitter.publish_call_count(), 1);
}

#[tokio::test]
async fn test_over_limit_text_is_rejected_before_dispatch() {
    let h = harness().await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, &"x".repeat(300)).await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(!outcome.results[0].retryable);
    assert_eq!(h.twitter.publish_call_count(), 0);
}

#[tokio::test]
async fn test_retry_never_republishes_succeeded_account() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter),
        MockAdapter::new(Platform::LinkedIn)
            .fail_account("li-b", PlatformError::Network("linkedin: 503".to_string())),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let b = connect(&h.service, USER, Platform::LinkedIn, "li-b").await;
    let content = draft(&h.service, USER, "Retry me").await;

    h.service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id, &b.id]))
        .await
        .unwrap();
    assert_eq!(h.twitter.publish_call_count(), 1);
    let linkedin_calls = h.linkedin.publish_call_count();

    let result = h
        .service
        .retry()
        .retry_publication(USER, &content.id, &b.id)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(h.linkedin.publish_call_count() > linkedin_calls);
    assert_eq!(h.twitter.publish_call_count(), 1);

    // Retrying the succeeded account returns the stored result
    let result = h
        .service
        .retry()
        .retry_publication(USER, &content.id, &a.id)
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.external_post_id.as_deref(), Some("twitter-tw-a-1"));
    assert_eq!(h.twitter.publish_call_count(), 1);

    let publication = h
        .service
        .database()
        .get_publication(&content.id, &b.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!publication.success);
    assert_eq!(publication.attempts, 2);
}

#[tokio::test]
async fn test_retry_requires_prior_attempt() {
    let h = harness().await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Untouched").await;

    let err = h
        .service
        .retry()
        .retry_publication(USER, &content.id, &a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::NotFound(_)));

    let err = h
        .service
        .retry()
        .retry_publication(OTHER_USER, &content.id, &a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Unauthorized(_)));
}

#[tokio::test]
async fn test_retry_success_marks_content_published() {
    let h = harness_with(
        MockAdapter::new(Platform::Twitter).with_transient_failures(3),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Second chance").await;

    let outcome = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();
    assert!(!outcome.success);

    let result = h
        .service
        .retry()
        .retry_publication(USER, &content.id, &a.id)
        .await
        .unwrap();
    assert!(result.success);

    let stored = h.service.content().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.status, ContentStatus::Published);
}

#[tokio::test]
async fn test_publish_emits_events() {
    let h = harness().await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Watched").await;
    let mut events = h.service.subscribe();

    h.service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        Event::PublishStarted { .. }
    ));
    match events.recv().await.unwrap() {
        Event::AccountPublished {
            account_id,
            platform,
            ..
        } => {
            assert_eq!(account_id, a.id);
            assert_eq!(platform, Platform::Twitter);
        }
        other => panic!("Unexpected event: {:?}", other),
    }
    assert_eq!(
        events.recv().await.unwrap(),
        Event::LibraryInvalidated {
            user_id: USER.to_string()
        }
    );
}

#[tokio::test]
async fn test_published_text_is_immutable() {
    let h = harness().await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Original").await;

    let edited = h
        .service
        .content()
        .update_text(USER, &content.id, "Edited")
        .await
        .unwrap();
    assert_eq!(edited.text, "Edited");

    h.service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap();

    let err = h
        .service
        .content()
        .update_text(USER, &content.id, "Too late")
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Conflict(_)));
}

#[tokio::test]
async fn test_unrecorded_outcome_fails_the_request() {
    let h = harness().await;
    let a = connect(&h.service, USER, Platform::Twitter, "tw-a").await;
    let content = draft(&h.service, USER, "Nowhere to write").await;

    sqlx::query("DROP TABLE publications")
        .execute(h.service.database().pool())
        .await
        .unwrap();

    let err = h
        .service
        .publishing()
        .publish_now(USER, &request(&content.id, &[&a.id]))
        .await
        .unwrap_err();
    assert!(matches!(err, PagecastError::Database(_)));
    assert_eq!(h.twitter.publish_call_count(), 1);

    // The success was never stored, so the content is not marked published
    let stored = h.service.content().get(USER, &content.id).await.unwrap();
    assert_eq!(stored.status, ContentStatus::Draft);
}
