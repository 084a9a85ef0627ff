//! HTTP adapters against a local mock server

use secrecy::SecretString;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use libpagecast::platforms::facebook::FacebookAdapter;
use libpagecast::platforms::linkedin::LinkedInAdapter;
use libpagecast::platforms::twitter::TwitterAdapter;
use libpagecast::platforms::{PlatformAdapter, PublishPayload};
use libpagecast::PlatformError;

fn payload(account: &str, text: &str) -> PublishPayload {
    PublishPayload {
        content_id: "c1".to_string(),
        external_account_id: account.to_string(),
        text: text.to_string(),
        image_url: None,
    }
}

fn kind(error: &PlatformError) -> &'static str {
    match error {
        PlatformError::Authentication(_) => "authentication",
        PlatformError::RateLimit(_) => "rate_limit",
        PlatformError::Validation(_) => "validation",
        PlatformError::Network(_) => "network",
        PlatformError::Timeout(_) => "timeout",
        PlatformError::Posting(_) => "posting",
        PlatformError::NotConfigured(_) => "not_configured",
    }
}

fn token() -> SecretString {
    SecretString::from("secret-token".to_string())
}

#[tokio::test]
async fn test_twitter_publish_and_metrics() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json_string(r#"{"text":"Hello readers"}"#))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({ "data": { "id": "1790", "text": "Hello readers" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/2/tweets/1790"))
        .and(query_param("tweet.fields", "public_metrics,non_public_metrics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "id": "1790",
                "public_metrics": {
                    "impression_count": 1000,
                    "like_count": 50,
                    "retweet_count": 8,
                    "quote_count": 2,
                    "reply_count": 5
                },
                "non_public_metrics": { "url_link_clicks": 7, "user_profile_clicks": 3 }
            }
        })))
        .mount(&server)
        .await;

    let adapter = TwitterAdapter::new(Some(server.uri()), Duration::from_secs(5)).unwrap();

    let id = adapter
        .publish(&payload("42", "Hello readers"), &token())
        .await
        .unwrap();
    assert_eq!(id, "1790");

    let metrics = adapter.fetch_analytics(&id, &token()).await.unwrap();
    assert_eq!(metrics.impressions, 1000);
    assert_eq!(metrics.likes, 50);
    assert_eq!(metrics.shares, 10);
    assert_eq!(metrics.comments, 5);
    assert_eq!(metrics.clicks, 10);
    assert_eq!(metrics.engagement_rate, 6.5);
}

#[tokio::test]
async fn test_status_codes_map_to_error_kinds() {
    let server = MockServer::start().await;
    let adapter = TwitterAdapter::new(Some(server.uri()), Duration::from_secs(5)).unwrap();

    for (status, expected) in [
        (401_u16, "authentication"),
        (429, "rate_limit"),
        (400, "validation"),
        (503, "network"),
    ] {
        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/2/tweets"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = adapter
            .publish(&payload("42", "hi"), &token())
            .await
            .unwrap_err();
        assert_eq!(kind(&err), expected, "HTTP {} mapped to {:?}", status, err);
        assert!(err.to_string().contains(&format!("HTTP {}", status)));
    }
}

#[tokio::test]
async fn test_slow_platform_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "data": { "id": "1" } }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let adapter = TwitterAdapter::new(Some(server.uri()), Duration::from_millis(200)).unwrap();
    let err = adapter
        .publish(&payload("42", "hi"), &token())
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::Timeout(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_linkedin_post_id_from_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/ugcPosts"))
        .and(header("X-Restli-Protocol-Version", "2.0.0"))
        .respond_with(ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:99"))
        .mount(&server)
        .await;

    let adapter = LinkedInAdapter::new(Some(server.uri()), Duration::from_secs(5)).unwrap();
    let id = adapter
        .publish(&payload("abc", "New chapter"), &token())
        .await
        .unwrap();

    assert_eq!(id, "urn:li:share:99");
}

#[tokio::test]
async fn test_facebook_feed_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/page-1/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "page-1_555" })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter = FacebookAdapter::new(Some(server.uri()), Duration::from_secs(5)).unwrap();
    let id = adapter
        .publish(&payload("page-1", "Out now"), &token())
        .await
        .unwrap();

    assert_eq!(id, "page-1_555");
}
