//! Shared setup for libpagecast integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use libpagecast::config::Config;
use libpagecast::crypto::TokenCipher;
use libpagecast::platforms::mock::MockAdapter;
use libpagecast::platforms::AdapterRegistry;
use libpagecast::tokens::{NewAccount, TokenGrant, TokenRefresher};
use libpagecast::{Database, GeneratedContent, PagecastService, Platform, PlatformError, SocialAccount};

pub const USER: &str = "user-1";
pub const OTHER_USER: &str = "user-2";

/// Refresher for tests that never expect a refresh
pub struct NoRefresh;

#[async_trait]
impl TokenRefresher for NoRefresh {
    async fn refresh(
        &self,
        platform: Platform,
        _refresh_token: &SecretString,
    ) -> Result<TokenGrant, PlatformError> {
        Err(PlatformError::Authentication(format!(
            "{}: refresh not available in tests",
            platform
        )))
    }
}

pub struct Harness {
    pub service: PagecastService,
    pub twitter: Arc<MockAdapter>,
    pub linkedin: Arc<MockAdapter>,
}

/// Config without real platform credentials and with zero backoff
pub fn test_config() -> Config {
    let mut config = Config::default_config();
    config.publishing.backoff_base = Duration::ZERO;
    config.publishing.request_timeout = Duration::from_secs(5);
    config
}

pub async fn harness() -> Harness {
    harness_with(
        MockAdapter::new(Platform::Twitter),
        MockAdapter::new(Platform::LinkedIn),
        test_config(),
    )
    .await
}

pub async fn harness_with(twitter: MockAdapter, linkedin: MockAdapter, config: Config) -> Harness {
    let db = Database::in_memory().await.unwrap();
    build(db, twitter, linkedin, config, &TokenCipher::generate_key())
}

/// Build a service over an existing database; every runner sharing a
/// database must use the same token key
pub fn build(
    db: Database,
    twitter: MockAdapter,
    linkedin: MockAdapter,
    config: Config,
    token_key: &str,
) -> Harness {
    let twitter = Arc::new(twitter);
    let linkedin = Arc::new(linkedin);
    let adapters = AdapterRegistry::new()
        .with(twitter.clone())
        .with(linkedin.clone());

    let service = PagecastService::with_components(
        config,
        db,
        TokenCipher::from_key(token_key).unwrap(),
        Arc::new(NoRefresh),
        adapters,
    );

    Harness {
        service,
        twitter,
        linkedin,
    }
}

pub async fn connect(
    service: &PagecastService,
    user_id: &str,
    platform: Platform,
    external_account_id: &str,
) -> SocialAccount {
    service
        .tokens()
        .connect_account(NewAccount {
            user_id,
            platform,
            external_account_id,
            display_name: external_account_id,
            access_token: "access-token",
            refresh_token: None,
            token_expires_at: None,
        })
        .await
        .unwrap()
}

pub async fn draft(service: &PagecastService, user_id: &str, text: &str) -> GeneratedContent {
    let mut content = GeneratedContent::new(user_id, Platform::Twitter, text.to_string());
    content.hashtags = vec!["books".to_string()];
    service.content().create(&content).await.unwrap();
    content
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn in_secs(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now() + chrono::Duration::seconds(secs)
}
