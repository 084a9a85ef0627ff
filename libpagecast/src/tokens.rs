//! Account token store
//!
//! Hands out currently valid access tokens for connected accounts, refreshing
//! expired ones through the platform's OAuth token endpoint. Concurrent
//! refreshes of the same account are tolerated: each writes its own grant and
//! the last write wins.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PlatformsConfig;
use crate::crypto::TokenCipher;
use crate::db::Database;
use crate::error::{PagecastError, PlatformError, Result};
use crate::platforms::error_for_status;
use crate::service::events::{Event, EventBus};
use crate::types::{Platform, SocialAccount};

/// Tokens returned by a successful refresh
pub struct TokenGrant {
    pub access_token: SecretString,
    /// Some providers rotate the refresh token on every use
    pub refresh_token: Option<SecretString>,
    /// Lifetime in seconds
    pub expires_in: Option<i64>,
}

/// Exchanges a refresh token for a fresh access token
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        platform: Platform,
        refresh_token: &SecretString,
    ) -> std::result::Result<TokenGrant, PlatformError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

struct OAuthClient {
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

/// Standard `grant_type=refresh_token` exchange against each platform
pub struct OAuthRefresher {
    http: Client,
    clients: HashMap<Platform, OAuthClient>,
}

impl OAuthRefresher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            clients: HashMap::new(),
        })
    }

    /// Register every platform that has OAuth client credentials configured
    pub fn from_config(platforms: &PlatformsConfig, timeout: Duration) -> Result<Self> {
        let mut refresher = Self::new(timeout)?;

        for platform in Platform::ALL {
            let Some(config) = platforms.get(platform) else {
                continue;
            };
            if let (Some(client_id), Some(client_secret)) =
                (&config.client_id, &config.client_secret)
            {
                let token_url = config
                    .token_url
                    .clone()
                    .unwrap_or_else(|| default_token_url(platform).to_string());
                refresher = refresher.with_client(platform, &token_url, client_id, client_secret);
            }
        }

        Ok(refresher)
    }

    pub fn with_client(
        mut self,
        platform: Platform,
        token_url: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        self.clients.insert(
            platform,
            OAuthClient {
                token_url: token_url.to_string(),
                client_id: client_id.to_string(),
                client_secret: SecretString::from(client_secret.to_string()),
            },
        );
        self
    }
}

fn default_token_url(platform: Platform) -> &'static str {
    match platform {
        Platform::Twitter => "https://api.x.com/2/oauth2/token",
        Platform::LinkedIn => "https://www.linkedin.com/oauth/v2/accessToken",
        Platform::Facebook | Platform::Instagram => {
            "https://graph.facebook.com/v19.0/oauth/access_token"
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(
        &self,
        platform: Platform,
        refresh_token: &SecretString,
    ) -> std::result::Result<TokenGrant, PlatformError> {
        let client = self.clients.get(&platform).ok_or_else(|| {
            PlatformError::NotConfigured(format!("{}: no OAuth client credentials", platform))
        })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret()),
            ("client_id", client.client_id.as_str()),
            ("client_secret", client.client_secret.expose_secret()),
        ];

        let response = self
            .http
            .post(&client.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PlatformError::Timeout(format!("{}: token refresh timed out", platform))
                } else {
                    PlatformError::Network(format!("{}: {}", platform, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(platform, status, &body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Posting(format!("{}: invalid token response: {}", platform, e)))?;

        Ok(TokenGrant {
            access_token: SecretString::from(token.access_token),
            refresh_token: token.refresh_token.map(SecretString::from),
            expires_in: token.expires_in,
        })
    }
}

/// Fields needed to connect a new account
pub struct NewAccount<'a> {
    pub user_id: &'a str,
    pub platform: Platform,
    pub external_account_id: &'a str,
    pub display_name: &'a str,
    pub access_token: &'a str,
    pub refresh_token: Option<&'a str>,
    pub token_expires_at: Option<i64>,
}

#[derive(Clone)]
pub struct TokenStore {
    db: Arc<Database>,
    cipher: Arc<TokenCipher>,
    refresher: Arc<dyn TokenRefresher>,
    event_bus: EventBus,
}

impl TokenStore {
    pub fn new(
        db: Arc<Database>,
        cipher: Arc<TokenCipher>,
        refresher: Arc<dyn TokenRefresher>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            cipher,
            refresher,
            event_bus,
        }
    }

    /// Store a newly connected account with its tokens encrypted
    pub async fn connect_account(&self, new: NewAccount<'_>) -> Result<SocialAccount> {
        let now = chrono::Utc::now().timestamp();
        let account = SocialAccount {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id.to_string(),
            platform: new.platform,
            external_account_id: new.external_account_id.to_string(),
            display_name: new.display_name.to_string(),
            access_token: self.cipher.encrypt(new.access_token)?,
            refresh_token: new
                .refresh_token
                .map(|t| self.cipher.encrypt(t))
                .transpose()?,
            token_expires_at: new.token_expires_at,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        self.db.insert_account(&account).await?;
        info!(account_id = %account.id, platform = %account.platform, "Connected social account");

        Ok(account)
    }

    /// Soft-deactivate an account owned by `user_id`
    pub async fn disconnect_account(&self, user_id: &str, account_id: &str) -> Result<()> {
        let account = self.owned_account(user_id, account_id).await?;
        self.deactivate(&account, "disconnected").await
    }

    /// A currently valid access token for the account, refreshing if expired
    pub async fn get_valid_access_token(
        &self,
        user_id: &str,
        account_id: &str,
    ) -> Result<SecretString> {
        let account = self.owned_account(user_id, account_id).await?;
        self.token_for_account(&account).await
    }

    /// Same as [`Self::get_valid_access_token`] for an already loaded account
    pub async fn token_for_account(&self, account: &SocialAccount) -> Result<SecretString> {
        if !account.is_active {
            return Err(PagecastError::AccountExpired(format!(
                "Account {} is inactive",
                account.id
            )));
        }

        let now = chrono::Utc::now().timestamp();
        if !account.token_expired(now) {
            return self.cipher.decrypt(&account.access_token);
        }

        let Some(encrypted_refresh) = &account.refresh_token else {
            warn!(account_id = %account.id, "Access token expired and no refresh token is stored");
            self.deactivate(account, "token expired without refresh token")
                .await?;
            return Err(PagecastError::AccountExpired(format!(
                "Account {} token expired and cannot be refreshed",
                account.id
            )));
        };

        let refresh_token = self.cipher.decrypt(encrypted_refresh)?;
        debug!(account_id = %account.id, platform = %account.platform, "Refreshing access token");

        match self.refresher.refresh(account.platform, &refresh_token).await {
            Ok(grant) => {
                let access_ct = self.cipher.encrypt(grant.access_token.expose_secret())?;
                let refresh_ct = grant
                    .refresh_token
                    .as_ref()
                    .map(|t| self.cipher.encrypt(t.expose_secret()))
                    .transpose()?;
                let expires_at = grant.expires_in.map(|secs| now + secs);

                self.db
                    .update_account_tokens(
                        &account.id,
                        &access_ct,
                        refresh_ct.as_deref(),
                        expires_at,
                        now,
                    )
                    .await?;
                info!(account_id = %account.id, platform = %account.platform, "Refreshed access token");

                Ok(grant.access_token)
            }
            // Only a rejected grant means the user must reconnect
            Err(e @ (PlatformError::Authentication(_) | PlatformError::Validation(_))) => {
                warn!(account_id = %account.id, platform = %account.platform, error = %e, "Token refresh rejected");
                self.deactivate(account, "token refresh rejected").await?;
                Err(PagecastError::AccountExpired(format!(
                    "Account {} token refresh failed: {}",
                    account.id, e
                )))
            }
            Err(e) => {
                warn!(account_id = %account.id, platform = %account.platform, error = %e, "Token refresh failed");
                Err(PagecastError::Platform(e))
            }
        }
    }

    async fn owned_account(&self, user_id: &str, account_id: &str) -> Result<SocialAccount> {
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

        Ok(account)
    }

    async fn deactivate(&self, account: &SocialAccount, reason: &str) -> Result<()> {
        self.db
            .deactivate_account(&account.id, chrono::Utc::now().timestamp())
            .await?;
        self.event_bus.emit(Event::AccountDeactivated {
            user_id: account.user_id.clone(),
            account_id: account.id.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubRefresher {
        grant: Option<(String, Option<String>, Option<i64>)>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(
            &self,
            platform: Platform,
            refresh_token: &SecretString,
        ) -> std::result::Result<TokenGrant, PlatformError> {
            *self.calls.lock().unwrap() += 1;
            assert_eq!(refresh_token.expose_secret(), "refresh-1");
            match &self.grant {
                Some((access, refresh, expires_in)) => Ok(TokenGrant {
                    access_token: SecretString::from(access.clone()),
                    refresh_token: refresh.clone().map(SecretString::from),
                    expires_in: *expires_in,
                }),
                None => Err(PlatformError::Authentication(format!(
                    "{}: invalid_grant",
                    platform
                ))),
            }
        }
    }

    async fn store_with(grant: Option<(String, Option<String>, Option<i64>)>) -> (TokenStore, Arc<StubRefresher>, EventBus) {
        let db = Arc::new(Database::in_memory().await.unwrap());
        let cipher = Arc::new(TokenCipher::from_key(&TokenCipher::generate_key()).unwrap());
        let refresher = Arc::new(StubRefresher {
            grant,
            calls: Mutex::new(0),
        });
        let events = EventBus::new(16);
        let store = TokenStore::new(db, cipher, refresher.clone(), events.clone());
        (store, refresher, events)
    }

    fn new_account<'a>(expires_at: Option<i64>, refresh: Option<&'a str>) -> NewAccount<'a> {
        NewAccount {
            user_id: "user-1",
            platform: Platform::LinkedIn,
            external_account_id: "urn:li:person:abc",
            display_name: "Reader",
            access_token: "access-1",
            refresh_token: refresh,
            token_expires_at: expires_at,
        }
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_without_refresh() {
        let (store, refresher, _) = store_with(None).await;
        let future = chrono::Utc::now().timestamp() + 3600;
        let account = store
            .connect_account(new_account(Some(future), Some("refresh-1")))
            .await
            .unwrap();

        assert_ne!(account.access_token, "access-1");

        let token = store
            .get_valid_access_token("user-1", &account.id)
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "access-1");
        assert_eq!(*refresher.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_and_persisted() {
        let (store, refresher, _) = store_with(Some((
            "access-2".to_string(),
            Some("refresh-2".to_string()),
            Some(3600),
        )))
        .await;
        let account = store
            .connect_account(new_account(Some(1), Some("refresh-1")))
            .await
            .unwrap();

        let token = store
            .get_valid_access_token("user-1", &account.id)
            .await
            .unwrap();
        assert_eq!(token.expose_secret(), "access-2");
        assert_eq!(*refresher.calls.lock().unwrap(), 1);

        let stored = store.db.get_account(&account.id).await.unwrap().unwrap();
        assert!(stored.token_expires_at.unwrap() > chrono::Utc::now().timestamp());
        assert_eq!(
            store.cipher.decrypt(&stored.access_token).unwrap().expose_secret(),
            "access-2"
        );
        assert_eq!(
            store
                .cipher
                .decrypt(stored.refresh_token.as_deref().unwrap())
                .unwrap()
                .expose_secret(),
            "refresh-2"
        );

        // Second call uses the persisted token
        store
            .get_valid_access_token("user-1", &account.id)
            .await
            .unwrap();
        assert_eq!(*refresher.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_deactivates() {
        let (store, refresher, events) = store_with(None).await;
        let mut rx = events.subscribe();
        let account = store
            .connect_account(new_account(Some(1), None))
            .await
            .unwrap();

        let result = store.get_valid_access_token("user-1", &account.id).await;
        assert!(matches!(result, Err(PagecastError::AccountExpired(_))));
        assert!(!result.unwrap_err().is_retryable());
        assert_eq!(*refresher.calls.lock().unwrap(), 0);

        let stored = store.db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(matches!(
            rx.recv().await.unwrap(),
            Event::AccountDeactivated { .. }
        ));

        // Inactive accounts stay expired
        let again = store.get_valid_access_token("user-1", &account.id).await;
        assert!(matches!(again, Err(PagecastError::AccountExpired(_))));
    }

    #[tokio::test]
    async fn test_failed_refresh_deactivates() {
        let (store, refresher, _) = store_with(None).await;
        let account = store
            .connect_account(new_account(Some(1), Some("refresh-1")))
            .await
            .unwrap();

        let result = store.get_valid_access_token("user-1", &account.id).await;
        assert!(matches!(result, Err(PagecastError::AccountExpired(_))));
        assert_eq!(*refresher.calls.lock().unwrap(), 1);

        let stored = store.db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_ownership_checks() {
        let (store, _, _) = store_with(None).await;
        let account = store
            .connect_account(new_account(None, None))
            .await
            .unwrap();

        let result = store.get_valid_access_token("user-2", &account.id).await;
        assert!(matches!(result, Err(PagecastError::Unauthorized(_))));

        let result = store.get_valid_access_token("user-1", "missing").await;
        assert!(matches!(result, Err(PagecastError::NotFound(_))));

        store.disconnect_account("user-1", &account.id).await.unwrap();
        let stored = store.db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }
}
