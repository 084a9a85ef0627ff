//! Mock adapter implementation for testing
//!
//! A configurable in-memory adapter that can succeed, fail per account, fail
//! transiently a fixed number of times, or stall. It records every call so
//! integration tests can assert exactly which accounts were published to.

use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{AdapterResult, PlatformAdapter, PublishPayload};
use crate::error::PlatformError;
use crate::types::{AnalyticsSnapshot, Platform};

/// Configuration for mock adapter behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Errors returned for specific external account ids
    pub failing_accounts: HashMap<String, PlatformError>,

    /// Error returned for every publish
    pub publish_error: Option<PlatformError>,

    /// Remaining publishes that fail with a network error before succeeding
    pub transient_failures: Arc<Mutex<u32>>,

    /// Delay before completing publishes (simulates network latency)
    pub delay: Duration,

    pub snapshot: AnalyticsSnapshot,

    pub analytics_error: Option<PlatformError>,

    pub publish_calls: Arc<Mutex<usize>>,

    pub analytics_calls: Arc<Mutex<usize>>,

    /// Every payload that was published successfully
    pub published: Arc<Mutex<Vec<PublishPayload>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            failing_accounts: HashMap::new(),
            publish_error: None,
            transient_failures: Arc::new(Mutex::new(0)),
            delay: Duration::from_millis(0),
            snapshot: AnalyticsSnapshot::default(),
            analytics_error: None,
            publish_calls: Arc::new(Mutex::new(0)),
            analytics_calls: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

pub struct MockAdapter {
    config: MockConfig,
}

impl MockAdapter {
    /// A mock that always succeeds
    pub fn new(platform: Platform) -> Self {
        Self::with_config(MockConfig::new(platform))
    }

    pub fn with_config(config: MockConfig) -> Self {
        Self { config }
    }

    /// A mock whose every publish fails with `error`
    pub fn failing(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.publish_error = Some(error);
        Self::with_config(config)
    }

    pub fn fail_account(mut self, external_account_id: &str, error: PlatformError) -> Self {
        self.config
            .failing_accounts
            .insert(external_account_id.to_string(), error);
        self
    }

    pub fn with_transient_failures(self, count: u32) -> Self {
        *lock(&self.config.transient_failures) = count;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.config.delay = delay;
        self
    }

    pub fn with_snapshot(mut self, snapshot: AnalyticsSnapshot) -> Self {
        self.config.snapshot = snapshot;
        self
    }

    pub fn with_analytics_error(mut self, error: PlatformError) -> Self {
        self.config.analytics_error = Some(error);
        self
    }

    pub fn publish_call_count(&self) -> usize {
        *lock(&self.config.publish_calls)
    }

    pub fn analytics_call_count(&self) -> usize {
        *lock(&self.config.analytics_calls)
    }

    /// External account ids that were published to, in call order
    pub fn published_accounts(&self) -> Vec<String> {
        lock(&self.config.published)
            .iter()
            .map(|p| p.external_account_id.clone())
            .collect()
    }

    pub fn published(&self) -> Vec<PublishPayload> {
        lock(&self.config.published).clone()
    }
}

// A poisoned counter only means another test thread panicked mid-update
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl PlatformAdapter for MockAdapter {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn publish(&self, payload: &PublishPayload, _token: &SecretString) -> AdapterResult<String> {
        let call = {
            let mut calls = lock(&self.config.publish_calls);
            *calls += 1;
            *calls
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        {
            let mut remaining = lock(&self.config.transient_failures);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(PlatformError::Network(format!(
                    "{}: connection reset",
                    self.config.platform
                )));
            }
        }

        if let Some(error) = self.config.failing_accounts.get(&payload.external_account_id) {
            return Err(error.clone());
        }
        if let Some(error) = &self.config.publish_error {
            return Err(error.clone());
        }

        lock(&self.config.published).push(payload.clone());

        Ok(format!(
            "{}-{}-{}",
            self.config.platform, payload.external_account_id, call
        ))
    }

    async fn fetch_analytics(
        &self,
        _external_post_id: &str,
        _token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot> {
        *lock(&self.config.analytics_calls) += 1;

        match &self.config.analytics_error {
            Some(error) => Err(error.clone()),
            None => Ok(self.config.snapshot),
        }
    }
}
