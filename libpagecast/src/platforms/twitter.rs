//! Twitter/X adapter (API v2)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::debug;

use super::{as_count, http_client, read_json, request_error, AdapterResult, PlatformAdapter, PublishPayload};
use crate::error::PlatformError;
use crate::types::{AnalyticsSnapshot, Platform};

const DEFAULT_API_BASE: &str = "https://api.x.com";

pub struct TwitterAdapter {
    http: Client,
    api_base: String,
}

impl TwitterAdapter {
    pub fn new(api_base: Option<String>, timeout: Duration) -> AdapterResult<Self> {
        Ok(Self {
            http: http_client(Platform::Twitter, timeout)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl PlatformAdapter for TwitterAdapter {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn publish(&self, payload: &PublishPayload, token: &SecretString) -> AdapterResult<String> {
        if payload.image_url.is_some() {
            debug!(content_id = %payload.content_id, "Twitter media upload not supported, posting text only");
        }

        let response = self
            .http
            .post(format!("{}/2/tweets", self.api_base))
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({ "text": payload.text }))
            .send()
            .await
            .map_err(|e| request_error(Platform::Twitter, e))?;

        let body = read_json(Platform::Twitter, response).await?;
        body["data"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("twitter: response missing data.id".to_string()))
    }

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot> {
        let response = self
            .http
            .get(format!("{}/2/tweets/{}", self.api_base, external_post_id))
            .query(&[("tweet.fields", "public_metrics,non_public_metrics")])
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(Platform::Twitter, e))?;

        let body = read_json(Platform::Twitter, response).await?;
        let public = &body["data"]["public_metrics"];
        if public.is_null() {
            return Err(PlatformError::Posting(format!(
                "twitter: no metrics for tweet {}",
                external_post_id
            )));
        }
        let private = &body["data"]["non_public_metrics"];

        let impressions = as_count(&public["impression_count"]);
        Ok(AnalyticsSnapshot::new(
            impressions,
            as_count(&public["like_count"]),
            as_count(&public["retweet_count"]) + as_count(&public["quote_count"]),
            as_count(&public["reply_count"]),
            as_count(&private["url_link_clicks"]) + as_count(&private["user_profile_clicks"]),
            impressions,
        ))
    }
}
