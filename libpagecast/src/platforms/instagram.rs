//! Instagram adapter (Graph API content publishing)
//!
//! Publishing is two-step: create a media container from the image URL, then
//! publish the container.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::facebook::insight_value;
use super::{http_client, read_json, request_error, AdapterResult, PlatformAdapter, PublishPayload};
use crate::error::PlatformError;
use crate::types::{AnalyticsSnapshot, Platform};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

pub struct InstagramAdapter {
    http: Client,
    api_base: String,
}

impl InstagramAdapter {
    pub fn new(api_base: Option<String>, timeout: Duration) -> AdapterResult<Self> {
        Ok(Self {
            http: http_client(Platform::Instagram, timeout)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    async fn post_form(
        &self,
        url: String,
        form: &[(&str, &str)],
        token: &SecretString,
    ) -> AdapterResult<String> {
        let response = self
            .http
            .post(url)
            .form(form)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(Platform::Instagram, e))?;

        let body = read_json(Platform::Instagram, response).await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("instagram: response missing id".to_string()))
    }
}

#[async_trait]
impl PlatformAdapter for InstagramAdapter {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, payload: &PublishPayload, token: &SecretString) -> AdapterResult<String> {
        let image_url = payload.image_url.as_deref().ok_or_else(|| {
            PlatformError::Validation("instagram: an image is required".to_string())
        })?;
        let account = &payload.external_account_id;

        let container_id = self
            .post_form(
                format!("{}/{}/media", self.api_base, account),
                &[("image_url", image_url), ("caption", payload.text.as_str())],
                token,
            )
            .await?;

        self.post_form(
            format!("{}/{}/media_publish", self.api_base, account),
            &[("creation_id", container_id.as_str())],
            token,
        )
        .await
    }

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot> {
        let response = self
            .http
            .get(format!("{}/{}/insights", self.api_base, external_post_id))
            .query(&[("metric", "impressions,reach,likes,comments,shares,saved")])
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(Platform::Instagram, e))?;

        let body = read_json(Platform::Instagram, response).await?;

        Ok(AnalyticsSnapshot::new(
            insight_value(&body, "impressions"),
            insight_value(&body, "likes"),
            insight_value(&body, "shares"),
            insight_value(&body, "comments"),
            0,
            insight_value(&body, "reach"),
        ))
    }
}
