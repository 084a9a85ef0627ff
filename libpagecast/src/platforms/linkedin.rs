//! LinkedIn adapter (UGC posts and share statistics)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{as_count, http_client, read_json, request_error, AdapterResult, PlatformAdapter, PublishPayload};
use crate::error::PlatformError;
use crate::types::{AnalyticsSnapshot, Platform};

const DEFAULT_API_BASE: &str = "https://api.linkedin.com";

pub struct LinkedInAdapter {
    http: Client,
    api_base: String,
}

impl LinkedInAdapter {
    pub fn new(api_base: Option<String>, timeout: Duration) -> AdapterResult<Self> {
        Ok(Self {
            http: http_client(Platform::LinkedIn, timeout)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Accounts store either a bare member id or a full URN
fn author_urn(external_account_id: &str) -> String {
    if external_account_id.starts_with("urn:li:") {
        external_account_id.to_string()
    } else {
        format!("urn:li:person:{}", external_account_id)
    }
}

fn share_body(payload: &PublishPayload) -> serde_json::Value {
    let (category, media) = match &payload.image_url {
        Some(url) => (
            "IMAGE",
            serde_json::json!([{ "status": "READY", "originalUrl": url }]),
        ),
        None => ("NONE", serde_json::json!([])),
    };

    serde_json::json!({
        "author": author_urn(&payload.external_account_id),
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": payload.text },
                "shareMediaCategory": category,
                "media": media,
            }
        },
        "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
    })
}

#[async_trait]
impl PlatformAdapter for LinkedInAdapter {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn publish(&self, payload: &PublishPayload, token: &SecretString) -> AdapterResult<String> {
        let response = self
            .http
            .post(format!("{}/v2/ugcPosts", self.api_base))
            .bearer_auth(token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .json(&share_body(payload))
            .send()
            .await
            .map_err(|e| request_error(Platform::LinkedIn, e))?;

        // The post URN arrives in a header; older API versions echo it in the body
        let header_id = response
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = read_json(Platform::LinkedIn, response).await?;
        header_id
            .or_else(|| body["id"].as_str().map(str::to_string))
            .ok_or_else(|| PlatformError::Posting("linkedin: response missing post id".to_string()))
    }

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot> {
        let posts = format!("List({})", external_post_id);
        let response = self
            .http
            .get(format!("{}/v2/organizationalEntityShareStatistics", self.api_base))
            .query(&[("q", "organizationalEntity"), ("ugcPosts", posts.as_str())])
            .bearer_auth(token.expose_secret())
            .header("X-Restli-Protocol-Version", "2.0.0")
            .send()
            .await
            .map_err(|e| request_error(Platform::LinkedIn, e))?;

        let body = read_json(Platform::LinkedIn, response).await?;
        let stats = &body["elements"][0]["totalShareStatistics"];
        if stats.is_null() {
            return Err(PlatformError::Posting(format!(
                "linkedin: no share statistics for {}",
                external_post_id
            )));
        }

        Ok(AnalyticsSnapshot::new(
            as_count(&stats["impressionCount"]),
            as_count(&stats["likeCount"]),
            as_count(&stats["shareCount"]),
            as_count(&stats["commentCount"]),
            as_count(&stats["clickCount"]),
            as_count(&stats["uniqueImpressionsCount"]),
        ))
    }
}
