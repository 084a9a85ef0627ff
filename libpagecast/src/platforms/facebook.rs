//! Facebook Pages adapter (Graph API)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

use super::{as_count, http_client, read_json, request_error, AdapterResult, PlatformAdapter, PublishPayload};
use crate::error::PlatformError;
use crate::types::{AnalyticsSnapshot, Platform};

const DEFAULT_API_BASE: &str = "https://graph.facebook.com/v19.0";

const POST_FIELDS: &str = "insights.metric(post_impressions,post_impressions_unique,post_clicks),\
likes.summary(true).limit(0),comments.summary(true).limit(0),shares";

pub struct FacebookAdapter {
    http: Client,
    api_base: String,
}

impl FacebookAdapter {
    pub fn new(api_base: Option<String>, timeout: Duration) -> AdapterResult<Self> {
        Ok(Self {
            http: http_client(Platform::Facebook, timeout)?,
            api_base: api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

/// Value of a named metric in a Graph `insights` block
pub(crate) fn insight_value(insights: &serde_json::Value, name: &str) -> i64 {
    insights["data"]
        .as_array()
        .and_then(|metrics| metrics.iter().find(|m| m["name"] == name))
        .map(|m| {
            let latest = &m["values"][0]["value"];
            if latest.is_null() {
                as_count(&m["total_value"]["value"])
            } else {
                as_count(latest)
            }
        })
        .unwrap_or(0)
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, payload: &PublishPayload, token: &SecretString) -> AdapterResult<String> {
        let page = &payload.external_account_id;

        let request = match &payload.image_url {
            Some(url) => self
                .http
                .post(format!("{}/{}/photos", self.api_base, page))
                .form(&[("url", url.as_str()), ("caption", payload.text.as_str())]),
            None => self
                .http
                .post(format!("{}/{}/feed", self.api_base, page))
                .form(&[("message", payload.text.as_str())]),
        };

        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(Platform::Facebook, e))?;

        let body = read_json(Platform::Facebook, response).await?;
        // Photo uploads return both the photo id and the feed post id
        body["post_id"]
            .as_str()
            .or_else(|| body["id"].as_str())
            .map(str::to_string)
            .ok_or_else(|| PlatformError::Posting("facebook: response missing id".to_string()))
    }

    async fn fetch_analytics(
        &self,
        external_post_id: &str,
        token: &SecretString,
    ) -> AdapterResult<AnalyticsSnapshot> {
        let response = self
            .http
            .get(format!("{}/{}", self.api_base, external_post_id))
            .query(&[("fields", POST_FIELDS)])
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(Platform::Facebook, e))?;

        let body = read_json(Platform::Facebook, response).await?;
        let insights = &body["insights"];

        Ok(AnalyticsSnapshot::new(
            insight_value(insights, "post_impressions"),
            as_count(&body["likes"]["summary"]["total_count"]),
            as_count(&body["shares"]["count"]),
            as_count(&body["comments"]["summary"]["total_count"]),
            insight_value(insights, "post_clicks"),
            insight_value(insights, "post_impressions_unique"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_value_shapes() {
        let insights = serde_json::json!({
            "data": [
                { "name": "post_impressions", "values": [{ "value": 1200 }] },
                { "name": "post_clicks", "total_value": { "value": 40 } }
            ]
        });

        assert_eq!(insight_value(&insights, "post_impressions"), 1200);
        assert_eq!(insight_value(&insights, "post_clicks"), 40);
        assert_eq!(insight_value(&insights, "post_impressions_unique"), 0);
        assert_eq!(insight_value(&serde_json::Value::Null, "post_clicks"), 0);
    }
}
