//! Core types for Pagecast

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Social networks Pagecast can publish to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    LinkedIn,
    Facebook,
    Instagram,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Twitter,
        Platform::LinkedIn,
        Platform::Facebook,
        Platform::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::LinkedIn => "linkedin",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
        }
    }

    /// Maximum post length in characters
    pub fn character_limit(&self) -> usize {
        match self {
            Platform::Twitter => 280,
            Platform::LinkedIn => 3000,
            Platform::Facebook => 63206,
            Platform::Instagram => 2200,
        }
    }

    /// Instagram only accepts media posts
    pub fn requires_image(&self) -> bool {
        matches!(self, Platform::Instagram)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "linkedin" => Ok(Platform::LinkedIn),
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: twitter, linkedin, facebook, instagram",
                s
            )),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Accounts
// ============================================================================

/// A connected social account
///
/// `access_token` and `refresh_token` hold ciphertext as stored in the
/// database. Use [`crate::tokens::TokenStore`] to obtain a usable token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialAccount {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub external_account_id: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SocialAccount {
    /// Tokens without an expiry never expire
    pub fn token_expired(&self, now: i64) -> bool {
        self.token_expires_at.is_some_and(|expires| expires <= now)
    }
}

// ============================================================================
// Content
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Scheduled => "scheduled",
            ContentStatus::Published => "published",
            ContentStatus::Failed => "failed",
        }
    }
}

impl FromStr for ContentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContentStatus::Draft),
            "scheduled" => Ok(ContentStatus::Scheduled),
            "published" => Ok(ContentStatus::Published),
            "failed" => Ok(ContentStatus::Failed),
            _ => Err(format!("Unknown content status: {}", s)),
        }
    }
}

/// Generated social content for one target platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub id: String,
    pub user_id: String,
    pub book_id: Option<String>,
    pub platform: Platform,
    pub text: String,
    pub hashtags: Vec<String>,
    pub image_url: Option<String>,
    pub status: ContentStatus,
    pub created_at: i64,
    pub updated_at: i64,
    pub published_at: Option<i64>,
}

impl GeneratedContent {
    pub fn new(user_id: &str, platform: Platform, text: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            book_id: None,
            platform,
            text,
            hashtags: Vec::new(),
            image_url: None,
            status: ContentStatus::Draft,
            created_at: now,
            updated_at: now,
            published_at: None,
        }
    }

    /// Text as it will appear on the platform, hashtags appended
    pub fn render_text(&self) -> String {
        if self.hashtags.is_empty() {
            return self.text.clone();
        }

        let tags: Vec<String> = self
            .hashtags
            .iter()
            .map(|tag| {
                let tag = tag.trim();
                if tag.starts_with('#') {
                    tag.to_string()
                } else {
                    format!("#{}", tag)
                }
            })
            .collect();

        format!("{}\n\n{}", self.text.trim_end(), tags.join(" "))
    }
}

// ============================================================================
// Scheduling
// ============================================================================

/// Lifecycle of a scheduled post
///
/// `InFlight` is internal: it marks a post claimed by a promotion run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleState {
    Pending,
    InFlight,
    Published,
    Cancelled,
    Failed,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::Pending => "pending",
            ScheduleState::InFlight => "in_flight",
            ScheduleState::Published => "published",
            ScheduleState::Cancelled => "cancelled",
            ScheduleState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScheduleState::Published | ScheduleState::Cancelled | ScheduleState::Failed
        )
    }
}

impl FromStr for ScheduleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ScheduleState::Pending),
            "in_flight" => Ok(ScheduleState::InFlight),
            "published" => Ok(ScheduleState::Published),
            "cancelled" => Ok(ScheduleState::Cancelled),
            "failed" => Ok(ScheduleState::Failed),
            _ => Err(format!(
                "Unknown schedule state: '{}'. Valid options: pending, in_flight, published, cancelled, failed",
                s
            )),
        }
    }
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPost {
    pub id: String,
    pub content_id: String,
    pub user_id: String,
    pub account_ids: Vec<String>,
    /// Unix seconds
    pub scheduled_at: i64,
    pub state: ScheduleState,
    /// Owner token of the current promotion claim
    #[serde(default, skip_serializing)]
    pub claim_token: Option<String>,
    pub claimed_at: Option<i64>,
    pub attempts: u32,
    pub error_message: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ScheduledPost {
    pub fn new(user_id: &str, content_id: &str, account_ids: Vec<String>, scheduled_at: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            content_id: content_id.to_string(),
            user_id: user_id.to_string(),
            account_ids,
            scheduled_at,
            state: ScheduleState::Pending,
            claim_token: None,
            claimed_at: None,
            attempts: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Publishing
// ============================================================================

/// Stored outcome for one (content, account) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub content_id: String,
    pub account_id: String,
    pub platform: Platform,
    pub success: bool,
    pub external_post_id: Option<String>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub attempts: u32,
    pub published_at: Option<i64>,
    pub updated_at: i64,
}

/// Result of publishing content to a single account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishResult {
    pub success: bool,
    pub content_id: String,
    pub account_id: String,
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_post_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retryable: bool,
}

impl PublishResult {
    pub fn succeeded(
        content_id: &str,
        account_id: &str,
        platform: Platform,
        external_post_id: String,
    ) -> Self {
        Self {
            success: true,
            content_id: content_id.to_string(),
            account_id: account_id.to_string(),
            platform: Some(platform),
            external_post_id: Some(external_post_id),
            error: None,
            retryable: false,
        }
    }

    pub fn failed(
        content_id: &str,
        account_id: &str,
        platform: Option<Platform>,
        error: String,
        retryable: bool,
    ) -> Self {
        Self {
            success: false,
            content_id: content_id.to_string(),
            account_id: account_id.to_string(),
            platform,
            external_post_id: None,
            error: Some(error),
            retryable,
        }
    }
}

impl From<&Publication> for PublishResult {
    fn from(publication: &Publication) -> Self {
        Self {
            success: publication.success,
            content_id: publication.content_id.clone(),
            account_id: publication.account_id.clone(),
            platform: Some(publication.platform),
            external_post_id: publication.external_post_id.clone(),
            error: publication.error_message.clone(),
            retryable: publication.retryable,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PublishSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

impl PublishSummary {
    pub fn from_results(results: &[PublishResult]) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            successful,
            failed: results.len() - successful,
        }
    }
}

/// Aggregated outcome of a publish batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    pub success: bool,
    pub results: Vec<PublishResult>,
    pub summary: PublishSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl PublishOutcome {
    pub fn new(results: Vec<PublishResult>, warnings: Vec<String>) -> Self {
        let summary = PublishSummary::from_results(&results);
        Self {
            success: summary.successful > 0,
            results,
            summary,
            warnings,
        }
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Engagement metrics normalized across platforms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSnapshot {
    pub impressions: i64,
    pub likes: i64,
    pub shares: i64,
    pub comments: i64,
    pub clicks: i64,
    pub reach: i64,
    pub engagement_rate: f64,
}

impl AnalyticsSnapshot {
    /// Build a snapshot and derive its engagement rate
    pub fn new(impressions: i64, likes: i64, shares: i64, comments: i64, clicks: i64, reach: i64) -> Self {
        Self {
            impressions,
            likes,
            shares,
            comments,
            clicks,
            reach,
            engagement_rate: engagement_rate(impressions, likes, shares, comments),
        }
    }

    /// Sum two snapshots, recomputing the rate from the combined counters
    pub fn combine(&self, other: &AnalyticsSnapshot) -> Self {
        Self::new(
            self.impressions + other.impressions,
            self.likes + other.likes,
            self.shares + other.shares,
            self.comments + other.comments,
            self.clicks + other.clicks,
            self.reach + other.reach,
        )
    }
}

/// `(likes + shares + comments) / impressions * 100`, two decimals
pub fn engagement_rate(impressions: i64, likes: i64, shares: i64, comments: i64) -> f64 {
    if impressions <= 0 {
        return 0.0;
    }
    let rate = (likes + shares + comments) as f64 / impressions as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

/// The single current-state analytics row for a content item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostAnalytics {
    pub content_id: String,
    pub platform: Platform,
    #[serde(flatten)]
    pub metrics: AnalyticsSnapshot,
    pub last_updated: i64,
}
